//! Rights registry operations for the repository.
//!
//! The ledger only reads these tables. `register_media` is the write path used
//! by the rights-registration workflow (and by tests).

use crate::domain::{MediaId, MediaOwnership, OwnerRef, OwnershipEntry, Share};
use crate::ownership::OwnershipError;
use sqlx::Row;

use super::Repository;

impl Repository {
    /// Register (or re-register) a media item and replace its ownership entries.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn register_media(&self, media: &MediaOwnership) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO media (media_id, artist_name, title, channel_id)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(media_id) DO UPDATE SET
                artist_name = excluded.artist_name,
                title = excluded.title,
                channel_id = excluded.channel_id
            "#,
        )
        .bind(media.media_id.as_str())
        .bind(&media.artist_name)
        .bind(media.title.as_deref())
        .bind(media.channel_id.as_deref())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM media_ownership WHERE media_id = ?")
            .bind(media.media_id.as_str())
            .execute(&mut *tx)
            .await?;

        for (position, entry) in media.entries.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO media_ownership
                (media_id, position, owner_kind, owner_key, owner_name, share)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(media.media_id.as_str())
            .bind(position as i64)
            .bind(entry.owner.kind())
            .bind(entry.owner.key())
            .bind(entry.owner_name.as_deref())
            .bind(entry.share.to_canonical_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Read a media item and its ownership entries in registration order.
    pub async fn query_media_ownership(
        &self,
        media_id: &MediaId,
    ) -> Result<Option<MediaOwnership>, OwnershipError> {
        let media_row = sqlx::query(
            "SELECT media_id, artist_name, title, channel_id FROM media WHERE media_id = ?",
        )
        .bind(media_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(media_row) = media_row else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT owner_kind, owner_key, owner_name, share
            FROM media_ownership
            WHERE media_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(media_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let malformed = |message: String| OwnershipError::Malformed {
            media_id: media_id.to_string(),
            message,
        };

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let kind: String = row.try_get("owner_kind")?;
            let key: String = row.try_get("owner_key")?;
            let owner = OwnerRef::from_parts(&kind, key)
                .ok_or_else(|| malformed(format!("unknown owner kind {}", kind)))?;
            let share_str: String = row.try_get("share")?;
            let share = Share::from_str_canonical(&share_str)
                .map_err(|e| malformed(format!("share {}: {}", share_str, e)))?;
            entries.push(OwnershipEntry {
                owner,
                owner_name: row.try_get("owner_name")?,
                share,
            });
        }

        Ok(Some(MediaOwnership {
            media_id: media_id.clone(),
            artist_name: media_row.try_get("artist_name")?,
            title: media_row.try_get("title")?,
            channel_id: media_row.try_get("channel_id")?,
            entries,
        }))
    }
}
