//! Payout request reads for the repository.

use crate::domain::{ArtistId, PayoutRequest, RequestId};

use super::{payout_from_row, Repository, PAYOUT_COLUMNS};

impl Repository {
    /// Fetch a payout request by id.
    pub async fn get_payout_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<PayoutRequest>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM payout_requests WHERE request_id = ?",
            PAYOUT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(request_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| payout_from_row(&r)).transpose()
    }

    /// The artist's `submitted` request, if any. At most one exists.
    pub async fn open_payout_request(
        &self,
        artist_id: &ArtistId,
    ) -> Result<Option<PayoutRequest>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM payout_requests WHERE artist_id = ? AND status = 'submitted'",
            PAYOUT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(artist_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| payout_from_row(&r)).transpose()
    }

    /// All payout requests of an artist, newest first.
    pub async fn list_payout_requests(
        &self,
        artist_id: &ArtistId,
    ) -> Result<Vec<PayoutRequest>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {} FROM payout_requests
            WHERE artist_id = ?
            ORDER BY requested_at DESC, rowid DESC
            "#,
            PAYOUT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(artist_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(payout_from_row).collect()
    }
}
