//! Repository layer for database operations.
//!
//! Reads go straight to the pool. Every mutation of the ledger goes through a
//! [`LedgerTx`] so it commits or rolls back as one unit. Methods are organized
//! across submodules by domain:
//! - `ownership.rs` - rights registry reads and registration writes
//! - `payouts.rs` - payout request reads
//! - `ledger_tx.rs` - the transactional write handle

mod ledger_tx;
mod ownership;
mod payouts;

pub use ledger_tx::{ClaimCandidate, LedgerTx};

use crate::domain::{
    AllocationRecord, AllocationStatus, ArtistAccount, ArtistId, BidderId, MediaId, Money,
    NameFingerprint, OwnerRef, PayoutMethod, PayoutRequest, PayoutStatus, RequestId, StoredTip,
    TimeMs, TipEvent, TipId,
};
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

pub(crate) const ALLOCATION_COLUMNS: &str = "a.seq, a.allocation_id, a.tip_id, a.owner_index, \
     a.media_id, a.owner_kind, a.owner_key, a.origin_fingerprint, a.artist_name, a.channel_id, \
     a.amount, a.allocated_at, a.status, a.claimed_at, a.matched_at, a.payout_request_id";

pub(crate) const PAYOUT_COLUMNS: &str = "request_id, artist_id, amount_requested, \
     amount_approved, method, method_details, total_earned_at_request, status, requested_at, \
     processed_at";

pub(crate) const ACCOUNT_COLUMNS: &str = "artist_id, balance, total_earned, \
     last_payout_total_earned, payout_count, display_name, channel_id";

/// Allocation with the tip and media metadata it came from, for history views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub record: AllocationRecord,
    pub tip_amount: Money,
    pub bidder_id: BidderId,
    pub tipped_at: TimeMs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_artist_name: Option<String>,
}

/// Allocation stream totals for one artist, recomputed from records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTotals {
    pub pending: Money,
    pub all_time: Money,
}

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a transactional write handle.
    pub async fn begin_ledger_tx(&self) -> Result<LedgerTx, sqlx::Error> {
        LedgerTx::begin(&self.pool).await
    }

    // =========================================================================
    // Tips and allocations
    // =========================================================================

    /// Fetch a processed tip by id.
    pub async fn get_tip(&self, tip_id: &TipId) -> Result<Option<StoredTip>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT tip_id, media_id, bidder_id, amount, artist_pool, platform_fee,
                   tipped_at, processed_at
            FROM tip_events
            WHERE tip_id = ?
            "#,
        )
        .bind(tip_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| tip_from_row(&r)).transpose()
    }

    /// All allocation records of a tip, in owner order.
    pub async fn allocations_for_tip(
        &self,
        tip_id: &TipId,
    ) -> Result<Vec<AllocationRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM allocations a WHERE a.tip_id = ? ORDER BY a.owner_index ASC",
            ALLOCATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(tip_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(allocation_from_row).collect()
    }

    /// Allocation history of an artist, newest first, with tip and media metadata.
    pub async fn query_history(
        &self,
        artist_id: &ArtistId,
        limit: i64,
    ) -> Result<Vec<HistoryEntry>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}, t.amount AS tip_amount, t.bidder_id, t.tipped_at,
                   m.title AS media_title, m.artist_name AS media_artist_name
            FROM allocations a
            JOIN tip_events t ON t.tip_id = a.tip_id
            LEFT JOIN media m ON m.media_id = a.media_id
            WHERE a.owner_kind = 'artist' AND a.owner_key = ?
            ORDER BY a.allocated_at DESC, a.seq DESC
            LIMIT ?
            "#,
            ALLOCATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(artist_id.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(HistoryEntry {
                    record: allocation_from_row(row)?,
                    tip_amount: money_col(row, "tip_amount")?,
                    bidder_id: BidderId::new(row.try_get::<String, _>("bidder_id")?),
                    tipped_at: TimeMs::new(row.try_get("tipped_at")?),
                    media_title: row.try_get("media_title")?,
                    media_artist_name: row.try_get("media_artist_name")?,
                })
            })
            .collect()
    }

    /// Pending unverified records matching a fingerprint and/or a channel id, oldest first.
    pub async fn query_unclaimed(
        &self,
        fingerprint: Option<&NameFingerprint>,
        channel_id: Option<&str>,
    ) -> Result<Vec<AllocationRecord>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {} FROM allocations a
            WHERE a.owner_kind = 'name' AND a.status = 'pending'
              AND ((? IS NOT NULL AND a.origin_fingerprint = ?)
                   OR (? IS NOT NULL AND a.channel_id = ?))
            ORDER BY a.seq ASC
            "#,
            ALLOCATION_COLUMNS
        );
        let fp = fingerprint.map(|f| f.as_str());
        let rows = sqlx::query(&sql)
            .bind(fp)
            .bind(fp)
            .bind(channel_id)
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(allocation_from_row).collect()
    }

    /// Recompute pending and all-time totals for an artist from the allocation stream.
    ///
    /// Amounts are INTEGER columns, so SQLite's SUM stays exact here.
    pub async fn stream_totals(&self, artist_id: &ArtistId) -> Result<StreamTotals, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'pending' THEN amount ELSE 0 END), 0) AS pending,
                COALESCE(SUM(amount), 0) AS all_time
            FROM allocations
            WHERE owner_kind = 'artist' AND owner_key = ?
            "#,
        )
        .bind(artist_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(StreamTotals {
            pending: money_col(&row, "pending")?,
            all_time: money_col(&row, "all_time")?,
        })
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Materialised account of an artist, if the ledger has ever touched it.
    pub async fn get_account(
        &self,
        artist_id: &ArtistId,
    ) -> Result<Option<ArtistAccount>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM artist_accounts WHERE artist_id = ?",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(artist_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| account_from_row(&r)).transpose()
    }
}

// =============================================================================
// Row decoding
// =============================================================================

pub(crate) fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

pub(crate) fn money_col(row: &SqliteRow, column: &str) -> Result<Money, sqlx::Error> {
    let value: i64 = row.try_get(column)?;
    Money::try_new(value).map_err(|e| decode_error(format!("{}: {}", column, e)))
}

pub(crate) fn opt_money_col(row: &SqliteRow, column: &str) -> Result<Option<Money>, sqlx::Error> {
    let value: Option<i64> = row.try_get(column)?;
    value
        .map(Money::try_new)
        .transpose()
        .map_err(|e| decode_error(format!("{}: {}", column, e)))
}

fn opt_time_col(row: &SqliteRow, column: &str) -> Result<Option<TimeMs>, sqlx::Error> {
    Ok(row.try_get::<Option<i64>, _>(column)?.map(TimeMs::new))
}

pub(crate) fn tip_from_row(row: &SqliteRow) -> Result<StoredTip, sqlx::Error> {
    Ok(StoredTip {
        event: TipEvent {
            tip_id: TipId::new(row.try_get::<String, _>("tip_id")?),
            media_id: MediaId::new(row.try_get::<String, _>("media_id")?),
            bidder_id: BidderId::new(row.try_get::<String, _>("bidder_id")?),
            amount: money_col(row, "amount")?,
            timestamp: TimeMs::new(row.try_get("tipped_at")?),
        },
        artist_pool: money_col(row, "artist_pool")?,
        platform_fee: money_col(row, "platform_fee")?,
        processed_at: TimeMs::new(row.try_get("processed_at")?),
    })
}

pub(crate) fn allocation_from_row(row: &SqliteRow) -> Result<AllocationRecord, sqlx::Error> {
    let kind: String = row.try_get("owner_kind")?;
    let key: String = row.try_get("owner_key")?;
    let owner = OwnerRef::from_parts(&kind, key)
        .ok_or_else(|| decode_error(format!("unknown owner_kind {}", kind)))?;

    let status_str: String = row.try_get("status")?;
    let status = AllocationStatus::parse(&status_str)
        .ok_or_else(|| decode_error(format!("unknown allocation status {}", status_str)))?;

    Ok(AllocationRecord {
        allocation_id: row.try_get("allocation_id")?,
        tip_id: TipId::new(row.try_get::<String, _>("tip_id")?),
        media_id: MediaId::new(row.try_get::<String, _>("media_id")?),
        owner,
        owner_index: row.try_get("owner_index")?,
        amount: money_col(row, "amount")?,
        allocated_at: TimeMs::new(row.try_get("allocated_at")?),
        status,
        claimed_at: opt_time_col(row, "claimed_at")?,
        artist_name: row.try_get("artist_name")?,
        channel_id: row.try_get("channel_id")?,
        origin_fingerprint: row
            .try_get::<Option<String>, _>("origin_fingerprint")?
            .map(NameFingerprint::from_stored),
        matched_at: opt_time_col(row, "matched_at")?,
        payout_request_id: row
            .try_get::<Option<String>, _>("payout_request_id")?
            .map(RequestId::new),
    })
}

pub(crate) fn account_from_row(row: &SqliteRow) -> Result<ArtistAccount, sqlx::Error> {
    Ok(ArtistAccount {
        artist_id: ArtistId::new(row.try_get::<String, _>("artist_id")?),
        balance: money_col(row, "balance")?,
        total_escrow_earned: money_col(row, "total_earned")?,
        last_payout_total_earned: opt_money_col(row, "last_payout_total_earned")?,
        payout_count: row.try_get("payout_count")?,
        display_name: row.try_get("display_name")?,
        channel_id: row.try_get("channel_id")?,
    })
}

pub(crate) fn payout_from_row(row: &SqliteRow) -> Result<PayoutRequest, sqlx::Error> {
    let method_str: String = row.try_get("method")?;
    let method = PayoutMethod::parse(&method_str)
        .ok_or_else(|| decode_error(format!("unknown payout method {}", method_str)))?;

    let status_str: String = row.try_get("status")?;
    let status = PayoutStatus::parse(&status_str)
        .ok_or_else(|| decode_error(format!("unknown payout status {}", status_str)))?;

    let details_str: String = row.try_get("method_details")?;
    let method_details = serde_json::from_str(&details_str)
        .map_err(|e| decode_error(format!("method_details: {}", e)))?;

    Ok(PayoutRequest {
        request_id: RequestId::new(row.try_get::<String, _>("request_id")?),
        artist_id: ArtistId::new(row.try_get::<String, _>("artist_id")?),
        amount_requested: opt_money_col(row, "amount_requested")?,
        amount_approved: money_col(row, "amount_approved")?,
        method,
        method_details,
        total_earned_at_request: money_col(row, "total_earned_at_request")?,
        requested_at: TimeMs::new(row.try_get("requested_at")?),
        status,
        processed_at: opt_time_col(row, "processed_at")?,
    })
}
