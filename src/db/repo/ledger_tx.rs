//! Transactional write handle for ledger mutations.
//!
//! A `LedgerTx` wraps one SQLite transaction. Dropping it without `commit`
//! rolls everything back, so a failed operation leaves the ledger in its
//! pre-operation state. Callers open each transaction with a write
//! (`insert_tip` or `lock_account`) so SQLite takes the write lock before any
//! read that feeds a decision.

use super::{account_from_row, money_col, payout_from_row, ACCOUNT_COLUMNS, PAYOUT_COLUMNS};
use crate::domain::{
    AllocationRecord, ArtistAccount, ArtistId, Money, NameFingerprint, PayoutRequest,
    PayoutStatus, RequestId, TimeMs, TipEvent,
};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{Row, Transaction};

/// A pending allocation row eligible for claiming or matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimCandidate {
    pub seq: i64,
    pub amount: Money,
}

pub struct LedgerTx {
    tx: Transaction<'static, Sqlite>,
    now: TimeMs,
}

impl LedgerTx {
    pub(super) async fn begin(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        Ok(Self {
            tx: pool.begin().await?,
            now: TimeMs::now(),
        })
    }

    /// Timestamp applied to every row written in this transaction.
    pub fn now(&self) -> TimeMs {
        self.now
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    // =========================================================================
    // Tips and allocations
    // =========================================================================

    /// Record a tip. Returns `false` when the tip id was already processed.
    pub async fn insert_tip(
        &mut self,
        tip: &TipEvent,
        artist_pool: Money,
        platform_fee: Money,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO tip_events (
                tip_id, media_id, bidder_id, amount, artist_pool, platform_fee,
                tipped_at, processed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tip_id) DO NOTHING
            "#,
        )
        .bind(tip.tip_id.as_str())
        .bind(tip.media_id.as_str())
        .bind(tip.bidder_id.as_str())
        .bind(tip.amount.pence())
        .bind(artist_pool.pence())
        .bind(platform_fee.pence())
        .bind(tip.timestamp.as_ms())
        .bind(self.now.as_ms())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_allocation(
        &mut self,
        record: &AllocationRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO allocations (
                allocation_id, tip_id, owner_index, media_id, owner_kind, owner_key,
                origin_fingerprint, artist_name, channel_id, amount, allocated_at, status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.allocation_id)
        .bind(record.tip_id.as_str())
        .bind(record.owner_index)
        .bind(record.media_id.as_str())
        .bind(record.owner.kind())
        .bind(record.owner.key())
        .bind(record.origin_fingerprint.as_ref().map(|f| f.as_str()))
        .bind(record.artist_name.as_deref())
        .bind(record.channel_id.as_deref())
        .bind(record.amount.pence())
        .bind(record.allocated_at.as_ms())
        .bind(record.status.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    /// Pending, unreserved records of an artist, oldest first.
    pub async fn claimable_records(
        &mut self,
        artist_id: &ArtistId,
    ) -> Result<Vec<ClaimCandidate>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT a.seq, a.amount
            FROM allocations a
            LEFT JOIN payout_reservations r ON r.allocation_seq = a.seq
            WHERE a.owner_kind = 'artist' AND a.owner_key = ? AND a.status = 'pending'
              AND r.allocation_seq IS NULL
            ORDER BY a.allocated_at ASC, a.seq ASC
            "#,
        )
        .bind(artist_id.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(candidate_from_row).collect()
    }

    /// Mark records claimed. Only pending rows change; returns how many did.
    pub async fn claim_records(
        &mut self,
        seqs: &[i64],
        request_id: Option<&RequestId>,
    ) -> Result<u64, sqlx::Error> {
        let mut claimed = 0;
        for seq in seqs {
            let result = sqlx::query(
                r#"
                UPDATE allocations
                SET status = 'claimed', claimed_at = ?, payout_request_id = ?
                WHERE seq = ? AND status = 'pending'
                "#,
            )
            .bind(self.now.as_ms())
            .bind(request_id.map(|r| r.as_str()))
            .bind(seq)
            .execute(&mut *self.tx)
            .await?;
            claimed += result.rows_affected();
        }
        Ok(claimed)
    }

    /// Unverified pending records whose fingerprint or channel matches, oldest first.
    pub async fn unclaimed_matches(
        &mut self,
        fingerprint: &NameFingerprint,
        channel_id: Option<&str>,
    ) -> Result<Vec<ClaimCandidate>, sqlx::Error> {
        let fp = Some(fingerprint.as_str()).filter(|f| !f.is_empty());
        let rows = sqlx::query(
            r#"
            SELECT a.seq, a.amount
            FROM allocations a
            WHERE a.owner_kind = 'name' AND a.status = 'pending'
              AND ((? IS NOT NULL AND a.origin_fingerprint = ?)
                   OR (? IS NOT NULL AND a.channel_id = ?))
            ORDER BY a.seq ASC
            "#,
        )
        .bind(fp)
        .bind(fp)
        .bind(channel_id)
        .bind(channel_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(candidate_from_row).collect()
    }

    /// Re-key unverified records to a verified artist. Already re-keyed rows are skipped.
    pub async fn rekey_to_artist(
        &mut self,
        seqs: &[i64],
        artist_id: &ArtistId,
    ) -> Result<u64, sqlx::Error> {
        let mut rekeyed = 0;
        for seq in seqs {
            let result = sqlx::query(
                r#"
                UPDATE allocations
                SET owner_kind = 'artist', owner_key = ?, matched_at = ?
                WHERE seq = ? AND owner_kind = 'name'
                "#,
            )
            .bind(artist_id.as_str())
            .bind(self.now.as_ms())
            .bind(seq)
            .execute(&mut *self.tx)
            .await?;
            rekeyed += result.rows_affected();
        }
        Ok(rekeyed)
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Create the account row if missing and return its current state.
    ///
    /// The insert makes this the transaction's first write.
    pub async fn lock_account(
        &mut self,
        artist_id: &ArtistId,
    ) -> Result<ArtistAccount, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO artist_accounts (artist_id, updated_at) VALUES (?, ?)
            ON CONFLICT(artist_id) DO NOTHING
            "#,
        )
        .bind(artist_id.as_str())
        .bind(self.now.as_ms())
        .execute(&mut *self.tx)
        .await?;

        let sql = format!(
            "SELECT {} FROM artist_accounts WHERE artist_id = ?",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(artist_id.as_str())
            .fetch_one(&mut *self.tx)
            .await?;
        account_from_row(&row)
    }

    /// Add an allocation to both the balance and the lifetime total.
    pub async fn credit_account(
        &mut self,
        artist_id: &ArtistId,
        amount: Money,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO artist_accounts (artist_id, balance, total_earned, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(artist_id) DO UPDATE SET
                balance = balance + excluded.balance,
                total_earned = total_earned + excluded.total_earned,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(artist_id.as_str())
        .bind(amount.pence())
        .bind(amount.pence())
        .bind(self.now.as_ms())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    /// Subtract from the balance. Returns `false` if the balance is too small.
    pub async fn debit_account(
        &mut self,
        artist_id: &ArtistId,
        amount: Money,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE artist_accounts
            SET balance = balance - ?, updated_at = ?
            WHERE artist_id = ? AND balance >= ?
            "#,
        )
        .bind(amount.pence())
        .bind(self.now.as_ms())
        .bind(artist_id.as_str())
        .bind(amount.pence())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Advance the payout counters after a processed payout.
    pub async fn record_payout(
        &mut self,
        artist_id: &ArtistId,
        total_earned_at_request: Money,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE artist_accounts
            SET last_payout_total_earned = ?, payout_count = payout_count + 1, updated_at = ?
            WHERE artist_id = ?
            "#,
        )
        .bind(total_earned_at_request.pence())
        .bind(self.now.as_ms())
        .bind(artist_id.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    /// Remember the name and channel an artist verified with.
    pub async fn set_profile(
        &mut self,
        artist_id: &ArtistId,
        display_name: Option<&str>,
        channel_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE artist_accounts
            SET display_name = COALESCE(?, display_name),
                channel_id = COALESCE(?, channel_id),
                updated_at = ?
            WHERE artist_id = ?
            "#,
        )
        .bind(display_name)
        .bind(channel_id)
        .bind(self.now.as_ms())
        .bind(artist_id.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Payout requests
    // =========================================================================

    pub async fn get_payout_request(
        &mut self,
        request_id: &RequestId,
    ) -> Result<Option<PayoutRequest>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM payout_requests WHERE request_id = ?",
            PAYOUT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(request_id.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(|r| payout_from_row(&r)).transpose()
    }

    /// The artist's submitted request, if one is outstanding.
    pub async fn open_payout_request(
        &mut self,
        artist_id: &ArtistId,
    ) -> Result<Option<PayoutRequest>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM payout_requests WHERE artist_id = ? AND status = 'submitted'",
            PAYOUT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(artist_id.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(|r| payout_from_row(&r)).transpose()
    }

    pub async fn insert_payout_request(
        &mut self,
        request: &PayoutRequest,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO payout_requests (
                request_id, artist_id, amount_requested, amount_approved, method,
                method_details, total_earned_at_request, status, requested_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.request_id.as_str())
        .bind(request.artist_id.as_str())
        .bind(request.amount_requested.map(|m| m.pence()))
        .bind(request.amount_approved.pence())
        .bind(request.method.as_str())
        .bind(request.method_details.to_string())
        .bind(request.total_earned_at_request.pence())
        .bind(request.status.as_str())
        .bind(request.requested_at.as_ms())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    /// Move a submitted request to `status`. Returns `false` if it was not submitted.
    pub async fn close_payout_request(
        &mut self,
        request_id: &RequestId,
        status: PayoutStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payout_requests
            SET status = ?, processed_at = ?
            WHERE request_id = ? AND status = 'submitted'
            "#,
        )
        .bind(status.as_str())
        .bind(self.now.as_ms())
        .bind(request_id.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn reserve_records(
        &mut self,
        request_id: &RequestId,
        seqs: &[i64],
    ) -> Result<(), sqlx::Error> {
        for seq in seqs {
            sqlx::query("INSERT INTO payout_reservations (allocation_seq, request_id) VALUES (?, ?)")
                .bind(seq)
                .bind(request_id.as_str())
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    /// Records held by a request, oldest first.
    pub async fn reserved_records(
        &mut self,
        request_id: &RequestId,
    ) -> Result<Vec<ClaimCandidate>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT a.seq, a.amount
            FROM payout_reservations r
            JOIN allocations a ON a.seq = r.allocation_seq
            WHERE r.request_id = ?
            ORDER BY a.allocated_at ASC, a.seq ASC
            "#,
        )
        .bind(request_id.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(candidate_from_row).collect()
    }

    pub async fn release_reservations(
        &mut self,
        request_id: &RequestId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM payout_reservations WHERE request_id = ?")
            .bind(request_id.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }
}

fn candidate_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ClaimCandidate, sqlx::Error> {
    Ok(ClaimCandidate {
        seq: row.try_get("seq")?,
        amount: money_col(row, "amount")?,
    })
}
