//! Escrow Ledger: allocation of tips, balances, history, debits and audit.

use super::locks::ArtistLocks;
use super::retry::with_contention_retry;
use super::LedgerError;
use crate::config::Config;
use crate::db::repo::{ClaimCandidate, HistoryEntry, LedgerTx};
use crate::db::Repository;
use crate::domain::{
    AllocationRecord, ArtistAccount, ArtistId, Money, MoneyError, NameFingerprint, RequestId,
    StoredTip, TimeMs, TipEvent, TipId,
};
use crate::engine::{plan_allocation, AllocationPlan, FeePolicy, OwnershipResolver};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result of `allocate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationOutcome {
    pub tip_id: TipId,
    pub artist_pool: Money,
    pub platform_fee: Money,
    pub records: Vec<AllocationRecord>,
    /// The tip had already been processed; nothing was written.
    pub duplicate: bool,
    /// No ownership entries were registered for the media. Reported on the
    /// delivery that performed the allocation.
    pub unresolved: bool,
}

/// Unclaimed allocations grouped by the name they were created under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnclaimedCandidate {
    pub fingerprint: NameFingerprint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub record_count: usize,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowInfo {
    pub artist_id: ArtistId,
    pub balance: Money,
    pub total_escrow_earned: Money,
    pub last_payout_total_earned: Option<Money>,
    pub payout_count: i64,
    pub history: Vec<HistoryEntry>,
    pub unclaimed_candidates: Vec<UnclaimedCandidate>,
}

/// Materialised account compared against the allocation stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub artist_id: ArtistId,
    pub balance: Money,
    pub stream_balance: Money,
    pub total_escrow_earned: Money,
    pub stream_total_earned: Money,
    pub consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebitOutcome {
    pub claimed_count: usize,
    pub claimed_total: Money,
    pub balance: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TipDetails {
    #[serde(flatten)]
    pub tip: StoredTip,
    pub records: Vec<AllocationRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnclaimedView {
    pub total: Money,
    pub records: Vec<AllocationRecord>,
}

#[derive(Debug, Clone)]
pub struct EscrowLedger {
    repo: Arc<Repository>,
    resolver: OwnershipResolver,
    locks: ArtistLocks,
    fee_policy: FeePolicy,
    history_limit: i64,
    retry_window: Duration,
}

impl EscrowLedger {
    pub fn new(
        repo: Arc<Repository>,
        resolver: OwnershipResolver,
        locks: ArtistLocks,
        config: &Config,
    ) -> Self {
        Self {
            repo,
            resolver,
            locks,
            fee_policy: config.fee_policy(),
            history_limit: config.history_limit,
            retry_window: config.contention_retry_window(),
        }
    }

    pub fn repo(&self) -> &Arc<Repository> {
        &self.repo
    }

    /// Allocate a confirmed tip across the media's owners.
    ///
    /// Idempotent by `tip_id`: a re-delivery returns the stored allocation with
    /// `duplicate: true` and writes nothing.
    pub async fn allocate(&self, tip: TipEvent) -> Result<AllocationOutcome, LedgerError> {
        if tip.tip_id.is_blank() {
            return Err(LedgerError::InvalidInput("tipId must not be empty".to_string()));
        }
        if tip.media_id.is_blank() {
            return Err(LedgerError::InvalidInput("mediaId must not be empty".to_string()));
        }
        if tip.amount.is_zero() {
            return Err(LedgerError::InvalidAmount(format!(
                "tip amount must be positive, got {}",
                tip.amount
            )));
        }

        if let Some(outcome) = self.existing_allocation(&tip).await? {
            return Ok(outcome);
        }

        let resolved = self.resolver.resolve(&tip.media_id).await?;
        let plan = plan_allocation(&tip, &resolved, &self.fee_policy, TimeMs::now())?;
        let credits = plan.verified_credits()?;

        if plan.unresolved {
            warn!(
                tip_id = %tip.tip_id,
                media_id = %tip.media_id,
                pool = %plan.artist_pool,
                "Ownership unresolved, routing artist pool to unclaimed name for manual follow-up"
            );
        }

        let _guards = self.locks.acquire(credits.iter().map(|(id, _)| id)).await;

        let (tip_ref, plan_ref, credits_ref) = (&tip, &plan, &credits);
        let inserted = with_contention_retry(self.retry_window, "allocate", move || {
            self.write_allocation(tip_ref, plan_ref, credits_ref)
        })
        .await?;

        if !inserted {
            // Lost a race with a concurrent delivery of the same tip.
            return self
                .existing_allocation(&tip)
                .await?
                .ok_or_else(|| LedgerError::Inconsistent(format!("tip {} vanished", tip.tip_id)));
        }

        info!(
            tip_id = %tip.tip_id,
            media_id = %tip.media_id,
            amount = %tip.amount,
            artist_pool = %plan.artist_pool,
            platform_fee = %plan.platform_fee,
            records = plan.records.len(),
            "Tip allocated"
        );

        Ok(AllocationOutcome {
            tip_id: tip.tip_id,
            artist_pool: plan.artist_pool,
            platform_fee: plan.platform_fee,
            records: plan.records,
            duplicate: false,
            unresolved: plan.unresolved,
        })
    }

    async fn write_allocation(
        &self,
        tip: &TipEvent,
        plan: &AllocationPlan,
        credits: &[(ArtistId, Money)],
    ) -> Result<bool, LedgerError> {
        let mut tx = self.repo.begin_ledger_tx().await?;
        if !tx.insert_tip(tip, plan.artist_pool, plan.platform_fee).await? {
            return Ok(false);
        }
        for record in &plan.records {
            tx.insert_allocation(record).await?;
        }
        for (artist_id, amount) in credits {
            tx.credit_account(artist_id, *amount).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn existing_allocation(
        &self,
        tip: &TipEvent,
    ) -> Result<Option<AllocationOutcome>, LedgerError> {
        let Some(stored) = self.repo.get_tip(&tip.tip_id).await? else {
            return Ok(None);
        };

        if stored.event.same_payload(tip) {
            info!(tip_id = %tip.tip_id, "Duplicate tip delivery ignored");
        } else {
            warn!(
                tip_id = %tip.tip_id,
                stored_amount = %stored.event.amount,
                delivered_amount = %tip.amount,
                "Duplicate tip delivery with a different payload ignored"
            );
        }

        let records = self.repo.allocations_for_tip(&tip.tip_id).await?;
        Ok(Some(AllocationOutcome {
            tip_id: stored.event.tip_id,
            artist_pool: stored.artist_pool,
            platform_fee: stored.platform_fee,
            records,
            duplicate: true,
            unresolved: false,
        }))
    }

    /// Account of an artist; an artist the ledger never touched has an empty one.
    pub async fn account(&self, artist_id: &ArtistId) -> Result<ArtistAccount, LedgerError> {
        Ok(self
            .repo
            .get_account(artist_id)
            .await?
            .unwrap_or_else(|| ArtistAccount::empty(artist_id.clone())))
    }

    /// Sum of the artist's pending allocations.
    pub async fn balance(&self, artist_id: &ArtistId) -> Result<Money, LedgerError> {
        Ok(self.account(artist_id).await?.balance)
    }

    /// Sum of every allocation ever made to the artist.
    pub async fn total_earned(&self, artist_id: &ArtistId) -> Result<Money, LedgerError> {
        Ok(self.account(artist_id).await?.total_escrow_earned)
    }

    pub async fn history(
        &self,
        artist_id: &ArtistId,
        limit: Option<i64>,
    ) -> Result<Vec<HistoryEntry>, LedgerError> {
        let limit = limit.filter(|l| *l > 0).unwrap_or(self.history_limit);
        Ok(self.repo.query_history(artist_id, limit).await?)
    }

    /// Balance, totals, recent history and unclaimed money that may belong to the artist.
    ///
    /// Candidates are looked up by `name` when given, otherwise by the display
    /// name and channel the artist last matched with.
    pub async fn escrow_info(
        &self,
        artist_id: &ArtistId,
        limit: Option<i64>,
        name: Option<&str>,
    ) -> Result<EscrowInfo, LedgerError> {
        let account = self.account(artist_id).await?;
        let history = self.history(artist_id, limit).await?;

        let fingerprint = name
            .map(NameFingerprint::from_name)
            .filter(|fp| !fp.is_empty())
            .or_else(|| {
                account
                    .display_name
                    .as_deref()
                    .map(NameFingerprint::from_name)
                    .filter(|fp| !fp.is_empty())
            });
        let channel_id = account.channel_id.as_deref();
        let unclaimed_candidates = if fingerprint.is_some() || channel_id.is_some() {
            let records = self
                .repo
                .query_unclaimed(fingerprint.as_ref(), channel_id)
                .await?;
            group_candidates(&records)?
        } else {
            Vec::new()
        };

        Ok(EscrowInfo {
            artist_id: account.artist_id,
            balance: account.balance,
            total_escrow_earned: account.total_escrow_earned,
            last_payout_total_earned: account.last_payout_total_earned,
            payout_count: account.payout_count,
            history,
            unclaimed_candidates,
        })
    }

    /// Claim the artist's oldest pending records up to `amount` (all of them when `None`).
    ///
    /// Records are never split: the claim stops at the first record that would
    /// overshoot `amount` and the rest stays pending.
    pub async fn debit(
        &self,
        artist_id: &ArtistId,
        amount: Option<Money>,
        payout_request_id: Option<&RequestId>,
    ) -> Result<DebitOutcome, LedgerError> {
        if amount.is_some_and(|a| a.is_zero()) {
            return Err(LedgerError::InvalidAmount(
                "debit amount must be positive".to_string(),
            ));
        }

        let _guard = self.locks.acquire_one(artist_id).await;
        let outcome = with_contention_retry(self.retry_window, "debit", || {
            self.write_debit(artist_id, amount, payout_request_id)
        })
        .await?;

        info!(
            artist_id = %artist_id,
            claimed = outcome.claimed_count,
            total = %outcome.claimed_total,
            balance = %outcome.balance,
            "Escrow debited"
        );
        Ok(outcome)
    }

    async fn write_debit(
        &self,
        artist_id: &ArtistId,
        amount: Option<Money>,
        payout_request_id: Option<&RequestId>,
    ) -> Result<DebitOutcome, LedgerError> {
        let mut tx = self.repo.begin_ledger_tx().await?;
        let account = tx.lock_account(artist_id).await?;
        if let Some(requested) = amount {
            if requested > account.balance {
                return Err(LedgerError::InsufficientBalance {
                    requested,
                    balance: account.balance,
                });
            }
        }

        let candidates = tx.claimable_records(artist_id).await?;
        let (seqs, total) = select_oldest_prefix(&candidates, amount)?;
        claim_and_debit(&mut tx, artist_id, &seqs, total, account.balance, payout_request_id)
            .await?;
        tx.commit().await?;

        Ok(DebitOutcome {
            claimed_count: seqs.len(),
            claimed_total: total,
            balance: account.balance.subtract(total)?,
        })
    }

    /// Recompute the artist's balance and total from the allocation stream and
    /// compare them with the materialised account.
    pub async fn audit(&self, artist_id: &ArtistId) -> Result<AuditReport, LedgerError> {
        let account = self.account(artist_id).await?;
        let stream = self.repo.stream_totals(artist_id).await?;
        let consistent =
            stream.pending == account.balance && stream.all_time == account.total_escrow_earned;
        if !consistent {
            warn!(
                artist_id = %artist_id,
                balance = %account.balance,
                stream_balance = %stream.pending,
                total = %account.total_escrow_earned,
                stream_total = %stream.all_time,
                "Escrow account drifted from allocation stream"
            );
        }

        Ok(AuditReport {
            artist_id: account.artist_id,
            balance: account.balance,
            stream_balance: stream.pending,
            total_escrow_earned: account.total_escrow_earned,
            stream_total_earned: stream.all_time,
            consistent,
        })
    }

    /// A processed tip and its allocation records.
    pub async fn tip(&self, tip_id: &TipId) -> Result<Option<TipDetails>, LedgerError> {
        let Some(tip) = self.repo.get_tip(tip_id).await? else {
            return Ok(None);
        };
        let records = self.repo.allocations_for_tip(tip_id).await?;
        Ok(Some(TipDetails { tip, records }))
    }

    /// Pending unverified records for a name and/or channel.
    pub async fn unclaimed(
        &self,
        name: Option<&str>,
        channel_id: Option<&str>,
    ) -> Result<UnclaimedView, LedgerError> {
        let fingerprint = name
            .map(NameFingerprint::from_name)
            .filter(|fp| !fp.is_empty());
        let channel_id = channel_id.filter(|c| !c.trim().is_empty());
        if fingerprint.is_none() && channel_id.is_none() {
            return Err(LedgerError::InvalidInput(
                "name or channelId is required".to_string(),
            ));
        }

        let records = self
            .repo
            .query_unclaimed(fingerprint.as_ref(), channel_id)
            .await?;
        let total = Money::checked_sum(records.iter().map(|r| r.amount))?;
        Ok(UnclaimedView { total, records })
    }
}

/// Mark `seqs` claimed and take `total` off the balance, inside the caller's transaction.
pub(crate) async fn claim_and_debit(
    tx: &mut LedgerTx,
    artist_id: &ArtistId,
    seqs: &[i64],
    total: Money,
    balance: Money,
    payout_request_id: Option<&RequestId>,
) -> Result<(), LedgerError> {
    let claimed = tx.claim_records(seqs, payout_request_id).await?;
    if claimed != seqs.len() as u64 {
        return Err(LedgerError::Inconsistent(format!(
            "claimed {} of {} records for {}",
            claimed,
            seqs.len(),
            artist_id
        )));
    }
    if !tx.debit_account(artist_id, total).await? {
        return Err(LedgerError::InsufficientBalance {
            requested: total,
            balance,
        });
    }
    Ok(())
}

/// Oldest-first whole records whose running total stays within `limit`.
///
/// With no limit every candidate is taken.
pub(crate) fn select_oldest_prefix(
    candidates: &[ClaimCandidate],
    limit: Option<Money>,
) -> Result<(Vec<i64>, Money), MoneyError> {
    let mut seqs = Vec::new();
    let mut total = Money::ZERO;
    for candidate in candidates {
        let next = total.add(candidate.amount)?;
        if limit.is_some_and(|l| next > l) {
            break;
        }
        seqs.push(candidate.seq);
        total = next;
    }
    Ok((seqs, total))
}

fn group_candidates(records: &[AllocationRecord]) -> Result<Vec<UnclaimedCandidate>, MoneyError> {
    let mut groups: Vec<UnclaimedCandidate> = Vec::new();
    for record in records {
        let fingerprint = record
            .origin_fingerprint
            .clone()
            .unwrap_or_else(|| NameFingerprint::from_stored(record.owner.key().to_string()));
        match groups.iter_mut().find(|g| g.fingerprint == fingerprint) {
            Some(group) => {
                group.record_count += 1;
                group.total = group.total.add(record.amount)?;
                if group.channel_id.is_none() {
                    group.channel_id = record.channel_id.clone();
                }
            }
            None => groups.push(UnclaimedCandidate {
                fingerprint,
                artist_name: record.artist_name.clone(),
                channel_id: record.channel_id.clone(),
                record_count: 1,
                total: record.amount,
            }),
        }
    }
    Ok(groups)
}
