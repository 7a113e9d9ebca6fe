//! Payout Eligibility Engine: eligibility checks, payout requests, and the
//! atomic debit that follows an operator's confirmation.
//!
//! A request reserves the exact allocation records it will pay out, so the
//! amount shown to the operator and the amount later debited are the same.
//! Confirmation claims those records, debits the account and advances the
//! payout counters in one transaction; if any step fails nothing changes.

use super::ledger::{claim_and_debit, select_oldest_prefix};
use super::locks::ArtistLocks;
use super::retry::with_contention_retry;
use super::LedgerError;
use crate::config::Config;
use crate::db::Repository;
use crate::domain::{
    ArtistAccount, ArtistId, Money, PayoutMethod, PayoutRequest, PayoutStatus, RequestId,
};
use crate::engine::{Eligibility, EligibilityReason, PayoutPolicy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Input of `request_payout`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPayout {
    /// Client idempotency key; generated when absent.
    pub request_id: Option<RequestId>,
    pub artist_id: ArtistId,
    /// `None` requests the full balance.
    pub amount: Option<Money>,
    pub method: PayoutMethod,
    pub method_details: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct PayoutService {
    repo: Arc<Repository>,
    locks: ArtistLocks,
    policy: PayoutPolicy,
    retry_window: Duration,
}

impl PayoutService {
    pub fn new(repo: Arc<Repository>, locks: ArtistLocks, config: &Config) -> Self {
        Self {
            repo,
            locks,
            policy: config.payout_policy(),
            retry_window: config.contention_retry_window(),
        }
    }

    pub fn policy(&self) -> &PayoutPolicy {
        &self.policy
    }

    /// Evaluate the payout gate against the current account state.
    ///
    /// Records reserved by an outstanding request are left out of the balance,
    /// and the artist is reported ineligible until that request is closed.
    pub async fn check_eligibility(
        &self,
        artist_id: &ArtistId,
        amount: Option<Money>,
    ) -> Result<Eligibility, LedgerError> {
        reject_zero(amount)?;
        let account = self
            .repo
            .get_account(artist_id)
            .await?
            .unwrap_or_else(|| ArtistAccount::empty(artist_id.clone()));

        match self.repo.open_payout_request(artist_id).await? {
            Some(open) => {
                let available = ArtistAccount {
                    balance: account.balance.shortfall_from(open.amount_approved),
                    ..account
                };
                Ok(self
                    .policy
                    .evaluate(&available, amount)
                    .with_outstanding_request())
            }
            None => Ok(self.policy.evaluate(&account, amount)),
        }
    }

    /// Create a submitted payout request and reserve the records it pays out.
    pub async fn request_payout(&self, input: RequestPayout) -> Result<PayoutRequest, LedgerError> {
        if input.artist_id.is_blank() {
            return Err(LedgerError::InvalidInput(
                "artistId must not be empty".to_string(),
            ));
        }
        reject_zero(input.amount)?;
        if let Some(id) = &input.request_id {
            if id.is_blank() {
                return Err(LedgerError::InvalidInput(
                    "requestId must not be empty".to_string(),
                ));
            }
            if let Some(existing) = self.repo.get_payout_request(id).await? {
                return same_artist(existing, &input.artist_id);
            }
        }

        let request_id = input
            .request_id
            .clone()
            .unwrap_or_else(RequestId::generate);

        let _guard = self.locks.acquire_one(&input.artist_id).await;
        let (input_ref, id_ref) = (&input, &request_id);
        let request = with_contention_retry(self.retry_window, "request_payout", || {
            self.write_request(input_ref, id_ref)
        })
        .await
        .map_err(|e| {
            if matches!(
                e,
                LedgerError::NotEligible { .. } | LedgerError::InsufficientBalance { .. }
            ) {
                warn!(artist_id = %input.artist_id, error = %e, "Payout request rejected");
            }
            e
        })?;

        info!(
            request_id = %request.request_id,
            artist_id = %request.artist_id,
            approved = %request.amount_approved,
            method = request.method.as_str(),
            "Payout requested"
        );
        Ok(request)
    }

    async fn write_request(
        &self,
        input: &RequestPayout,
        request_id: &RequestId,
    ) -> Result<PayoutRequest, LedgerError> {
        let mut tx = self.repo.begin_ledger_tx().await?;
        let account = tx.lock_account(&input.artist_id).await?;

        if let Some(existing) = tx.get_payout_request(request_id).await? {
            return same_artist(existing, &input.artist_id);
        }
        if let Some(open) = tx.open_payout_request(&input.artist_id).await? {
            return Err(LedgerError::PayoutPending {
                artist_id: input.artist_id.clone(),
                request_id: open.request_id,
            });
        }

        let eligibility = self.policy.evaluate(&account, input.amount);
        if !eligibility.eligible {
            return Err(rejection(&eligibility));
        }

        let candidates = tx.claimable_records(&input.artist_id).await?;
        let (seqs, approved) = select_oldest_prefix(&candidates, input.amount)?;
        if approved < self.policy.min_payout {
            // No whole-record prefix reaches the minimum below the requested amount.
            return Err(LedgerError::NotEligible {
                reason: EligibilityReason::BelowMinimumPayout,
                remaining_to_eligible: Money::ZERO,
                balance: account.balance,
            });
        }

        let request = PayoutRequest {
            request_id: request_id.clone(),
            artist_id: input.artist_id.clone(),
            amount_requested: input.amount,
            amount_approved: approved,
            method: input.method,
            method_details: input.method_details.clone(),
            total_earned_at_request: account.total_escrow_earned,
            requested_at: tx.now(),
            status: PayoutStatus::Submitted,
            processed_at: None,
        };
        tx.insert_payout_request(&request).await?;
        tx.reserve_records(request_id, &seqs).await?;
        tx.commit().await?;
        Ok(request)
    }

    /// Record the operator's success report: claim the reserved records, debit
    /// the balance and set `last_payout_total_earned`, all in one transaction.
    ///
    /// Confirming an already processed request returns it unchanged.
    pub async fn confirm_payout(
        &self,
        request_id: &RequestId,
    ) -> Result<PayoutRequest, LedgerError> {
        let request = self.load(request_id).await?;
        match request.status {
            PayoutStatus::Processed => return Ok(request),
            PayoutStatus::Cancelled => {
                return Err(LedgerError::PayoutClosed {
                    request_id: request.request_id,
                    status: request.status,
                })
            }
            PayoutStatus::Submitted => {}
        }

        let _guard = self.locks.acquire_one(&request.artist_id).await;
        let artist_ref = &request.artist_id;
        let processed = with_contention_retry(self.retry_window, "confirm_payout", || {
            self.write_confirm(request_id, artist_ref)
        })
        .await?;

        info!(
            request_id = %processed.request_id,
            artist_id = %processed.artist_id,
            amount = %processed.amount_approved,
            total_earned_at_request = %processed.total_earned_at_request,
            "Payout processed"
        );
        Ok(processed)
    }

    async fn write_confirm(
        &self,
        request_id: &RequestId,
        artist_id: &ArtistId,
    ) -> Result<PayoutRequest, LedgerError> {
        let mut tx = self.repo.begin_ledger_tx().await?;
        let account = tx.lock_account(artist_id).await?;
        let request = tx
            .get_payout_request(request_id)
            .await?
            .ok_or_else(|| LedgerError::PayoutNotFound(request_id.clone()))?;
        match request.status {
            PayoutStatus::Processed => return Ok(request),
            PayoutStatus::Cancelled => {
                return Err(LedgerError::PayoutClosed {
                    request_id: request.request_id,
                    status: request.status,
                })
            }
            PayoutStatus::Submitted => {}
        }

        let eligibility = self.policy.evaluate(&account, Some(request.amount_approved));
        if !eligibility.eligible {
            return Err(rejection(&eligibility));
        }

        let reserved = tx.reserved_records(request_id).await?;
        let reserved_total = Money::checked_sum(reserved.iter().map(|r| r.amount))?;
        if reserved_total != request.amount_approved {
            return Err(LedgerError::Inconsistent(format!(
                "request {} reserves {} but approved {}",
                request_id, reserved_total, request.amount_approved
            )));
        }
        let seqs: Vec<i64> = reserved.iter().map(|r| r.seq).collect();

        claim_and_debit(
            &mut tx,
            artist_id,
            &seqs,
            reserved_total,
            account.balance,
            Some(request_id),
        )
        .await?;
        tx.record_payout(artist_id, request.total_earned_at_request)
            .await?;
        if !tx
            .close_payout_request(request_id, PayoutStatus::Processed)
            .await?
        {
            return Err(LedgerError::Inconsistent(format!(
                "request {} left the submitted state mid-transaction",
                request_id
            )));
        }
        tx.release_reservations(request_id).await?;
        let processed = tx
            .get_payout_request(request_id)
            .await?
            .ok_or_else(|| LedgerError::PayoutNotFound(request_id.clone()))?;
        tx.commit().await?;
        Ok(processed)
    }

    /// Withdraw a submitted request and release its reserved records.
    pub async fn cancel_payout(
        &self,
        request_id: &RequestId,
    ) -> Result<PayoutRequest, LedgerError> {
        let request = self.load(request_id).await?;
        if request.status != PayoutStatus::Submitted {
            return Err(LedgerError::PayoutClosed {
                request_id: request.request_id,
                status: request.status,
            });
        }

        let _guard = self.locks.acquire_one(&request.artist_id).await;
        let artist_ref = &request.artist_id;
        let cancelled = with_contention_retry(self.retry_window, "cancel_payout", || {
            self.write_cancel(request_id, artist_ref)
        })
        .await?;

        info!(
            request_id = %cancelled.request_id,
            artist_id = %cancelled.artist_id,
            "Payout cancelled"
        );
        Ok(cancelled)
    }

    async fn write_cancel(
        &self,
        request_id: &RequestId,
        artist_id: &ArtistId,
    ) -> Result<PayoutRequest, LedgerError> {
        let mut tx = self.repo.begin_ledger_tx().await?;
        tx.lock_account(artist_id).await?;
        if !tx
            .close_payout_request(request_id, PayoutStatus::Cancelled)
            .await?
        {
            let current = tx
                .get_payout_request(request_id)
                .await?
                .ok_or_else(|| LedgerError::PayoutNotFound(request_id.clone()))?;
            return Err(LedgerError::PayoutClosed {
                request_id: current.request_id,
                status: current.status,
            });
        }
        tx.release_reservations(request_id).await?;
        let cancelled = tx
            .get_payout_request(request_id)
            .await?
            .ok_or_else(|| LedgerError::PayoutNotFound(request_id.clone()))?;
        tx.commit().await?;
        Ok(cancelled)
    }

    pub async fn get_payout(&self, request_id: &RequestId) -> Result<PayoutRequest, LedgerError> {
        self.load(request_id).await
    }

    /// Payout requests of an artist, newest first.
    pub async fn list_payouts(
        &self,
        artist_id: &ArtistId,
    ) -> Result<Vec<PayoutRequest>, LedgerError> {
        Ok(self.repo.list_payout_requests(artist_id).await?)
    }

    async fn load(&self, request_id: &RequestId) -> Result<PayoutRequest, LedgerError> {
        self.repo
            .get_payout_request(request_id)
            .await?
            .ok_or_else(|| LedgerError::PayoutNotFound(request_id.clone()))
    }
}

fn reject_zero(amount: Option<Money>) -> Result<(), LedgerError> {
    if amount.is_some_and(|a| a.is_zero()) {
        return Err(LedgerError::InvalidAmount(
            "payout amount must be positive".to_string(),
        ));
    }
    Ok(())
}

fn same_artist(
    existing: PayoutRequest,
    artist_id: &ArtistId,
) -> Result<PayoutRequest, LedgerError> {
    if existing.artist_id != *artist_id {
        return Err(LedgerError::InvalidInput(format!(
            "requestId {} belongs to another artist",
            existing.request_id
        )));
    }
    Ok(existing)
}

fn rejection(eligibility: &Eligibility) -> LedgerError {
    match eligibility.reason {
        EligibilityReason::InsufficientBalance => LedgerError::InsufficientBalance {
            requested: eligibility.amount,
            balance: eligibility.balance,
        },
        reason => LedgerError::NotEligible {
            reason,
            remaining_to_eligible: eligibility.remaining_to_eligible,
            balance: eligibility.balance,
        },
    }
}
