//! Stateful ledger services.
//!
//! This module provides:
//! - `EscrowLedger`: tip allocation, balances, history, debits and audit
//! - `MatchingService`: reconciliation of unclaimed allocations
//! - `PayoutService`: eligibility, payout requests and their confirmation
//!
//! Each service mutates the ledger through one `LedgerTx` per operation, holds
//! the per-artist locks of the artists it touches, and retries the whole unit
//! on SQLite contention.

use crate::domain::{ArtistId, MediaId, Money, MoneyError, PayoutStatus, RequestId};
use crate::engine::{AllocationError, EligibilityReason, ResolveError};
use crate::ownership::OwnershipError;
use thiserror::Error;

pub mod ledger;
pub mod locks;
pub mod matching;
pub mod payouts;
pub mod retry;

pub use ledger::{AllocationOutcome, AuditReport, EscrowInfo, EscrowLedger, UnclaimedCandidate};
pub use locks::ArtistLocks;
pub use matching::{MatchOutcome, MatchingService};
pub use payouts::{PayoutService, RequestPayout};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("insufficient balance: requested {requested}, balance {balance}")]
    InsufficientBalance { requested: Money, balance: Money },
    #[error("not eligible for payout: {reason}")]
    NotEligible {
        reason: EligibilityReason,
        remaining_to_eligible: Money,
        balance: Money,
    },
    #[error("invalid ownership for media {media_id}: {reason}")]
    InvalidOwnership { media_id: MediaId, reason: String },
    #[error("media {0} is not registered")]
    MediaNotFound(MediaId),
    #[error("payout request {0} not found")]
    PayoutNotFound(RequestId),
    #[error("artist {artist_id} already has an outstanding payout request {request_id}")]
    PayoutPending {
        artist_id: ArtistId,
        request_id: RequestId,
    },
    #[error("payout request {request_id} is already {}", status.as_str())]
    PayoutClosed {
        request_id: RequestId,
        status: PayoutStatus,
    },
    #[error("match needs a non-empty artist name or a channel id")]
    InvalidMatchCandidate,
    #[error("ledger inconsistency: {0}")]
    Inconsistent(String),
    #[error(transparent)]
    Money(#[from] MoneyError),
    #[error(transparent)]
    Ownership(#[from] OwnershipError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LedgerError {
    /// True for SQLite busy/locked errors and pool timeouts, which are safe to
    /// retry because the failed transaction was rolled back.
    pub fn is_contention(&self) -> bool {
        match self {
            LedgerError::Database(sqlx::Error::PoolTimedOut) => true,
            LedgerError::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                // Extended result codes keep the primary code in the low byte.
                .map(|code| matches!(code & 0xff, 5 | 6))
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl From<ResolveError> for LedgerError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::MediaNotFound(media_id) => LedgerError::MediaNotFound(media_id),
            ResolveError::InvalidOwnership { media_id, reason } => {
                LedgerError::InvalidOwnership { media_id, reason }
            }
            ResolveError::Source(e) => LedgerError::Ownership(e),
        }
    }
}

impl From<AllocationError> for LedgerError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::InvalidAmount(amount) => {
                LedgerError::InvalidAmount(format!("tip amount must be positive, got {}", amount))
            }
            AllocationError::Money(e) => LedgerError::Money(e),
            AllocationError::Split(e) => LedgerError::Inconsistent(format!("split failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_contention() {
        assert!(LedgerError::Database(sqlx::Error::PoolTimedOut).is_contention());
        assert!(!LedgerError::Database(sqlx::Error::RowNotFound).is_contention());
        assert!(!LedgerError::InvalidMatchCandidate.is_contention());
    }

    #[test]
    fn test_payout_closed_message() {
        let err = LedgerError::PayoutClosed {
            request_id: RequestId::new("r1"),
            status: PayoutStatus::Processed,
        };
        assert_eq!(err.to_string(), "payout request r1 is already processed");
    }
}
