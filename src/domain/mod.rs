//! Domain types for the artist tip escrow ledger.
//!
//! This module provides:
//! - Integer minor-unit money (`Money`) and exact ownership fractions (`Share`)
//! - Identifiers and `TimeMs`
//! - Owner references (verified artist vs. unverified name fingerprint)
//! - Tip events, allocation records, payout requests and artist accounts

pub mod allocation;
pub mod money;
pub mod owner;
pub mod ownership;
pub mod payout;
pub mod primitives;
pub mod share;
pub mod tip;

pub use allocation::{AllocationRecord, AllocationStatus};
pub use money::{Money, MoneyError, Rounding};
pub use owner::{NameFingerprint, OwnerRef};
pub use ownership::{MediaOwnership, OwnershipEntry};
pub use payout::{ArtistAccount, PayoutMethod, PayoutRequest, PayoutStatus};
pub use primitives::{ArtistId, BidderId, MediaId, RequestId, TimeMs, TipId};
pub use share::Share;
pub use tip::{StoredTip, TipEvent};
