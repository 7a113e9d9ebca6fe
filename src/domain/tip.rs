//! Confirmed tip events, the source of truth for every allocation.

use crate::domain::{BidderId, MediaId, Money, TimeMs, TipId};
use serde::{Deserialize, Serialize};

/// A tip whose funds were already taken from the bidder's wallet upstream.
///
/// Immutable once created; `tip_id` is the allocation idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipEvent {
    pub tip_id: TipId,
    pub media_id: MediaId,
    pub bidder_id: BidderId,
    pub amount: Money,
    pub timestamp: TimeMs,
}

impl TipEvent {
    pub fn new(
        tip_id: TipId,
        media_id: MediaId,
        bidder_id: BidderId,
        amount: Money,
        timestamp: TimeMs,
    ) -> Self {
        Self {
            tip_id,
            media_id,
            bidder_id,
            amount,
            timestamp,
        }
    }

    /// True when another delivery of the same `tip_id` carries the same payload.
    pub fn same_payload(&self, other: &TipEvent) -> bool {
        self.media_id == other.media_id
            && self.bidder_id == other.bidder_id
            && self.amount == other.amount
            && self.timestamp == other.timestamp
    }
}

/// A processed tip as stored, with its platform/artist split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTip {
    #[serde(flatten)]
    pub event: TipEvent,
    pub artist_pool: Money,
    pub platform_fee: Money,
    pub processed_at: TimeMs,
}
