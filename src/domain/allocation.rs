//! Allocation records: one per (tip, owner) pair.

use crate::domain::{MediaId, Money, NameFingerprint, OwnerRef, RequestId, TimeMs, TipId};
use serde::{Deserialize, Serialize};

/// Lifecycle of an allocation. `Pending` -> `Claimed` is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    Pending,
    Claimed,
}

impl AllocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStatus::Pending => "pending",
            AllocationStatus::Claimed => "claimed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AllocationStatus::Pending),
            "claimed" => Some(AllocationStatus::Claimed),
            _ => None,
        }
    }
}

/// Escrow credit for one owner from one tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRecord {
    pub allocation_id: String,
    pub tip_id: TipId,
    pub media_id: MediaId,
    pub owner: OwnerRef,
    /// Position of the owner in the resolved ownership list.
    pub owner_index: i64,
    pub amount: Money,
    pub allocated_at: TimeMs,
    pub status: AllocationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<TimeMs>,
    /// Raw artist name, kept for unclaimed records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_name: Option<String>,
    /// Platform channel id of the media artist, kept for unclaimed records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Fingerprint the record was created under, retained after matching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_fingerprint: Option<NameFingerprint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_at: Option<TimeMs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_request_id: Option<RequestId>,
}

impl AllocationRecord {
    /// Deterministic allocation id for the `owner_index`-th owner of a tip.
    ///
    /// Length-prefixed SHA-256 over the tip id and index, truncated to 128 bits.
    pub fn compute_allocation_id(tip_id: &TipId, owner_index: i64) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update((tip_id.as_str().len() as u32).to_le_bytes());
        hasher.update(tip_id.as_str().as_bytes());
        hasher.update(owner_index.to_le_bytes());

        let hash = hasher.finalize();
        format!("alloc:{}", hex::encode(&hash[..16]))
    }

    pub fn is_pending(&self) -> bool {
        self.status == AllocationStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_id_is_deterministic() {
        let tip = TipId::new("tip-1");
        let a = AllocationRecord::compute_allocation_id(&tip, 0);
        let b = AllocationRecord::compute_allocation_id(&tip, 0);
        assert_eq!(a, b);
        assert!(a.starts_with("alloc:"));
        assert_eq!(a.len(), "alloc:".len() + 32);
    }

    #[test]
    fn allocation_id_differs_per_owner_and_tip() {
        let tip = TipId::new("tip-1");
        assert_ne!(
            AllocationRecord::compute_allocation_id(&tip, 0),
            AllocationRecord::compute_allocation_id(&tip, 1)
        );
        assert_ne!(
            AllocationRecord::compute_allocation_id(&tip, 0),
            AllocationRecord::compute_allocation_id(&TipId::new("tip-2"), 0)
        );
    }

    #[test]
    fn status_parse() {
        assert_eq!(
            AllocationStatus::parse("pending"),
            Some(AllocationStatus::Pending)
        );
        assert_eq!(AllocationStatus::parse("claimed").map(|s| s.as_str()), Some("claimed"));
        assert_eq!(AllocationStatus::parse("x"), None);
    }
}
