//! Payout requests and the artist escrow account they draw on.

use crate::domain::{ArtistId, Money, RequestId, TimeMs};
use serde::{Deserialize, Serialize};

/// How the artist wants to be paid. Execution is manual and out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    BankTransfer,
    Paypal,
}

impl PayoutMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutMethod::BankTransfer => "bank_transfer",
            PayoutMethod::Paypal => "paypal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bank_transfer" => Some(PayoutMethod::BankTransfer),
            "paypal" => Some(PayoutMethod::Paypal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    /// Waiting for the operator.
    Submitted,
    /// Operator reported success; the ledger was debited.
    Processed,
    /// Withdrawn before processing; reservations released.
    Cancelled,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Submitted => "submitted",
            PayoutStatus::Processed => "processed",
            PayoutStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(PayoutStatus::Submitted),
            "processed" => Some(PayoutStatus::Processed),
            "cancelled" => Some(PayoutStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    pub request_id: RequestId,
    pub artist_id: ArtistId,
    /// `None` means "full balance".
    pub amount_requested: Option<Money>,
    /// Sum of the whole allocation records reserved for this request.
    pub amount_approved: Money,
    pub method: PayoutMethod,
    pub method_details: serde_json::Value,
    /// `totalEscrowEarned` when the request was made.
    pub total_earned_at_request: Money,
    pub requested_at: TimeMs,
    pub status: PayoutStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<TimeMs>,
}

/// Materialised escrow account of a verified artist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistAccount {
    pub artist_id: ArtistId,
    /// Sum of pending allocations.
    pub balance: Money,
    /// Sum of every allocation ever made to the artist.
    pub total_escrow_earned: Money,
    /// `total_escrow_earned` at the last processed payout; `None` before the first.
    pub last_payout_total_earned: Option<Money>,
    pub payout_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

impl ArtistAccount {
    /// Account of an artist the ledger has never credited.
    pub fn empty(artist_id: ArtistId) -> Self {
        Self {
            artist_id,
            balance: Money::ZERO,
            total_escrow_earned: Money::ZERO,
            last_payout_total_earned: None,
            payout_count: 0,
            display_name: None,
            channel_id: None,
        }
    }
}
