//! Payout eligibility rules.
//!
//! Eligibility is always evaluated against a freshly read account; nothing here
//! caches state between calls.

use crate::domain::{ArtistAccount, Money};
use serde::Serialize;
use std::fmt;

/// Configured payout thresholds, all in pence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutPolicy {
    /// Cumulative earnings required before the first payout.
    pub first_payout_threshold: Money,
    /// Earnings required since the previous payout.
    pub payout_increment: Money,
    /// Smallest amount that may be paid out.
    pub min_payout: Money,
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self {
            first_payout_threshold: Money::from_pence(3300),
            payout_increment: Money::from_pence(1000),
            min_payout: Money::from_pence(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityReason {
    Eligible,
    BelowFirstPayoutThreshold,
    BelowPayoutIncrement,
    BelowMinimumPayout,
    InsufficientBalance,
    /// A submitted request is still waiting for the operator.
    PayoutPending,
}

impl fmt::Display for EligibilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EligibilityReason::Eligible => "eligible",
            EligibilityReason::BelowFirstPayoutThreshold => {
                "total earnings below the first payout threshold"
            }
            EligibilityReason::BelowPayoutIncrement => {
                "not enough earned since the last payout"
            }
            EligibilityReason::BelowMinimumPayout => "amount below the minimum payout",
            EligibilityReason::InsufficientBalance => "amount exceeds the available balance",
            EligibilityReason::PayoutPending => "a payout request is already outstanding",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: EligibilityReason,
    /// Further earnings needed before the threshold is met; zero once met.
    pub remaining_to_eligible: Money,
    /// Amount a payout would request: the explicit amount, or the full balance.
    pub amount: Money,
    /// Balance not reserved by an outstanding request.
    pub balance: Money,
    pub total_escrow_earned: Money,
    pub is_first_payout: bool,
}

impl Eligibility {
    /// Mark the artist ineligible while another request is outstanding.
    pub fn with_outstanding_request(self) -> Self {
        Self {
            eligible: false,
            reason: EligibilityReason::PayoutPending,
            ..self
        }
    }
}

impl PayoutPolicy {
    /// Remaining earnings before the account crosses its current threshold.
    pub fn remaining_to_eligible(&self, account: &ArtistAccount) -> Money {
        match account.last_payout_total_earned {
            None => self
                .first_payout_threshold
                .shortfall_from(account.total_escrow_earned),
            Some(last) => {
                let earned_since = account.total_escrow_earned.shortfall_from(last);
                self.payout_increment.shortfall_from(earned_since)
            }
        }
    }

    /// Evaluate the payout gate for `requested` (or the full balance).
    pub fn evaluate(&self, account: &ArtistAccount, requested: Option<Money>) -> Eligibility {
        let is_first_payout = account.last_payout_total_earned.is_none();
        let remaining = self.remaining_to_eligible(account);
        let amount = requested.unwrap_or(account.balance);

        let reason = if !remaining.is_zero() {
            if is_first_payout {
                EligibilityReason::BelowFirstPayoutThreshold
            } else {
                EligibilityReason::BelowPayoutIncrement
            }
        } else if amount > account.balance {
            EligibilityReason::InsufficientBalance
        } else if amount < self.min_payout {
            EligibilityReason::BelowMinimumPayout
        } else {
            EligibilityReason::Eligible
        };

        Eligibility {
            eligible: reason == EligibilityReason::Eligible,
            reason,
            remaining_to_eligible: remaining,
            amount,
            balance: account.balance,
            total_escrow_earned: account.total_escrow_earned,
            is_first_payout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ArtistId;

    fn account(balance: u32, total: u32, last: Option<u32>) -> ArtistAccount {
        ArtistAccount {
            balance: Money::from_pence(balance),
            total_escrow_earned: Money::from_pence(total),
            last_payout_total_earned: last.map(Money::from_pence),
            ..ArtistAccount::empty(ArtistId::new("a1"))
        }
    }

    #[test]
    fn test_first_payout_threshold_boundary() {
        let policy = PayoutPolicy::default();

        let e = policy.evaluate(&account(3299, 3299, None), None);
        assert!(!e.eligible);
        assert_eq!(e.reason, EligibilityReason::BelowFirstPayoutThreshold);
        assert_eq!(e.remaining_to_eligible, Money::from_pence(1));

        let e = policy.evaluate(&account(3300, 3300, None), None);
        assert!(e.eligible);
        assert_eq!(e.remaining_to_eligible, Money::ZERO);
        assert_eq!(e.amount, Money::from_pence(3300));
    }

    #[test]
    fn test_new_artist_needs_full_threshold() {
        let e = PayoutPolicy::default().evaluate(&account(0, 0, None), None);
        assert!(!e.eligible);
        assert_eq!(e.remaining_to_eligible, Money::from_pence(3300));
        assert!(e.is_first_payout);
    }

    #[test]
    fn test_subsequent_payout_increment() {
        let policy = PayoutPolicy::default();

        let e = policy.evaluate(&account(999, 4299, Some(3300)), None);
        assert!(!e.eligible);
        assert_eq!(e.reason, EligibilityReason::BelowPayoutIncrement);
        assert_eq!(e.remaining_to_eligible, Money::from_pence(1));

        let e = policy.evaluate(&account(1000, 4300, Some(3300)), None);
        assert!(e.eligible);
        assert!(!e.is_first_payout);
    }

    #[test]
    fn test_amount_bounds() {
        let policy = PayoutPolicy::default();
        let acct = account(3500, 3500, None);

        let e = policy.evaluate(&acct, Some(Money::from_pence(3501)));
        assert_eq!(e.reason, EligibilityReason::InsufficientBalance);
        assert!(!e.eligible);

        let e = policy.evaluate(&acct, Some(Money::from_pence(99)));
        assert_eq!(e.reason, EligibilityReason::BelowMinimumPayout);

        let e = policy.evaluate(&acct, Some(Money::from_pence(100)));
        assert!(e.eligible);
        assert_eq!(e.amount, Money::from_pence(100));
    }

    #[test]
    fn test_threshold_met_but_balance_already_paid() {
        // Earned enough overall but everything pending was already reserved elsewhere.
        let e = PayoutPolicy::default().evaluate(&account(50, 3300, None), None);
        assert_eq!(e.reason, EligibilityReason::BelowMinimumPayout);
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_value(EligibilityReason::BelowFirstPayoutThreshold).unwrap();
        assert_eq!(json, "below_first_payout_threshold");
    }
}
