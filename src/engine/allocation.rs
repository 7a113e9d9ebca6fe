//! Allocation planning: platform fee, artist pool and per-owner records.

use super::resolver::ResolvedOwnership;
use super::split::{largest_remainder_split, SplitError};
use crate::domain::{
    AllocationRecord, AllocationStatus, ArtistId, Money, MoneyError, NameFingerprint, OwnerRef,
    Rounding, TimeMs, TipEvent,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("tip amount must be positive, got {0}")]
    InvalidAmount(Money),
    #[error(transparent)]
    Money(#[from] MoneyError),
    #[error(transparent)]
    Split(#[from] SplitError),
}

/// Platform/artist split of a tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    /// Percentage of each tip that forms the artist pool, `0..=100`.
    pub artist_share_percent: u8,
}

impl FeePolicy {
    pub fn new(artist_share_percent: u8) -> Self {
        Self {
            artist_share_percent: artist_share_percent.min(100),
        }
    }

    /// Returns `(artist_pool, platform_fee)`.
    ///
    /// The pool is rounded down and the platform absorbs the remainder, so the
    /// two always add up to `amount`.
    pub fn split(&self, amount: Money) -> Result<(Money, Money), MoneyError> {
        let pool = amount.multiply_by_fraction(
            u64::from(self.artist_share_percent),
            100,
            Rounding::Down,
        )?;
        let fee = amount.subtract(pool)?;
        Ok((pool, fee))
    }
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self::new(70)
    }
}

/// Everything one tip writes to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    pub artist_pool: Money,
    pub platform_fee: Money,
    /// One pending record per resolved owner, in owner order.
    pub records: Vec<AllocationRecord>,
    pub unresolved: bool,
}

impl AllocationPlan {
    /// Total credited to each verified artist, in first-appearance order.
    pub fn verified_credits(&self) -> Result<Vec<(ArtistId, Money)>, MoneyError> {
        let mut credits: Vec<(ArtistId, Money)> = Vec::new();
        for record in &self.records {
            let Some(artist_id) = record.owner.artist_id() else {
                continue;
            };
            match credits.iter_mut().find(|(id, _)| id == artist_id) {
                Some((_, total)) => *total = total.add(record.amount)?,
                None => credits.push((artist_id.clone(), record.amount)),
            }
        }
        Ok(credits)
    }
}

/// Compute the fee split and the per-owner allocation records of a tip.
pub fn plan_allocation(
    tip: &TipEvent,
    ownership: &ResolvedOwnership,
    policy: &FeePolicy,
    allocated_at: TimeMs,
) -> Result<AllocationPlan, AllocationError> {
    if tip.amount.is_zero() {
        return Err(AllocationError::InvalidAmount(tip.amount));
    }

    let (artist_pool, platform_fee) = policy.split(tip.amount)?;
    let weights: Vec<u128> = ownership.owners.iter().map(|o| o.weight).collect();
    let amounts = largest_remainder_split(artist_pool, &weights)?;

    let records = ownership
        .owners
        .iter()
        .zip(amounts)
        .enumerate()
        .map(|(index, (owner, amount))| {
            let owner_index = index as i64;
            let origin_fingerprint = match &owner.owner {
                OwnerRef::Unverified { fingerprint } => Some(fingerprint.clone()),
                OwnerRef::Verified { .. } => None::<NameFingerprint>,
            };
            AllocationRecord {
                allocation_id: AllocationRecord::compute_allocation_id(&tip.tip_id, owner_index),
                tip_id: tip.tip_id.clone(),
                media_id: tip.media_id.clone(),
                owner: owner.owner.clone(),
                owner_index,
                amount,
                allocated_at,
                status: AllocationStatus::Pending,
                claimed_at: None,
                artist_name: owner.artist_name.clone(),
                channel_id: owner.channel_id.clone(),
                origin_fingerprint,
                matched_at: None,
                payout_request_id: None,
            }
        })
        .collect();

    Ok(AllocationPlan {
        artist_pool,
        platform_fee,
        records,
        unresolved: ownership.unresolved,
    })
}
