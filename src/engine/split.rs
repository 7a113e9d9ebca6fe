//! Largest-remainder split of an amount across integer weights.

use crate::domain::Money;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("cannot split across zero weights")]
    Empty,
    #[error("weights sum to zero")]
    ZeroTotalWeight,
    #[error("split arithmetic overflow")]
    Overflow,
}

/// Split `total` proportionally to `weights`, conserving every penny.
///
/// Each part starts at `floor(total * w / W)`. The leftover pence (always fewer
/// than the number of parts) go one each to the parts with the largest
/// fractional remainder; equal remainders favour the earlier part. The result
/// has the same length and order as `weights` and sums to `total` exactly.
pub fn largest_remainder_split(total: Money, weights: &[u128]) -> Result<Vec<Money>, SplitError> {
    if weights.is_empty() {
        return Err(SplitError::Empty);
    }
    let weight_sum = weights
        .iter()
        .try_fold(0u128, |acc, w| acc.checked_add(*w))
        .ok_or(SplitError::Overflow)?;
    if weight_sum == 0 {
        return Err(SplitError::ZeroTotalWeight);
    }

    let total_units = total.pence() as u128;
    let mut parts = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    let mut allocated: u128 = 0;

    for (index, weight) in weights.iter().enumerate() {
        let product = total_units.checked_mul(*weight).ok_or(SplitError::Overflow)?;
        let floor = product / weight_sum;
        allocated += floor;
        parts.push(floor);
        remainders.push((product % weight_sum, index));
    }

    // Fewer than weights.len() units remain after flooring.
    let leftover = (total_units - allocated) as usize;
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, index) in remainders.into_iter().take(leftover) {
        parts[index] += 1;
    }

    parts
        .into_iter()
        .map(|p| {
            i64::try_from(p)
                .ok()
                .and_then(|v| Money::try_new(v).ok())
                .ok_or(SplitError::Overflow)
        })
        .collect()
}
