//! Ownership Resolver: validated owner list with integer split weights.

use crate::domain::{MediaId, MediaOwnership, NameFingerprint, OwnerRef, Share};
use crate::ownership::{OwnershipError, OwnershipSource};
use rust_decimal::Decimal as RustDecimal;
use std::sync::Arc;
use thiserror::Error;

/// Largest accepted deviation of the share sum from exactly one.
pub const SHARE_SUM_TOLERANCE: RustDecimal = RustDecimal::from_parts(1, 0, 0, false, 4);

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("media {0} is not registered")]
    MediaNotFound(MediaId),
    #[error("invalid ownership for media {media_id}: {reason}")]
    InvalidOwnership { media_id: MediaId, reason: String },
    #[error(transparent)]
    Source(#[from] OwnershipError),
}

/// One owner after validation, with its share rescaled to an integer weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOwner {
    pub owner: OwnerRef,
    pub weight: u128,
    /// Raw name, carried on unverified records.
    pub artist_name: Option<String>,
    /// Media channel id, carried on unverified records of the media's own artist.
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOwnership {
    pub media_id: MediaId,
    pub owners: Vec<ResolvedOwner>,
    /// No ownership entries were registered; the whole pool goes to the media
    /// artist's name in the unclaimed pool.
    pub unresolved: bool,
}

/// Resolves the current owners of a media item from an [`OwnershipSource`].
#[derive(Debug, Clone)]
pub struct OwnershipResolver {
    source: Arc<dyn OwnershipSource>,
}

impl OwnershipResolver {
    pub fn new(source: Arc<dyn OwnershipSource>) -> Self {
        Self { source }
    }

    pub async fn resolve(&self, media_id: &MediaId) -> Result<ResolvedOwnership, ResolveError> {
        let media = self
            .source
            .media_ownership(media_id)
            .await?
            .ok_or_else(|| ResolveError::MediaNotFound(media_id.clone()))?;
        resolve_media(&media)
    }
}

/// Validate a media item's ownership entries and turn them into split weights.
///
/// Duplicate owners are merged into their first position. Shares must be
/// non-negative and sum to one within [`SHARE_SUM_TOLERANCE`]; weights are the
/// shares at their common decimal scale, so the split normalises by the actual
/// sum and still conserves the pool exactly.
pub fn resolve_media(media: &MediaOwnership) -> Result<ResolvedOwnership, ResolveError> {
    let media_fingerprint = NameFingerprint::from_name(&media.artist_name);

    if media.entries.is_empty() {
        let owner = OwnerRef::Unverified {
            fingerprint: media_fingerprint,
        };
        return Ok(ResolvedOwnership {
            media_id: media.media_id.clone(),
            owners: vec![ResolvedOwner {
                owner,
                weight: 1,
                artist_name: Some(media.artist_name.clone()),
                channel_id: media.channel_id.clone(),
            }],
            unresolved: true,
        });
    }

    let invalid = |reason: String| ResolveError::InvalidOwnership {
        media_id: media.media_id.clone(),
        reason,
    };

    let mut merged: Vec<(OwnerRef, Option<String>, Share)> =
        Vec::with_capacity(media.entries.len());
    for entry in &media.entries {
        if entry.share.is_negative() {
            return Err(invalid(format!(
                "negative share {} for {}",
                entry.share, entry.owner
            )));
        }
        match merged.iter_mut().find(|(owner, _, _)| *owner == entry.owner) {
            Some((_, _, share)) => *share = *share + entry.share,
            None => merged.push((entry.owner.clone(), entry.owner_name.clone(), entry.share)),
        }
    }

    let sum = merged
        .iter()
        .fold(Share::zero(), |acc, (_, _, share)| acc + *share);
    if (sum.inner() - RustDecimal::ONE).abs() > SHARE_SUM_TOLERANCE {
        return Err(invalid(format!("shares sum to {}, expected 1", sum)));
    }

    let scale = merged
        .iter()
        .map(|(_, _, share)| share.scale())
        .max()
        .unwrap_or(0);

    let mut owners = Vec::with_capacity(merged.len());
    for (owner, owner_name, share) in merged {
        let weight = share
            .scaled_weight(scale)
            .ok_or_else(|| invalid(format!("share {} has too much precision", share)))?;
        let (artist_name, channel_id) = match &owner {
            OwnerRef::Verified { .. } => (None, None),
            OwnerRef::Unverified { fingerprint } => {
                let channel = if *fingerprint == media_fingerprint {
                    media.channel_id.clone()
                } else {
                    None
                };
                let name = owner_name.or_else(|| Some(fingerprint.as_str().to_string()));
                (name, channel)
            }
        };
        owners.push(ResolvedOwner {
            owner,
            weight,
            artist_name,
            channel_id,
        });
    }

    Ok(ResolvedOwnership {
        media_id: media.media_id.clone(),
        owners,
        unresolved: false,
    })
}
