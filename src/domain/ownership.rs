//! Rights-registry view of a media item.

use crate::domain::{MediaId, OwnerRef, Share};
use serde::{Deserialize, Serialize};

/// One owner of a media item and their fraction of the artist pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipEntry {
    pub owner: OwnerRef,
    /// Raw name as registered, for unverified owners.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    pub share: Share,
}

impl OwnershipEntry {
    pub fn verified(artist_id: crate::domain::ArtistId, share: Share) -> Self {
        Self {
            owner: OwnerRef::verified(artist_id),
            owner_name: None,
            share,
        }
    }

    pub fn unverified(name: &str, share: Share) -> Self {
        Self {
            owner: OwnerRef::unverified(name),
            owner_name: Some(name.to_string()),
            share,
        }
    }
}

/// Media metadata plus its current ownership entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaOwnership {
    pub media_id: MediaId,
    /// Raw artist name as shown on the media item.
    pub artist_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// External platform channel id of the media's artist, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub entries: Vec<OwnershipEntry>,
}

impl MediaOwnership {
    pub fn new(media_id: MediaId, artist_name: impl Into<String>) -> Self {
        Self {
            media_id,
            artist_name: artist_name.into(),
            title: None,
            channel_id: None,
            entries: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_entry(mut self, entry: OwnershipEntry) -> Self {
        self.entries.push(entry);
        self
    }
}
