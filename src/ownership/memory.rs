//! In-memory ownership source for tests and embedding.

use super::{OwnershipError, OwnershipSource};
use crate::domain::{MediaId, MediaOwnership};
use async_trait::async_trait;
use std::collections::HashMap;

/// Ownership source that returns predefined media records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOwnershipSource {
    media: HashMap<MediaId, MediaOwnership>,
}

impl InMemoryOwnershipSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a media item, replacing any previous registration.
    pub fn with_media(mut self, media: MediaOwnership) -> Self {
        self.media.insert(media.media_id.clone(), media);
        self
    }
}

#[async_trait]
impl OwnershipSource for InMemoryOwnershipSource {
    async fn media_ownership(
        &self,
        media_id: &MediaId,
    ) -> Result<Option<MediaOwnership>, OwnershipError> {
        Ok(self.media.get(media_id).cloned())
    }
}
