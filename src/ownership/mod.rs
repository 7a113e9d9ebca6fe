//! Ownership source abstraction over the rights registry.

use crate::domain::{MediaId, MediaOwnership};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryOwnershipSource;

/// Read-only access to media metadata and ownership entries.
///
/// The rights-registration workflow owns the data; the ledger never writes it.
#[async_trait]
pub trait OwnershipSource: Send + Sync + fmt::Debug {
    /// Fetch a media item with its ownership entries, in registration order.
    ///
    /// Returns `None` when the media item is not registered at all. A registered
    /// item with no entries returns `Some` with an empty `entries` list.
    async fn media_ownership(
        &self,
        media_id: &MediaId,
    ) -> Result<Option<MediaOwnership>, OwnershipError>;
}

/// Error type for ownership source operations.
#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error("ownership storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("malformed ownership row for media {media_id}: {message}")]
    Malformed { media_id: String, message: String },
}
