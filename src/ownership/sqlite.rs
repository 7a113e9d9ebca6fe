//! Ownership source backed by the rights-registry tables in the ledger database.

use super::{OwnershipError, OwnershipSource};
use crate::db::Repository;
use crate::domain::{MediaId, MediaOwnership};
use async_trait::async_trait;

#[async_trait]
impl OwnershipSource for Repository {
    async fn media_ownership(
        &self,
        media_id: &MediaId,
    ) -> Result<Option<MediaOwnership>, OwnershipError> {
        self.query_media_ownership(media_id).await
    }
}
