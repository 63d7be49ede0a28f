//! Storage sink boundary.

use async_trait::async_trait;

use crate::context::RunContext;
use crate::error::StorageError;
use crate::model::DomainRecord;

/// A batch-write destination for domain records.
///
/// Queues deliver at least once, so `write_many` may see the same records
/// again after a redelivery. Implementations must upsert by
/// [`DomainRecord::key`] rather than duplicate rows. Calls from concurrent
/// runs must be safe; no ordering between batches is implied.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn write_many(
        &self,
        ctx: &RunContext,
        records: Vec<DomainRecord>,
    ) -> Result<(), StorageError>;
}
