//! In-memory storage backend.
//!
//! Keeps records in RAM, keyed by table and record key.
//! Useful for testing and short-lived runs that don't need persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chaintask_core::context::RunContext;
use chaintask_core::error::StorageError;
use chaintask_core::model::{DomainRecord, EvmTransaction};
use chaintask_core::storage::Storage;

#[derive(Default)]
struct Inner {
    /// Records in first-write order.
    rows: Vec<DomainRecord>,
    /// (table, key) → position in `rows`.
    index: HashMap<(&'static str, String), usize>,
    /// Size of every `write_many` batch received.
    batches: Vec<usize>,
}

/// In-memory record storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All records routed to `table`, in first-write order.
    pub fn records(&self, table: &str) -> Vec<DomainRecord> {
        self.lock()
            .rows
            .iter()
            .filter(|r| r.model().table == table)
            .cloned()
            .collect()
    }

    /// Stored EVM transactions, in first-write order.
    pub fn transactions(&self) -> Vec<EvmTransaction> {
        self.lock()
            .rows
            .iter()
            .map(|r| match r {
                DomainRecord::EvmTransaction(tx) => tx.clone(),
            })
            .collect()
    }

    /// Total number of distinct stored records.
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `write_many` calls received.
    pub fn write_calls(&self) -> usize {
        self.lock().batches.len()
    }

    /// Sizes of the received batches, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batches.clone()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn write_many(
        &self,
        ctx: &RunContext,
        records: Vec<DomainRecord>,
    ) -> Result<(), StorageError> {
        ctx.check()?;
        let mut inner = self.lock();
        inner.batches.push(records.len());
        for record in records {
            let key = (record.model().table, record.key().to_string());
            match inner.index.get(&key).copied() {
                Some(pos) => inner.rows[pos] = record,
                None => {
                    let pos = inner.rows.len();
                    inner.rows.push(record);
                    inner.index.insert(key, pos);
                }
            }
        }
        tracing::trace!(total = inner.rows.len(), "memory storage batch applied");
        Ok(())
    }
}
