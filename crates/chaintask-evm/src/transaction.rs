//! The `evm_transaction` task: one tipset's EVM transactions → storage.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use chaintask_core::context::RunContext;
use chaintask_core::error::{NodeError, TaskError};
use chaintask_core::model::{DomainRecord, EvmTransaction, ModelDescriptor};
use chaintask_core::node::NodeConnector;
use chaintask_core::normalize::{normalize_all, NormalizeContext, RawRecord};
use chaintask_core::storage::Storage;
use chaintask_core::task::Task;
use chaintask_core::types::{RunReport, TipSet};

use crate::lotus::LotusConnector;

/// Extracts the EVM transactions of a tipset and writes them as one batch.
pub struct TransactionTask {
    connector: Arc<dyn NodeConnector>,
}

impl TransactionTask {
    pub const NAME: &'static str = "evm_transaction";

    pub fn new(connector: Arc<dyn NodeConnector>) -> Self {
        Self { connector }
    }

    /// A task that talks to Lotus over HTTP JSON-RPC.
    pub fn lotus() -> Self {
        Self::new(Arc::new(LotusConnector::default()))
    }
}

/// Check that every fetched transaction is a JSON object.
pub fn raw_records(values: Vec<Value>) -> Result<Vec<RawRecord>, NodeError> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| match value {
            Value::Object(map) => Ok(map),
            other => Err(NodeError::Malformed(format!(
                "transaction {i} is not an object: {other}"
            ))),
        })
        .collect()
}

#[async_trait]
impl Task for TransactionTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn model(&self) -> ModelDescriptor {
        EvmTransaction::MODEL
    }

    async fn run(
        &self,
        ctx: &RunContext,
        node_addr: &str,
        version: i32,
        tipset: &TipSet,
        storage: &dyn Storage,
    ) -> Result<RunReport, TaskError> {
        // Dropped on every return path, which closes the session.
        let session = ctx
            .guard(self.connector.connect(ctx, node_addr))
            .await?
            .map_err(TaskError::Connection)?;

        let block_hash = tipset.key.eth_hash().map_err(TaskError::KeyResolution)?;

        let fetched = ctx
            .guard(session.block_transactions(ctx, &block_hash))
            .await?
            .map_err(TaskError::Fetch)?;

        // An unknown block must fail the run so the message is redelivered.
        let raws = fetched.ok_or_else(|| TaskError::Fetch(NodeError::BlockNotFound(block_hash)))?;
        if raws.is_empty() {
            debug!(height = tipset.height, "can not find any transaction");
            return Ok(RunReport::default());
        }

        let records = raw_records(raws).map_err(TaskError::Fetch)?;
        let normalize_ctx = NormalizeContext {
            height: tipset.height,
            version,
        };
        let transactions = normalize_all(&records, &normalize_ctx)?;

        let processed = transactions.len();
        let batch: Vec<DomainRecord> = transactions.into_iter().map(DomainRecord::from).collect();
        ctx.guard(storage.write_many(ctx, batch))
            .await?
            .map_err(TaskError::Storage)?;

        debug!(height = tipset.height, count = processed, "process transaction");
        Ok(RunReport { processed })
    }
}
