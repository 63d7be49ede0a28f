//! chaintask-evm — EVM transaction extraction from Filecoin Lotus nodes.

pub mod lotus;
pub mod transaction;

use std::sync::Arc;

use chaintask_core::task::Task;

pub use lotus::{ApiInfo, LotusConnector, LotusSession};
pub use transaction::TransactionTask;

/// Every task this crate provides, ready for [`TaskRegistry::register`](chaintask_core::TaskRegistry).
pub fn default_tasks() -> Vec<Arc<dyn Task>> {
    vec![Arc::new(TransactionTask::lotus())]
}
