//! chaintask-mq — notification queue implementations.
//!
//! - [`memory`] — in-process committable queue (dev/testing, embedded use)

pub mod memory;

use std::sync::Arc;

use chaintask_core::mq::Mq;

pub use memory::MemoryQueue;

/// Every queue implementation this crate provides, ready for
/// [`MqRegistry::register`](chaintask_core::MqRegistry).
pub fn default_queues() -> Vec<Arc<dyn Mq>> {
    vec![Arc::new(MemoryQueue::new())]
}
