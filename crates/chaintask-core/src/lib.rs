//! chaintask-core — extraction and normalization pipeline for per-tipset chain data.
//!
//! # Architecture
//!
//! ```text
//! Mq (fetch_message) ──► dispatch_once ──► Task::run
//!                                            ├── NodeConnector / NodeSession (scoped)
//!                                            ├── TipSetKey::eth_hash        (lookup handle)
//!                                            ├── normalize                  (RawRecord → EvmTransaction)
//!                                            │     └── codec               (hex → u64 / decimal / bytes)
//!                                            └── Storage::write_many       (one batch per tipset)
//!                    ◄── CommittableMq::commit (only after a successful run)
//! ```
//!
//! Tasks and queues are looked up by name through [`TaskRegistry`] and
//! [`MqRegistry`], which are filled once at startup.

pub mod codec;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod mq;
pub mod node;
pub mod normalize;
pub mod registry;
pub mod storage;
pub mod task;
pub mod types;

pub use codec::CodecError;
pub use config::{ChainNotifyConfig, LogConfig, TaskConfig};
pub use context::{CancelHandle, Interrupted, RunContext};
pub use dispatch::dispatch_once;
pub use error::{DispatchError, KeyError, MqError, NodeError, StorageError, TaskError};
pub use model::{DomainRecord, EvmTransaction, ModelDescriptor};
pub use mq::{CommittableMq, Mq, MqRegistry};
pub use node::{NodeConnector, NodeSession};
pub use normalize::{FieldError, NormalizeContext, RawRecord, RecordError};
pub use registry::Registry;
pub use storage::Storage;
pub use task::{Task, TaskRegistry};
pub use types::{Message, RunReport, TipSet, TipSetKey};
