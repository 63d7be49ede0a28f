//! Error types for the task pipeline.
//!
//! Each stage wraps its cause with `#[source]`, so callers can walk the chain
//! down to the underlying codec, transport, or storage failure.

use thiserror::Error;

use crate::context::Interrupted;
use crate::normalize::RecordError;

/// A tipset key that cannot be turned into a lookup hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("tipset key has no CIDs")]
    Empty,

    #[error("tipset key has an empty CID at position {position}")]
    EmptyCid { position: usize },

    #[error("tipset key CID at position {position} is invalid: {reason}")]
    InvalidCid { position: usize, reason: String },
}

/// Errors from the node RPC boundary.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("cannot connect to node: {0}")]
    Connect(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed node response: {0}")]
    Malformed(String),

    #[error("block {0} not found on node")]
    BlockNotFound(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Errors returned by [`Task::run`](crate::task::Task::run).
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("connect to node failed")]
    Connection(#[source] NodeError),

    #[error("tipset key resolution failed")]
    KeyResolution(#[source] KeyError),

    #[error("fetch block transactions failed")]
    Fetch(#[source] NodeError),

    #[error("normalize transactions failed")]
    Normalize(#[from] RecordError),

    #[error("storage write_many failed")]
    Storage(#[source] StorageError),

    #[error("run cancelled")]
    Cancelled,

    #[error("run deadline exceeded")]
    DeadlineExceeded,
}

impl From<Interrupted> for TaskError {
    fn from(e: Interrupted) -> Self {
        match e {
            Interrupted::Cancelled => Self::Cancelled,
            Interrupted::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

impl TaskError {
    /// Short name of the pipeline stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connect",
            Self::KeyResolution(_) => "key",
            Self::Fetch(_) => "fetch",
            Self::Normalize(_) => "normalize",
            Self::Storage(_) => "storage",
            Self::Cancelled | Self::DeadlineExceeded => "interrupted",
        }
    }

    /// Returns `true` if the run stopped because its context was cancelled or expired.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::DeadlineExceeded
                | Self::Connection(NodeError::Interrupted(_))
                | Self::Fetch(NodeError::Interrupted(_))
                | Self::Storage(StorageError::Interrupted(_))
        )
    }
}

/// Errors from a notification queue.
#[derive(Debug, Error)]
pub enum MqError {
    #[error("queue is not initialized")]
    NotInitialized,

    #[error("invalid queue configuration: {0}")]
    Config(String),

    #[error("queue is closed")]
    Closed,

    #[error("queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("fetch cancelled")]
    Cancelled,

    #[error("fetch deadline exceeded")]
    DeadlineExceeded,

    #[error("unknown message id: {0}")]
    UnknownMessage(String),

    #[error("message body is not a valid tipset")]
    InvalidMessage(#[source] serde_json::Error),
}

impl From<Interrupted> for MqError {
    fn from(e: Interrupted) -> Self {
        match e {
            Interrupted::Cancelled => Self::Cancelled,
            Interrupted::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// Errors from one fetch → run → commit cycle.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("fetch message failed")]
    Fetch(#[source] MqError),

    #[error("message {message_id} does not resolve to a tipset")]
    Resolve {
        message_id: String,
        #[source]
        source: MqError,
    },

    #[error("task run for message {message_id} failed")]
    Run {
        message_id: String,
        #[source]
        source: TaskError,
    },

    #[error("commit of message {message_id} failed")]
    Commit {
        message_id: String,
        #[source]
        source: MqError,
    },
}
