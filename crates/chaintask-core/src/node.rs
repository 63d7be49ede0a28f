//! Node RPC boundary.
//!
//! A [`NodeConnector`] opens one [`NodeSession`] per task run. Sessions are
//! released when dropped, so every exit path of a run closes its connection.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RunContext;
use crate::error::NodeError;

/// Opens sessions against a full node addressed by a connection string.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    async fn connect(
        &self,
        ctx: &RunContext,
        addr: &str,
    ) -> Result<Box<dyn NodeSession>, NodeError>;
}

/// A live connection to a full node.
#[async_trait]
pub trait NodeSession: Send + Sync {
    /// Fetch the full transaction objects of the block with `block_hash`.
    ///
    /// Returns `Ok(None)` when the node does not know the block.
    async fn block_transactions(
        &self,
        ctx: &RunContext,
        block_hash: &str,
    ) -> Result<Option<Vec<Value>>, NodeError>;
}
