//! One fetch → run → commit cycle.
//!
//! The surrounding scheduler decides when and how often to call
//! [`dispatch_once`]; this module fixes the ordering contract between the
//! queue and the task.

use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::error::DispatchError;
use crate::mq::Mq;
use crate::storage::Storage;
use crate::task::Task;
use crate::types::RunReport;

/// Fetch one message from `mq`, run `task` on its tipset, and commit the
/// message if the queue supports it.
///
/// The commit happens only after `run` succeeds. On any failure the message
/// is left uncommitted so the queue delivers it again.
pub async fn dispatch_once(
    ctx: &RunContext,
    mq: &dyn Mq,
    task: &dyn Task,
    node_addr: &str,
    version: i32,
    storage: &dyn Storage,
) -> Result<RunReport, DispatchError> {
    let message = mq.fetch_message(ctx).await.map_err(DispatchError::Fetch)?;

    let tipset = message.tipset().map_err(|source| DispatchError::Resolve {
        message_id: message.id.clone(),
        source,
    })?;

    debug!(
        task = task.name(),
        message_id = %message.id,
        height = tipset.height,
        attempts = message.attempts,
        "dispatching tipset"
    );

    let report = match task.run(ctx, node_addr, version, &tipset, storage).await {
        Ok(report) => report,
        Err(source) => {
            warn!(
                task = task.name(),
                message_id = %message.id,
                height = tipset.height,
                stage = source.stage(),
                error = %source,
                "task run failed, leaving message uncommitted"
            );
            return Err(DispatchError::Run {
                message_id: message.id,
                source,
            });
        }
    };

    if let Some(committable) = mq.as_committable() {
        committable
            .commit(ctx, &message)
            .await
            .map_err(|source| DispatchError::Commit {
                message_id: message.id.clone(),
                source,
            })?;
    }

    info!(
        task = task.name(),
        message_id = %message.id,
        height = tipset.height,
        processed = report.processed,
        "tipset processed"
    );
    Ok(report)
}
