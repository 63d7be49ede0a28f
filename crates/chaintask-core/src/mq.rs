//! Notification queue traits and the process-wide queue registry.
//!
//! A queue tells the dispatcher that a tipset is ready. Every queue offers the
//! base capability (`init_from_config`, `fetch_message`, `close`). Queues
//! that can acknowledge deliveries also implement [`CommittableMq`] and
//! expose it through [`Mq::as_committable`].

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::config::ChainNotifyConfig;
use crate::context::RunContext;
use crate::error::MqError;
use crate::registry::{Named, Registry};
use crate::types::Message;

#[async_trait]
pub trait Mq: Send + Sync {
    /// Implementation name used for registry lookup (e.g. `"memory"`).
    fn name(&self) -> &str;

    /// Set up the queue. Calling it again with the same arguments is a no-op.
    async fn init_from_config(
        &self,
        ctx: &RunContext,
        config: &ChainNotifyConfig,
        queue_name: &str,
    ) -> Result<(), MqError>;

    /// Wait for the next message. Fails on transport errors, cancellation,
    /// or after [`close`](Mq::close).
    async fn fetch_message(&self, ctx: &RunContext) -> Result<Message, MqError>;

    /// Release underlying resources. Idempotent.
    async fn close(&self) -> Result<(), MqError>;

    /// The commit capability, when this queue supports acknowledgements.
    fn as_committable(&self) -> Option<&dyn CommittableMq> {
        None
    }
}

/// A queue that redelivers messages until they are committed.
///
/// `commit` must only be called once the task run for the message has
/// succeeded; uncommitted messages are delivered again (at-least-once).
#[async_trait]
pub trait CommittableMq: Mq {
    async fn commit(&self, ctx: &RunContext, message: &Message) -> Result<(), MqError>;
}

impl Named for dyn Mq {
    fn registry_name(&self) -> &str {
        self.name()
    }
}

pub type MqRegistry = Registry<dyn Mq>;

static QUEUES: OnceLock<MqRegistry> = OnceLock::new();

/// Install the process-wide queue registry. See [`crate::task::install`].
pub fn install(registry: MqRegistry) -> Result<(), MqRegistry> {
    QUEUES.set(registry)
}

pub fn global() -> Option<&'static MqRegistry> {
    QUEUES.get()
}

/// Look up a queue in the installed registry.
pub fn get_mq(name: &str) -> Option<Arc<dyn Mq>> {
    global()?.get(name)
}
