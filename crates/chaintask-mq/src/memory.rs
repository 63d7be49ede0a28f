//! In-process committable queue.
//!
//! Fetched messages stay in flight until committed. In-flight messages can
//! be pushed back with [`MemoryQueue::redeliver_uncommitted`], which is what a
//! broker does when a consumer disappears before acknowledging.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, trace};

use chaintask_core::config::ChainNotifyConfig;
use chaintask_core::context::RunContext;
use chaintask_core::error::MqError;
use chaintask_core::mq::{CommittableMq, Mq};
use chaintask_core::types::{Message, TipSet};

#[derive(Default)]
struct State {
    queue_name: Option<String>,
    capacity: usize,
    pending: VecDeque<Message>,
    /// Fetched but not yet committed, in fetch order.
    in_flight: Vec<Message>,
    next_seq: u64,
    closed: bool,
}

/// A bounded, in-process notification queue with commit support.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
    notify: Notify,
}

impl MemoryQueue {
    pub const NAME: &'static str = "memory";

    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Announce a tipset. Returns the message id.
    pub fn publish(&self, tipset: &TipSet) -> Result<String, MqError> {
        let id = {
            let mut state = self.lock();
            if state.closed {
                return Err(MqError::Closed);
            }
            let Some(queue_name) = state.queue_name.clone() else {
                return Err(MqError::NotInitialized);
            };
            if state.pending.len() + state.in_flight.len() >= state.capacity {
                return Err(MqError::Full {
                    capacity: state.capacity,
                });
            }
            state.next_seq += 1;
            let message = Message::for_tipset(format!("{queue_name}-{}", state.next_seq), tipset)?;
            let id = message.id.clone();
            state.pending.push_back(message);
            id
        };
        trace!(%id, height = tipset.height, "tipset published");
        self.notify.notify_one();
        Ok(id)
    }

    /// Put every in-flight message back at the head of the queue, in fetch
    /// order, with its delivery count bumped. Returns how many were requeued.
    pub fn redeliver_uncommitted(&self) -> usize {
        let count = {
            let mut state = self.lock();
            let in_flight = std::mem::take(&mut state.in_flight);
            let count = in_flight.len();
            for mut message in in_flight.into_iter().rev() {
                message.attempts += 1;
                state.pending.push_front(message);
            }
            count
        };
        if count > 0 {
            debug!(count, "requeued uncommitted messages");
            self.notify.notify_waiters();
        }
        count
    }

    /// Messages waiting to be fetched.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Messages fetched but not committed.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }
}

#[async_trait]
impl Mq for MemoryQueue {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn init_from_config(
        &self,
        _ctx: &RunContext,
        config: &ChainNotifyConfig,
        queue_name: &str,
    ) -> Result<(), MqError> {
        if queue_name.is_empty() {
            return Err(MqError::Config("queue name must not be empty".into()));
        }
        if config.capacity == 0 {
            return Err(MqError::Config("capacity must be positive".into()));
        }

        let mut state = self.lock();
        if state.closed {
            return Err(MqError::Closed);
        }
        match state.queue_name.as_deref() {
            Some(current) if current != queue_name => Err(MqError::Config(format!(
                "queue already initialized as {current:?}"
            ))),
            _ => {
                state.queue_name = Some(queue_name.to_string());
                state.capacity = config.capacity;
                Ok(())
            }
        }
    }

    async fn fetch_message(&self, ctx: &RunContext) -> Result<Message, MqError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a publish or close in
            // between still wakes this fetcher.
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(MqError::Closed);
                }
                if state.queue_name.is_none() {
                    return Err(MqError::NotInitialized);
                }
                if let Some(message) = state.pending.pop_front() {
                    state.in_flight.push(message.clone());
                    return Ok(message);
                }
            }

            ctx.guard(notified).await?;
        }
    }

    async fn close(&self) -> Result<(), MqError> {
        let was_open = {
            let mut state = self.lock();
            !std::mem::replace(&mut state.closed, true)
        };
        if was_open {
            debug!("memory queue closed");
            self.notify.notify_waiters();
        }
        Ok(())
    }

    fn as_committable(&self) -> Option<&dyn CommittableMq> {
        Some(self)
    }
}

#[async_trait]
impl CommittableMq for MemoryQueue {
    async fn commit(&self, _ctx: &RunContext, message: &Message) -> Result<(), MqError> {
        let mut state = self.lock();
        let pos = state
            .in_flight
            .iter()
            .position(|m| m.id == message.id)
            .ok_or_else(|| MqError::UnknownMessage(message.id.clone()))?;
        state.in_flight.remove(pos);
        Ok(())
    }
}
