//! The `Task` trait and the process-wide task registry.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::context::RunContext;
use crate::error::TaskError;
use crate::model::ModelDescriptor;
use crate::registry::{Named, Registry};
use crate::storage::Storage;
use crate::types::{RunReport, TipSet};

/// A named unit of work over one tipset.
///
/// Implementations hold no per-run mutable state, so the same instance may
/// run concurrently for different tipsets.
#[async_trait]
pub trait Task: Send + Sync {
    /// Stable, globally unique task name (e.g. `"evm_transaction"`).
    fn name(&self) -> &str;

    /// The record type this task writes.
    fn model(&self) -> ModelDescriptor;

    /// Extract, normalize, and store the records of `tipset`.
    ///
    /// An empty tipset is a success with `processed == 0` and no write.
    async fn run(
        &self,
        ctx: &RunContext,
        node_addr: &str,
        version: i32,
        tipset: &TipSet,
        storage: &dyn Storage,
    ) -> Result<RunReport, TaskError>;
}

impl Named for dyn Task {
    fn registry_name(&self) -> &str {
        self.name()
    }
}

pub type TaskRegistry = Registry<dyn Task>;

static TASKS: OnceLock<TaskRegistry> = OnceLock::new();

/// Install the process-wide task registry.
///
/// Call once during startup, before any lookups run concurrently. A second
/// call hands the rejected registry back.
pub fn install(registry: TaskRegistry) -> Result<(), TaskRegistry> {
    TASKS.set(registry)
}

/// The installed registry, if any.
pub fn global() -> Option<&'static TaskRegistry> {
    TASKS.get()
}

/// Look up a task in the installed registry.
pub fn get_task(name: &str) -> Option<Arc<dyn Task>> {
    global()?.get(name)
}
