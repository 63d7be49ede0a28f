//! Configuration types.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Notification queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNotifyConfig {
    /// Queue implementation to look up in the queue registry.
    #[serde(default = "default_mq")]
    pub mq: String,
    /// Maximum buffered messages for in-process queues.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_mq() -> String {
    "memory".into()
}

fn default_capacity() -> usize {
    1_024
}

impl Default for ChainNotifyConfig {
    fn default() -> Self {
        Self {
            mq: default_mq(),
            capacity: default_capacity(),
        }
    }
}

/// Settings for running a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task to look up in the task registry.
    #[serde(default = "default_task")]
    pub task: String,
    /// Lotus API address: `http(s)://host:port/rpc/v1`, a multiaddr, or
    /// either prefixed with `TOKEN:`.
    pub lotus_addr: String,
    /// Record layout version stamped on every record.
    #[serde(default = "default_version")]
    pub version: i32,
    /// Per-run timeout in milliseconds; `0` disables it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Queue to consume from.
    #[serde(default = "default_queue")]
    pub queue: String,
}

fn default_task() -> String {
    "evm_transaction".into()
}

fn default_version() -> i32 {
    1
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_queue() -> String {
    "tipsets".into()
}

impl TaskConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            task: default_task(),
            lotus_addr: "http://127.0.0.1:1234/rpc/v1".into(),
            version: default_version(),
            timeout_ms: default_timeout_ms(),
            queue: default_queue(),
        }
    }
}

/// Log level per component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: crate name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".into()
}

impl LogConfig {
    /// `EnvFilter` directive string, e.g. `"info,chaintask_evm=debug"`.
    pub fn directives(&self) -> String {
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        let mut directives = self.level.clone();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}
