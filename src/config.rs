use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Settings for one synchronisation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Compute and report the diff without writing to the destination.
    #[serde(default)]
    pub dry_run: bool,
    /// Where to write the diff as JSON, if anywhere.
    #[serde(default)]
    pub diff_output: Option<PathBuf>,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl SyncConfig {
    pub fn trace_loaded(&self) {
        info!(
            dry_run = self.dry_run,
            diff_output = ?self.diff_output,
            max_concurrency = self.executor.max_concurrency,
            min_call_interval_ms = self.executor.min_call_interval_ms,
            continue_on_failure = self.executor.continue_on_failure,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}

/// How operations are dispatched to the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Operations of one model in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Minimum spacing between two destination calls.
    #[serde(default)]
    pub min_call_interval_ms: u64,
    /// Keep going after a failed operation.
    #[serde(default = "default_continue_on_failure")]
    pub continue_on_failure: bool,
}

fn default_max_concurrency() -> usize {
    1
}

fn default_continue_on_failure() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            min_call_interval_ms: 0,
            continue_on_failure: default_continue_on_failure(),
        }
    }
}

impl ExecutorConfig {
    pub fn min_call_interval(&self) -> Duration {
        Duration::from_millis(self.min_call_interval_ms)
    }
}
