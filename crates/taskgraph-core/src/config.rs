use std::env;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize_opt(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Scheduler run configuration. Built via `SchedulerConfig::from_env()` or
/// the builder methods, then handed to `Scheduler::new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on worker threads; `None` means "derive from the system
    /// and the registered task count". Resolved lazily in `start()` since
    /// the task count isn't known until registration is complete.
    pub workers: Option<usize>,
    /// If true, a failing task transitively skips every downstream task; if
    /// false, only its direct children are marked skipped during cascade
    /// (deeper descendants are still canonicalized skipped at drain).
    pub skip_dependents: bool,
    /// Whether `results` is emptied at run start. Set to `false` to
    /// pre-seed `results` and have tasks observe earlier runs' output.
    pub clear_results_on_start: bool,
    /// Logging hints, honored by the CLI's `tracing-subscriber` init; the
    /// scheduler core never branches on these.
    pub setup_logging: bool,
    pub verbose: bool,
    pub add_stream_handler: bool,
    pub add_file_handler: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: None,
            skip_dependents: true,
            clear_results_on_start: true,
            setup_logging: true,
            verbose: false,
            add_stream_handler: true,
            add_file_handler: false,
        }
    }
}

impl SchedulerConfig {
    /// Build config from environment variables, falling back to defaults.
    /// Recognizes `TASKGRAPH_WORKERS`, `TASKGRAPH_SKIP_DEPENDENTS`,
    /// `TASKGRAPH_CLEAR_RESULTS_ON_START`, `TASKGRAPH_VERBOSE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: env_usize_opt("TASKGRAPH_WORKERS"),
            skip_dependents: env_or(
                "TASKGRAPH_SKIP_DEPENDENTS",
                &defaults.skip_dependents.to_string(),
            ) != "false",
            clear_results_on_start: env_or(
                "TASKGRAPH_CLEAR_RESULTS_ON_START",
                &defaults.clear_results_on_start.to_string(),
            ) != "false",
            verbose: env_or("TASKGRAPH_VERBOSE", "false") == "true",
            ..defaults
        }
    }

    /// Explicit `.workers(n)` builder call; overrides both the default and
    /// any `TASKGRAPH_WORKERS` environment value.
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    pub fn skip_dependents(mut self, value: bool) -> Self {
        self.skip_dependents = value;
        self
    }

    pub fn clear_results_on_start(mut self, value: bool) -> Self {
        self.clear_results_on_start = value;
        self
    }

    /// Resolve the worker-thread count now that the task count is known:
    /// the configured value (explicit or from env), or the system's
    /// available parallelism, capped at `total`. An explicit `workers < 1`
    /// is a configuration error, not silently clamped to 1.
    pub fn resolved_worker_threads(&self, total: usize) -> Result<usize, ConfigError> {
        let configured = match self.workers {
            Some(0) => return Err(ConfigError::InvalidWorkerCount(0)),
            Some(n) => n,
            None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        };
        Ok(configured.min(total.max(1)))
    }

    /// Default `tracing` filter directive for the CLI's subscriber init:
    /// `debug` when verbose, `warn` otherwise — mirrors the teacher's
    /// `verbose` → filter-level mapping.
    pub fn default_filter_directive(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}
