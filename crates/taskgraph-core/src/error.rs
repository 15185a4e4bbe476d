use thiserror::Error;

/// Errors raised while shaping the dependency graph, at `add_node` or `start()`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("task name must not be empty")]
    EmptyName,

    #[error("task '{0}' is already registered")]
    DuplicateName(String),

    #[error("task '{task}' depends on unregistered task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("dependency cycle detected: {0}")]
    CycleDetected(String),
}

/// Errors raised while constructing a `SchedulerConfig` or `SharedState`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("workers must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    #[error("initial state key '{0}' is reserved (leading underscore) and may not be seeded by the caller")]
    ReservedKey(String),

    #[error("'results' is scheduler-managed and may not be seeded directly; use result pre-seeding instead")]
    ReservedResultsKey,
}

/// Errors raised by `Scheduler::register` / `Scheduler::start` around run lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("scheduler has already been started")]
    AlreadyStarted,
}
