use clap::Parser;

/// Reference CLI for the dependency-aware task scheduler.
///
/// Runs a small built-in fixture graph (see `fixtures.rs`) through
/// `taskgraph_core::Scheduler`, reporting progress via the terminal hook
/// collaborator.
#[derive(Parser, Debug)]
#[command(name = "taskgraph", about = "Dependency-aware parallel task scheduler")]
pub struct CliArgs {
    /// Upper bound on worker threads (defaults to available parallelism,
    /// capped at the task count; overridable via TASKGRAPH_WORKERS).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Only register fixture tasks carrying one of these tags (comma-separated).
    /// `after` edges pointing at filtered-out tasks are stripped.
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Disable cascading skip propagation: a failing task only skips its
    /// direct children instead of its whole downstream subgraph (deeper
    /// descendants are still reported skipped at drain).
    #[arg(long)]
    pub skip_deps: bool,

    /// Print the dependency graph and exit without running anything.
    #[arg(long)]
    pub graph: bool,

    /// Raise the default log filter from `warn` to `debug`.
    #[arg(long)]
    pub verbose: bool,

    /// `key=value` pairs seeding Shared State, and `result-<name>=value`
    /// pairs pre-seeding `results` (which also implies
    /// `clear_results_on_start = false`). May be repeated.
    #[arg(trailing_var_arg = true)]
    pub assignments: Vec<String>,
}

/// One parsed `--key=value` / `result-<name>=value` trailing assignment.
#[derive(Debug, PartialEq, Eq)]
pub enum Assignment {
    State { key: String, value: String },
    Result { task: String, value: String },
}

/// Parse the trailing `assignments` into typed state/result seeds. Entries
/// that don't contain `=` are ignored with a warning at the call site.
pub fn parse_assignments(raw: &[String]) -> Vec<Assignment> {
    raw.iter()
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            if let Some(task) = key.strip_prefix("result-") {
                Some(Assignment::Result { task: task.to_string(), value: value.to_string() })
            } else {
                Some(Assignment::State { key: key.to_string(), value: value.to_string() })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_state_assignment() {
        let parsed = parse_assignments(&["count=3".to_string()]);
        assert_eq!(parsed, vec![Assignment::State { key: "count".to_string(), value: "3".to_string() }]);
    }

    #[test]
    fn parses_result_preseed_assignment() {
        let parsed = parse_assignments(&["result-x=preset".to_string()]);
        assert_eq!(
            parsed,
            vec![Assignment::Result { task: "x".to_string(), value: "preset".to_string() }]
        );
    }

    #[test]
    fn ignores_entries_without_equals() {
        let parsed = parse_assignments(&["not-an-assignment".to_string()]);
        assert!(parsed.is_empty());
    }
}
