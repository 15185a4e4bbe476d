use std::time::Duration;

use serde::Serialize;

use crate::task::{TaskStatus, ThreadId};

/// One task's final record, as reported in a `Summary`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub name: String,
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub assigned_thread: ThreadId,
}

/// The end-of-run report returned by `Scheduler::start`.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration: Duration,
    pub any_failed: bool,
    pub tasks: Vec<TaskReport>,
}

impl Summary {
    pub fn build(tasks: Vec<TaskReport>, duration: Duration) -> Self {
        let total = tasks.len();
        let passed = tasks.iter().filter(|t| t.status == TaskStatus::Passed).count();
        let failed = tasks.iter().filter(|t| t.status == TaskStatus::Failed).count();
        let skipped = tasks.iter().filter(|t| t.status == TaskStatus::Skipped).count();
        Self { total, passed, failed, skipped, duration, any_failed: failed > 0, tasks }
    }

    /// A human-readable multi-line report: counts, then the names of every
    /// failed and skipped task.
    pub fn text(&self) -> String {
        let mut out = format!(
            "ran {} task(s) in {:.3}s: {} passed, {} failed, {} skipped\n",
            self.total,
            self.duration.as_secs_f64(),
            self.passed,
            self.failed,
            self.skipped,
        );

        let failed_names: Vec<&str> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| t.name.as_str())
            .collect();
        if !failed_names.is_empty() {
            out.push_str(&format!("failed: {}\n", failed_names.join(", ")));
        }

        let skipped_names: Vec<&str> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Skipped)
            .map(|t| t.name.as_str())
            .collect();
        if !skipped_names.is_empty() {
            out.push_str(&format!("skipped: {}\n", skipped_names.join(", ")));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, status: TaskStatus) -> TaskReport {
        TaskReport {
            name: name.to_string(),
            status,
            result: None,
            error: None,
            assigned_thread: ThreadId::Unassigned,
        }
    }

    #[test]
    fn counts_partition_the_total() {
        let tasks = vec![
            report("a", TaskStatus::Passed),
            report("b", TaskStatus::Failed),
            report("c", TaskStatus::Skipped),
        ];
        let summary = Summary::build(tasks, Duration::from_secs(1));
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed + summary.failed + summary.skipped, summary.total);
        assert!(summary.any_failed);
    }

    #[test]
    fn text_lists_failed_and_skipped_names() {
        let tasks = vec![
            report("a", TaskStatus::Passed),
            report("b", TaskStatus::Failed),
            report("c", TaskStatus::Skipped),
        ];
        let summary = Summary::build(tasks, Duration::from_millis(5));
        let text = summary.text();
        assert!(text.contains("failed: b"));
        assert!(text.contains("skipped: c"));
    }

    #[test]
    fn empty_run_has_no_failures() {
        let summary = Summary::build(vec![], Duration::from_secs(0));
        assert_eq!(summary.total, 0);
        assert!(!summary.any_failed);
        assert!(!summary.text().contains("failed:"));
    }
}
