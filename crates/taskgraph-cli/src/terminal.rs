use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};

use taskgraph_core::{Hooks, Summary, TaskStatus};

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const RUNNING: Color = Color::Cyan;
    const PASSED: Color = Color::Green;
    const FAILED: Color = Color::Red;
    const SKIPPED: Color = Color::DarkYellow;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Passed => Colors::PASSED,
        TaskStatus::Failed => Colors::FAILED,
        TaskStatus::Skipped => Colors::SKIPPED,
        TaskStatus::Running | TaskStatus::Pending => Colors::RUNNING,
    }
}

/// Manages terminal output for a scheduler run. Registers purely through
/// the public hook API — it has no scheduling privilege and could equally
/// be swapped for a TUI or a no-op.
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    /// Print the startup banner.
    pub fn print_banner(&self, workers: usize, total: usize) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("taskgraph"),
            ResetColor,
            Print(format!(" - running {} task(s) across {} worker(s)\n", total, workers)),
            SetForegroundColor(Colors::DIM),
            Print("---\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Wire `on_task_run` / `on_task_done` onto `hooks` so every dispatch and
    /// completion prints a progress line. `total` is captured for the
    /// `(n/total)` suffix.
    pub fn attach(&self, hooks: &mut Hooks, total: usize) {
        hooks.set_on_task_run(vec![], |name, thread, _extras| {
            let mut stdout = io::stdout();
            let _ = execute!(
                stdout,
                SetForegroundColor(Colors::RUNNING),
                Print(format!("[{thread}] {name} -> RUNNING\n")),
                ResetColor,
            );
            let _ = stdout.flush();
        });

        hooks.set_on_task_done(vec![], move |name, thread, status, count, _extras| {
            let mut stdout = io::stdout();
            let _ = execute!(
                stdout,
                SetForegroundColor(status_color(status)),
                Print(format!("[{thread}] {name} -> {status} ({count}/{total})\n")),
                ResetColor,
            );
            let _ = stdout.flush();
        });
    }

    /// Print the final summary text.
    pub fn print_summary(&self, summary: &Summary) -> Result<()> {
        let mut stdout = io::stdout();
        let color = if summary.any_failed { Colors::FAILED } else { Colors::PASSED };
        execute!(
            stdout,
            Print("---\n"),
            SetForegroundColor(color),
            Print(summary.text()),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::FAILED),
            Print(format!("error: {}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }
}

impl Default for Terminal {
    fn default() -> Self {
        Self::new()
    }
}
