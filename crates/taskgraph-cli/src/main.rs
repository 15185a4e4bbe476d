mod cli;
mod fixtures;
mod terminal;

use std::collections::HashMap;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use taskgraph_core::{Scheduler, SchedulerConfig, SharedState};

use crate::cli::{parse_assignments, Assignment, CliArgs};
use crate::terminal::Terminal;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let filter_default = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter_default)),
        )
        .with_target(false)
        .init();

    match run(&args) {
        Ok(any_failed) => {
            if any_failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            let _ = Terminal::new().print_error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> Result<bool> {
    let all_tasks = fixtures::demo_graph();

    if args.graph {
        print_graph(&all_tasks, &args.tags);
        return Ok(false);
    }

    let assignments = parse_assignments(&args.assignments);
    let mut initial_state = HashMap::new();
    let mut preseeded_results = HashMap::new();
    for assignment in assignments {
        match assignment {
            Assignment::State { key, value } => {
                initial_state.insert(key, serde_json::Value::String(value));
            }
            Assignment::Result { task, value } => {
                preseeded_results.insert(task, serde_json::Value::String(value));
            }
        }
    }
    let clear_results_on_start = preseeded_results.is_empty();

    let mut config = SchedulerConfig::from_env()
        .skip_dependents(!args.skip_deps)
        .clear_results_on_start(clear_results_on_start);
    if let Some(workers) = args.workers {
        config = config.workers(workers);
    }
    if args.verbose {
        config.verbose = true;
    }

    let state = SharedState::new(initial_state, preseeded_results)
        .context("invalid initial state or pre-seeded results")?;
    let mut scheduler = Scheduler::new(config.clone(), state);
    fixtures::register_filtered(&mut scheduler, &all_tasks, &args.tags)
        .context("failed to register the demo task graph")?;

    let total = scheduler.graph().len();
    let terminal = Terminal::new();
    terminal.attach(scheduler.hooks_mut(), total);
    let resolved_workers = config
        .resolved_worker_threads(total)
        .context("invalid worker count")?;
    terminal.print_banner(resolved_workers, total)?;

    let state_for_diagnostics = scheduler.state().clone();
    let summary = scheduler.start().context("scheduler run failed")?;
    tracing::debug!(state = ?state_for_diagnostics.snapshot(), "sanitized state at end of run");
    terminal.print_summary(&summary)?;
    info!(failed = summary.failed, skipped = summary.skipped, "run complete");

    Ok(summary.any_failed)
}

fn print_graph(tasks: &[fixtures::FixtureTask], tags: &[String]) {
    println!("digraph taskgraph {{");
    for task in tasks {
        if !tags.is_empty() && !task.tags.iter().any(|t| tags.iter().any(|want| want == t)) {
            continue;
        }
        for dep in &task.after {
            println!("  \"{dep}\" -> \"{}\";", task.name);
        }
        if task.after.is_empty() {
            println!("  \"{}\";", task.name);
        }
    }
    println!("}}");
}
