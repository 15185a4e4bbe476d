use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::config::SchedulerConfig;
use crate::error::StartError;
use crate::graph::Graph;
use crate::hooks::{Hooks, StartMetadata};
use crate::state::SharedState;
use crate::summary::{Summary, TaskReport};
use crate::task::{TaskBody, TaskDef, TaskRun, TaskStatus, ThreadId};
use crate::worker::{Completion, WorkItem, WorkerPool};

/// Orchestrates one run: registration, validation, dispatch, skip
/// propagation, and summary assembly. Single-use — `start()` consumes it.
pub struct Scheduler {
    graph: Graph,
    config: SchedulerConfig,
    state: SharedState,
    hooks: Hooks,
    started: bool,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, state: SharedState) -> Self {
        Self { graph: Graph::new(), config, state, hooks: Hooks::new(), started: false }
    }

    pub fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Register a task. Fails with `AlreadyStarted` if called after `start()`
    /// was invoked (impossible by construction once `start` consumes
    /// `self`, but kept for a future multi-phase registration API).
    pub fn register(
        &mut self,
        name: &str,
        body: TaskBody,
        after: Vec<String>,
        tags: Vec<String>,
    ) -> Result<(), StartError> {
        if self.started {
            return Err(StartError::AlreadyStarted);
        }
        self.graph.add_node(name, body, after, tags)?;
        Ok(())
    }

    /// Run every registered task to completion and return the summary.
    pub fn start(mut self) -> Result<Summary, StartError> {
        if self.started {
            return Err(StartError::AlreadyStarted);
        }
        self.started = true;
        self.graph.validate()?;

        let total = self.graph.len();
        let workers = self.config.resolved_worker_threads(total)?;
        tracing::info!(total, workers, "scheduler starting");

        self.state.prepare_for_run(self.config.clear_results_on_start);
        self.hooks.fire_scheduler_start(StartMetadata { total, workers });

        let start_instant = Instant::now();

        let runs: Arc<Mutex<HashMap<String, TaskRun>>> = Arc::new(Mutex::new(
            self.graph.nodes().iter().map(|n| (n.clone(), TaskRun::default())).collect(),
        ));
        let mut remaining: HashMap<String, usize> = self
            .graph
            .dependency_counts()
            .into_iter()
            .map(|(n, deps)| (n, deps.len()))
            .collect();
        let terminal_counter = Arc::new(AtomicUsize::new(0));
        let tasks: Arc<HashMap<String, TaskDef>> = Arc::new(
            self.graph
                .nodes()
                .iter()
                .map(|n| (n.clone(), self.graph.task(n).unwrap().clone()))
                .collect(),
        );

        let (ready_tx, ready_rx) = crossbeam_channel::unbounded::<WorkItem>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<Completion>();

        let hooks = Arc::new(self.hooks);

        let pool = if total == 0 {
            None
        } else {
            Some(WorkerPool::spawn(
                workers,
                ready_rx,
                done_tx,
                tasks,
                runs.clone(),
                terminal_counter.clone(),
                self.state.clone(),
                hooks.clone(),
            ))
        };

        let mut in_flight: usize = 0;
        for name in self.graph.initial_ready() {
            in_flight += 1;
            let _ = ready_tx.send(WorkItem::Task(name));
        }

        if total == 0 {
            // nothing to drain; fall through to summary assembly below
        } else if in_flight == 0 {
            // No roots at all is impossible once validate() has passed and
            // total > 0 (validate guarantees acyclicity, so at least one
            // node has no predecessors), but stay defensive.
            tracing::warn!("graph has tasks but no ready roots");
        } else {
            while in_flight > 0 {
                let completion = match done_rx.recv() {
                    Ok(c) => c,
                    Err(_) => break,
                };
                in_flight -= 1;

                if completion.status == TaskStatus::Passed {
                    if let Some(value) = &completion.result {
                        self.state.record_result(&completion.name, value.clone());
                    }
                    for downstream in self.graph.downstream(&completion.name).clone() {
                        if let Some(count) = remaining.get_mut(&downstream) {
                            *count = count.saturating_sub(1);
                            let ready = *count == 0
                                && is_pending(&runs, &downstream);
                            if ready {
                                in_flight += 1;
                                let _ = ready_tx.send(WorkItem::Task(downstream));
                            }
                        }
                    }
                } else {
                    cascade_skip(
                        &completion.name,
                        &self.graph,
                        &runs,
                        &terminal_counter,
                        &hooks,
                        self.config.skip_dependents,
                    );
                }
            }
        }

        // Drain: any task that never reached a terminal state (unreachable
        // grandchildren under `skip_dependents = false`) is canonicalized
        // to SKIPPED before the summary is built.
        canonicalize_unreached(&self.graph, &runs, &terminal_counter, &hooks);

        if let Some(pool) = pool {
            for _ in 0..workers {
                let _ = ready_tx.send(WorkItem::Shutdown);
            }
            drop(ready_tx);
            pool.join();
        }

        let duration = start_instant.elapsed();
        let reports = build_reports(&self.graph, &runs);
        let summary = Summary::build(reports, duration);

        hooks.fire_scheduler_done(&summary);
        tracing::info!(
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "scheduler finished"
        );

        Ok(summary)
    }
}

fn is_pending(runs: &Mutex<HashMap<String, TaskRun>>, name: &str) -> bool {
    let guard = lock(runs);
    guard.get(name).map(|r| r.status == TaskStatus::Pending).unwrap_or(false)
}

fn lock(runs: &Mutex<HashMap<String, TaskRun>>) -> MutexGuard<'_, HashMap<String, TaskRun>> {
    runs.lock().unwrap_or_else(|e| e.into_inner())
}

/// Mark `name`'s immediate downstream tasks `SKIPPED`, recursing further
/// only when `skip_dependents` is true. Each marked task fires
/// `on_task_done` with the `Unassigned` thread sentinel and the next
/// terminal count.
fn cascade_skip(
    name: &str,
    graph: &Graph,
    runs: &Mutex<HashMap<String, TaskRun>>,
    terminal_counter: &AtomicUsize,
    hooks: &Hooks,
    skip_dependents: bool,
) {
    let downstream: Vec<String> = graph.downstream(name).iter().cloned().collect();
    for child in downstream {
        let newly_skipped = {
            let mut guard = lock(runs);
            match guard.get_mut(&child) {
                Some(run) if run.status == TaskStatus::Pending => {
                    run.status = TaskStatus::Skipped;
                    run.assigned_thread = ThreadId::Unassigned;
                    true
                }
                _ => false,
            }
        };

        if newly_skipped {
            let count = terminal_counter.fetch_add(1, Ordering::SeqCst) + 1;
            hooks.fire_task_done(&child, ThreadId::Unassigned, TaskStatus::Skipped, count);
            tracing::debug!(task = %child, via = %name, "task skipped");
            if skip_dependents {
                cascade_skip(&child, graph, runs, terminal_counter, hooks, skip_dependents);
            }
        }
    }
}

fn canonicalize_unreached(
    graph: &Graph,
    runs: &Mutex<HashMap<String, TaskRun>>,
    terminal_counter: &AtomicUsize,
    hooks: &Hooks,
) {
    for name in graph.nodes() {
        let newly_skipped = {
            let mut guard = lock(runs);
            match guard.get_mut(name) {
                Some(run) if run.status == TaskStatus::Pending => {
                    run.status = TaskStatus::Skipped;
                    run.assigned_thread = ThreadId::Unassigned;
                    true
                }
                _ => false,
            }
        };
        if newly_skipped {
            let count = terminal_counter.fetch_add(1, Ordering::SeqCst) + 1;
            hooks.fire_task_done(name, ThreadId::Unassigned, TaskStatus::Skipped, count);
            tracing::debug!(task = %name, "task skipped at drain (unreached)");
        }
    }
}

fn build_reports(graph: &Graph, runs: &Mutex<HashMap<String, TaskRun>>) -> Vec<TaskReport> {
    let guard = lock(runs);
    graph
        .nodes()
        .iter()
        .map(|name| {
            let run = &guard[name];
            TaskReport {
                name: name.clone(),
                status: run.status,
                result: run.result.clone(),
                error: run.error.clone(),
                assigned_thread: run.assigned_thread,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn plain(f: impl Fn() -> crate::task::TaskOutcome + Send + Sync + 'static) -> TaskBody {
        TaskBody::Plain(Arc::new(f))
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(
            SchedulerConfig::default(),
            SharedState::new(HashMap::new(), HashMap::new()).unwrap(),
        )
    }

    #[test]
    fn empty_graph_produces_empty_summary() {
        let summary = scheduler().start().unwrap();
        assert_eq!(summary.total, 0);
        assert!(!summary.any_failed);
    }

    #[test]
    fn linear_chain_all_pass_in_order() {
        let mut sched = scheduler();
        sched.register("x", plain(|| Ok(json!("x"))), vec![], vec![]).unwrap();
        sched
            .register(
                "y",
                TaskBody::WithState(Arc::new(|state: &SharedState| {
                    let x = state.get("results").unwrap()["x"].clone();
                    Ok(json!(format!("y.{}", x.as_str().unwrap())))
                })),
                vec!["x".to_string()],
                vec![],
            )
            .unwrap();
        sched
            .register(
                "z",
                TaskBody::WithState(Arc::new(|state: &SharedState| {
                    let y = state.get("results").unwrap()["y"].clone();
                    Ok(json!(format!("z.{}", y.as_str().unwrap())))
                })),
                vec!["y".to_string()],
                vec![],
            )
            .unwrap();

        let summary = sched.start().unwrap();
        assert_eq!(summary.passed, 3);
        assert_eq!(summary.failed, 0);
        let z = summary.tasks.iter().find(|t| t.name == "z").unwrap();
        assert_eq!(z.result, Some(json!("z.y.x")));
    }

    #[test]
    fn diamond_with_failing_branch_skips_the_join() {
        let mut sched = scheduler();
        sched.register("a", plain(|| Ok(json!("a"))), vec![], vec![]).unwrap();
        sched.register("b", plain(|| Ok(json!("b"))), vec!["a".to_string()], vec![]).unwrap();
        sched.register("c", plain(|| Ok(json!("c"))), vec!["a".to_string()], vec![]).unwrap();
        sched
            .register("d", plain(|| Err("boom".to_string())), vec!["c".to_string()], vec![])
            .unwrap();
        sched.register("e", plain(|| Ok(json!("e"))), vec!["c".to_string()], vec![]).unwrap();
        sched
            .register("f", plain(|| Ok(json!("f"))), vec!["b".to_string(), "d".to_string()], vec![])
            .unwrap();

        let summary = sched.start().unwrap();
        assert!(summary.any_failed);
        let status_of = |n: &str| summary.tasks.iter().find(|t| t.name == n).unwrap().status;
        assert_eq!(status_of("a"), TaskStatus::Passed);
        assert_eq!(status_of("b"), TaskStatus::Passed);
        assert_eq!(status_of("c"), TaskStatus::Passed);
        assert_eq!(status_of("d"), TaskStatus::Failed);
        assert_eq!(status_of("e"), TaskStatus::Passed);
        assert_eq!(status_of("f"), TaskStatus::Skipped);
    }

    #[test]
    fn skip_dependents_false_still_reports_grandchildren_skipped_via_drain() {
        let mut config = SchedulerConfig::default();
        config.skip_dependents = false;
        let mut sched = Scheduler::new(config, SharedState::new(HashMap::new(), HashMap::new()).unwrap());
        sched.register("a", plain(|| Err("fail".to_string())), vec![], vec![]).unwrap();
        sched.register("b", plain(|| Ok(json!("b"))), vec!["a".to_string()], vec![]).unwrap();
        sched.register("c", plain(|| Ok(json!("c"))), vec!["b".to_string()], vec![]).unwrap();

        let summary = sched.start().unwrap();
        let status_of = |n: &str| summary.tasks.iter().find(|t| t.name == n).unwrap().status;
        assert_eq!(status_of("a"), TaskStatus::Failed);
        assert_eq!(status_of("b"), TaskStatus::Skipped);
        assert_eq!(status_of("c"), TaskStatus::Skipped);
    }

    #[test]
    fn cycle_is_rejected_before_any_task_runs() {
        let mut sched = scheduler();
        sched.register("p", plain(|| Ok(json!(()))), vec!["q".to_string()], vec![]).unwrap();
        sched.register("q", plain(|| Ok(json!(()))), vec!["p".to_string()], vec![]).unwrap();
        let err = sched.start().unwrap_err();
        assert!(matches!(err, StartError::Graph(crate::error::GraphError::CycleDetected(_))));
    }

    #[test]
    fn fan_in_runs_dependent_exactly_once() {
        let calls = Arc::new(StdMutex::new(0usize));
        let calls_clone = calls.clone();
        let mut sched = scheduler();
        sched.register("a", plain(|| Ok(json!("a"))), vec![], vec![]).unwrap();
        sched.register("b", plain(|| Ok(json!("b"))), vec![], vec![]).unwrap();
        sched.register("c", plain(|| Ok(json!("c"))), vec![], vec![]).unwrap();
        sched
            .register(
                "join",
                plain(move || {
                    *calls_clone.lock().unwrap() += 1;
                    Ok(json!("joined"))
                }),
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
                vec![],
            )
            .unwrap();

        let summary = sched.start().unwrap();
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(summary.passed, 4);
    }

    #[test]
    fn result_preseeding_is_visible_and_overwritten_on_completion() {
        let mut results = HashMap::new();
        results.insert("x".to_string(), json!("preset"));
        let state = SharedState::new(HashMap::new(), results).unwrap();
        let mut config = SchedulerConfig::default();
        config.clear_results_on_start = false;
        let mut sched = Scheduler::new(config, state);

        sched.register("x", plain(|| Ok(json!("x.fresh"))), vec![], vec![]).unwrap();

        let summary = sched.start().unwrap();
        let x = summary.tasks.iter().find(|t| t.name == "x").unwrap();
        assert_eq!(x.result, Some(json!("x.fresh")));
    }
}
