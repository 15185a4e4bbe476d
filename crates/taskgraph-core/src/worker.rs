use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::hooks::Hooks;
use crate::state::SharedState;
use crate::task::{TaskDef, TaskRun, TaskStatus, ThreadId};

/// One item on the ready queue: a task name to run, or the shutdown sentinel.
pub enum WorkItem {
    Task(String),
    Shutdown,
}

/// What a worker reports back to the scheduler's bookkeeping loop after
/// running one task. Hooks and counting have already happened by the time
/// this is sent; the scheduler only needs it to update `remaining` counts
/// and decide what to dispatch next.
pub struct Completion {
    pub name: String,
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
}

/// N long-lived threads pulling from a shared `crossbeam_channel` ready
/// queue. Each worker runs a task to completion, marks it `RUNNING` and
/// fires the per-task hooks itself (the source of the `on_task_run`/
/// `on_task_done` happens-before guarantees), then posts a `Completion`
/// back to the scheduler's bookkeeping thread for downstream dispatch.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        count: usize,
        ready_rx: Receiver<WorkItem>,
        done_tx: Sender<Completion>,
        tasks: Arc<HashMap<String, TaskDef>>,
        runs: Arc<Mutex<HashMap<String, TaskRun>>>,
        terminal_counter: Arc<AtomicUsize>,
        state: SharedState,
        hooks: Arc<Hooks>,
    ) -> Self {
        let mut handles = Vec::with_capacity(count);
        for i in 0..count {
            let ready_rx = ready_rx.clone();
            let done_tx = done_tx.clone();
            let tasks = tasks.clone();
            let runs = runs.clone();
            let terminal_counter = terminal_counter.clone();
            let state = state.clone();
            let hooks = hooks.clone();
            let thread = ThreadId::Worker(i);

            let handle = std::thread::Builder::new()
                .name(thread.to_string())
                .spawn(move || {
                    worker_loop(thread, ready_rx, done_tx, tasks, runs, terminal_counter, state, hooks)
                })
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }
        Self { handles }
    }

    /// Block until every worker has exited, which happens once it consumes
    /// its shutdown sentinel.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    thread: ThreadId,
    ready_rx: Receiver<WorkItem>,
    done_tx: Sender<Completion>,
    tasks: Arc<HashMap<String, TaskDef>>,
    runs: Arc<Mutex<HashMap<String, TaskRun>>>,
    terminal_counter: Arc<AtomicUsize>,
    state: SharedState,
    hooks: Arc<Hooks>,
) {
    loop {
        let item = match ready_rx.recv() {
            Ok(item) => item,
            Err(_) => break,
        };

        let name = match item {
            WorkItem::Shutdown => break,
            WorkItem::Task(name) => name,
        };

        {
            let mut guard = runs.lock().unwrap_or_else(|e| e.into_inner());
            let run = guard.get_mut(&name).expect("dispatched task must be registered");
            run.status = TaskStatus::Running;
            run.assigned_thread = thread;
        }

        let task = &tasks[&name];
        hooks.fire_task_run(&name, thread);
        tracing::debug!(task = %name, %thread, "task started");

        let outcome = catch_unwind(AssertUnwindSafe(|| task.body.invoke(&state)));

        let (status, result, error) = match outcome {
            Ok(Ok(value)) => (TaskStatus::Passed, Some(value), None),
            Ok(Err(message)) => (TaskStatus::Failed, None, Some(message)),
            Err(panic) => (TaskStatus::Failed, None, Some(panic_message(panic))),
        };

        tracing::debug!(task = %name, %thread, %status, "task finished");

        {
            let mut guard = runs.lock().unwrap_or_else(|e| e.into_inner());
            let run = guard.get_mut(&name).expect("dispatched task must be registered");
            run.status = status;
            run.result = result.clone();
            run.error = error;
        }

        let count = terminal_counter.fetch_add(1, Ordering::SeqCst) + 1;
        hooks.fire_task_done(&name, thread, status, count);

        if done_tx.send(Completion { name, status, result }).is_err() {
            break;
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}
