use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::summary::Summary;
use crate::task::{TaskStatus, ThreadId};

/// An opaque, pre-bound argument captured at hook-registration time and
/// replayed on every firing. Analogous to the source's `*extras` tuple.
pub type Extra = Arc<dyn Any + Send + Sync>;

/// Metadata handed to `on_scheduler_start`.
#[derive(Debug, Clone, Copy)]
pub struct StartMetadata {
    pub total: usize,
    pub workers: usize,
}

type StartFn = dyn Fn(StartMetadata, &[Extra]) + Send + Sync;
type TaskRunFn = dyn Fn(&str, ThreadId, &[Extra]) + Send + Sync;
type TaskDoneFn = dyn Fn(&str, ThreadId, TaskStatus, usize, &[Extra]) + Send + Sync;
type DoneFn = dyn Fn(&Summary, &[Extra]) + Send + Sync;

struct Slot<F: ?Sized> {
    callback: Arc<F>,
    extras: Vec<Extra>,
}

/// Four single-slot lifecycle hooks. Registering a new callback for a slot
/// replaces whatever was registered before. A panicking callback is caught
/// and logged; it never aborts the run.
#[derive(Default)]
pub struct Hooks {
    on_scheduler_start: Option<Slot<StartFn>>,
    on_task_run: Option<Slot<TaskRunFn>>,
    on_task_done: Option<Slot<TaskDoneFn>>,
    on_scheduler_done: Option<Slot<DoneFn>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_scheduler_start<F>(&mut self, extras: Vec<Extra>, f: F)
    where
        F: Fn(StartMetadata, &[Extra]) + Send + Sync + 'static,
    {
        self.on_scheduler_start = Some(Slot { callback: Arc::new(f), extras });
    }

    pub fn set_on_task_run<F>(&mut self, extras: Vec<Extra>, f: F)
    where
        F: Fn(&str, ThreadId, &[Extra]) + Send + Sync + 'static,
    {
        self.on_task_run = Some(Slot { callback: Arc::new(f), extras });
    }

    pub fn set_on_task_done<F>(&mut self, extras: Vec<Extra>, f: F)
    where
        F: Fn(&str, ThreadId, TaskStatus, usize, &[Extra]) + Send + Sync + 'static,
    {
        self.on_task_done = Some(Slot { callback: Arc::new(f), extras });
    }

    pub fn set_on_scheduler_done<F>(&mut self, extras: Vec<Extra>, f: F)
    where
        F: Fn(&Summary, &[Extra]) + Send + Sync + 'static,
    {
        self.on_scheduler_done = Some(Slot { callback: Arc::new(f), extras });
    }

    pub fn fire_scheduler_start(&self, meta: StartMetadata) {
        if let Some(slot) = &self.on_scheduler_start {
            let cb = slot.callback.clone();
            let extras = slot.extras.clone();
            guarded("on_scheduler_start", || cb(meta, &extras));
        }
    }

    pub fn fire_task_run(&self, name: &str, thread: ThreadId) {
        if let Some(slot) = &self.on_task_run {
            let cb = slot.callback.clone();
            let extras = slot.extras.clone();
            guarded("on_task_run", || cb(name, thread, &extras));
        }
    }

    pub fn fire_task_done(&self, name: &str, thread: ThreadId, status: TaskStatus, count: usize) {
        if let Some(slot) = &self.on_task_done {
            let cb = slot.callback.clone();
            let extras = slot.extras.clone();
            guarded("on_task_done", || cb(name, thread, status, count, &extras));
        }
    }

    pub fn fire_scheduler_done(&self, summary: &Summary) {
        if let Some(slot) = &self.on_scheduler_done {
            let cb = slot.callback.clone();
            let extras = slot.extras.clone();
            guarded("on_scheduler_done", || cb(summary, &extras));
        }
    }
}

fn guarded<F: FnOnce()>(hook_name: &str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(hook = hook_name, "hook callback panicked; run continues");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn replacing_a_slot_drops_the_previous_callback() {
        let mut hooks = Hooks::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f1 = first.clone();
        hooks.set_on_task_run(vec![], move |_, _, _| {
            f1.fetch_add(1, Ordering::SeqCst);
        });
        let f2 = second.clone();
        hooks.set_on_task_run(vec![], move |_, _, _| {
            f2.fetch_add(1, Ordering::SeqCst);
        });

        hooks.fire_task_run("a", ThreadId::Worker(0));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_panicking_hook_does_not_propagate() {
        let mut hooks = Hooks::new();
        hooks.set_on_task_run(vec![], |_, _, _| panic!("boom"));
        hooks.fire_task_run("a", ThreadId::Worker(0));
    }

    #[test]
    fn extras_are_replayed_on_every_firing() {
        let mut hooks = Hooks::new();
        let seen: Extra = Arc::new(42usize);
        let total: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let total_clone = total.clone();
        hooks.set_on_task_done(vec![seen], move |_, _, _, _, extras| {
            let v = extras[0].downcast_ref::<usize>().copied().unwrap_or(0);
            total_clone.fetch_add(v, Ordering::SeqCst);
        });
        hooks.fire_task_done("a", ThreadId::Worker(0), TaskStatus::Passed, 1);
        hooks.fire_task_done("b", ThreadId::Worker(1), TaskStatus::Passed, 2);
        assert_eq!(total.load(Ordering::SeqCst), 84);
    }

    #[test]
    fn unset_slots_fire_nothing() {
        let hooks = Hooks::new();
        hooks.fire_scheduler_start(StartMetadata { total: 0, workers: 1 });
        hooks.fire_task_run("a", ThreadId::Unassigned);
    }
}
