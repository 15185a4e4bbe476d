use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ConfigError;

/// Shared, process-wide mapping handed to every `with_state` task body.
///
/// Mirrors the source's convention of publishing a single mutex handle to
/// task code: cloning `SharedState` clones the `Arc`, so every clone guards
/// the *same* underlying map. Task bodies are expected to call [`lock`] to
/// perform their own non-atomic read-modify-write sequences; the scheduler
/// itself only takes the lock to write `results` and to produce the
/// sanitized snapshot.
///
/// Reserved-key handling: the source models reserved entries (`_state_lock`,
/// `results`) as ordinary dict keys with an underscore-prefix convention. A
/// literal port would require a lock handle that is both a map value and the
/// map's own guard, which is a real `Arc` reference cycle, not just an
/// inconvenience. We keep the external contract — sanitized snapshots omit
/// internals and expose `results` — and drop the self-referential data
/// layout: `results` gets its own field, and the "`_state_lock`" handle *is*
/// this struct, passed to tasks directly instead of round-tripped through
/// the map.
///
/// [`lock`]: SharedState::lock
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<Mutex<StateInner>>,
}

#[derive(Debug, Default)]
pub struct StateInner {
    pub values: HashMap<String, serde_json::Value>,
    pub results: HashMap<String, serde_json::Value>,
}

/// True for any key the scheduler reserves: the underscore-prefix convention
/// plus the bare `results` name, which has its own dedicated storage.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with('_') || key == "results"
}

impl SharedState {
    /// Build shared state from caller-supplied initial values and an
    /// optional pre-seeded `results` map. Rejects reserved keys in `initial`
    /// per the Shared State invariants.
    pub fn new(
        initial: HashMap<String, serde_json::Value>,
        preseeded_results: HashMap<String, serde_json::Value>,
    ) -> Result<Self, ConfigError> {
        for key in initial.keys() {
            if key == "results" {
                return Err(ConfigError::ReservedResultsKey);
            }
            if key.starts_with('_') {
                return Err(ConfigError::ReservedKey(key.clone()));
            }
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(StateInner {
                values: initial,
                results: preseeded_results,
            })),
        })
    }

    /// Acquire the advisory lock. Task bodies use this to perform compound
    /// operations (increment-then-read, append-then-check, ...) atomically;
    /// the scheduler uses it only for `results` writes and snapshotting.
    pub fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read a single user key, or the full `results` map if `key == "results"`.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let guard = self.lock();
        if key == "results" {
            Some(serde_json::to_value(&guard.results).unwrap_or(serde_json::Value::Null))
        } else {
            guard.values.get(key).cloned()
        }
    }

    /// Write a single user key. Reserved keys are rejected — user task
    /// bodies may not shadow scheduler-owned state.
    pub fn set(&self, key: &str, value: serde_json::Value) -> Result<(), ConfigError> {
        if key == "results" {
            return Err(ConfigError::ReservedResultsKey);
        }
        if key.starts_with('_') {
            return Err(ConfigError::ReservedKey(key.to_string()));
        }
        self.lock().values.insert(key.to_string(), value);
        Ok(())
    }

    /// Clear `results` at run start, unless the caller opted out via
    /// `clear_results_on_start = false`.
    pub fn prepare_for_run(&self, clear_results: bool) {
        if clear_results {
            self.lock().results.clear();
        }
    }

    /// Scheduler-internal: record a task's return value under `_state_lock`.
    pub fn record_result(&self, name: &str, value: serde_json::Value) {
        self.lock().results.insert(name.to_string(), value);
    }

    /// Deep copy of the mapping with reserved keys excluded, and `results`
    /// folded in under its own key. Safe to call at any time.
    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        let guard = self.lock();
        let mut out: HashMap<String, serde_json::Value> = guard
            .values
            .iter()
            .filter(|(k, _)| !is_reserved_key(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        out.insert(
            "results".to_string(),
            serde_json::to_value(&guard.results).unwrap_or(serde_json::Value::Null),
        );
        out
    }
}
