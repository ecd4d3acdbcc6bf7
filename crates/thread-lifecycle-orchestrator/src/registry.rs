//! Supervisor registry.
//!
//! An explicit registry object keyed by thread ID, replacing what
//! would otherwise be hidden module-level mutable state. The
//! at-most-one-running invariant is enforced here: a slot must be
//! reserved before any process is spawned, and reservation fails while
//! a slot exists.

use agent_process_manager::RequestWriter;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tiller_domain::{EngineError, EngineResult, SessionId, ThreadId};
use tokio::sync::{broadcast, watch};

/// A live supervisor's control surface.
pub(crate) struct RunningThread {
    /// Signals the event stream to terminate the process.
    pub stop_tx: broadcast::Sender<()>,
    /// Set before the stop signal so the pump can tell an explicit
    /// stop from a natural exit.
    pub stop_requested: Arc<AtomicBool>,
    /// Writer for follow-up request frames.
    pub writer: Arc<tokio::sync::Mutex<RequestWriter>>,
    /// The session this supervisor replays into.
    pub session_id: SessionId,
    /// Flips to true when the pump has fully torn down.
    pub done_rx: watch::Receiver<bool>,
    pub pid: Option<u32>,
}

enum Slot {
    /// Reserved by a start in progress; no process exists yet.
    Reserved,
    Running(RunningThread),
}

/// Registry of thread supervisors, one slot per running thread.
#[derive(Clone, Default)]
pub struct SupervisorRegistry {
    slots: Arc<Mutex<HashMap<ThreadId, Slot>>>,
}

impl SupervisorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the thread's slot.
    ///
    /// This is the mutual-exclusion token: concurrent starts race on
    /// this insertion, and exactly one wins.
    pub(crate) fn reserve(&self, thread_id: &ThreadId) -> EngineResult<()> {
        let mut slots = self.slots.lock().unwrap();
        if slots.contains_key(thread_id) {
            return Err(EngineError::AlreadyRunning(thread_id.clone()));
        }
        slots.insert(thread_id.clone(), Slot::Reserved);
        Ok(())
    }

    /// Fill a reserved slot with the live supervisor handles.
    pub(crate) fn activate(&self, thread_id: &ThreadId, running: RunningThread) {
        let mut slots = self.slots.lock().unwrap();
        slots.insert(thread_id.clone(), Slot::Running(running));
    }

    /// Release a slot (failed start or pump teardown). Idempotent.
    pub(crate) fn release(&self, thread_id: &ThreadId) {
        let mut slots = self.slots.lock().unwrap();
        slots.remove(thread_id);
    }

    /// Whether the thread has a live (or starting) supervisor.
    pub fn is_running(&self, thread_id: &ThreadId) -> bool {
        self.slots.lock().unwrap().contains_key(thread_id)
    }

    /// Handles needed to stop the thread, if running.
    pub(crate) fn stop_handles(
        &self,
        thread_id: &ThreadId,
    ) -> Option<(broadcast::Sender<()>, Arc<AtomicBool>, watch::Receiver<bool>)> {
        let slots = self.slots.lock().unwrap();
        match slots.get(thread_id) {
            Some(Slot::Running(running)) => Some((
                running.stop_tx.clone(),
                running.stop_requested.clone(),
                running.done_rx.clone(),
            )),
            _ => None,
        }
    }

    /// The request writer and bound session, if running.
    pub(crate) fn writer(
        &self,
        thread_id: &ThreadId,
    ) -> Option<(Arc<tokio::sync::Mutex<RequestWriter>>, SessionId)> {
        let slots = self.slots.lock().unwrap();
        match slots.get(thread_id) {
            Some(Slot::Running(running)) => {
                Some((running.writer.clone(), running.session_id.clone()))
            }
            _ => None,
        }
    }

    /// Thread IDs with live supervisors (diagnostics, shutdown).
    pub fn running_threads(&self) -> Vec<ThreadId> {
        self.slots.lock().unwrap().keys().cloned().collect()
    }

    /// Number of live slots.
    pub fn count(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_is_exclusive() {
        let registry = SupervisorRegistry::new();
        let thread = ThreadId::new();

        registry.reserve(&thread).unwrap();
        let err = registry.reserve(&thread).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyRunning(_)));

        registry.release(&thread);
        registry.reserve(&thread).unwrap();
    }

    #[test]
    fn release_is_idempotent() {
        let registry = SupervisorRegistry::new();
        let thread = ThreadId::new();

        registry.reserve(&thread).unwrap();
        registry.release(&thread);
        registry.release(&thread);
        assert!(!registry.is_running(&thread));
    }

    #[test]
    fn concurrent_reserve_admits_exactly_one() {
        let registry = SupervisorRegistry::new();
        let thread = ThreadId::new();

        let winners: usize = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let thread = thread.clone();
                std::thread::spawn(move || registry.reserve(&thread).is_ok())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(winners, 1);
    }

    #[test]
    fn stop_handles_absent_for_reserved_slot() {
        let registry = SupervisorRegistry::new();
        let thread = ThreadId::new();
        registry.reserve(&thread).unwrap();

        assert!(registry.stop_handles(&thread).is_none());
        assert!(registry.writer(&thread).is_none());
        assert!(registry.is_running(&thread));
    }
}
