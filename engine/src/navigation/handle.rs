//! Session handles and the session registry

use super::cancel::CancelSignal;
use super::session::{NavigationReport, StateSnapshot};
use anyhow::{Context, Result};
use carnav_sdk::errors::EngineError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Handle to a spawned navigation session
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    cancel: CancelSignal,
    status: watch::Receiver<StateSnapshot>,
    join: JoinHandle<NavigationReport>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: Uuid,
        cancel: CancelSignal,
        status: watch::Receiver<StateSnapshot>,
        join: JoinHandle<NavigationReport>,
    ) -> Self {
        Self {
            id,
            cancel,
            status,
            join,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation; takes effect at the next step boundary or
    /// immediately if a capability call is in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Latest published snapshot
    pub fn status(&self) -> StateSnapshot {
        self.status.borrow().clone()
    }

    /// Wait for the next snapshot
    ///
    /// Returns `None` once the session has finished publishing.
    pub async fn changed(&mut self) -> Option<StateSnapshot> {
        self.status.changed().await.ok()?;
        Some(self.status.borrow_and_update().clone())
    }

    /// Wait for the session to terminate
    pub async fn wait(self) -> Result<NavigationReport> {
        self.join
            .await
            .with_context(|| format!("Navigation session {} did not finish", self.id))
    }
}

#[derive(Debug)]
struct Entry {
    cancel: CancelSignal,
    status: watch::Receiver<StateSnapshot>,
}

/// Lookup of running and finished sessions by id
///
/// Every session started by a navigator is registered here so a caller
/// holding only the id can query or cancel it.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, Entry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        // A panic while holding the lock leaves the map itself intact
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn register(
        &self,
        id: Uuid,
        cancel: CancelSignal,
        status: watch::Receiver<StateSnapshot>,
    ) {
        self.entries().insert(id, Entry { cancel, status });
    }

    /// Latest snapshot of session `id`
    pub fn status(&self, id: Uuid) -> Result<StateSnapshot, EngineError> {
        self.entries()
            .get(&id)
            .map(|entry| entry.status.borrow().clone())
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    /// Cancel session `id`
    pub fn cancel(&self, id: Uuid) -> Result<(), EngineError> {
        let entries = self.entries();
        let entry = entries
            .get(&id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;
        entry.cancel.cancel();
        Ok(())
    }

    /// Cancel every registered session
    pub fn cancel_all(&self) {
        for entry in self.entries().values() {
            entry.cancel.cancel();
        }
    }

    /// Snapshots of all registered sessions
    pub fn list(&self) -> Vec<StateSnapshot> {
        self.entries()
            .values()
            .map(|entry| entry.status.borrow().clone())
            .collect()
    }

    /// Forget terminated sessions; returns how many were removed
    pub fn prune_terminated(&self) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.status.borrow().is_terminated());
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::session::NavState;

    fn snapshot(id: Uuid, state: NavState) -> StateSnapshot {
        StateSnapshot {
            session_id: id,
            state,
            iteration: 0,
            max_iterations: 3,
            last_action: None,
            last_explanation: None,
            termination: None,
        }
    }

    #[test]
    fn test_unknown_session() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();

        assert!(matches!(
            registry.status(id),
            Err(EngineError::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.cancel(id),
            Err(EngineError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_cancel_by_id() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let cancel = CancelSignal::new();
        let (_tx, rx) = watch::channel(snapshot(id, NavState::Sensing));

        registry.register(id, cancel.clone(), rx);
        registry.cancel(id).unwrap();

        assert!(cancel.is_cancelled());
        assert_eq!(registry.status(id).unwrap().state, NavState::Sensing);
    }

    #[test]
    fn test_prune_terminated() {
        let registry = SessionRegistry::new();
        let running = Uuid::new_v4();
        let finished = Uuid::new_v4();
        let (_tx1, rx1) = watch::channel(snapshot(running, NavState::Acting));
        let (_tx2, rx2) = watch::channel(snapshot(finished, NavState::Terminated));

        registry.register(running, CancelSignal::new(), rx1);
        registry.register(finished, CancelSignal::new(), rx2);

        assert_eq!(registry.prune_terminated(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.status(running).is_ok());
    }
}
