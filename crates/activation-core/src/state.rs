//! Activation registry - per-extension activation state.
//!
//! Every extension id moves through
//! `NotStarted -> Activating -> {Activated, Failed}`. Both terminal states are
//! kept in the same `activated` table (a failed extension is "done" too, and is
//! never retried); `activating` holds the shared in-flight handle so that
//! concurrent requests for one id collapse into a single activation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use serde::Serialize;

use crate::error::FailureReason;
use crate::ExtensionId;

/// In-flight activation, cloneable by every requester of the same id.
pub type SharedActivation = Shared<BoxFuture<'static, ActivationOutcome>>;

/// Terminal result of activating one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActivationOutcome {
    Activated,
    Failed { reason: FailureReason },
}

impl ActivationOutcome {
    pub fn failed(reason: FailureReason) -> Self {
        Self::Failed { reason }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Where an extension is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    NotStarted,
    Activating,
    Activated,
    Failed,
}

/// What caused an activation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "event", rename_all = "snake_case")]
pub enum ActivationReason {
    /// Startup event fired by the host once registration completed
    Startup(String),
    /// An activation event such as `onCommand:...`
    Event(String),
    /// Explicit activation by extension id
    ById,
}

/// Terminal record for one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivatedExtension {
    pub id: ExtensionId,
    pub activation_failed: bool,
    pub failure: Option<FailureReason>,
    pub reason: ActivationReason,
    /// Time spent in the activation hook; `None` when no hook ran
    pub elapsed: Option<Duration>,
}

impl ActivatedExtension {
    pub(crate) fn new(
        id: &str,
        outcome: &ActivationOutcome,
        reason: ActivationReason,
        elapsed: Option<Duration>,
    ) -> Self {
        let failure = match outcome {
            ActivationOutcome::Activated => None,
            ActivationOutcome::Failed { reason } => Some(reason.clone()),
        };
        Self {
            id: id.to_string(),
            activation_failed: failure.is_some(),
            failure,
            reason,
            elapsed,
        }
    }

    pub fn outcome(&self) -> ActivationOutcome {
        match &self.failure {
            None => ActivationOutcome::Activated,
            Some(reason) => ActivationOutcome::failed(reason.clone()),
        }
    }
}

/// Result of asking the registry to start an activation.
pub(crate) enum Begin {
    /// Already terminal; nothing to do
    Done(ActivationOutcome),
    /// In flight (possibly just started by this call); await to observe the outcome
    Join(SharedActivation),
}

#[derive(Default)]
struct Tables {
    activated: HashMap<ExtensionId, ActivatedExtension>,
    activating: HashMap<ExtensionId, SharedActivation>,
}

/// Process-wide activation state, owned by whoever composes the activator.
#[derive(Default)]
pub struct ActivationRegistry {
    tables: Mutex<Tables>,
}

impl std::fmt::Debug for ActivationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.lock();
        f.debug_struct("ActivationRegistry")
            .field("activated", &tables.activated.len())
            .field("activating", &tables.activating.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ActivationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self, id: &str) -> ActivationState {
        let tables = self.lock();
        match tables.activated.get(id) {
            Some(record) if record.activation_failed => ActivationState::Failed,
            Some(_) => ActivationState::Activated,
            None if tables.activating.contains_key(id) => ActivationState::Activating,
            None => ActivationState::NotStarted,
        }
    }

    /// Terminal record for `id`, if it has one.
    pub fn get(&self, id: &str) -> Option<ActivatedExtension> {
        self.lock().activated.get(id).cloned()
    }

    /// True once `id` reached a terminal state (including failure).
    pub fn is_activated(&self, id: &str) -> bool {
        self.lock().activated.contains_key(id)
    }

    pub fn activation_failed(&self, id: &str) -> Option<bool> {
        self.lock().activated.get(id).map(|r| r.activation_failed)
    }

    /// Shared handle of an activation currently in flight.
    pub(crate) fn in_flight(&self, id: &str) -> Option<SharedActivation> {
        self.lock().activating.get(id).cloned()
    }

    pub fn activating_count(&self) -> usize {
        self.lock().activating.len()
    }

    /// All terminal records, sorted by id.
    pub fn snapshot(&self) -> Vec<ActivatedExtension> {
        let mut records: Vec<ActivatedExtension> =
            self.lock().activated.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Check-then-insert for one id under a single lock acquisition.
    ///
    /// `start` is only called when `id` is neither terminal nor in flight; the
    /// handle it returns is stored before the lock is released.
    pub(crate) fn begin<F>(&self, id: &str, start: F) -> Begin
    where
        F: FnOnce() -> SharedActivation,
    {
        let mut tables = self.lock();
        if let Some(record) = tables.activated.get(id) {
            return Begin::Done(record.outcome());
        }
        if let Some(in_flight) = tables.activating.get(id) {
            return Begin::Join(in_flight.clone());
        }
        let handle = start();
        tables.activating.insert(id.to_string(), handle.clone());
        Begin::Join(handle)
    }

    /// Move an in-flight activation to its terminal record.
    pub(crate) fn complete(&self, record: ActivatedExtension) {
        let mut tables = self.lock();
        tables.activating.remove(&record.id);
        tables.activated.entry(record.id.clone()).or_insert(record);
    }

    /// Record a failure decided without running the hook.
    ///
    /// Returns false (and changes nothing) when `id` is already terminal or in
    /// flight.
    pub(crate) fn record_failure(
        &self,
        id: &str,
        failure: FailureReason,
        reason: ActivationReason,
    ) -> bool {
        let mut tables = self.lock();
        if tables.activated.contains_key(id) || tables.activating.contains_key(id) {
            return false;
        }
        let record = ActivatedExtension::new(id, &ActivationOutcome::failed(failure), reason, None);
        tables.activated.insert(id.to_string(), record);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn ready(outcome: ActivationOutcome) -> SharedActivation {
        async move { outcome }.boxed().shared()
    }

    #[test]
    fn test_unknown_id_is_not_started() {
        let registry = ActivationRegistry::new();
        assert_eq!(registry.state("a"), ActivationState::NotStarted);
        assert!(!registry.is_activated("a"));
        assert_eq!(registry.activation_failed("a"), None);
    }

    #[test]
    fn test_begin_starts_once_then_joins() {
        let registry = ActivationRegistry::new();
        let mut starts = 0;

        for _ in 0..3 {
            let begin = registry.begin("a", || {
                starts += 1;
                ready(ActivationOutcome::Activated)
            });
            assert!(matches!(begin, Begin::Join(_)));
        }

        assert_eq!(starts, 1);
        assert_eq!(registry.state("a"), ActivationState::Activating);
        assert_eq!(registry.activating_count(), 1);
    }

    #[test]
    fn test_complete_moves_to_terminal() {
        let registry = ActivationRegistry::new();
        let _ = registry.begin("a", || ready(ActivationOutcome::Activated));

        registry.complete(ActivatedExtension::new(
            "a",
            &ActivationOutcome::Activated,
            ActivationReason::ById,
            Some(Duration::from_millis(3)),
        ));

        assert_eq!(registry.state("a"), ActivationState::Activated);
        assert_eq!(registry.activating_count(), 0);
        assert_eq!(registry.activation_failed("a"), Some(false));

        // Terminal ids never start again
        let begin = registry.begin("a", || panic!("must not restart"));
        assert!(matches!(begin, Begin::Done(ActivationOutcome::Activated)));
    }

    #[test]
    fn test_record_failure_is_terminal_and_not_overwritten() {
        let registry = ActivationRegistry::new();
        let failure = FailureReason::UnknownDependency {
            dependency: "x".to_string(),
        };

        assert!(registry.record_failure("a", failure.clone(), ActivationReason::ById));
        assert!(!registry.record_failure(
            "a",
            FailureReason::DependencyDepthExceeded { max_depth: 10 },
            ActivationReason::ById
        ));

        let record = registry.get("a").unwrap();
        assert!(record.activation_failed);
        assert_eq!(record.failure, Some(failure));
        assert_eq!(record.elapsed, None);
        assert_eq!(registry.state("a"), ActivationState::Failed);
    }

    #[test]
    fn test_record_failure_skips_in_flight() {
        let registry = ActivationRegistry::new();
        let _ = registry.begin("a", || ready(ActivationOutcome::Activated));

        assert!(!registry.record_failure(
            "a",
            FailureReason::DependencyDepthExceeded { max_depth: 10 },
            ActivationReason::ById
        ));
        assert_eq!(registry.state("a"), ActivationState::Activating);
    }

    #[test]
    fn test_snapshot_sorted_by_id() {
        let registry = ActivationRegistry::new();
        for id in ["c", "a", "b"] {
            registry.complete(ActivatedExtension::new(
                id,
                &ActivationOutcome::Activated,
                ActivationReason::Event("*".to_string()),
                None,
            ));
        }
        let ids: Vec<String> = registry.snapshot().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
