//! Activation scheduler
//!
//! `ExtensionActivator` composes the descriptor store, the event index, the
//! activation registry and the readiness gate, and drives dependency
//! resolution round by round:
//!
//! ```text
//! activate_by_event / activate_by_id
//!   → readiness gate (FIFO until registration completes)
//!   → activate_batch
//!       loop {
//!         drop terminal descriptors          (idempotence)
//!         depth > max_depth → fail the rest  (cycle guard)
//!         resolve → (green, red)
//!         activate all green concurrently, wait for every one
//!         red empty → done, else batch = red, depth += 1
//!       }
//! ```
//!
//! Per-extension failures never escape: they are recorded in the registry
//! and reported to the diagnostics sink. `activate_by_id` returns
//! [`ActivationError::UnknownExtension`] for ids that were never registered.
//!
//! Hooks run as tokio tasks when a runtime is available, so an activation
//! that has started finishes even if every requester stops awaiting it.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::Instant;

use futures::future::join_all;
use futures::FutureExt;

use crate::config::ActivatorConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink};
use crate::error::{ActivationError, ActivationResult, FailureReason};
use crate::events::{run_listeners, ActivationEventIndex};
use crate::ext_registry::{ExtensionDescriptor, ExtensionRegistry};
use crate::gate::ReadinessGate;
use crate::loader::ExtensionLoader;
use crate::resolver::DependencyResolver;
use crate::state::{
    ActivatedExtension, ActivationOutcome, ActivationReason, ActivationRegistry, ActivationState,
    Begin, SharedActivation,
};

/// Dependency-ordered, deduplicating extension activator
pub struct ExtensionActivator {
    config: ActivatorConfig,
    extensions: RwLock<ExtensionRegistry>,
    events: Mutex<ActivationEventIndex>,
    activated_events: Mutex<HashSet<String>>,
    state: Arc<ActivationRegistry>,
    gate: ReadinessGate,
    loader: Arc<dyn ExtensionLoader>,
    sink: Arc<dyn DiagnosticsSink>,
}

impl std::fmt::Debug for ExtensionActivator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionActivator")
            .field("config", &self.config)
            .field("extensions", &self.read_extensions().count())
            .field("state", &self.state)
            .field("gate", &self.gate)
            .finish()
    }
}

impl ExtensionActivator {
    /// Create an activator with a fresh activation registry.
    pub fn new(
        config: ActivatorConfig,
        loader: Arc<dyn ExtensionLoader>,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self::with_registry(config, Arc::new(ActivationRegistry::new()), loader, sink)
    }

    /// Create an activator that records into an existing registry.
    pub fn with_registry(
        config: ActivatorConfig,
        state: Arc<ActivationRegistry>,
        loader: Arc<dyn ExtensionLoader>,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            config,
            extensions: RwLock::new(ExtensionRegistry::new()),
            events: Mutex::new(ActivationEventIndex::new()),
            activated_events: Mutex::new(HashSet::new()),
            state,
            gate: ReadinessGate::new(),
            loader,
            sink,
        }
    }

    pub fn config(&self) -> &ActivatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ActivationRegistry> {
        &self.state
    }

    fn read_extensions(&self) -> RwLockReadGuard<'_, ExtensionRegistry> {
        self.extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_events(&self) -> MutexGuard<'_, ActivationEventIndex> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register descriptors and index their activation events.
    /// Returns how many were added (duplicates are reported and skipped).
    pub fn register(&self, descriptors: impl IntoIterator<Item = ExtensionDescriptor>) -> usize {
        let added = {
            let mut extensions = self
                .extensions
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            extensions.register(descriptors, &*self.sink)
        };
        self.lock_events().add_descriptors(&added);

        tracing::debug!("Registered {} extensions", added.len());
        added.len()
    }

    pub fn descriptor(&self, id: &str) -> Option<Arc<ExtensionDescriptor>> {
        self.read_extensions().get(id)
    }

    /// All descriptors in registration order
    pub fn descriptors(&self) -> Vec<Arc<ExtensionDescriptor>> {
        self.read_extensions().all().to_vec()
    }

    pub fn descriptors_for_event(&self, event: &str) -> Vec<Arc<ExtensionDescriptor>> {
        self.lock_events().descriptors_for_event(event)
    }

    /// Signal that registration is complete and release queued requests.
    pub fn registration_complete(&self) -> usize {
        tracing::info!(
            "Registration complete ({} extensions)",
            self.read_extensions().count()
        );
        self.gate.open()
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_open()
    }

    /// Requests currently parked behind the readiness gate.
    pub fn queued_requests(&self) -> usize {
        self.gate.queued()
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Run `listener` the next time `event` is triggered.
    pub fn on_event_once<F>(&self, event: impl Into<String>, listener: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.lock_events().register_one_time_listener(event, listener);
    }

    /// Fire and clear the one-time listeners for `event`.
    ///
    /// Listeners run outside the index lock, so they may register new
    /// listeners; those wait for the next trigger.
    pub fn trigger_event(&self, event: &str) -> usize {
        let listeners = {
            let mut events = self.lock_events();
            events.take_listeners(event)
        };
        run_listeners(event, listeners)
    }

    /// Events processed so far by `activate_by_event`
    pub fn activated_events(&self) -> Vec<String> {
        let mut events: Vec<String> = self
            .activated_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        events.sort();
        events
    }

    // ========================================================================
    // Activation entry points
    // ========================================================================

    /// Activate every extension declaring `event`.
    pub async fn activate_by_event(&self, event: &str) {
        self.activate_for_event(event, ActivationReason::Event(event.to_string()))
            .await;
    }

    /// Fire the configured startup events.
    pub async fn activate_startup(&self) {
        for event in self.config.startup_events.clone() {
            let reason = ActivationReason::Startup(event.clone());
            self.activate_for_event(&event, reason).await;
        }
    }

    async fn activate_for_event(&self, event: &str, reason: ActivationReason) {
        self.gate.wait().await;

        let descriptors = self.descriptors_for_event(event);
        self.trigger_event(event);

        tracing::debug!(
            "Activation event '{}' matched {} extensions",
            event,
            descriptors.len()
        );
        self.activate_batch(descriptors, reason).await;

        self.activated_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.to_string());
    }

    /// Activate one extension (and its dependencies) by id.
    pub async fn activate_by_id(&self, id: &str) -> ActivationResult<ActivationOutcome> {
        self.gate.wait().await;

        let Some(desc) = self.descriptor(id) else {
            tracing::warn!("Activation requested for unknown extension '{}'", id);
            return Err(ActivationError::UnknownExtension(id.to_string()));
        };

        self.activate_batch(vec![desc], ActivationReason::ById).await;
        self.settled_outcome(id).await
    }

    /// Drive `descriptors` (plus their pending dependencies) to a terminal
    /// state.
    pub async fn activate_batch(
        &self,
        descriptors: Vec<Arc<ExtensionDescriptor>>,
        reason: ActivationReason,
    ) {
        let mut batch = {
            let extensions = self.read_extensions();
            DependencyResolver::new(&extensions, &self.state, &*self.sink).expand(&descriptors)
        };
        let mut depth = 0;

        loop {
            batch.retain(|d| !self.state.is_activated(&d.id));
            if batch.is_empty() {
                return;
            }

            if depth > self.config.max_depth {
                self.fail_depth_exceeded(&batch, &reason);
                return;
            }

            let resolution = {
                let extensions = self.read_extensions();
                DependencyResolver::new(&extensions, &self.state, &*self.sink)
                    .resolve(&batch, &reason)
            };
            tracing::debug!(
                depth,
                green = resolution.green.len(),
                red = resolution.red.len(),
                failed = resolution.failed.len(),
                "Resolved activation round"
            );

            // Green extensions only depend on activated ones, so they can run together
            join_all(
                resolution
                    .green
                    .iter()
                    .map(|desc| self.activate_extension(desc, reason.clone())),
            )
            .await;

            if resolution.red.is_empty() {
                return;
            }
            batch = resolution.red;
            depth += 1;
        }
    }

    fn fail_depth_exceeded(&self, batch: &[Arc<ExtensionDescriptor>], reason: &ActivationReason) {
        let max_depth = self.config.max_depth;
        for desc in batch {
            let failure = FailureReason::DependencyDepthExceeded { max_depth };
            if self.state.record_failure(&desc.id, failure, reason.clone()) {
                self.sink.report(Diagnostic::error(
                    &desc.id,
                    DiagnosticKind::DependencyDepthExceeded,
                    format!(
                        "Cannot activate extension '{}': dependency cycle or more than {} dependency levels",
                        desc.id, max_depth
                    ),
                ));
            }
        }
    }

    // ========================================================================
    // Single extension activation
    // ========================================================================

    /// Activate one extension whose dependencies are satisfied. Concurrent
    /// calls for the same id share a single hook invocation.
    async fn activate_extension(
        &self,
        desc: &Arc<ExtensionDescriptor>,
        reason: ActivationReason,
    ) -> ActivationOutcome {
        let begin = self
            .state
            .begin(&desc.id, || self.start_activation(Arc::clone(desc), reason));
        match begin {
            Begin::Done(outcome) => outcome,
            Begin::Join(in_flight) => in_flight.await,
        }
    }

    /// Build the shared activation handle. Called while the registry lock is
    /// held; a spawned task cannot record its outcome until the lock is
    /// released, so the handle is always in `activating` first.
    ///
    /// On a tokio runtime the hook runs as its own task and keeps going when
    /// every requester stops awaiting. Without one it runs lazily, driven by
    /// whoever awaits the handle.
    fn start_activation(
        &self,
        desc: Arc<ExtensionDescriptor>,
        reason: ActivationReason,
    ) -> SharedActivation {
        let activation = run_activation(
            Arc::clone(&desc),
            reason.clone(),
            Arc::clone(&self.loader),
            Arc::clone(&self.state),
            Arc::clone(&self.sink),
        );

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return activation.boxed().shared();
        };

        let task = runtime.spawn(activation);
        let state = Arc::clone(&self.state);
        async move {
            match task.await {
                Ok(outcome) => outcome,
                // Runtime shutting down; the hook never finished
                Err(e) => {
                    let outcome = ActivationOutcome::failed(FailureReason::ActivationFailed {
                        message: format!("activation task did not complete: {}", e),
                    });
                    state.complete(ActivatedExtension::new(&desc.id, &outcome, reason, None));
                    outcome
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn settled_outcome(&self, id: &str) -> ActivationResult<ActivationOutcome> {
        if let Some(record) = self.state.get(id) {
            return Ok(record.outcome());
        }
        // Still in flight for another requester: observe the same result
        if let Some(in_flight) = self.state.in_flight(id) {
            return Ok(in_flight.await);
        }
        tracing::error!("Extension '{}' has no activation outcome after its batch", id);
        Err(ActivationError::Unsettled(id.to_string()))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn state(&self, id: &str) -> ActivationState {
        self.state.state(id)
    }

    pub fn is_activated(&self, id: &str) -> bool {
        self.state.is_activated(id)
    }

    pub fn activation_failed(&self, id: &str) -> Option<bool> {
        self.state.activation_failed(id)
    }

    pub fn activated(&self, id: &str) -> Option<ActivatedExtension> {
        self.state.get(id)
    }

    pub fn snapshot(&self) -> Vec<ActivatedExtension> {
        self.state.snapshot()
    }
}

/// Run one activation hook to its terminal record.
async fn run_activation(
    desc: Arc<ExtensionDescriptor>,
    reason: ActivationReason,
    loader: Arc<dyn ExtensionLoader>,
    state: Arc<ActivationRegistry>,
    sink: Arc<dyn DiagnosticsSink>,
) -> ActivationOutcome {
    tracing::debug!("Activating extension '{}'", desc.id);
    let started = Instant::now();

    let hook = {
        let desc = Arc::clone(&desc);
        async move { loader.activate(&desc).await }
    };
    let result = match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!(
            "activation hook panicked: {}",
            panic_message(panic.as_ref())
        )),
    };
    let elapsed = started.elapsed();

    let outcome = match result {
        Ok(()) => {
            tracing::info!("Activated extension '{}' in {:?}", desc.id, elapsed);
            ActivationOutcome::Activated
        }
        Err(e) => {
            let message = format!("{:#}", e);
            sink.report(Diagnostic::error(
                &desc.id,
                DiagnosticKind::ActivationException,
                format!("Activating extension '{}' failed: {}", desc.id, message),
            ));
            ActivationOutcome::failed(FailureReason::ActivationFailed { message })
        }
    };

    state.complete(ActivatedExtension::new(
        &desc.id,
        &outcome,
        reason,
        Some(elapsed),
    ));
    outcome
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
