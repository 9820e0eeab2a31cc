//! Activation Core - dependency-ordered extension activation
//!
//! Extensions are registered as [`ExtensionDescriptor`]s declaring their
//! dependencies and the activation events they respond to. The
//! [`ExtensionActivator`] activates them on demand:
//!
//! - every dependency finishes activating before its dependent starts,
//! - each extension's hook runs at most once, however many requests race,
//! - failures are recorded and cascade to dependents, never to callers,
//! - cycles and overly deep chains terminate with a diagnostic,
//! - requests made before registration completes wait behind a gate.
//!
//! ```no_run
//! use std::sync::Arc;
//! use activation_core::{ActivatorConfig, ExtensionActivator, ExtensionDescriptor, TracingSink};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let activator = ExtensionActivator::new(
//!     ActivatorConfig::default(),
//!     Arc::new(|desc: &ExtensionDescriptor| {
//!         let id = desc.id.clone();
//!         async move {
//!             println!("starting {}", id);
//!             Ok::<(), anyhow::Error>(())
//!         }
//!     }),
//!     Arc::new(TracingSink),
//! );
//! activator.register(vec![
//!     ExtensionDescriptor::new("base"),
//!     ExtensionDescriptor::new("git")
//!         .with_dependencies(["base"])
//!         .with_activation_events(["onCommand:git.clone"]),
//! ]);
//! activator.registration_complete();
//! activator.activate_by_event("onCommand:git.clone").await;
//! # Ok(())
//! # }
//! ```

pub mod activator;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod ext_registry;
pub mod gate;
pub mod loader;
pub mod manifest;
pub mod resolver;
pub mod state;

/// Unique, stable extension identifier (e.g. `vendor.git`)
pub type ExtensionId = String;

pub use activator::ExtensionActivator;
pub use config::{ActivatorConfig, DEFAULT_MAX_DEPTH, STARTUP_EVENT};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink, MemorySink, Severity, TracingSink};
pub use error::{ActivationError, ActivationResult, FailureReason};
pub use events::ActivationEventIndex;
pub use ext_registry::{ExtensionDescriptor, ExtensionRegistry};
pub use gate::ReadinessGate;
pub use loader::ExtensionLoader;
pub use manifest::ActivationManifest;
pub use state::{
    ActivatedExtension, ActivationOutcome, ActivationReason, ActivationRegistry, ActivationState,
};
