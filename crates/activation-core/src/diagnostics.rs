//! Diagnostics reported while registering and activating extensions.
//!
//! The sink is purely observational: nothing it does affects control flow.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::ExtensionId;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// What a diagnostic is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnknownDependency { dependency: ExtensionId },
    DependencyFailed { dependency: ExtensionId },
    ActivationException,
    DependencyDepthExceeded,
    DuplicateRegistration,
}

/// A single `(severity, extension id, message)` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub extension_id: ExtensionId,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn error(extension_id: &str, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            extension_id: extension_id.to_string(),
            kind,
            message: message.into(),
        }
    }

    pub fn warning(extension_id: &str, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            extension_id: extension_id.to_string(),
            kind,
            message: message.into(),
        }
    }
}

/// Receives diagnostics from the engine.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => tracing::error!(
                extension = %diagnostic.extension_id,
                "{}",
                diagnostic.message
            ),
            Severity::Warning => tracing::warn!(
                extension = %diagnostic.extension_id,
                "{}",
                diagnostic.message
            ),
        }
    }
}

/// Collects diagnostics in memory, in report order.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything reported so far.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Diagnostics reported for one extension.
    pub fn for_extension(&self, extension_id: &str) -> Vec<Diagnostic> {
        self.entries()
            .into_iter()
            .filter(|d| d.extension_id == extension_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticsSink for MemorySink {
    fn report(&self, diagnostic: Diagnostic) {
        // Also log through tracing
        TracingSink.report(diagnostic.clone());
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }
}
