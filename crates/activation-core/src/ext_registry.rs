//! Extension Registry - Descriptor store for every known extension
//!
//! This module provides:
//! - `ExtensionDescriptor`: Immutable metadata about one extension
//! - `ExtensionRegistry`: Append-only store of descriptors, keyed by id
//!
//! Descriptors arrive pre-parsed (see [`crate::manifest`]) and are never
//! mutated or removed once registered.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink};
use crate::ExtensionId;

// ============================================================================
// Core Types
// ============================================================================

/// Metadata describing an extension
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExtensionDescriptor {
    /// Unique, stable identifier (e.g., "vendor.git")
    pub id: ExtensionId,
    /// Declared entry point, handed to the extension loader
    #[serde(default)]
    pub main: Option<String>,
    /// Ids of extensions that must be activated first, in declaration order
    #[serde(default)]
    pub dependencies: Vec<ExtensionId>,
    /// Events that trigger activation (e.g., "onCommand:git.clone", "*")
    #[serde(default)]
    pub activation_events: Vec<String>,
}

impl ExtensionDescriptor {
    pub fn new(id: impl Into<ExtensionId>) -> Self {
        Self {
            id: id.into(),
            main: None,
            dependencies: Vec::new(),
            activation_events: Vec::new(),
        }
    }

    pub fn with_main(mut self, main: impl Into<String>) -> Self {
        self.main = Some(main.into());
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ExtensionId>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_activation_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.activation_events = events.into_iter().map(Into::into).collect();
        self
    }
}

// ============================================================================
// Extension Registry Implementation
// ============================================================================

/// Append-only store of extension descriptors
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    descriptors: Vec<Arc<ExtensionDescriptor>>,
    by_id: HashMap<ExtensionId, usize>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch of descriptors.
    ///
    /// A descriptor whose id is already present is skipped with a
    /// `DuplicateRegistration` diagnostic; the earlier registration stands and
    /// the rest of the batch is still processed. Returns the descriptors that
    /// were actually added, in batch order.
    pub fn register(
        &mut self,
        descriptors: impl IntoIterator<Item = ExtensionDescriptor>,
        sink: &dyn DiagnosticsSink,
    ) -> Vec<Arc<ExtensionDescriptor>> {
        let mut added = Vec::new();
        for desc in descriptors {
            if self.by_id.contains_key(&desc.id) {
                sink.report(Diagnostic::warning(
                    &desc.id,
                    DiagnosticKind::DuplicateRegistration,
                    format!("Extension '{}' is already registered", desc.id),
                ));
                continue;
            }

            let desc = Arc::new(desc);
            self.by_id.insert(desc.id.clone(), self.descriptors.len());
            self.descriptors.push(Arc::clone(&desc));
            added.push(desc);
        }
        added
    }

    pub fn get(&self, id: &str) -> Option<Arc<ExtensionDescriptor>> {
        self.by_id
            .get(id)
            .map(|&idx| Arc::clone(&self.descriptors[idx]))
    }

    /// All descriptors in registration order
    pub fn all(&self) -> &[Arc<ExtensionDescriptor>] {
        &self.descriptors
    }

    pub fn count(&self) -> usize {
        self.descriptors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;

    #[test]
    fn test_register_and_lookup() {
        let sink = MemorySink::new();
        let mut registry = ExtensionRegistry::new();

        let added = registry.register(
            vec![
                ExtensionDescriptor::new("b"),
                ExtensionDescriptor::new("a").with_dependencies(["b"]),
            ],
            &sink,
        );

        assert_eq!(added.len(), 2);
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.get("a").unwrap().dependencies, vec!["b"]);
        assert!(registry.get("missing").is_none());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_skipped() {
        let sink = MemorySink::new();
        let mut registry = ExtensionRegistry::new();

        registry.register(vec![ExtensionDescriptor::new("a").with_main("first.js")], &sink);
        let added = registry.register(
            vec![
                ExtensionDescriptor::new("a").with_main("second.js"),
                ExtensionDescriptor::new("c"),
            ],
            &sink,
        );

        // The duplicate is dropped but the rest of the batch still lands
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].id, "c");
        assert_eq!(registry.get("a").unwrap().main.as_deref(), Some("first.js"));

        let diagnostics = sink.entries();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].extension_id, "a");
        assert_eq!(diagnostics[0].kind, DiagnosticKind::DuplicateRegistration);
    }

    #[test]
    fn test_all_keeps_insertion_order() {
        let sink = MemorySink::new();
        let mut registry = ExtensionRegistry::new();
        registry.register(
            ["z", "m", "a"].into_iter().map(ExtensionDescriptor::new),
            &sink,
        );

        let ids: Vec<&str> = registry.all().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "m", "a"]);
    }
}
