//! Dependency resolver - classifies one round of activation requests.
//!
//! Each requested descriptor ends a round in exactly one of:
//! - skipped (already terminal),
//! - `green` (every dependency activated successfully),
//! - `red` (some dependency is registered but not activated yet),
//! - failed (a dependency is unknown or failed; recorded immediately).

use std::collections::HashSet;
use std::sync::Arc;

use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink};
use crate::error::FailureReason;
use crate::ext_registry::{ExtensionDescriptor, ExtensionRegistry};
use crate::state::{ActivationReason, ActivationRegistry};
use crate::ExtensionId;

/// Outcome of one resolution round
#[derive(Debug, Default)]
pub struct Resolution {
    /// Ready to activate this round
    pub green: Vec<Arc<ExtensionDescriptor>>,
    /// Blocked on a pending dependency; retry next round
    pub red: Vec<Arc<ExtensionDescriptor>>,
    /// Ids failed during this round
    pub failed: Vec<ExtensionId>,
}

/// Ordered set of descriptors, deduplicated by id.
#[derive(Default)]
struct DescriptorSet {
    items: Vec<Arc<ExtensionDescriptor>>,
    ids: HashSet<ExtensionId>,
}

impl DescriptorSet {
    fn insert(&mut self, desc: &Arc<ExtensionDescriptor>) {
        if self.ids.insert(desc.id.clone()) {
            self.items.push(Arc::clone(desc));
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}

pub struct DependencyResolver<'a> {
    extensions: &'a ExtensionRegistry,
    state: &'a ActivationRegistry,
    sink: &'a dyn DiagnosticsSink,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(
        extensions: &'a ExtensionRegistry,
        state: &'a ActivationRegistry,
        sink: &'a dyn DiagnosticsSink,
    ) -> Self {
        Self {
            extensions,
            state,
            sink,
        }
    }

    /// Add every registered, not yet terminal, transitive dependency of the
    /// batch. Requested descriptors keep their order and come first.
    pub fn expand(&self, batch: &[Arc<ExtensionDescriptor>]) -> Vec<Arc<ExtensionDescriptor>> {
        let mut set = DescriptorSet::default();
        for desc in batch {
            set.insert(desc);
        }

        let mut cursor = 0;
        while cursor < set.items.len() {
            let desc = Arc::clone(&set.items[cursor]);
            cursor += 1;
            for dep_id in &desc.dependencies {
                if set.contains(dep_id) || self.state.is_activated(dep_id) {
                    continue;
                }
                if let Some(dep) = self.extensions.get(dep_id) {
                    set.insert(&dep);
                }
            }
        }
        set.items
    }

    /// Classify one round. Unknown and failed dependencies fail the requesting
    /// descriptor right away, with a diagnostic, in batch order.
    pub fn resolve(
        &self,
        batch: &[Arc<ExtensionDescriptor>],
        reason: &ActivationReason,
    ) -> Resolution {
        let mut green = DescriptorSet::default();
        let mut red = DescriptorSet::default();
        let mut failed = Vec::new();

        'requests: for desc in batch {
            if self.state.is_activated(&desc.id) {
                continue;
            }

            let mut green_light = true;
            for dep_id in &desc.dependencies {
                match self.state.activation_failed(dep_id) {
                    Some(false) => continue,
                    Some(true) => {
                        self.fail(
                            desc,
                            FailureReason::DependencyFailed {
                                dependency: dep_id.clone(),
                            },
                            DiagnosticKind::DependencyFailed {
                                dependency: dep_id.clone(),
                            },
                            format!(
                                "Cannot activate extension '{}' because its dependency '{}' failed to activate",
                                desc.id, dep_id
                            ),
                            reason,
                            &mut failed,
                        );
                        continue 'requests;
                    }
                    None => {}
                }

                match self.extensions.get(dep_id) {
                    Some(dep) => {
                        // Registered but not done yet: wait for it, and make
                        // sure it is part of the next round.
                        green_light = false;
                        red.insert(&dep);
                    }
                    None => {
                        self.fail(
                            desc,
                            FailureReason::UnknownDependency {
                                dependency: dep_id.clone(),
                            },
                            DiagnosticKind::UnknownDependency {
                                dependency: dep_id.clone(),
                            },
                            format!(
                                "Cannot activate extension '{}' because it depends on unknown extension '{}'",
                                desc.id, dep_id
                            ),
                            reason,
                            &mut failed,
                        );
                        continue 'requests;
                    }
                }
            }

            if green_light {
                green.insert(desc);
            } else {
                red.insert(desc);
            }
        }

        // A descriptor can be both green (its own request) and red (pulled
        // in as someone's pending dependency); green wins.
        let green = green.items;
        let red = red
            .items
            .into_iter()
            .filter(|d| !green.iter().any(|g| g.id == d.id))
            .filter(|d| !failed.contains(&d.id))
            .collect();

        Resolution { green, red, failed }
    }

    fn fail(
        &self,
        desc: &ExtensionDescriptor,
        failure: FailureReason,
        kind: DiagnosticKind,
        message: String,
        reason: &ActivationReason,
        failed: &mut Vec<ExtensionId>,
    ) {
        if self.state.record_failure(&desc.id, failure, reason.clone()) {
            self.sink
                .report(Diagnostic::error(&desc.id, kind, message));
            failed.push(desc.id.clone());
        }
    }
}
