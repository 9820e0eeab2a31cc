//! Activation event index and one-time event listeners.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ext_registry::ExtensionDescriptor;

/// Callback fired once, the next time its event is triggered.
pub type OneTimeListener = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Maps activation events to the descriptors interested in them.
///
/// Append-only: descriptors are added as they register and never removed.
#[derive(Default)]
pub struct ActivationEventIndex {
    by_event: HashMap<String, Vec<Arc<ExtensionDescriptor>>>,
    listeners: HashMap<String, Vec<OneTimeListener>>,
}

impl std::fmt::Debug for ActivationEventIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationEventIndex")
            .field("events", &self.by_event.keys().collect::<Vec<_>>())
            .field(
                "pending_listeners",
                &self.listeners.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

impl ActivationEventIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every activation event declared by `descriptors`.
    pub fn add_descriptors(&mut self, descriptors: &[Arc<ExtensionDescriptor>]) {
        for desc in descriptors {
            for event in &desc.activation_events {
                let entry = self.by_event.entry(event.clone()).or_default();
                // An extension listing the same event twice is indexed once
                if !entry.iter().any(|d| d.id == desc.id) {
                    entry.push(Arc::clone(desc));
                }
            }
        }
    }

    /// Snapshot of the descriptors declaring `event`, in registration order.
    pub fn descriptors_for_event(&self, event: &str) -> Vec<Arc<ExtensionDescriptor>> {
        self.by_event.get(event).cloned().unwrap_or_default()
    }

    pub fn register_one_time_listener<F>(&mut self, event: impl Into<String>, listener: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.listeners
            .entry(event.into())
            .or_default()
            .push(Box::new(listener));
    }

    pub fn pending_listeners(&self, event: &str) -> usize {
        self.listeners.get(event).map(Vec::len).unwrap_or(0)
    }

    /// Remove and return every listener waiting on `event`.
    pub fn take_listeners(&mut self, event: &str) -> Vec<OneTimeListener> {
        self.listeners.remove(event).unwrap_or_default()
    }

    /// Fire and clear the listeners for `event`. Returns how many ran.
    pub fn trigger(&mut self, event: &str) -> usize {
        let listeners = self.take_listeners(event);
        run_listeners(event, listeners)
    }
}

/// Invoke listeners in registration order. A failing listener is logged and
/// does not stop the ones after it.
pub(crate) fn run_listeners(event: &str, listeners: Vec<OneTimeListener>) -> usize {
    let count = listeners.len();
    for (idx, listener) in listeners.into_iter().enumerate() {
        if let Err(e) = listener() {
            tracing::warn!("Listener #{} for event '{}' failed: {:#}", idx, event, e);
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn desc(id: &str, events: &[&str]) -> Arc<ExtensionDescriptor> {
        Arc::new(ExtensionDescriptor::new(id).with_activation_events(events.iter().copied()))
    }

    #[test]
    fn test_descriptors_for_event() {
        let mut index = ActivationEventIndex::new();
        index.add_descriptors(&[
            desc("a", &["onCommand:x", "onCommand:x"]),
            desc("b", &["onCommand:x", "*"]),
        ]);

        let ids: Vec<String> = index
            .descriptors_for_event("onCommand:x")
            .iter()
            .map(|d| d.id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(index.descriptors_for_event("*").len(), 1);
        assert!(index.descriptors_for_event("unknown").is_empty());
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_registration() {
        let mut index = ActivationEventIndex::new();
        index.add_descriptors(&[desc("a", &["e"])]);
        let snapshot = index.descriptors_for_event("e");

        index.add_descriptors(&[desc("b", &["e"])]);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(index.descriptors_for_event("e").len(), 2);
    }

    #[test]
    fn test_listeners_fire_once_in_order() {
        let mut index = ActivationEventIndex::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = Arc::clone(&order);
            index.register_one_time_listener("e", move || {
                order.lock().unwrap().push(n);
                Ok(())
            });
        }
        assert_eq!(index.pending_listeners("e"), 3);

        assert_eq!(index.trigger("e"), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);

        // Consumed: a second trigger is a no-op
        assert_eq!(index.trigger("e"), 0);
        assert_eq!(order.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_failing_listener_does_not_stop_others() {
        let mut index = ActivationEventIndex::new();
        let ran = Arc::new(AtomicUsize::new(0));

        index.register_one_time_listener("e", || Err(anyhow::anyhow!("listener broke")));
        let counter = Arc::clone(&ran);
        index.register_one_time_listener("e", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(index.trigger("e"), 2);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_trigger_without_listeners_is_noop() {
        let mut index = ActivationEventIndex::new();
        assert_eq!(index.trigger("nothing"), 0);
    }
}
