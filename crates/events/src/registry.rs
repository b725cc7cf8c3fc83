//! Process-wide subscription state.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::BusError;
use crate::handler::SubscriptionBinding;

type RemovedCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Outcome of removing a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The pair was not registered.
    NotRegistered,
    /// The pair was removed; other handlers remain for the event.
    Removed,
    /// The pair was removed and it was the last handler for the event; the
    /// event key itself is gone and the removal callback has fired.
    RemovedLast,
}

/// In-memory map from event key to registered handler bindings.
///
/// This is deliberate process-wide state with no persistence: it must be
/// rebuilt by re-subscribing on every start, before any consumer runs, and
/// cleared on shutdown. The mutex is required because subscriptions can be
/// added or removed while consumers are dispatching.
pub struct SubscriptionRegistry {
    bindings: Mutex<HashMap<String, Vec<SubscriptionBinding>>>,
    on_event_removed: Mutex<Option<RemovedCallback>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding under its event key.
    ///
    /// Errors if the exact (event, handler) pair is already present.
    pub fn add(&self, binding: SubscriptionBinding) -> Result<(), BusError> {
        let mut bindings = self.lock_bindings();
        let entries = bindings.entry(binding.event_key().to_string()).or_default();

        if entries
            .iter()
            .any(|b| b.handler_name() == binding.handler_name())
        {
            return Err(BusError::DuplicateSubscription {
                event_key: binding.event_key().to_string(),
                handler: binding.handler_name(),
            });
        }

        debug!(
            event_key = binding.event_key(),
            handler = binding.handler_name(),
            "subscription registered"
        );
        entries.push(binding);
        Ok(())
    }

    /// Remove a binding; drops the event key entirely when its handler list
    /// becomes empty and fires the removal callback with the key.
    pub fn remove(&self, event_key: &str, handler_name: &str) -> Removal {
        let removal = {
            let mut bindings = self.lock_bindings();
            let Some(entries) = bindings.get_mut(event_key) else {
                return Removal::NotRegistered;
            };
            let before = entries.len();
            entries.retain(|b| b.handler_name() != handler_name);
            if entries.len() == before {
                return Removal::NotRegistered;
            }
            if entries.is_empty() {
                bindings.remove(event_key);
                Removal::RemovedLast
            } else {
                Removal::Removed
            }
        };

        debug!(event_key, handler = handler_name, ?removal, "subscription removed");

        if removal == Removal::RemovedLast {
            let callback = self
                .on_event_removed
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(callback) = callback.as_ref() {
                callback(event_key);
            }
        }
        removal
    }

    pub fn has_subscriptions_for(&self, event_key: &str) -> bool {
        self.lock_bindings()
            .get(event_key)
            .is_some_and(|entries| !entries.is_empty())
    }

    pub fn has_handler(&self, event_key: &str, handler_name: &str) -> bool {
        self.lock_bindings()
            .get(event_key)
            .is_some_and(|entries| entries.iter().any(|b| b.handler_name() == handler_name))
    }

    /// Snapshot of the bindings for an event key, in registration order.
    ///
    /// A snapshot so dispatch never holds the registry lock across handler
    /// execution.
    pub fn handlers_for(&self, event_key: &str) -> Vec<SubscriptionBinding> {
        self.lock_bindings()
            .get(event_key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_bindings().is_empty()
    }

    /// Drop every binding (shutdown path).
    pub fn clear(&self) {
        self.lock_bindings().clear();
    }

    /// Observer fired with the event key when its last handler is removed.
    pub fn set_on_event_removed(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *self
            .on_event_removed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(callback));
    }

    fn lock_bindings(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, Vec<SubscriptionBinding>>> {
        // Handlers never run under this lock, so a poisoned guard still
        // holds a usable map.
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self {
            bindings: Mutex::new(HashMap::new()),
            on_event_removed: Mutex::new(None),
        }
    }
}

impl core::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let keys: Vec<String> = self.lock_bindings().keys().cloned().collect();
        f.debug_struct("SubscriptionRegistry")
            .field("event_keys", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    use crate::error::HandlerError;
    use crate::event::Event;
    use crate::handler::{EventHandler, HandlerContext};

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Sample;

    impl Event for Sample {
        const KEY: &'static str = "SampleEvent";
    }

    struct First;

    #[async_trait]
    impl EventHandler<Sample> for First {
        const NAME: &'static str = "First";

        async fn handle(&self, _: &HandlerContext, _: Sample) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct Second;

    #[async_trait]
    impl EventHandler<Sample> for Second {
        const NAME: &'static str = "Second";

        async fn handle(&self, _: &HandlerContext, _: Sample) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn binding_first() -> SubscriptionBinding {
        SubscriptionBinding::new::<Sample, First>(Arc::new(First))
    }

    fn binding_second() -> SubscriptionBinding {
        SubscriptionBinding::new::<Sample, Second>(Arc::new(Second))
    }

    #[test]
    fn duplicate_pairs_are_rejected() {
        let registry = SubscriptionRegistry::new();
        registry.add(binding_first()).unwrap();

        let err = registry.add(binding_first()).unwrap_err();
        assert!(matches!(err, BusError::DuplicateSubscription { .. }));

        // A different handler for the same event is fine.
        registry.add(binding_second()).unwrap();
        assert_eq!(registry.handlers_for("SampleEvent").len(), 2);
    }

    #[test]
    fn removing_the_last_handler_drops_the_key_and_notifies() {
        let registry = SubscriptionRegistry::new();
        let notified = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&notified);
        registry.set_on_event_removed(move |key| {
            assert_eq!(key, "SampleEvent");
            flag.store(true, Ordering::SeqCst);
        });

        registry.add(binding_first()).unwrap();
        registry.add(binding_second()).unwrap();

        assert_eq!(registry.remove("SampleEvent", "First"), Removal::Removed);
        assert!(!notified.load(Ordering::SeqCst));
        assert!(registry.has_subscriptions_for("SampleEvent"));

        assert_eq!(
            registry.remove("SampleEvent", "Second"),
            Removal::RemovedLast
        );
        assert!(notified.load(Ordering::SeqCst));
        assert!(!registry.has_subscriptions_for("SampleEvent"));
        assert!(registry.is_empty());
    }

    #[test]
    fn removing_an_unknown_pair_is_reported() {
        let registry = SubscriptionRegistry::new();
        assert_eq!(
            registry.remove("SampleEvent", "First"),
            Removal::NotRegistered
        );

        registry.add(binding_first()).unwrap();
        assert_eq!(
            registry.remove("SampleEvent", "Second"),
            Removal::NotRegistered
        );
        assert!(registry.has_handler("SampleEvent", "First"));
    }

    #[test]
    fn clear_empties_everything() {
        let registry = SubscriptionRegistry::new();
        registry.add(binding_first()).unwrap();
        assert!(!registry.is_empty());

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.handlers_for("SampleEvent").is_empty());
    }
}
