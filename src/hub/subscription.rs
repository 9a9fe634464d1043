#![expect(
    clippy::module_name_repetitions,
    reason = "Subscription types deliberately include the module name for clarity"
)]

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use super::types::request::ControlMessage;

/// Point-in-time copy of the recorded subscription intent.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    /// Explicitly subscribed device identifiers, sorted
    pub device_ids: Vec<String>,
    /// Whether `subscribe_all` has been requested
    pub all: bool,
}

#[derive(Debug, Default)]
struct Intent {
    device_ids: BTreeSet<String>,
    all: bool,
}

/// Records what the caller asked to receive, independent of the link.
///
/// The lock here is separate from the link lock so a reconnect can read the
/// intent while new subscribe calls are in flight. It is never held across an
/// `.await`.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    intent: Mutex<Intent>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add device identifiers to the replay set. Duplicates are ignored.
    pub fn add<I>(&self, device_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.intent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .device_ids
            .extend(device_ids);
    }

    pub fn set_all(&self) {
        self.intent.lock().unwrap_or_else(PoisonError::into_inner).all = true;
    }

    #[must_use]
    pub fn snapshot(&self) -> SubscriptionSnapshot {
        let intent = self.intent.lock().unwrap_or_else(PoisonError::into_inner);
        SubscriptionSnapshot {
            device_ids: intent.device_ids.iter().cloned().collect(),
            all: intent.all,
        }
    }

    /// The single message that restores this intent on a fresh link.
    ///
    /// `subscribeAll` wins over explicit identifiers; `None` when nothing was requested.
    #[must_use]
    pub fn replay_message(&self) -> Option<ControlMessage> {
        let intent = self.intent.lock().unwrap_or_else(PoisonError::into_inner);
        if intent.all {
            Some(ControlMessage::SubscribeAll)
        } else if intent.device_ids.is_empty() {
            None
        } else {
            Some(ControlMessage::subscribe(
                intent.device_ids.iter().cloned().collect(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| (*id).to_owned()).collect()
    }

    #[test]
    fn empty_registry_replays_nothing() {
        let registry = SubscriptionRegistry::new();

        assert_eq!(registry.replay_message(), None);
        assert_eq!(registry.snapshot(), SubscriptionSnapshot::default());
    }

    #[test]
    fn device_ids_are_deduplicated_and_sorted() {
        let registry = SubscriptionRegistry::new();
        registry.add(ids(&["b", "a"]));
        registry.add(ids(&["a", "c"]));

        assert_eq!(registry.snapshot().device_ids, ids(&["a", "b", "c"]));
        assert_eq!(
            registry.replay_message(),
            Some(ControlMessage::subscribe(ids(&["a", "b", "c"])))
        );
    }

    #[test]
    fn subscribe_all_wins_over_explicit_ids() {
        let registry = SubscriptionRegistry::new();
        registry.add(ids(&["a"]));
        registry.set_all();

        let snapshot = registry.snapshot();
        assert!(snapshot.all);
        assert_eq!(snapshot.device_ids, ids(&["a"]));
        assert_eq!(registry.replay_message(), Some(ControlMessage::SubscribeAll));
    }
}
