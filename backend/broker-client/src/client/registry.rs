use crate::client::types::Subscription;

use std::collections::HashMap;

/// Every subscription the broker has acknowledged, keyed by subscription id.
///
/// This is what gets replayed after a reconnect. It lives only in memory.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    entries: HashMap<String, Subscription>,
}

impl SubscriptionRegistry {
    /// Records an acknowledged subscription, returning the entry it replaced.
    pub(crate) fn record(&mut self, subscription: Subscription) -> Option<Subscription> {
        self.entries
            .insert(subscription.subscription_id.clone(), subscription)
    }

    /// Snapshot of every entry, ordered by subscription id.
    pub(crate) fn all(&self) -> Vec<Subscription> {
        let mut subscriptions: Vec<Subscription> = self.entries.values().cloned().collect();
        subscriptions.sort_by(|a, b| a.subscription_id.cmp(&b.subscription_id));
        subscriptions
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
