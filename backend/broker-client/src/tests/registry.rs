// Unit tests for the in-memory subscription registry.

use crate::client::Subscription;
use crate::client::registry::SubscriptionRegistry;

/// **VALUE**: Verifies that subscribing again with the same id replaces the entry.
///
/// **WHY THIS MATTERS**: Replay after reconnect must re-issue exactly one subscribe per
/// id with its latest channel and event.
///
/// **BUG THIS CATCHES**: Would catch duplicate entries per id, which would replay a stale
/// binding next to the current one.
#[test]
fn given_existing_id_when_recorded_again_then_entry_replaced() {
    // GIVEN: A registry holding "s1" on channel a
    let mut registry = SubscriptionRegistry::default();
    assert!(registry.record(Subscription::new("s1", "a")).is_none());

    // WHEN: Recording "s1" again on channel b
    let previous = registry.record(Subscription::new("s1", "b").with_event("e"));

    // THEN: The old entry is returned and only the new one remains
    assert_eq!(previous.map(|s| s.channel), Some("a".to_string()));
    let all = registry.all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].channel, "b");
    assert_eq!(all[0].event.as_deref(), Some("e"));
}

/// **VALUE**: Verifies snapshots come back ordered by subscription id.
///
/// **BUG THIS CATCHES**: Would catch replay order depending on hash iteration order,
/// which makes reconnect logs and tests nondeterministic.
#[test]
fn given_several_entries_when_listed_then_sorted_by_id() {
    // GIVEN: Entries recorded out of order
    let mut registry = SubscriptionRegistry::default();
    for id in ["c", "a", "b"] {
        registry.record(Subscription::new(id, "chan"));
    }

    // WHEN: Listing
    let ids: Vec<String> = registry
        .all()
        .into_iter()
        .map(|s| s.subscription_id)
        .collect();

    // THEN: Sorted
    assert_eq!(ids, ["a", "b", "c"]);

    // AND: Clearing empties it
    registry.clear();
    assert!(registry.is_empty());
}
