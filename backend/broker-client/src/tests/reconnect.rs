// Unit tests for the reconnect backoff schedule.

use crate::client::reconnect::reconnect_backoff;
use crate::config::ClientConfig;

use std::time::Duration;

use backoff::backoff::Backoff;

/// **VALUE**: Pins the reconnect schedule: 200 ms doubling to a 3 s cap.
///
/// **WHY THIS MATTERS**: Too fast hammers a restarting broker; too slow leaves
/// subscribers deaf long after the broker is back.
///
/// **BUG THIS CATCHES**: Would catch jitter being left on, the cap being ignored, or
/// the schedule ending (max elapsed time) so the client gives up reconnecting.
#[test]
fn given_default_config_when_backing_off_then_doubles_to_cap() {
    // GIVEN: The default schedule
    let mut backoff = reconnect_backoff(&ClientConfig::new("/tmp/broker.sock"));

    // WHEN: Taking seven delays
    let delays: Vec<u128> = (0..7)
        .map(|_| backoff.next_backoff().map(|d| d.as_millis()).unwrap_or_default())
        .collect();

    // THEN: 200, 400, 800, 1600 then capped at 3000
    assert_eq!(delays, [200, 400, 800, 1600, 3000, 3000, 3000]);
}

/// **VALUE**: Verifies that a reset starts the schedule over.
///
/// **BUG THIS CATCHES**: Would catch a client that reconnected once and then waits the
/// full cap after every later disconnect.
#[test]
fn given_advanced_backoff_when_reset_then_starts_from_initial() {
    // GIVEN: A custom schedule advanced past its first step
    let config = ClientConfig::new("/tmp/broker.sock")
        .with_reconnect_backoff(Duration::from_millis(10), Duration::from_millis(40));
    let mut backoff = reconnect_backoff(&config);
    backoff.next_backoff();
    backoff.next_backoff();

    // WHEN: Resetting
    backoff.reset();

    // THEN: Back to the initial delay
    assert_eq!(backoff.next_backoff().map(|d| d.as_millis()), Some(10));
}
