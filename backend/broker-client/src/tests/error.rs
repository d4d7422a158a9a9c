// Unit tests for the error taxonomy and its conversions.

use crate::error::{ClientError, FrameError};

/// **VALUE**: Verifies that a broker rejection carries the broker's own reason.
///
/// **WHY THIS MATTERS**: The broker's error string ("channel not allowed", "rate
/// limited") is the only actionable detail a caller gets.
///
/// **BUG THIS CATCHES**: Would catch the detail being dropped, or an empty detail
/// producing a dangling "rejected: " message.
#[test]
fn given_broker_error_when_rejected_created_then_message_includes_detail() {
    // GIVEN/WHEN: Rejections with and without detail
    let with_detail = ClientError::rejected("publish", Some("channel not allowed"));
    let empty_detail = ClientError::rejected("publish", Some(""));
    let without_detail = ClientError::rejected("subscription", None);

    // THEN: Detail is included only when present
    assert!(with_detail.is_rejected());
    assert!(
        with_detail
            .to_string()
            .contains("publish rejected: channel not allowed")
    );
    assert!(empty_detail.to_string().contains("publish rejected"));
    assert!(!empty_detail.to_string().contains("rejected:"));
    assert!(
        without_detail
            .to_string()
            .contains("subscription rejected")
    );
}

/// **VALUE**: Verifies that frame errors land in the right client error kind.
///
/// **WHY THIS MATTERS**: Callers branch on kind. A read failure means the stream is
/// gone (retryable); a malformed or oversized frame is a protocol violation.
///
/// **BUG THIS CATCHES**: Would catch an oversized frame being reported as
/// `NotConnected`, which would hide a misbehaving broker.
#[test]
fn given_frame_errors_when_converted_then_map_to_expected_kinds() {
    // GIVEN: One frame error of each kind
    let too_large: ClientError = FrameError::too_large(64).into();
    let decode: ClientError = FrameError::decode("invalid transport envelope").into();
    let read: ClientError =
        FrameError::from(std::io::Error::from(std::io::ErrorKind::ConnectionReset)).into();

    // THEN: Oversized and undecodable frames are protocol errors
    assert!(too_large.is_protocol());
    assert!(
        too_large
            .to_string()
            .contains("transport frame exceeds max size of 64 bytes")
    );
    assert!(decode.is_protocol());

    // AND: I/O failures mean the connection is gone
    assert!(read.is_not_connected());

    // AND: A directly built protocol error has the same kind
    assert!(ClientError::protocol("unexpected frame").is_protocol());
}

/// **VALUE**: Verifies every error renders its source location.
///
/// **BUG THIS CATCHES**: Would catch `#[track_caller]` being dropped from a
/// constructor, which makes every location point inside the error module.
#[test]
fn given_error_constructor_when_displayed_then_points_at_caller() {
    // GIVEN/WHEN: An error built in this file
    let error = ClientError::closed();

    // THEN: Location references this test file, not the error module
    let rendered = error.to_string();
    assert!(rendered.starts_with("Closed Error: broker client closed"));
    assert!(
        rendered.contains("tests/error.rs"),
        "Location should point at the caller: {rendered}"
    );
    assert!(error.is_closed());
    assert!(!error.is_timeout());
}
