// Unit tests for bounded newline-delimited frame reads.

use crate::transport::FrameReader;

/// **VALUE**: Verifies frames are split on `\n` and returned without the terminator.
///
/// **BUG THIS CATCHES**: Would catch the newline leaking into the frame (breaking
/// JSON decoding of the next stage) or CRLF input keeping its `\r`.
#[tokio::test]
async fn given_several_lines_when_reading_then_yields_each_frame_without_terminator() {
    // GIVEN: Three lines, one CRLF-terminated and the last unterminated
    let input: &[u8] = b"{\"a\":1}\n{\"b\":2}\r\n{\"c\":3}";
    let mut reader = FrameReader::new(input, 1024);

    // WHEN/THEN: Each frame comes back in order
    assert_eq!(reader.next_frame().await.ok().flatten(), Some(b"{\"a\":1}".to_vec()));
    assert_eq!(reader.next_frame().await.ok().flatten(), Some(b"{\"b\":2}".to_vec()));
    assert_eq!(reader.next_frame().await.ok().flatten(), Some(b"{\"c\":3}".to_vec()));

    // AND: Clean EOF afterwards
    assert!(matches!(reader.next_frame().await, Ok(None)));
}

/// **VALUE**: Verifies a line over the limit is refused.
///
/// **WHY THIS MATTERS**: Without a cap a misbehaving broker could make the client buffer
/// an unbounded line.
///
/// **BUG THIS CATCHES**: Would catch the size check being skipped when the line spans
/// several buffer fills.
#[tokio::test]
async fn given_line_longer_than_limit_when_reading_then_returns_too_large() {
    // GIVEN: A 200-byte line and a 64-byte limit
    let mut input = vec![b'x'; 200];
    input.push(b'\n');
    let mut reader = FrameReader::new(input.as_slice(), 64);

    // WHEN: Reading
    let result = reader.next_frame().await;

    // THEN: Too large
    assert!(
        matches!(&result, Err(e) if e.is_too_large()),
        "Expected too-large error, got {result:?}"
    );
}

/// **VALUE**: Verifies the limit is inclusive.
///
/// **BUG THIS CATCHES**: Would catch an off-by-one that rejects a frame of exactly
/// `max_frame_bytes`.
#[tokio::test]
async fn given_line_exactly_at_limit_when_reading_then_accepted() {
    // GIVEN: A 64-byte line and a 64-byte limit
    let mut input = vec![b'y'; 64];
    input.push(b'\n');
    let mut reader = FrameReader::new(input.as_slice(), 64);

    // WHEN: Reading
    let frame = reader.next_frame().await;

    // THEN: Accepted intact
    assert_eq!(frame.ok().flatten().map(|f| f.len()), Some(64));
}

/// **VALUE**: Verifies empty input is a clean EOF, not an empty frame.
#[tokio::test]
async fn given_empty_input_when_reading_then_returns_none() {
    // GIVEN: No bytes
    let input: &[u8] = b"";
    let mut reader = FrameReader::new(input, 64);

    // WHEN/THEN: Clean EOF
    assert!(matches!(reader.next_frame().await, Ok(None)));
}
