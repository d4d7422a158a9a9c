use crate::error::frame::FrameError;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;

/// Reads newline-terminated frames, refusing any line longer than
/// `max_frame_bytes`.
///
/// The line is accumulated incrementally, so an oversized frame is detected
/// as soon as the limit is crossed instead of after buffering the whole line.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    max_frame_bytes: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_bytes: usize) -> Self {
        let capacity = INITIAL_BUFFER_CAPACITY.min(max_frame_bytes.max(1));
        Self {
            reader: BufReader::with_capacity(capacity, inner),
            max_frame_bytes,
        }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Next frame without its line terminator, or `None` at a clean EOF.
    ///
    /// A final line that ends at EOF without a newline is still returned.
    ///
    /// # Errors
    ///
    /// - [`FrameError::TooLarge`] if the line exceeds the limit. The reader
    ///   is left mid-line and must not be used again.
    /// - [`FrameError::Read`] on an I/O failure.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut line = Vec::new();

        loop {
            let available = self.reader.fill_buf().await?;

            if available.is_empty() {
                return Ok(if line.is_empty() {
                    None
                } else {
                    Some(trim_carriage_return(line))
                });
            }

            match available.iter().position(|byte| *byte == b'\n') {
                Some(newline) => {
                    if line.len() + newline > self.max_frame_bytes {
                        return Err(FrameError::too_large(self.max_frame_bytes));
                    }
                    line.extend_from_slice(&available[..newline]);
                    self.reader.consume(newline + 1);
                    return Ok(Some(trim_carriage_return(line)));
                }
                None => {
                    let chunk = available.len();
                    if line.len() + chunk > self.max_frame_bytes {
                        return Err(FrameError::too_large(self.max_frame_bytes));
                    }
                    line.extend_from_slice(available);
                    self.reader.consume(chunk);
                }
            }
        }
    }
}

fn trim_carriage_return(mut line: Vec<u8>) -> Vec<u8> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    line
}
