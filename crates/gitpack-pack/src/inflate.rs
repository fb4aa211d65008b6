//! Zlib payload inflation without a stored compressed length.
//!
//! Pack entries record the inflated size but not how many compressed bytes
//! follow the header. The decompressor guesses a window, reads that many raw
//! bytes, and grows the window when the stream has not ended yet.

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{PackError, PackResult};
use crate::io::PackHandle;

/// Bytes added to the window after each attempt that ran out of room.
pub const DEFAULT_INFLATE_GROWTH: usize = 128;

/// Upper bound on deflate's expansion of its input, plus slack for the
/// zlib header and trailer.
const MAX_DEFLATE_RATIO: usize = 1032;
const RATIO_SLACK: usize = 64;

/// Most output that `input_len` compressed bytes can inflate to.
fn output_bound(input_len: usize) -> usize {
    input_len
        .saturating_mul(MAX_DEFLATE_RATIO)
        .saturating_add(RATIO_SLACK)
}

/// First window size tried for an entry declaring `declared_size` bytes.
pub fn initial_window(declared_size: u64) -> usize {
    usize::try_from(declared_size)
        .unwrap_or(usize::MAX)
        .saturating_mul(2)
        .saturating_add(32)
}

/// Outcome of one inflate attempt over a fixed window.
#[derive(Debug, PartialEq, Eq)]
pub enum Attempt {
    /// The zlib stream ended inside the window.
    Complete(Vec<u8>),
    /// The output buffer filled up before the stream ended.
    OutputFull,
    /// Every input byte was consumed before the stream ended.
    InputExhausted,
}

/// Inflate `input` into at most `capacity` output bytes.
///
/// Corrupt zlib data is an error; running out of output space or input is
/// reported as [`Attempt::OutputFull`] or [`Attempt::InputExhausted`].
pub fn inflate_window(input: &[u8], capacity: usize, offset: u64) -> PackResult<Attempt> {
    let mut out = Vec::with_capacity(capacity);
    let mut stream = Decompress::new(true);
    match stream.decompress_vec(input, &mut out, FlushDecompress::Finish) {
        Ok(Status::StreamEnd) => Ok(Attempt::Complete(out)),
        Ok(Status::Ok) | Ok(Status::BufError) if out.len() >= capacity => Ok(Attempt::OutputFull),
        Ok(Status::Ok) | Ok(Status::BufError) => Ok(Attempt::InputExhausted),
        Err(e) => Err(PackError::Decompression {
            offset,
            reason: e.to_string(),
        }),
    }
}

/// Inflate the zlib stream starting at `offset` in `handle`.
///
/// Each attempt reads up to `window` raw bytes and allows `window` output
/// bytes, starting at `initial_window(declared_size)` and growing by
/// `growth`. The output allowance never exceeds what the bytes actually
/// read could inflate to, so a corrupt declared size costs nothing. A short
/// read means the file ended; if the input then runs out before the stream
/// does, the payload is truncated.
pub async fn inflate_at(
    handle: &mut dyn PackHandle,
    offset: u64,
    declared_size: u64,
    growth: usize,
) -> PackResult<Vec<u8>> {
    let growth = growth.max(1);
    let mut window = initial_window(declared_size);
    loop {
        let input = handle.read_at(offset, window).await?;
        let capacity = window.min(output_bound(input.len()));
        match inflate_window(&input, capacity, offset)? {
            Attempt::Complete(out) => return Ok(out),
            Attempt::OutputFull if capacity < window => {
                return Err(PackError::Decompression {
                    offset,
                    reason: format!(
                        "{} compressed bytes inflate past {capacity} bytes",
                        input.len()
                    ),
                });
            }
            Attempt::InputExhausted if input.len() < window => {
                return Err(PackError::TruncatedPayload {
                    offset,
                    read: input.len(),
                });
            }
            Attempt::OutputFull | Attempt::InputExhausted => {
                tracing::trace!(offset, window, "inflate window too small, growing");
                window = window.saturating_add(growth);
            }
        }
    }
}
