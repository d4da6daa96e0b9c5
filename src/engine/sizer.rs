//! Adaptive transfer sizing for the download phase.

use super::{MAX_CHUNK_BYTES, MIN_CHUNK_BYTES, TARGET_DURATION_MS};

/// Next round's payload size from the previous round's elapsed time.
/// Scales by target/actual so each round converges on the target transfer
/// window; a round that ran long shrinks the next payload, a round that
/// finished early grows it. Non-positive elapsed leaves the size alone.
pub fn next_chunk_size(elapsed_ms: f64, current_bytes: u64) -> u64 {
    if elapsed_ms <= 0.0 {
        return current_bytes;
    }
    let scaled = (TARGET_DURATION_MS / elapsed_ms * current_bytes as f64).round();
    (scaled as u64).clamp(MIN_CHUNK_BYTES, MAX_CHUNK_BYTES)
}
