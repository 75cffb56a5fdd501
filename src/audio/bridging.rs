//! # Audio Bridging Across Restarts
//!
//! A recognition session has a hard time limit, so an endless stream is really a
//! chain of sessions. When one session ends mid-speech, the words that were still
//! being spoken would be lost. To avoid that, every session keeps a log of the audio
//! it consumed; the next session starts by re-sending the tail of the previous log
//! that came after the last final result.
//!
//! ## The arithmetic:
//! The previous log is assumed to span the whole session time limit evenly, so each
//! chunk covers `limit / len` milliseconds. Chunks up to the last final result
//! (adjusted by the previous bridging offset) are skipped; the rest are replayed,
//! and their total duration becomes the new bridging offset, which is later
//! subtracted from result timestamps so they stay on the global timeline.

use bytes::{Bytes, BytesMut};
use std::mem;

/// What to replay at the start of the next session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgePlan {
    /// Leading chunks of the previous log that are not replayed
    pub chunks_to_skip: usize,
    /// Duration of the replayed audio, in milliseconds
    pub bridging_offset: i64,
}

/// Plan the replay from the previous session's log.
///
/// Returns `None` when there is nothing to bridge (empty log or zero time limit).
pub fn plan_bridge(
    previous_len: usize,
    session_time_limit_ms: i64,
    final_request_end_time: i64,
    bridging_offset: i64,
) -> Option<BridgePlan> {
    if previous_len == 0 || session_time_limit_ms <= 0 {
        return None;
    }

    let chunk_duration = session_time_limit_ms as f64 / previous_len as f64;
    let offset = clamp_offset(bridging_offset, final_request_end_time);

    let skip = ((final_request_end_time - offset) as f64 / chunk_duration).round();
    let chunks_to_skip = (skip.max(0.0) as usize).min(previous_len);
    let bridging_offset = ((previous_len - chunks_to_skip) as f64 * chunk_duration).round() as i64;

    Some(BridgePlan {
        chunks_to_skip,
        bridging_offset,
    })
}

/// Clamp a bridging offset into `[0, final_request_end_time]`.
pub fn clamp_offset(bridging_offset: i64, final_request_end_time: i64) -> i64 {
    bridging_offset.min(final_request_end_time).max(0)
}

/// Current and previous session audio logs.
///
/// Only audio consumed from the ingest queue is recorded. Bridged audio that is
/// replayed into a session is not recorded again.
#[derive(Debug, Default)]
pub struct BridgingBuffer {
    current: Vec<Bytes>,
    previous: Vec<Bytes>,
}

impl BridgingBuffer {
    pub fn record(&mut self, chunk: Bytes) {
        self.current.push(chunk);
    }

    pub fn reset_current(&mut self) {
        self.current.clear();
    }

    /// The current log becomes the previous one; the current log starts empty.
    pub fn rotate(&mut self) {
        self.previous = mem::take(&mut self.current);
    }

    pub fn current_len(&self) -> usize {
        self.current.len()
    }

    pub fn previous_len(&self) -> usize {
        self.previous.len()
    }

    /// Previous-log chunks selected by `plan`, joined into one buffer.
    pub fn bridge_audio(&self, plan: &BridgePlan) -> Option<Bytes> {
        let tail = self.previous.get(plan.chunks_to_skip..)?;
        if tail.is_empty() {
            return None;
        }
        Some(join_chunks(tail))
    }
}

/// Concatenate chunks in order into a single buffer.
pub fn join_chunks(chunks: &[Bytes]) -> Bytes {
    if let [single] = chunks {
        return single.clone();
    }

    let total = chunks.iter().map(Bytes::len).sum();
    let mut joined = BytesMut::with_capacity(total);
    for chunk in chunks {
        joined.extend_from_slice(chunk);
    }
    joined.freeze()
}
