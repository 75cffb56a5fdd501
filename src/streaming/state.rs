//! # Session Timeline State
//!
//! Bookkeeping that survives across the recognition sessions of one endless stream.
//! Each session reports result times relative to its own audio; this state turns
//! those into times on a single stream-wide timeline.
//!
//! ## The correction:
//! ```text
//! corrected_time = result_end_time - bridging_offset + session_time_limit * restart_counter
//! ```
//! - `session_time_limit * restart_counter`: time covered by earlier sessions
//! - `bridging_offset`: replayed audio at the start of this session, which the
//!   recognizer counts again but which already happened on the global timeline

use crate::audio::bridging::BridgePlan;
use crate::config::StreamingSettings;
use crate::recognition::EventDuration;
use std::time::Duration;
use tokio::time::Instant;

/// Timing parameters of an endless stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    pub session_time_limit: Duration,
    pub restart_pause: Duration,
    pub pull_timeout: Duration,
}

impl StreamLimits {
    pub fn session_time_limit_ms(&self) -> i64 {
        self.session_time_limit.as_millis() as i64
    }
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            session_time_limit: Duration::from_millis(240_000),
            restart_pause: Duration::from_millis(100),
            pull_timeout: Duration::from_millis(100),
        }
    }
}

impl From<&StreamingSettings> for StreamLimits {
    fn from(settings: &StreamingSettings) -> Self {
        Self {
            session_time_limit: settings.session_time_limit(),
            restart_pause: settings.restart_pause(),
            pull_timeout: settings.pull_timeout(),
        }
    }
}

#[derive(Debug)]
pub struct SessionState {
    session_time_limit_ms: i64,
    /// Number of completed sessions
    pub restart_counter: u32,
    pub stream_start_time: Instant,
    /// End of the latest result in the current session (ms, session-relative)
    pub result_end_time: i64,
    /// End of the latest final result in the current session
    pub is_final_end_time: i64,
    /// End of the last final result of the previous session; drives bridging
    pub final_request_end_time: i64,
    /// Duration of audio replayed at the start of the current session
    pub bridging_offset: i64,
    /// Set between sessions; the next session replays audio before live input
    pub new_stream: bool,
    final_in_session: bool,
    sessions_started: u32,
}

impl SessionState {
    pub fn new(session_time_limit_ms: i64) -> Self {
        Self {
            session_time_limit_ms,
            restart_counter: 0,
            stream_start_time: Instant::now(),
            result_end_time: 0,
            is_final_end_time: 0,
            final_request_end_time: 0,
            bridging_offset: 0,
            new_stream: true,
            final_in_session: false,
            sessions_started: 0,
        }
    }

    /// Stream time that precedes the current session.
    pub fn time_offset(&self) -> i64 {
        self.session_time_limit_ms * self.restart_counter as i64
    }

    pub fn begin_session(&mut self) {
        self.stream_start_time = Instant::now();
        self.sessions_started += 1;
    }

    /// Sessions actually opened. Differs from `restart_counter + 1` when the
    /// stream stops between `finish_session` and the next `begin_session`.
    pub fn sessions_started(&self) -> u32 {
        self.sessions_started
    }

    pub fn session_deadline(&self) -> Instant {
        self.stream_start_time + Duration::from_millis(self.session_time_limit_ms.max(0) as u64)
    }

    pub fn apply_bridge(&mut self, plan: &BridgePlan) {
        self.bridging_offset = plan.bridging_offset;
    }

    /// Record a result's end time and return it on the stream-wide timeline.
    pub fn record_result(&mut self, end_time: EventDuration, is_final: bool) -> i64 {
        self.result_end_time = end_time.as_millis();
        if is_final {
            self.is_final_end_time = self.result_end_time;
            self.final_in_session = true;
        }
        self.corrected_time()
    }

    pub fn corrected_time(&self) -> i64 {
        self.result_end_time - self.bridging_offset + self.time_offset()
    }

    /// Transition to the next session.
    ///
    /// The last final's end time carries forward only if this session produced a
    /// final; otherwise the previous value is kept.
    pub fn finish_session(&mut self) {
        if self.final_in_session {
            self.final_request_end_time = self.is_final_end_time;
        }
        self.result_end_time = 0;
        self.final_in_session = false;
        self.restart_counter += 1;
        self.new_stream = true;
    }
}
