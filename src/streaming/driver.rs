//! # Session Driver
//!
//! Runs exactly one recognition session of an endless stream:
//!
//! 1. Replay the bridged tail of the previous session's audio, if this is a new session
//! 2. Open the remote call and feed it live audio from the ingest queue
//! 3. Turn each recognition event into an interim/final result on the global timeline
//! 4. Return when the time limit hits, the recognizer closes, the stream is stopped,
//!    or the recognizer fails
//!
//! Everything the driver touches (timeline state, audio logs, the queue) is owned
//! by the orchestrator and lent to the driver for the duration of one session.
//!
//! ## Rust Concepts Used:
//! - **tokio::select! (biased)**: One loop waits on the deadline, the recognizer, and
//!   the audio queue at once; the deadline is always checked first
//! - **Borrowed context struct**: `SessionDriver<'a>` holds `&mut` borrows instead of
//!   shared ownership, so nothing outlives the session by accident

use crate::audio::bridging::{join_chunks, plan_bridge, BridgingBuffer};
use crate::audio::queue::{AudioQueueReceiver, Pull};
use crate::recognition::{RecognitionError, RecognitionEvent, SpeechRecognizer, StreamingConfig};
use crate::streaming::events::{EventEmitter, StreamEvent, TranscriptPayload, WordTimestamp};
use crate::streaming::state::{SessionState, StreamLimits};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    TimeLimitReached,
    /// The recognizer ended its event sequence on its own
    RemoteClosed,
    Stopped,
}

pub struct SessionDriver<'a> {
    pub recognizer: &'a dyn SpeechRecognizer,
    pub config: &'a StreamingConfig,
    pub limits: &'a StreamLimits,
    pub state: &'a mut SessionState,
    pub audio: &'a mut BridgingBuffer,
    pub queue: &'a mut AudioQueueReceiver,
    pub events: &'a EventEmitter,
}

impl SessionDriver<'_> {
    pub async fn run(mut self) -> Result<SessionOutcome, RecognitionError> {
        let (audio_tx, audio_rx) = mpsc::unbounded_channel::<Bytes>();

        // Bridged audio is queued before the call opens so it is sent first
        if self.state.new_stream {
            self.send_bridge(&audio_tx);
            self.state.new_stream = false;
        }

        let mut responses = self
            .recognizer
            .streaming_recognize(self.config.clone(), UnboundedReceiverStream::new(audio_rx).boxed());

        let pull_timeout = self.limits.pull_timeout;
        let deadline = tokio::time::sleep_until(self.state.session_deadline());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = &mut deadline => {
                    info!(
                        "Session {} reached the {:?} time limit",
                        self.state.restart_counter, self.limits.session_time_limit
                    );
                    return Ok(SessionOutcome::TimeLimitReached);
                }

                response = responses.next() => match response {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(err)) => return Err(err),
                    None => {
                        debug!("Recognizer closed session {}", self.state.restart_counter);
                        return Ok(SessionOutcome::RemoteClosed);
                    }
                },

                pulled = self.queue.pull(pull_timeout) => match pulled {
                    Pull::Chunk(first) => {
                        let mut batch = vec![first];
                        self.queue.drain_ready(&mut batch);
                        self.forward_audio(&audio_tx, batch);
                    }
                    Pull::Timeout => {}
                    Pull::Closed => return Ok(SessionOutcome::Stopped),
                },
            }
        }
    }

    fn send_bridge(&mut self, audio_tx: &mpsc::UnboundedSender<Bytes>) {
        let Some(plan) = plan_bridge(
            self.audio.previous_len(),
            self.limits.session_time_limit_ms(),
            self.state.final_request_end_time,
            self.state.bridging_offset,
        ) else {
            return;
        };

        self.state.apply_bridge(&plan);

        if let Some(bridge) = self.audio.bridge_audio(&plan) {
            debug!(
                "Replaying {} of {} chunks ({} bytes, {}ms) into session {}",
                self.audio.previous_len() - plan.chunks_to_skip,
                self.audio.previous_len(),
                bridge.len(),
                plan.bridging_offset,
                self.state.restart_counter
            );
            // Receiver is alive until the call is opened just below
            let _ = audio_tx.send(bridge);
        }
    }

    fn forward_audio(&mut self, audio_tx: &mpsc::UnboundedSender<Bytes>, batch: Vec<Bytes>) {
        let joined = join_chunks(&batch);
        for chunk in batch {
            self.audio.record(chunk);
        }

        if audio_tx.send(joined).is_err() {
            debug!("Recognizer stopped accepting audio");
        }
    }

    fn handle_event(&mut self, event: RecognitionEvent) {
        // Only the top alternative of the first result is reported
        let Some(result) = event.results.into_iter().next() else {
            return;
        };
        let Some(alternative) = result.alternatives.into_iter().next() else {
            return;
        };

        let corrected_time = self.state.record_result(result.result_end_time, result.is_final);
        let restart_count = self.state.restart_counter;

        if result.is_final {
            let word_timestamps = if self.config.config.enable_word_time_offsets
                && !alternative.words.is_empty()
            {
                Some(
                    alternative
                        .words
                        .iter()
                        .map(|w| WordTimestamp {
                            word: w.word.clone(),
                            start_time: w.start_time.as_secs_f64(),
                            end_time: w.end_time.as_secs_f64(),
                        })
                        .collect(),
                )
            } else {
                None
            };

            info!(
                "Final result at {}ms (session {}): {}",
                corrected_time, restart_count, alternative.transcript
            );
            self.events.emit(StreamEvent::Final(TranscriptPayload {
                transcript: alternative.transcript,
                confidence: alternative.confidence,
                corrected_time: Some(corrected_time),
                restart_count: Some(restart_count),
                word_timestamps,
            }));
        } else {
            debug!("Interim result at {}ms: {}", corrected_time, alternative.transcript);
            self.events.emit(StreamEvent::Interim(TranscriptPayload {
                transcript: alternative.transcript,
                confidence: alternative.confidence,
                corrected_time: Some(corrected_time),
                restart_count: Some(restart_count),
                word_timestamps: None,
            }));
        }
    }
}
