//! # Endless Stream Orchestrator
//!
//! Presents one unbounded recognition stream on top of a recognizer whose sessions
//! have a hard duration cap. The orchestrator runs sessions back to back; between
//! sessions it carries timeline state forward and rotates the audio logs so the
//! next session can replay speech that was cut off.
//!
//! ## Lifecycle:
//! ```text
//! new() -> configure() -> run(sink)     handle().add_audio(..) / handle().stop()
//!                           |
//!                           +-- streaming_started
//!                           +-- loop until stopped:
//!                                 stream_restart  -> session (interim/final results)
//!                                 error?          -> reported, not fatal
//!                                 carry state, rotate audio, pause
//! ```
//!
//! ## Usage:
//! ```rust,ignore
//! let mut stream = EndlessStream::new(recognizer, StreamLimits::default());
//! stream.configure(options)?;
//! let handle = stream.handle();
//! tokio::spawn(stream.run(sink));
//! handle.add_audio(chunk);
//! handle.stop();
//! ```

use crate::audio::bridging::BridgingBuffer;
use crate::audio::queue::AudioQueueReceiver;
use crate::error::StreamError;
use crate::recognition::{SpeechRecognizer, StreamingConfig};
use crate::streaming::driver::{SessionDriver, SessionOutcome};
use crate::streaming::events::{EventEmitter, EventForwarder, ResultSink, StreamEvent};
use crate::streaming::handle::StreamHandle;
use crate::streaming::options::{StreamMode, StreamingOptions};
use crate::streaming::state::{SessionState, StreamLimits};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct EndlessStream {
    recognizer: Arc<dyn SpeechRecognizer>,
    limits: StreamLimits,
    config: Option<StreamingConfig>,
    handle: StreamHandle,
    queue: AudioQueueReceiver,
}

impl EndlessStream {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, limits: StreamLimits) -> Self {
        let (handle, queue) = StreamHandle::new();
        Self {
            recognizer,
            limits,
            config: None,
            handle,
            queue,
        }
    }

    /// Validate options and freeze the recognition config used by every session.
    pub fn configure(&mut self, options: StreamingOptions) -> Result<(), StreamError> {
        let config = options.into_config(StreamMode::Endless)?;
        info!(
            "Endless stream configured: {} @ {}Hz, {}",
            config.config.encoding, config.config.sample_rate_hertz, config.config.language_code
        );
        self.config = Some(config);
        Ok(())
    }

    pub fn config(&self) -> Option<&StreamingConfig> {
        self.config.as_ref()
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    /// Run sessions until stopped, delivering events to `sink` in order.
    ///
    /// Returns `Err(NotConfigured)` (after emitting a `fatal_error`) if
    /// `configure` never succeeded. Remote failures are reported as `error`
    /// events and do not end the stream.
    pub async fn run(mut self, sink: ResultSink) -> Result<(), StreamError> {
        let forwarder = EventForwarder::spawn(sink);
        let events = forwarder.emitter();

        let result = self.run_sessions(&events).await;
        self.handle.set_running(false);

        drop(events);
        forwarder.finish().await;
        result
    }

    async fn run_sessions(&mut self, events: &EventEmitter) -> Result<(), StreamError> {
        let Some(config) = self.config.clone() else {
            error!("Endless stream started without configuration");
            events.emit(StreamEvent::FatalError {
                message: StreamError::NotConfigured.to_string(),
            });
            return Err(StreamError::NotConfigured);
        };

        self.handle.set_running(true);
        let mut state = SessionState::new(self.limits.session_time_limit_ms());
        let mut audio = BridgingBuffer::default();

        info!("Starting endless streaming recognition via {}", self.recognizer.name());
        events.emit(StreamEvent::SessionStarted {
            message: "Endless streaming started".to_string(),
            restart_count: state.restart_counter,
        });

        while !self.queue.is_stopped() {
            state.begin_session();
            events.emit(StreamEvent::RestartNotice {
                message: format!("Stream restart #{}", state.restart_counter),
                restart_count: state.restart_counter,
                time_offset: state.time_offset(),
            });
            audio.reset_current();

            let outcome = SessionDriver {
                recognizer: self.recognizer.as_ref(),
                config: &config,
                limits: &self.limits,
                state: &mut state,
                audio: &mut audio,
                queue: &mut self.queue,
                events,
            }
            .run()
            .await;

            match outcome {
                Ok(SessionOutcome::Stopped) => break,
                Ok(SessionOutcome::TimeLimitReached) => {
                    info!(
                        "Rotating session {} after {} chunk(s)",
                        state.restart_counter,
                        audio.current_len()
                    )
                }
                Ok(SessionOutcome::RemoteClosed) => {
                    info!("Recognizer ended session {}, restarting", state.restart_counter)
                }
                Err(err) => {
                    warn!("Session {} failed: {}", state.restart_counter, err);
                    events.emit(StreamEvent::Error {
                        message: StreamError::Remote(err).to_string(),
                        restart_count: Some(state.restart_counter),
                    });
                }
            }

            if self.queue.is_stopped() {
                break;
            }

            state.finish_session();
            audio.rotate();

            tokio::select! {
                _ = tokio::time::sleep(self.limits.restart_pause) => {}
                _ = self.queue.stopped() => break,
            }
        }

        info!(
            "Endless stream stopped after {} session(s)",
            state.sessions_started()
        );
        Ok(())
    }
}
