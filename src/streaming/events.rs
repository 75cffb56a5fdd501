//! # Stream Events
//!
//! Everything a running stream tells its consumer goes through `StreamEvent`:
//! lifecycle notices, interim and final transcripts, and errors. Events serialize
//! to the JSON shapes WebSocket clients receive, tagged by `"type"`.
//!
//! ## Delivery:
//! Streams never call the consumer's sink directly from recognition code. Events go
//! into an unbounded channel and a single forwarder task awaits the sink for each
//! one in turn, so a slow consumer never stalls the recognizer and events arrive
//! strictly in emission order.

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Word timing in seconds, relative to the session's audio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordTimestamp {
    pub word: String,
    #[serde(rename = "startTime")]
    pub start_time: f64,
    #[serde(rename = "endTime")]
    pub end_time: f64,
}

/// Transcript body shared by interim and final results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptPayload {
    pub transcript: String,
    pub confidence: f32,
    /// Result end time on the stream-wide timeline, in milliseconds (endless mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_count: Option<u32>,
    #[serde(rename = "wordTimestamps", skip_serializing_if = "Option::is_none")]
    pub word_timestamps: Option<Vec<WordTimestamp>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Emitted once when a stream begins running
    #[serde(rename = "streaming_started")]
    SessionStarted { message: String, restart_count: u32 },

    /// Emitted at the start of every recognition session, including the first
    #[serde(rename = "stream_restart")]
    RestartNotice {
        message: String,
        restart_count: u32,
        /// Milliseconds of stream time that precede this session
        time_offset: i64,
    },

    #[serde(rename = "interim_result")]
    Interim(TranscriptPayload),

    #[serde(rename = "final_result")]
    Final(TranscriptPayload),

    /// The recognizer detected the end of a single utterance
    EndOfUtterance,

    /// A recognition session failed; endless streams restart after this
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        restart_count: Option<u32>,
    },

    /// The stream could not run at all
    FatalError { message: String },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::SessionStarted { .. } => "streaming_started",
            StreamEvent::RestartNotice { .. } => "stream_restart",
            StreamEvent::Interim(_) => "interim_result",
            StreamEvent::Final(_) => "final_result",
            StreamEvent::EndOfUtterance => "end_of_utterance",
            StreamEvent::Error { .. } => "error",
            StreamEvent::FatalError { .. } => "fatal_error",
        }
    }
}

/// Consumer callback for stream events.
///
/// Awaited once per event, one event at a time.
pub type ResultSink =
    Arc<dyn Fn(StreamEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Wrap an async closure as a `ResultSink`.
pub fn result_sink<F, Fut>(f: F) -> ResultSink
where
    F: Fn(StreamEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Handle used by stream code to emit events.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl EventEmitter {
    pub fn emit(&self, event: StreamEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            warn!("Dropping {} event, forwarder is gone", kind);
        }
    }
}

/// Task that delivers events to a sink, strictly in order.
pub struct EventForwarder {
    emitter: EventEmitter,
    task: JoinHandle<()>,
}

impl EventForwarder {
    pub fn spawn(sink: ResultSink) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<StreamEvent>();

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                debug!("Delivering {} event", event.kind());
                sink(event).await;
            }
        });

        Self {
            emitter: EventEmitter { tx },
            task,
        }
    }

    pub fn emitter(&self) -> EventEmitter {
        self.emitter.clone()
    }

    /// Deliver whatever is still queued, then stop.
    ///
    /// Every emitter clone must be dropped first or this never returns.
    pub async fn finish(self) {
        drop(self.emitter);
        if let Err(e) = self.task.await {
            warn!("Event forwarder ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn payload(transcript: &str) -> TranscriptPayload {
        TranscriptPayload {
            transcript: transcript.to_string(),
            confidence: 0.5,
            corrected_time: Some(1300),
            restart_count: Some(1),
            word_timestamps: None,
        }
    }

    #[test]
    fn test_final_result_json_shape() {
        let value = serde_json::to_value(StreamEvent::Final(payload("hello"))).unwrap();
        assert_eq!(value["type"], "final_result");
        assert_eq!(value["transcript"], "hello");
        assert_eq!(value["corrected_time"], 1300);
        assert_eq!(value["restart_count"], 1);
        assert!(value.get("wordTimestamps").is_none());
    }

    #[test]
    fn test_word_timestamps_json_shape() {
        let mut body = payload("hi");
        body.word_timestamps = Some(vec![WordTimestamp {
            word: "hi".to_string(),
            start_time: 0.1,
            end_time: 0.4,
        }]);
        let value = serde_json::to_value(StreamEvent::Final(body)).unwrap();
        assert_eq!(value["wordTimestamps"][0]["word"], "hi");
        assert_eq!(value["wordTimestamps"][0]["startTime"], 0.1);
    }

    #[test]
    fn test_lifecycle_event_json_shapes() {
        let value = serde_json::to_value(StreamEvent::RestartNotice {
            message: "Stream restart #2".to_string(),
            restart_count: 2,
            time_offset: 480_000,
        })
        .unwrap();
        assert_eq!(value["type"], "stream_restart");
        assert_eq!(value["time_offset"], 480_000);

        let value = serde_json::to_value(StreamEvent::EndOfUtterance).unwrap();
        assert_eq!(value, serde_json::json!({"type": "end_of_utterance"}));

        let value = serde_json::to_value(StreamEvent::Error {
            message: "boom".to_string(),
            restart_count: None,
        })
        .unwrap();
        assert_eq!(value, serde_json::json!({"type": "error", "message": "boom"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwarder_preserves_order_with_slow_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink = result_sink(move |event: StreamEvent| {
            let seen = sink_seen.clone();
            async move {
                // First event is slowest; order must still hold
                if let StreamEvent::Interim(p) = &event {
                    if p.transcript == "a" {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
                seen.lock().unwrap().push(event);
            }
        });

        let forwarder = EventForwarder::spawn(sink);
        let emitter = forwarder.emitter();
        for t in ["a", "b", "c"] {
            emitter.emit(StreamEvent::Interim(payload(t)));
        }
        drop(emitter);
        forwarder.finish().await;

        let transcripts: Vec<String> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                StreamEvent::Interim(p) => p.transcript.clone(),
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(transcripts, vec!["a", "b", "c"]);
    }
}
