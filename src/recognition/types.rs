//! # Recognition Types
//!
//! Plain data structures describing what we send to the remote speech recognizer
//! and what comes back from it. Nothing in here knows about a particular vendor SDK:
//! adapters (see `wire.rs`) translate provider payloads into these structs so the
//! streaming code never touches provider types.
//!
//! ## Time representation:
//! Providers report offsets as a whole-seconds part plus a sub-second remainder.
//! `EventDuration` keeps that split (seconds + microseconds) and converts to
//! integer milliseconds the same way everywhere: `seconds * 1000 + micros / 1000`,
//! truncated.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Audio encodings understood by the remote recognizer.
///
/// Serialized in the provider's SCREAMING_SNAKE_CASE naming (`LINEAR16`, `WEBM_OPUS`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioEncoding {
    WebmOpus,
    Linear16,
    Flac,
    OggOpus,
    Amr,
    AmrWb,
}

impl AudioEncoding {
    /// Parse an encoding name, accepting the short aliases clients commonly send.
    ///
    /// ## Accepted names (case-insensitive):
    /// - `webm`, `webm_opus` → WEBM_OPUS
    /// - `wav`, `linear16` → LINEAR16
    /// - `flac` → FLAC
    /// - `opus`, `ogg_opus` → OGG_OPUS
    /// - `amr` → AMR
    /// - `amr_wb` → AMR_WB
    ///
    /// Returns `None` for anything else so the caller can pick its own fallback.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "webm" | "webm_opus" => Some(AudioEncoding::WebmOpus),
            "wav" | "linear16" => Some(AudioEncoding::Linear16),
            "flac" => Some(AudioEncoding::Flac),
            "opus" | "ogg_opus" => Some(AudioEncoding::OggOpus),
            "amr" => Some(AudioEncoding::Amr),
            "amr_wb" => Some(AudioEncoding::AmrWb),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioEncoding::WebmOpus => "WEBM_OPUS",
            AudioEncoding::Linear16 => "LINEAR16",
            AudioEncoding::Flac => "FLAC",
            AudioEncoding::OggOpus => "OGG_OPUS",
            AudioEncoding::Amr => "AMR",
            AudioEncoding::AmrWb => "AMR_WB",
        }
    }
}

impl fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognition parameters for one stream.
///
/// Field names serialize in camelCase because this struct is sent to the
/// recognizer verbatim inside the streaming config message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionConfig {
    pub encoding: AudioEncoding,
    pub sample_rate_hertz: u32,
    pub language_code: String,
    pub max_alternatives: u32,
    pub enable_word_time_offsets: bool,
    pub enable_automatic_punctuation: bool,
    pub model: String,
}

/// Full configuration of a streaming recognition call.
///
/// Once a stream starts this value is frozen; every restart reuses the exact same config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingConfig {
    pub config: RecognitionConfig,
    pub interim_results: bool,
    pub single_utterance: bool,
}

/// A provider-reported offset, split into whole seconds and a microsecond remainder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventDuration {
    pub seconds: i64,
    pub micros: i64,
}

impl EventDuration {
    pub fn new(seconds: i64, micros: i64) -> Self {
        Self { seconds, micros }
    }

    #[cfg(test)]
    pub fn from_millis(millis: i64) -> Self {
        Self {
            seconds: millis / 1000,
            micros: (millis % 1000) * 1000,
        }
    }

    /// Integer milliseconds, truncating anything below one millisecond.
    pub fn as_millis(&self) -> i64 {
        self.seconds * 1000 + self.micros / 1000
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.seconds as f64 + self.micros as f64 / 1_000_000.0
    }
}

/// One recognized word with its offsets inside the session's audio.
#[derive(Debug, Clone, PartialEq)]
pub struct WordInfo {
    pub word: String,
    pub start_time: EventDuration,
    pub end_time: EventDuration,
}

/// One hypothesis for a result. Providers order alternatives by likelihood.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Alternative {
    pub transcript: String,
    /// 0.0 when the provider did not report a confidence
    pub confidence: f32,
    pub words: Vec<WordInfo>,
}

/// A single recognition result (interim or final).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecognitionResult {
    pub alternatives: Vec<Alternative>,
    pub is_final: bool,
    /// End of this result, measured from the start of the session's audio
    pub result_end_time: EventDuration,
}

/// Speech events a provider may attach to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeechEvent {
    #[default]
    Unspecified,
    EndOfSingleUtterance,
}

/// One message received from the remote recognizer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecognitionEvent {
    pub results: Vec<RecognitionResult>,
    pub speech_event: SpeechEvent,
}

#[cfg(test)]
impl RecognitionEvent {
    /// Single-result event with one alternative
    pub fn with_result(transcript: &str, is_final: bool, end_millis: i64) -> Self {
        Self {
            results: vec![RecognitionResult {
                alternatives: vec![Alternative {
                    transcript: transcript.to_string(),
                    confidence: if is_final { 0.9 } else { 0.0 },
                    words: Vec::new(),
                }],
                is_final,
                result_end_time: EventDuration::from_millis(end_millis),
            }],
            speech_event: SpeechEvent::Unspecified,
        }
    }
}

/// Failures surfaced by the remote recognition call.
///
/// Every variant ends the current call's event sequence. None of them is fatal
/// for an endless stream: the orchestrator reports them and restarts.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionError {
    /// Could not reach the recognizer, or the transport broke mid-stream
    Connection(String),

    /// The recognizer sent something we could not understand
    Protocol(String),

    /// The recognizer reported an error status
    Service { code: i32, message: String },
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionError::Connection(msg) => write!(f, "connection error: {}", msg),
            RecognitionError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            RecognitionError::Service { code, message } => {
                write!(f, "service error {}: {}", code, message)
            }
        }
    }
}

impl std::error::Error for RecognitionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_aliases() {
        assert_eq!(AudioEncoding::parse("wav"), Some(AudioEncoding::Linear16));
        assert_eq!(AudioEncoding::parse("LINEAR16"), Some(AudioEncoding::Linear16));
        assert_eq!(AudioEncoding::parse("webm"), Some(AudioEncoding::WebmOpus));
        assert_eq!(AudioEncoding::parse("Opus"), Some(AudioEncoding::OggOpus));
        assert_eq!(AudioEncoding::parse("amr_wb"), Some(AudioEncoding::AmrWb));
        assert_eq!(AudioEncoding::parse("mp3"), None);
    }

    #[test]
    fn test_encoding_wire_names() {
        let json = serde_json::to_string(&AudioEncoding::AmrWb).unwrap();
        assert_eq!(json, "\"AMR_WB\"");
        let json = serde_json::to_string(&AudioEncoding::Linear16).unwrap();
        assert_eq!(json, "\"LINEAR16\"");
    }

    #[test]
    fn test_duration_truncates_to_millis() {
        // 2s + 345_678us = 2345.678ms, truncated
        assert_eq!(EventDuration::new(2, 345_678).as_millis(), 2345);
        assert_eq!(EventDuration::from_millis(1500).as_millis(), 1500);
        assert!((EventDuration::new(1, 250_000).as_secs_f64() - 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_streaming_config_serializes_camel_case() {
        let config = StreamingConfig {
            config: RecognitionConfig {
                encoding: AudioEncoding::Linear16,
                sample_rate_hertz: 16000,
                language_code: "en-US".to_string(),
                max_alternatives: 1,
                enable_word_time_offsets: false,
                enable_automatic_punctuation: true,
                model: "latest_long".to_string(),
            },
            interim_results: true,
            single_utterance: false,
        };

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["config"]["sampleRateHertz"], 16000);
        assert_eq!(value["config"]["encoding"], "LINEAR16");
        assert_eq!(value["interimResults"], true);
        assert_eq!(value["singleUtterance"], false);
    }
}
