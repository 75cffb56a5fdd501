//! Client-facing streaming options and their translation into a `StreamingConfig`.
//!
//! Clients send a loose JSON object (camelCase keys, every field optional). Missing
//! fields take per-mode defaults; unknown encodings fall back to the mode's default
//! encoding rather than failing.

use crate::error::StreamError;
use crate::recognition::{AudioEncoding, RecognitionConfig, StreamingConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which kind of stream a connection runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamMode {
    /// Unbounded duration, restarted transparently every session time limit
    #[serde(rename = "endless_streaming")]
    Endless,
    /// One recognition session, optionally ending at the first utterance
    #[serde(rename = "streaming")]
    Single,
}

impl StreamMode {
    pub fn default_encoding(&self) -> AudioEncoding {
        match self {
            StreamMode::Endless => AudioEncoding::Linear16,
            StreamMode::Single => AudioEncoding::WebmOpus,
        }
    }

    pub fn default_sample_rate(&self) -> u32 {
        match self {
            StreamMode::Endless => 16000,
            StreamMode::Single => 48000,
        }
    }
}

/// Options as sent by a client, e.g.
/// `{"encoding": "wav", "sampleRateHertz": 16000, "languageCode": "de-DE"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingOptions {
    pub encoding: Option<String>,
    pub sample_rate_hertz: Option<i64>,
    pub language_code: Option<String>,
    pub interim_results: Option<bool>,
    pub enable_word_time_offsets: Option<bool>,
    pub max_alternatives: Option<i64>,
    pub enable_automatic_punctuation: Option<bool>,
    pub model: Option<String>,
    /// Ignored by endless streams
    pub single_utterance: Option<bool>,
}

impl StreamingOptions {
    /// Resolve defaults and validate.
    ///
    /// ## Validation:
    /// - `sampleRateHertz` must be positive
    /// - `maxAlternatives` must be at least 1
    pub fn into_config(self, mode: StreamMode) -> Result<StreamingConfig, StreamError> {
        let encoding = match self.encoding.as_deref() {
            None => mode.default_encoding(),
            Some(name) => AudioEncoding::parse(name).unwrap_or_else(|| {
                warn!(
                    "Unknown encoding {:?}, falling back to {}",
                    name,
                    mode.default_encoding()
                );
                mode.default_encoding()
            }),
        };

        let sample_rate_hertz = match self.sample_rate_hertz {
            None => mode.default_sample_rate(),
            Some(rate) if rate > 0 => u32::try_from(rate).map_err(|_| {
                StreamError::InvalidConfig(format!("sampleRateHertz {} is out of range", rate))
            })?,
            Some(rate) => {
                return Err(StreamError::InvalidConfig(format!(
                    "sampleRateHertz must be positive, got {}",
                    rate
                )))
            }
        };

        let max_alternatives = match self.max_alternatives {
            None => 1,
            Some(n) if n >= 1 => u32::try_from(n).map_err(|_| {
                StreamError::InvalidConfig(format!("maxAlternatives {} is out of range", n))
            })?,
            Some(n) => {
                return Err(StreamError::InvalidConfig(format!(
                    "maxAlternatives must be at least 1, got {}",
                    n
                )))
            }
        };

        let single_utterance = match mode {
            StreamMode::Endless => false,
            StreamMode::Single => self.single_utterance.unwrap_or(false),
        };

        Ok(StreamingConfig {
            config: RecognitionConfig {
                encoding,
                sample_rate_hertz,
                language_code: self.language_code.unwrap_or_else(|| "en-US".to_string()),
                max_alternatives,
                enable_word_time_offsets: self.enable_word_time_offsets.unwrap_or(false),
                enable_automatic_punctuation: self.enable_automatic_punctuation.unwrap_or(true),
                model: self.model.unwrap_or_else(|| "latest_long".to_string()),
            },
            interim_results: self.interim_results.unwrap_or(true),
            single_utterance,
        })
    }
}
