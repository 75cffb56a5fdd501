//! # Batch Transcription
//!
//! `POST /api/v1/stt` transcribes a complete recording sent as base64 in a JSON body.
//! The recording goes through the same remote recognizer as live streams: one
//! call in single-utterance mode without interim results, whose final results are
//! joined into one transcription.
//!
//! ## Request:
//! ```json
//! {
//!   "audio_data": "<base64>",
//!   "format": "wav",
//!   "language": "en-US",
//!   "sample_rate": 16000,
//!   "enable_word_timestamps": true,
//!   "enable_automatic_punctuation": true,
//!   "model": "latest_long"
//! }
//! ```
//! Only `audio_data` is required.

use crate::error::{AppError, AppResult, StreamError};
use crate::recognition::{
    AudioEncoding, AudioStream, EventStream, RecognitionConfig, StreamingConfig,
};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::ops::RangeInclusive;
use tracing::{info, warn};

/// `mp3` has no matching recognizer encoding and is rejected.
const SUPPORTED_FORMATS: [&str; 4] = ["webm", "wav", "flac", "opus"];
const SUPPORTED_MODELS: [&str; 4] = ["latest_long", "latest_short", "phone_call", "video"];
const SAMPLE_RATE_RANGE: RangeInclusive<i64> = 8000..=48000;

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    pub audio_data: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub enable_word_timestamps: bool,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: i64,
    #[serde(default = "default_punctuation")]
    pub enable_automatic_punctuation: bool,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_format() -> String {
    "webm".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_sample_rate() -> i64 {
    48_000
}

fn default_punctuation() -> bool {
    true
}

fn default_model() -> String {
    "latest_long".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordTiming {
    pub word: String,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcription {
    pub transcription: String,
    /// Mean confidence of the final results
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_timestamps: Option<Vec<WordTiming>>,
}

impl TranscribeRequest {
    /// Validate the request and build the recognition config for it.
    fn streaming_config(&self) -> AppResult<StreamingConfig> {
        let format = self.format.trim().to_ascii_lowercase();
        let encoding = SUPPORTED_FORMATS
            .contains(&format.as_str())
            .then(|| AudioEncoding::parse(&format))
            .flatten()
            .ok_or_else(|| {
                AppError::ValidationError(format!("Unsupported audio format: {}", self.format))
            })?;

        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate) {
            return Err(AppError::ValidationError(
                "Sample rate must be between 8000 and 48000 Hz".to_string(),
            ));
        }

        if self.language.trim().is_empty() {
            return Err(AppError::ValidationError("Language code is required".to_string()));
        }

        if !SUPPORTED_MODELS.contains(&self.model.as_str()) {
            return Err(AppError::ValidationError(format!(
                "Unsupported recognition model: {}",
                self.model
            )));
        }

        Ok(StreamingConfig {
            config: RecognitionConfig {
                encoding,
                sample_rate_hertz: self.sample_rate as u32,
                language_code: self.language.trim().to_string(),
                max_alternatives: 1,
                enable_word_time_offsets: self.enable_word_timestamps,
                enable_automatic_punctuation: self.enable_automatic_punctuation,
                model: self.model.clone(),
            },
            interim_results: false,
            single_utterance: true,
        })
    }

    fn decode_audio(&self, max_bytes: usize) -> AppResult<Bytes> {
        let encoded = self.audio_data.trim();
        if encoded.is_empty() {
            return Err(AppError::ValidationError("Audio data cannot be empty".to_string()));
        }

        let audio = BASE64
            .decode(encoded)
            .map_err(|e| AppError::BadRequest(format!("Audio data decoding error: {}", e)))?;

        if audio.is_empty() {
            return Err(AppError::ValidationError("Audio data cannot be empty".to_string()));
        }
        if audio.len() > max_bytes {
            return Err(AppError::ValidationError(format!(
                "Audio is {} bytes, the limit is {}",
                audio.len(),
                max_bytes
            )));
        }

        Ok(Bytes::from(audio))
    }
}

/// Split a recording into chunks of at most `chunk_bytes` without copying.
fn audio_chunks(audio: Bytes, chunk_bytes: usize) -> AudioStream {
    let chunk_bytes = chunk_bytes.max(1);
    let chunks: Vec<Bytes> = (0..audio.len())
        .step_by(chunk_bytes)
        .map(|start| audio.slice(start..(start + chunk_bytes).min(audio.len())))
        .collect();
    stream::iter(chunks).boxed()
}

/// Drain a recognition call, keeping only final results.
///
/// Returns `None` when the recognizer produced no final transcript.
async fn collect_finals(
    mut events: EventStream,
    include_words: bool,
) -> Result<Option<Transcription>, StreamError> {
    let mut transcripts = Vec::new();
    let mut confidence_sum = 0.0f32;
    let mut words = Vec::new();

    while let Some(event) = events.next().await {
        for result in event?.results.into_iter().filter(|r| r.is_final) {
            let Some(alternative) = result.alternatives.into_iter().next() else {
                continue;
            };
            let transcript = alternative.transcript.trim();
            if transcript.is_empty() {
                continue;
            }

            if include_words {
                words.extend(alternative.words.iter().map(|w| WordTiming {
                    word: w.word.clone(),
                    start_time: w.start_time.as_secs_f64(),
                    end_time: w.end_time.as_secs_f64(),
                }));
            }
            confidence_sum += alternative.confidence;
            transcripts.push(transcript.to_string());
        }
    }

    if transcripts.is_empty() {
        return Ok(None);
    }

    Ok(Some(Transcription {
        confidence: (confidence_sum / transcripts.len() as f32).clamp(0.0, 1.0),
        transcription: transcripts.join(" "),
        word_timestamps: (include_words && !words.is_empty()).then_some(words),
    }))
}

pub async fn transcribe(
    state: web::Data<AppState>,
    body: web::Json<TranscribeRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    let config = state.get_config();

    let streaming_config = request.streaming_config()?;
    let audio = request.decode_audio(config.performance.max_batch_audio_bytes)?;

    let _slot = state
        .try_acquire_stream(config.performance.max_concurrent_streams)
        .ok_or_else(|| {
            AppError::Unavailable(format!(
                "Maximum concurrent streams ({}) reached",
                config.performance.max_concurrent_streams
            ))
        })?;

    info!(
        bytes = audio.len(),
        encoding = %streaming_config.config.encoding,
        sample_rate = streaming_config.config.sample_rate_hertz,
        "Batch transcription started"
    );

    let events = state.recognizer().streaming_recognize(
        streaming_config,
        audio_chunks(audio, config.performance.max_chunk_bytes),
    );

    // One call cannot outlive the provider's session limit
    let limit = config.streaming.session_time_limit();
    let collected =
        tokio::time::timeout(limit, collect_finals(events, request.enable_word_timestamps))
            .await
            .map_err(|_| AppError::Internal(format!("Recognition timed out after {:?}", limit)))?;

    let transcription = match collected {
        Ok(Some(transcription)) => transcription,
        Ok(None) => return Err(AppError::Internal("No speech detected".to_string())),
        Err(e) => {
            warn!("Batch transcription failed: {}", e);
            state.record_stream_error();
            return Err(e.into());
        }
    };

    info!(
        chars = transcription.transcription.len(),
        confidence = transcription.confidence,
        "Batch transcription finished"
    );

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Transcription successful",
        "data": transcription
    })))
}
