//! JSON adapter for the recognizer's streaming protocol.
//!
//! Outbound: the first text frame is `{"streamingConfig": {...}}`, everything after
//! that is binary audio. When the client has no more audio it sends `{"audioEnd": true}`.
//!
//! Inbound: each text frame is one response. Durations come either as protobuf-JSON
//! strings (`"1.250s"`) or as `{ "seconds": .., "nanos": .. }` objects.

use crate::recognition::types::{
    Alternative, EventDuration, RecognitionError, RecognitionEvent, RecognitionResult,
    SpeechEvent, StreamingConfig, WordInfo,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    results: Vec<WireResult>,
    #[serde(default)]
    speech_event_type: Option<String>,
    #[serde(default)]
    error: Option<WireStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    #[serde(default)]
    alternatives: Vec<WireAlternative>,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    result_end_time: Option<WireDuration>,
}

#[derive(Debug, Deserialize)]
struct WireAlternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    words: Vec<WireWord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireWord {
    #[serde(default)]
    word: String,
    #[serde(default)]
    start_time: Option<WireDuration>,
    #[serde(default)]
    end_time: Option<WireDuration>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireDuration {
    Text(String),
    Parts {
        #[serde(default)]
        seconds: serde_json::Value,
        #[serde(default)]
        nanos: i64,
    },
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// Build the opening frame of a streaming session.
pub fn encode_config(config: &StreamingConfig) -> String {
    serde_json::json!({ "streamingConfig": config }).to_string()
}

/// Frame telling the recognizer that no more audio will follow.
pub fn encode_audio_end() -> String {
    serde_json::json!({ "audioEnd": true }).to_string()
}

/// Decode one response frame.
///
/// An `error` object in the frame is turned into `RecognitionError::Service`.
pub fn decode_response(text: &str) -> Result<RecognitionEvent, RecognitionError> {
    let response: WireResponse = serde_json::from_str(text)
        .map_err(|e| RecognitionError::Protocol(format!("invalid response frame: {}", e)))?;

    if let Some(status) = response.error {
        return Err(RecognitionError::Service {
            code: status.code,
            message: status.message,
        });
    }

    let speech_event = match response.speech_event_type.as_deref() {
        Some("END_OF_SINGLE_UTTERANCE") => SpeechEvent::EndOfSingleUtterance,
        _ => SpeechEvent::Unspecified,
    };

    let results = response
        .results
        .into_iter()
        .map(convert_result)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RecognitionEvent {
        results,
        speech_event,
    })
}

fn convert_result(result: WireResult) -> Result<RecognitionResult, RecognitionError> {
    let alternatives = result
        .alternatives
        .into_iter()
        .map(|alt| {
            let words = alt
                .words
                .into_iter()
                .map(|w| {
                    Ok(WordInfo {
                        word: w.word,
                        start_time: convert_optional(w.start_time)?,
                        end_time: convert_optional(w.end_time)?,
                    })
                })
                .collect::<Result<Vec<_>, RecognitionError>>()?;

            Ok(Alternative {
                transcript: alt.transcript,
                confidence: alt.confidence.unwrap_or(0.0),
                words,
            })
        })
        .collect::<Result<Vec<_>, RecognitionError>>()?;

    Ok(RecognitionResult {
        alternatives,
        is_final: result.is_final,
        result_end_time: convert_optional(result.result_end_time)?,
    })
}

fn convert_optional(duration: Option<WireDuration>) -> Result<EventDuration, RecognitionError> {
    match duration {
        Some(d) => convert_duration(d),
        None => Ok(EventDuration::default()),
    }
}

fn convert_duration(duration: WireDuration) -> Result<EventDuration, RecognitionError> {
    match duration {
        WireDuration::Text(text) => parse_duration(&text),
        WireDuration::Parts { seconds, nanos } => {
            // int64 fields may arrive as JSON strings
            let seconds = match &seconds {
                serde_json::Value::Null => 0,
                serde_json::Value::Number(n) => n.as_i64().unwrap_or(0),
                serde_json::Value::String(s) => s.parse().map_err(|_| {
                    RecognitionError::Protocol(format!("invalid duration seconds: {}", s))
                })?,
                other => {
                    return Err(RecognitionError::Protocol(format!(
                        "invalid duration seconds: {}",
                        other
                    )))
                }
            };
            Ok(EventDuration::new(seconds, nanos / 1000))
        }
    }
}

/// Parse a protobuf-JSON duration such as `"3s"` or `"1.250s"`.
pub fn parse_duration(text: &str) -> Result<EventDuration, RecognitionError> {
    let invalid = || RecognitionError::Protocol(format!("invalid duration: {:?}", text));

    let body = text.trim().strip_suffix('s').ok_or_else(invalid)?;
    let (whole, fraction) = match body.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (body, ""),
    };

    let seconds: i64 = whole.parse().map_err(|_| invalid())?;
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    // Keep microsecond precision, right-padding short fractions ("25" -> 250000)
    let mut digits: String = fraction.chars().take(6).collect();
    while digits.len() < 6 {
        digits.push('0');
    }
    let micros: i64 = digits.parse().map_err(|_| invalid())?;

    Ok(EventDuration::new(seconds, micros))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("3s").unwrap(), EventDuration::new(3, 0));
        assert_eq!(parse_duration("1.25s").unwrap(), EventDuration::new(1, 250_000));
        assert_eq!(
            parse_duration("0.123456789s").unwrap(),
            EventDuration::new(0, 123_456)
        );
        assert!(parse_duration("12").is_err());
        assert!(parse_duration("a.bs").is_err());
    }

    #[test]
    fn test_decode_final_result_with_words() {
        let frame = r#"{
            "results": [{
                "alternatives": [{
                    "transcript": "hello world",
                    "confidence": 0.92,
                    "words": [
                        {"word": "hello", "startTime": "0.100s", "endTime": "0.500s"},
                        {"word": "world", "startTime": {"seconds": "0", "nanos": 600000000}, "endTime": "1s"}
                    ]
                }],
                "isFinal": true,
                "resultEndTime": "1.200s"
            }]
        }"#;

        let event = decode_response(frame).unwrap();
        assert_eq!(event.results.len(), 1);

        let result = &event.results[0];
        assert!(result.is_final);
        assert_eq!(result.result_end_time.as_millis(), 1200);

        let alt = &result.alternatives[0];
        assert_eq!(alt.transcript, "hello world");
        assert!((alt.confidence - 0.92).abs() < 1e-6);
        assert_eq!(alt.words.len(), 2);
        assert_eq!(alt.words[1].start_time.as_millis(), 600);
        assert_eq!(alt.words[1].end_time.as_millis(), 1000);
    }

    #[test]
    fn test_decode_interim_defaults() {
        let event =
            decode_response(r#"{"results":[{"alternatives":[{"transcript":"hel"}]}]}"#).unwrap();
        let result = &event.results[0];
        assert!(!result.is_final);
        assert_eq!(result.alternatives[0].confidence, 0.0);
        assert_eq!(result.result_end_time, EventDuration::default());
    }

    #[test]
    fn test_decode_speech_event_and_empty_frame() {
        let event = decode_response(r#"{"speechEventType":"END_OF_SINGLE_UTTERANCE"}"#).unwrap();
        assert_eq!(event.speech_event, SpeechEvent::EndOfSingleUtterance);
        assert!(event.results.is_empty());

        let event = decode_response("{}").unwrap();
        assert_eq!(event, RecognitionEvent::default());
    }

    #[test]
    fn test_decode_error_frame() {
        let err = decode_response(r#"{"error":{"code":11,"message":"Exceeded maximum allowed stream duration"}}"#)
            .unwrap_err();
        assert_eq!(
            err,
            RecognitionError::Service {
                code: 11,
                message: "Exceeded maximum allowed stream duration".to_string()
            }
        );

        assert!(matches!(
            decode_response("not json"),
            Err(RecognitionError::Protocol(_))
        ));
    }

    #[test]
    fn test_encode_config_frame() {
        use crate::recognition::types::{AudioEncoding, RecognitionConfig};

        let config = StreamingConfig {
            config: RecognitionConfig {
                encoding: AudioEncoding::WebmOpus,
                sample_rate_hertz: 48000,
                language_code: "en-US".to_string(),
                max_alternatives: 1,
                enable_word_time_offsets: true,
                enable_automatic_punctuation: true,
                model: "latest_long".to_string(),
            },
            interim_results: true,
            single_utterance: true,
        };

        let value: serde_json::Value = serde_json::from_str(&encode_config(&config)).unwrap();
        assert_eq!(value["streamingConfig"]["config"]["encoding"], "WEBM_OPUS");
        assert_eq!(value["streamingConfig"]["singleUtterance"], true);
    }
}
