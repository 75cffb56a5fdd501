//! # WebSocket Recognizer
//!
//! `SpeechRecognizer` implementation that talks to a remote streaming recognizer over
//! a WebSocket. Each `streaming_recognize` call opens its own connection, so one
//! recognition session maps to exactly one socket.
//!
//! ## How a session runs:
//! 1. Connect (bounded by `connect_timeout_ms`), with a bearer token if one is configured
//! 2. Send the streaming config as the first text frame
//! 3. Pump audio buffers out as binary frames while decoding response frames in
//! 4. Stop when the caller drops the event stream, the provider closes, or anything fails
//!
//! The session runs in its own task. Results travel back through a bounded channel
//! wrapped in a `ReceiverStream`, which is what the caller sees as an `EventStream`.

use crate::config::RecognizerConfig;
use crate::recognition::{AudioStream, EventStream, SpeechRecognizer};
use crate::recognition::types::{RecognitionError, RecognitionEvent, StreamingConfig};
use crate::recognition::wire;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

/// Responses buffered between the socket task and the consumer
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct WebSocketRecognizer {
    endpoint: String,
    api_key: Option<String>,
    connect_timeout: Duration,
}

impl WebSocketRecognizer {
    pub fn new(config: &RecognizerConfig) -> Self {
        let api_key = if config.api_key.trim().is_empty() {
            None
        } else {
            Some(config.api_key.clone())
        };

        Self {
            endpoint: config.endpoint.clone(),
            api_key,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self) -> Result<Request<()>, RecognitionError> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| RecognitionError::Connection(format!("invalid endpoint: {}", e)))?;

        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|e| {
                RecognitionError::Connection(format!("invalid api key header: {}", e))
            })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        Ok(request)
    }

    /// Run one session to completion, forwarding decoded events into `tx`.
    async fn run_session(
        &self,
        config: StreamingConfig,
        mut audio: AudioStream,
        tx: &mpsc::Sender<Result<RecognitionEvent, RecognitionError>>,
    ) -> Result<(), RecognitionError> {
        let request = self.build_request()?;

        let (socket, _) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                RecognitionError::Connection(format!(
                    "timed out connecting to {} after {:?}",
                    self.endpoint, self.connect_timeout
                ))
            })?
            .map_err(map_connect_error)?;

        debug!("Connected to recognizer at {}", self.endpoint);

        let (mut sink, mut source) = socket.split();
        sink.send(Message::Text(wire::encode_config(&config).into()))
            .await
            .map_err(|e| RecognitionError::Connection(e.to_string()))?;

        let mut audio_open = true;

        loop {
            tokio::select! {
                // Consumer dropped the event stream: end the remote session
                _ = tx.closed() => {
                    debug!("Event consumer gone, closing recognizer socket");
                    let _ = sink.close().await;
                    return Ok(());
                }

                chunk = audio.next(), if audio_open => match chunk {
                    Some(bytes) => {
                        sink.send(Message::Binary(bytes.to_vec().into()))
                            .await
                            .map_err(|e| RecognitionError::Connection(e.to_string()))?;
                    }
                    None => {
                        audio_open = false;
                        sink.send(Message::Text(wire::encode_audio_end().into()))
                            .await
                            .map_err(|e| RecognitionError::Connection(e.to_string()))?;
                    }
                },

                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let event = wire::decode_response(&text)?;
                        if tx.send(Ok(event)).await.is_err() {
                            return Ok(());
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return match frame {
                            Some(frame) if frame.code != CloseCode::Normal => {
                                Err(RecognitionError::Service {
                                    code: u16::from(frame.code) as i32,
                                    message: frame.reason.to_string(),
                                })
                            }
                            _ => Ok(()),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(RecognitionError::Connection(e.to_string())),
                    None => return Ok(()),
                },
            }
        }
    }
}

fn map_connect_error(err: tungstenite::Error) -> RecognitionError {
    match err {
        tungstenite::Error::Http(response) => RecognitionError::Service {
            code: response.status().as_u16() as i32,
            message: format!("handshake rejected with HTTP {}", response.status()),
        },
        other => RecognitionError::Connection(other.to_string()),
    }
}

impl SpeechRecognizer for WebSocketRecognizer {
    fn name(&self) -> &str {
        "websocket"
    }

    fn streaming_recognize(&self, config: StreamingConfig, audio: AudioStream) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let recognizer = self.clone();

        tokio::spawn(async move {
            info!("Opening recognition session at {}", recognizer.endpoint);
            match recognizer.run_session(config, audio, &tx).await {
                Ok(()) => debug!("Recognition session closed"),
                Err(err) => {
                    warn!("Recognition session failed: {}", err);
                    let _ = tx.send(Err(err)).await;
                }
            }
        });

        ReceiverStream::new(rx).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recognizer_config(endpoint: &str, api_key: &str) -> RecognizerConfig {
        RecognizerConfig {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            connect_timeout_ms: 200,
        }
    }

    #[test]
    fn test_request_carries_bearer_token() {
        let recognizer = WebSocketRecognizer::new(&recognizer_config("ws://127.0.0.1:9/stt", "secret"));
        let request = recognizer.build_request().unwrap();
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer secret"
        );
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let recognizer = WebSocketRecognizer::new(&recognizer_config("ws://127.0.0.1:9/stt", "  "));
        let request = recognizer.build_request().unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_invalid_endpoint_surfaces_as_error_event() {
        let recognizer = WebSocketRecognizer::new(&recognizer_config("not a url", ""));
        let audio = futures_util::stream::empty().boxed();

        let mut events = recognizer.streaming_recognize(sample_config(), audio);
        let first = events.next().await.unwrap();
        assert!(matches!(first, Err(RecognitionError::Connection(_))));
        assert!(events.next().await.is_none());
    }

    fn sample_config() -> StreamingConfig {
        use crate::recognition::types::{AudioEncoding, RecognitionConfig};

        StreamingConfig {
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
        }
    }
}
