//! # WebSocket Streaming Endpoints
//!
//! Browser and device clients stream audio over a WebSocket and receive transcripts
//! back on the same socket. Two endpoints share one actor:
//!
//! - `/ws/stt/endless`: endless streams (sessions rotated transparently)
//! - `/ws/stt/stream`: single-session streams
//!
//! ## WebSocket Protocol:
//! 1. **Connect**: Server sends `{"type":"connected", ...}`
//! 2. **Configure**: Client sends `{"type":"config","config":{...streaming options...}}`;
//!    server answers `configured` and starts the stream. Configuring again replaces
//!    the running stream.
//! 3. **Audio**: Binary frames, or `{"type":"audio","data":[..bytes..]}`
//! 4. **Results**: Server forwards every stream event as JSON (`interim_result`,
//!    `final_result`, `stream_restart`, `error`, ...)
//! 5. **Stop / Status**: `{"type":"stop"}` ends the stream, `{"type":"status"}` reports state
//!
//! ## Actor Model:
//! Each connection is an actix actor. The stream itself runs in a separate task;
//! its result sink posts events back to the actor's mailbox, which writes them to
//! the socket in order.

use crate::audio::processor::AudioProcessor;
use crate::error::StreamError;
use crate::recognition::StreamingConfig;
use crate::state::AppState;
use crate::streaming::{
    result_sink, EndlessStream, ResultSink, SingleStream, StreamEvent, StreamHandle,
    StreamLimits, StreamMode, StreamingOptions,
};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Messages accepted from clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Config {
        #[serde(default)]
        config: StreamingOptions,
    },
    /// Audio bytes as a JSON array, for clients that cannot send binary frames
    Audio { data: Vec<u8> },
    Stop,
    Status,
    Pong {
        #[serde(default)]
        timestamp: u64,
    },
}

/// Control messages sent to clients. Stream events are sent as-is.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        connection_id: String,
        mode: StreamMode,
        message: String,
    },
    Configured {
        message: String,
        config: StreamingConfig,
    },
    Stopped {
        message: String,
    },
    Status {
        mode: StreamMode,
        configured: bool,
        streaming: bool,
    },
    Error {
        code: String,
        message: String,
    },
    Ping {
        timestamp: u64,
    },
}

/// Stream event to forward to the client.
#[derive(Message)]
#[rtype(result = "()")]
struct DeliverEvent(StreamEvent);

pub struct StreamingSocket {
    connection_id: Uuid,
    mode: StreamMode,
    state: web::Data<AppState>,
    handle: Option<StreamHandle>,
    processor: Option<AudioProcessor>,
    last_heartbeat: Instant,
}

impl StreamingSocket {
    pub fn new(mode: StreamMode, state: web::Data<AppState>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            mode,
            state,
            handle: None,
            processor: None,
            last_heartbeat: Instant::now(),
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(e) => error!("Failed to serialize server message: {}", e),
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        warn!(connection_id = %self.connection_id, "WebSocket error {}: {}", code, message);
        self.send(
            ctx,
            &ServerMessage::Error {
                code: code.to_string(),
                message: message.to_string(),
            },
        );
    }

    fn stop_stream(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
        self.processor = None;
    }

    fn handle_config(&mut self, options: StreamingOptions, ctx: &mut ws::WebsocketContext<Self>) {
        self.stop_stream();

        let config = self.state.get_config();
        let recognizer = self.state.recognizer();

        // Metrics are updated here, before the event reaches the mailbox
        let addr = ctx.address();
        let metrics = self.state.clone();
        let sink: ResultSink = result_sink(move |event: StreamEvent| {
            match &event {
                StreamEvent::RestartNotice { restart_count, .. } if *restart_count > 0 => {
                    metrics.record_restart()
                }
                StreamEvent::Error { .. } | StreamEvent::FatalError { .. } => {
                    metrics.record_stream_error()
                }
                _ => {}
            }
            addr.do_send(DeliverEvent(event));
            std::future::ready(())
        });

        let prepared: Result<(StreamHandle, StreamingConfig, BoxFuture<'static, Result<(), StreamError>>), StreamError> =
            match self.mode {
                StreamMode::Endless => {
                    let mut stream = EndlessStream::new(recognizer, StreamLimits::from(&config.streaming));
                    stream.configure(options).and_then(|()| {
                        let stream_config = stream.config().cloned().ok_or(StreamError::NotConfigured)?;
                        Ok((stream.handle(), stream_config, Box::pin(stream.run(sink)) as BoxFuture<'static, _>))
                    })
                }
                StreamMode::Single => {
                    let mut stream = SingleStream::new(recognizer, config.streaming.pull_timeout());
                    stream.configure(options).and_then(|()| {
                        let stream_config = stream.config().cloned().ok_or(StreamError::NotConfigured)?;
                        Ok((stream.handle(), stream_config, Box::pin(stream.run(sink)) as BoxFuture<'static, _>))
                    })
                }
            };

        let (handle, stream_config, run) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.send_error(ctx, "config_error", &e.to_string());
                return;
            }
        };

        let Some(slot) = self.state.try_acquire_stream(config.performance.max_concurrent_streams) else {
            self.send_error(
                ctx,
                "capacity",
                &format!(
                    "Maximum concurrent streams ({}) reached",
                    config.performance.max_concurrent_streams
                ),
            );
            return;
        };

        self.processor = Some(AudioProcessor::new(
            stream_config.config.encoding,
            stream_config.config.sample_rate_hertz,
            config.performance.max_chunk_bytes,
        ));
        self.handle = Some(handle);

        let connection_id = self.connection_id;
        tokio::spawn(async move {
            // Dropped on completion or panic, freeing the slot either way
            let _slot = slot;
            if let Err(e) = run.await {
                warn!(%connection_id, "Stream ended with error: {}", e);
            }
            info!(%connection_id, "Stream finished");
        });

        info!(connection_id = %self.connection_id, "Stream configured and started");
        self.send(
            ctx,
            &ServerMessage::Configured {
                message: "Streaming configured".to_string(),
                config: stream_config,
            },
        );
    }

    fn handle_audio(&mut self, data: Vec<u8>, ctx: &mut ws::WebsocketContext<Self>) {
        let (Some(handle), Some(processor)) = (&self.handle, &self.processor) else {
            self.send_error(
                ctx,
                "not_configured",
                "Stream not configured. Send a config message first.",
            );
            return;
        };

        match processor.validate_chunk(&data) {
            Ok(info) => {
                if let Some(pcm) = info.pcm {
                    trace!(
                        bytes = info.bytes,
                        samples = pcm.samples,
                        peak = pcm.peak,
                        silent = pcm.is_silent(),
                        "Audio chunk received"
                    );
                }
                if !handle.add_audio(data) {
                    debug!("Audio dropped, stream is stopped");
                }
            }
            Err(e) => self.send_error(ctx, "audio_error", &e.to_string()),
        }
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Config { config }) => self.handle_config(config, ctx),
            Ok(ClientMessage::Audio { data }) => self.handle_audio(data, ctx),
            Ok(ClientMessage::Stop) => {
                if let Some(handle) = self.handle.as_ref().filter(|h| !h.is_stopped()) {
                    info!(connection_id = %self.connection_id, "Stopping stream on client request");
                    handle.stop();
                }
                self.send(
                    ctx,
                    &ServerMessage::Stopped {
                        message: "Streaming stopped".to_string(),
                    },
                );
            }
            Ok(ClientMessage::Status) => {
                let streaming = self.handle.as_ref().is_some_and(StreamHandle::is_active);
                self.send(
                    ctx,
                    &ServerMessage::Status {
                        mode: self.mode,
                        configured: self.handle.is_some(),
                        streaming,
                    },
                );
            }
            Ok(ClientMessage::Pong { timestamp }) => {
                self.last_heartbeat = Instant::now();
                let now = chrono::Utc::now().timestamp_millis() as u64;
                trace!(
                    connection_id = %self.connection_id,
                    round_trip_ms = now.saturating_sub(timestamp),
                    "Heartbeat pong"
                );
            }
            Err(e) => self.send_error(ctx, "invalid_message", &format!("Invalid message: {}", e)),
        }
    }
}

impl Actor for StreamingSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(connection_id = %self.connection_id, mode = ?self.mode, "WebSocket connection started");

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(connection_id = %act.connection_id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            act.send(
                ctx,
                &ServerMessage::Ping {
                    timestamp: chrono::Utc::now().timestamp_millis() as u64,
                },
            );
        });

        self.send(
            ctx,
            &ServerMessage::Connected {
                connection_id: self.connection_id.to_string(),
                mode: self.mode,
                message: "Connected. Send a config message to start streaming.".to_string(),
            },
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.stop_stream();
        info!(connection_id = %self.connection_id, "WebSocket connection stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for StreamingSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_text(&text, ctx),
            Ok(ws::Message::Binary(data)) => self.handle_audio(data.to_vec(), ctx),
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(connection_id = %self.connection_id, "WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                error!(connection_id = %self.connection_id, "WebSocket protocol error: {}", e);
                ctx.stop();
            }
        }
    }
}

impl Handler<DeliverEvent> for StreamingSocket {
    type Result = ();

    fn handle(&mut self, msg: DeliverEvent, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg.0) {
            Ok(json) => ctx.text(json),
            Err(e) => error!("Failed to serialize stream event: {}", e),
        }
    }
}

/// `GET /ws/stt/endless`
pub async fn endless_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("Endless streaming connection from {:?}", req.connection_info().peer_addr());
    ws::start(StreamingSocket::new(StreamMode::Endless, state), &req, stream)
}

/// `GET /ws/stt/stream`
pub async fn streaming_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("Streaming connection from {:?}", req.connection_info().peer_addr());
    ws::start(StreamingSocket::new(StreamMode::Single, state), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_message() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"config","config":{"encoding":"webm","sampleRateHertz":48000,"singleUtterance":true}}"#,
        )
        .unwrap();

        match msg {
            ClientMessage::Config { config } => {
                assert_eq!(config.encoding.as_deref(), Some("webm"));
                assert_eq!(config.sample_rate_hertz, Some(48000));
                assert_eq!(config.single_utterance, Some(true));
            }
            other => panic!("Wrong message type: {:?}", other),
        }

        // Missing config object means all defaults
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"config"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Config { config } if config == StreamingOptions::default()));
    }

    #[test]
    fn test_parse_audio_and_control_messages() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"audio","data":[1,2,255]}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Audio { data } if data == vec![1, 2, 255]));

        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"stop"}"#).unwrap(),
            ClientMessage::Stop
        ));
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"status"}"#).unwrap(),
            ClientMessage::Status
        ));
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"pong","timestamp":1700000000000}"#).unwrap(),
            ClientMessage::Pong { timestamp: 1_700_000_000_000 }
        ));

        // Bytes out of range are rejected
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"audio","data":[256]}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"transcribe"}"#).is_err());
    }

    #[test]
    fn test_server_message_shapes() {
        let json = serde_json::to_value(ServerMessage::Status {
            mode: StreamMode::Endless,
            configured: true,
            streaming: false,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "status",
                "mode": "endless_streaming",
                "configured": true,
                "streaming": false
            })
        );

        let json = serde_json::to_value(ServerMessage::Error {
            code: "audio_error".to_string(),
            message: "Invalid audio: Audio data is empty".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "audio_error");
    }
}
