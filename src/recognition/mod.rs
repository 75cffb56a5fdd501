// Recognition module - the remote streaming recognizer and its wire format
pub mod client;
pub mod types;
pub mod websocket;
pub mod wire;

#[cfg(test)]
pub mod scripted;

pub use client::{AudioStream, EventStream, SpeechRecognizer};
pub use types::*;
pub use websocket::WebSocketRecognizer;
