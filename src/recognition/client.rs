//! # Speech Recognizer Seam
//!
//! The remote streaming recognition call is an external collaborator. This trait is
//! the only thing the streaming code knows about it: hand over a config and a live
//! sequence of audio buffers, get back a live sequence of recognition events.
//!
//! ## Contract:
//! - The returned stream yields `Ok(event)` as the provider produces results.
//! - A transport or service failure is yielded once as `Err(..)`; nothing follows it.
//! - The stream ends (`None`) when the provider closes the session cleanly.
//! - Dropping the returned stream must tear the remote session down.
//! - When the audio stream ends, the provider is told no more audio is coming.

use crate::recognition::types::{RecognitionError, RecognitionEvent, StreamingConfig};
use bytes::Bytes;
use futures_util::stream::BoxStream;
use std::fmt;

/// Outbound audio: opaque byte buffers in capture order.
pub type AudioStream = BoxStream<'static, Bytes>;

/// Inbound recognition events.
pub type EventStream = BoxStream<'static, Result<RecognitionEvent, RecognitionError>>;

/// A remote speech recognizer that supports bidirectional streaming.
///
/// Implementations must be cheap to share (`Arc<dyn SpeechRecognizer>`) because one
/// instance serves every stream the server runs.
pub trait SpeechRecognizer: Send + Sync + fmt::Debug {
    /// Short name used in logs and health output.
    fn name(&self) -> &str;

    /// Open one recognition session.
    fn streaming_recognize(&self, config: StreamingConfig, audio: AudioStream) -> EventStream;
}
