//! Control handle shared between a running stream and the code that feeds it.

use crate::audio::queue::{audio_queue, AudioIngest, AudioQueueReceiver};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Cloneable handle for pushing audio into a stream and stopping it.
///
/// All methods are safe to call from any task or thread, before, during, or
/// after the stream runs.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    ingest: AudioIngest,
    running: Arc<AtomicBool>,
}

impl StreamHandle {
    pub(crate) fn new() -> (Self, AudioQueueReceiver) {
        let (ingest, queue) = audio_queue();
        (
            Self {
                ingest,
                running: Arc::new(AtomicBool::new(false)),
            },
            queue,
        )
    }

    /// Queue an audio chunk. Returns false if the stream is stopped and the chunk was dropped.
    pub fn add_audio(&self, chunk: impl Into<Bytes>) -> bool {
        self.ingest.push(chunk.into())
    }

    /// Ask the stream to stop. Idempotent.
    pub fn stop(&self) {
        if self.ingest.close() {
            info!("Stop requested for stream");
        }
    }

    /// The stream is running and has not been asked to stop.
    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.ingest.is_stopped()
    }

    pub fn is_stopped(&self) -> bool {
        self.ingest.is_stopped()
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }
}
