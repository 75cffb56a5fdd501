//! # Audio Ingest Queue
//!
//! Unbounded FIFO that carries raw audio chunks from whoever is capturing audio
//! (a WebSocket connection, a test) to the recognition session that is currently
//! running. The producer side never blocks and never fails; the consumer side waits
//! with a timeout so it can keep checking whether the stream has been stopped.
//!
//! ## Rust Concepts Used:
//! - **mpsc::unbounded_channel**: Lock-free multi-producer queue, `send` never waits
//! - **watch channel**: One-shot style "stopped" flag every clone can observe and await
//! - **Close sentinel**: Stopping also enqueues a marker so a blocked `recv` wakes up

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::trace;

#[derive(Debug)]
enum QueueItem {
    Chunk(Bytes),
    Close,
}

/// Result of one timed pull from the queue.
#[derive(Debug, PartialEq)]
pub enum Pull {
    Chunk(Bytes),
    /// Nothing arrived before the timeout
    Timeout,
    /// The stream was stopped; no more audio will be delivered
    Closed,
}

/// Producer half. Cheap to clone; all clones share the same stopped flag.
#[derive(Debug, Clone)]
pub struct AudioIngest {
    tx: mpsc::UnboundedSender<QueueItem>,
    stopped: Arc<watch::Sender<bool>>,
}

/// Consumer half, owned by the stream orchestrator and lent to each session.
#[derive(Debug)]
pub struct AudioQueueReceiver {
    rx: mpsc::UnboundedReceiver<QueueItem>,
    stopped: watch::Receiver<bool>,
    close_seen: bool,
}

/// Create a connected producer/consumer pair.
pub fn audio_queue() -> (AudioIngest, AudioQueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (stopped_tx, stopped_rx) = watch::channel(false);

    (
        AudioIngest {
            tx,
            stopped: Arc::new(stopped_tx),
        },
        AudioQueueReceiver {
            rx,
            stopped: stopped_rx,
            close_seen: false,
        },
    )
}

impl AudioIngest {
    /// Enqueue a chunk. Returns false if it was dropped because the stream is stopped.
    pub fn push(&self, chunk: Bytes) -> bool {
        if self.is_stopped() {
            trace!("Dropping {} byte chunk, stream stopped", chunk.len());
            return false;
        }
        self.tx.send(QueueItem::Chunk(chunk)).is_ok()
    }

    /// Mark the stream stopped and wake any waiting consumer.
    ///
    /// Idempotent: only the first call enqueues the close marker. Returns whether
    /// this call was the one that closed the queue.
    pub fn close(&self) -> bool {
        let was_stopped = self.stopped.send_replace(true);
        if was_stopped {
            return false;
        }
        let _ = self.tx.send(QueueItem::Close);
        true
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }
}

impl AudioQueueReceiver {
    /// Wait up to `timeout` for the next chunk.
    pub async fn pull(&mut self, timeout: Duration) -> Pull {
        if self.is_stopped() {
            return Pull::Closed;
        }

        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => Pull::Timeout,
            Ok(Some(QueueItem::Chunk(chunk))) => Pull::Chunk(chunk),
            Ok(Some(QueueItem::Close)) | Ok(None) => {
                self.close_seen = true;
                Pull::Closed
            }
        }
    }

    /// Move every chunk that is already queued into `batch` without waiting.
    ///
    /// Stops at the close marker; the caller sees the closed state on its next pull.
    pub fn drain_ready(&mut self, batch: &mut Vec<Bytes>) {
        while let Ok(item) = self.rx.try_recv() {
            match item {
                QueueItem::Chunk(chunk) => batch.push(chunk),
                QueueItem::Close => {
                    self.close_seen = true;
                    break;
                }
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.close_seen || *self.stopped.borrow()
    }

    /// Resolve once the stream has been stopped.
    pub async fn stopped(&mut self) {
        if self.close_seen {
            return;
        }
        // An error means every producer is gone, which is as final as a stop
        let _ = self.stopped.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn test_chunks_arrive_in_order() {
        let (ingest, mut queue) = audio_queue();
        assert!(ingest.push(Bytes::from_static(b"one")));
        assert!(ingest.push(Bytes::from_static(b"two")));

        assert_eq!(queue.pull(TIMEOUT).await, Pull::Chunk(Bytes::from_static(b"one")));
        assert_eq!(queue.pull(TIMEOUT).await, Pull::Chunk(Bytes::from_static(b"two")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_times_out_when_idle() {
        let (_ingest, mut queue) = audio_queue();
        assert_eq!(queue.pull(TIMEOUT).await, Pull::Timeout);
        assert!(!queue.is_stopped());
    }

    #[tokio::test]
    async fn test_drain_collects_everything_queued() {
        let (ingest, mut queue) = audio_queue();
        for i in 0..5u8 {
            ingest.push(Bytes::from(vec![i]));
        }

        let mut batch = match queue.pull(TIMEOUT).await {
            Pull::Chunk(first) => vec![first],
            other => panic!("expected chunk, got {:?}", other),
        };
        queue.drain_ready(&mut batch);

        assert_eq!(batch.len(), 5);
        assert_eq!(batch[4], Bytes::from(vec![4u8]));
    }

    #[tokio::test]
    async fn test_push_after_close_is_dropped() {
        let (ingest, mut queue) = audio_queue();
        ingest.push(Bytes::from_static(b"kept"));
        assert!(ingest.close());
        assert!(!ingest.push(Bytes::from_static(b"dropped")));

        // Stopped flag wins over whatever is still queued
        assert_eq!(queue.pull(TIMEOUT).await, Pull::Closed);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (ingest, mut queue) = audio_queue();
        let other = ingest.clone();

        assert!(ingest.close());
        assert!(!other.close());
        assert!(!ingest.close());
        assert!(other.is_stopped());

        queue.stopped().await;
        assert!(queue.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_wakes_waiting_consumer() {
        let (ingest, mut queue) = audio_queue();

        let waiter = tokio::spawn(async move { queue.pull(Duration::from_secs(60)).await });
        tokio::task::yield_now().await;
        ingest.close();

        assert_eq!(waiter.await.unwrap(), Pull::Closed);
    }
}
