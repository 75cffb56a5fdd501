//! # Audio Module
//!
//! Everything that touches raw audio on its way to the recognizer.
//!
//! ## Key Components:
//! - **Ingest Queue**: Non-blocking FIFO from the audio producer to the active session
//! - **Bridging Buffer**: Per-session audio logs and the replay plan used on restart
//! - **Audio Processor**: Validation of client chunks before they are queued
//!
//! Audio is treated as opaque bytes end to end. Only the processor ever looks
//! inside a chunk, and only for LINEAR16.

pub mod bridging;    // Session audio logs and restart replay
pub mod processor;   // Chunk validation
pub mod queue;       // Producer/consumer ingest queue
