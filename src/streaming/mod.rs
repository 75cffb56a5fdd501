//! # Streaming Recognition
//!
//! Turns a live audio feed into a live transcript using the remote recognizer.
//!
//! ## Key Components:
//! - **EndlessStream**: Unbounded stream built from back-to-back recognition sessions
//! - **SingleStream**: One session, optionally ending at the first utterance
//! - **SessionDriver**: Runs one session of an endless stream
//! - **SessionState**: Timeline bookkeeping that carries across sessions
//! - **StreamEvent / ResultSink**: What consumers receive, and how

pub mod driver;
pub mod endless;
pub mod events;
pub mod handle;
pub mod options;
pub mod single;
pub mod state;

pub use endless::EndlessStream;
pub use events::{result_sink, ResultSink, StreamEvent};
pub use handle::StreamHandle;
pub use options::{StreamMode, StreamingOptions};
pub use single::SingleStream;
pub use state::StreamLimits;
