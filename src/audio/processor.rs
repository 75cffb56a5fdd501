//! # Audio Chunk Validation
//!
//! Checks audio chunks arriving from clients before they enter the ingest queue.
//! Compressed encodings (Opus, FLAC, AMR) are opaque to us and only get size checks.
//! LINEAR16 can be inspected, so those chunks are also checked for sample alignment
//! and summarized (sample count, duration, peak level) for debug logging.
//!
//! ## Key Functions:
//! - **validate_chunk**: Reject empty, oversized, or misaligned chunks
//! - **pcm_summary**: Read little-endian 16-bit samples and compute simple stats

use crate::error::StreamError;
use crate::recognition::AudioEncoding;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Per-chunk information handed back to the caller after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkInfo {
    pub bytes: usize,
    /// Present only for LINEAR16 audio
    pub pcm: Option<PcmSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcmSummary {
    pub samples: usize,
    pub duration_ms: f64,
    /// Largest absolute sample value
    pub peak: u16,
}

impl PcmSummary {
    /// All samples are zero
    pub fn is_silent(&self) -> bool {
        self.peak == 0
    }
}

/// Validates chunks for one configured stream.
#[derive(Debug, Clone)]
pub struct AudioProcessor {
    encoding: AudioEncoding,
    sample_rate_hertz: u32,
    max_chunk_bytes: usize,
}

impl AudioProcessor {
    pub fn new(encoding: AudioEncoding, sample_rate_hertz: u32, max_chunk_bytes: usize) -> Self {
        Self {
            encoding,
            sample_rate_hertz,
            max_chunk_bytes,
        }
    }

    /// Validate an incoming chunk.
    ///
    /// ## Validation Checks:
    /// 1. **Not empty**
    /// 2. **Size**: At most `max_chunk_bytes`
    /// 3. **Alignment**: LINEAR16 chunks hold whole 16-bit samples
    pub fn validate_chunk(&self, data: &[u8]) -> Result<ChunkInfo, StreamError> {
        if data.is_empty() {
            return Err(StreamError::InvalidAudio("Audio data is empty".to_string()));
        }

        if data.len() > self.max_chunk_bytes {
            return Err(StreamError::InvalidAudio(format!(
                "Audio chunk of {} bytes exceeds the {} byte limit",
                data.len(),
                self.max_chunk_bytes
            )));
        }

        let pcm = match self.encoding {
            AudioEncoding::Linear16 => {
                if data.len() % 2 != 0 {
                    return Err(StreamError::InvalidAudio(
                        "LINEAR16 audio length must be even for 16-bit samples".to_string(),
                    ));
                }
                Some(pcm_summary(data, self.sample_rate_hertz))
            }
            _ => None,
        };

        Ok(ChunkInfo {
            bytes: data.len(),
            pcm,
        })
    }
}

/// Summarize mono little-endian 16-bit PCM.
pub fn pcm_summary(data: &[u8], sample_rate_hertz: u32) -> PcmSummary {
    let mut cursor = Cursor::new(data);
    let mut samples = 0usize;
    let mut peak = 0u16;

    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples += 1;
        peak = peak.max(sample.unsigned_abs());
    }

    let duration_ms = if sample_rate_hertz == 0 {
        0.0
    } else {
        samples as f64 * 1000.0 / sample_rate_hertz as f64
    };

    PcmSummary {
        samples,
        duration_ms,
        peak,
    }
}
