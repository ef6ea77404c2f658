//! Error types for clip extraction.

use std::io;
use thiserror::Error;

/// Clip extraction error type
#[derive(Error, Debug)]
pub enum ClipError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Outer Wave64 chunk was not followed by the WAVE form id
    #[error("Wave64 outer chunk is not followed by the wave form id")]
    BadForm,

    /// Chunk header or payload is inconsistent
    #[error("Bad {chunk} chunk: {reason}")]
    BadChunk { chunk: &'static str, reason: String },

    /// Format chunk fails the bits-per-sample consistency check
    #[error("bitsPerSample ({bits}) != 8 * bytesPerSample ({bytes_per_frame} bytes per frame / {channels} channels)")]
    BitsPerSample {
        bits: u16,
        bytes_per_frame: u16,
        channels: u16,
    },

    /// Data chunk size is not a whole number of frames
    #[error("Data chunk size {size} is not a multiple of frame size {frame_size}")]
    DataNotFrameAligned { size: u64, frame_size: u16 },

    /// Data chunk was reached before any format chunk
    #[error("No fmt chunk before data chunk")]
    MissingFormat,

    /// Chunk scan ended without a data chunk
    #[error("No data chunk")]
    MissingData,

    /// Fewer bytes were delivered than requested
    #[error("Truncated file (only read {read} of {wanted} bytes)")]
    Truncated { read: usize, wanted: usize },

    /// Conventional RIFF/WAVE header rejected
    #[error("Invalid WAV file: {0}")]
    InvalidWav(String),

    /// Sample width has no decode layout
    #[error("Unsupported sample layout: {channels} channels, {bytes_per_sample} bytes per sample")]
    UnsupportedLayout { channels: u16, bytes_per_sample: u16 },

    /// Marker tone not found within the search cap
    #[error("No marker detected in the first {searched} frames")]
    MarkerNotFound { searched: u64 },

    /// Malformed companion log line
    #[error("Log line {line}: {reason}")]
    Log { line: usize, reason: String },

    /// Clip window is empty or inverted
    #[error("Clip {name}: end frame {end} is not after start frame {start}")]
    InvalidWindow { name: String, start: i64, end: i64 },

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// Config file could not be parsed
    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// Config could not be serialized
    #[error("Config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Manifest serialization failed
    #[error("Manifest error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for clip extraction operations
pub type Result<T> = std::result::Result<T, ClipError>;
