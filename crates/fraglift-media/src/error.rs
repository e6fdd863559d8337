//! Error types for fraglift-media.

use crate::mp4::FourCc;
use std::io;
use thiserror::Error;

/// Result type for fraglift-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for fraglift-media operations.
///
/// Every variant is terminal for the decode, resolve or rewrap call that
/// produced it. Offsets are absolute positions in the input buffer.
#[derive(Debug, Error)]
pub enum Error {
    /// Not enough bytes for a box header, or an invalid size encoding.
    #[error("Malformed box header at offset {offset}: {reason}")]
    MalformedHeader { offset: u64, reason: String },

    /// A box declares more bytes than its parent (or the input) holds.
    #[error(
        "Truncated box '{box_type}' at offset {offset}: declared {declared} bytes, {available} available"
    )]
    TruncatedBox {
        box_type: FourCc,
        offset: u64,
        declared: u64,
        available: u64,
    },

    /// Encoding was requested for a box version with no defined layout.
    #[error("Unsupported version {version} for box '{box_type}'")]
    UnsupportedVersion { box_type: FourCc, version: u8 },

    /// No track has the requested handler type.
    #[error("No track with handler type '{handler}'")]
    UnknownTrack { handler: FourCc },

    /// No track has the requested track ID.
    #[error("No track with ID {track_id}")]
    UnknownTrackId { track_id: u32 },

    /// A resolved sample range does not fit in its buffer.
    #[error("Sample range {offset}+{length} exceeds buffer of {buffer_len} bytes")]
    SampleRangeOverflow {
        offset: u64,
        length: u32,
        buffer_len: u64,
    },

    /// A box decoded but its fields are inconsistent.
    #[error("Invalid box '{box_type}' at offset {offset}: {reason}")]
    InvalidBox {
        box_type: FourCc,
        offset: u64,
        reason: String,
    },

    /// ADTS parameters out of range.
    #[error("Invalid audio configuration: {0}")]
    InvalidAudioConfig(String),

    /// Payload too large for the 13-bit ADTS frame length.
    #[error("ADTS payload of {length} bytes does not fit the 13-bit frame length")]
    FrameTooLarge { length: usize },

    /// I/O error from the output writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a malformed header error.
    pub fn malformed_header(offset: u64, reason: impl Into<String>) -> Self {
        Self::MalformedHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Create an invalid box error.
    pub fn invalid_box(box_type: FourCc, offset: u64, reason: impl Into<String>) -> Self {
        Self::InvalidBox {
            box_type,
            offset,
            reason: reason.into(),
        }
    }

    /// Create an invalid audio configuration error.
    pub fn invalid_audio_config(msg: impl Into<String>) -> Self {
        Self::InvalidAudioConfig(msg.into())
    }
}
