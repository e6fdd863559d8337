//! Fraglift-Media: ISO base media box codec and audio track extraction
//!
//! This crate decodes MP4 and fragmented MP4 files into a tree of typed
//! boxes, locates a track and the byte ranges of its samples, and writes
//! those samples out as an elementary stream.
//!
//! # Modules
//!
//! - `mp4` - Box header codec, bounded reader, box registry and leaf codecs
//! - `demux` - Track/fragment locator, sample resolver and extraction
//! - `adts` - ADTS header synthesis for AAC access units
//!
//! # Pipeline
//!
//! 1. [`Mp4File::decode`] parses the fully buffered input into boxes
//! 2. [`Presentation::from_file`] lists the tracks in `moov` and pairs each
//!    `moof` with the `mdat` that follows it
//! 3. The resolver turns sample tables or track runs into checked
//!    (offset, length) ranges
//! 4. [`extract`] writes each sample, optionally behind an ADTS header
//!
//! The input is never copied: box payloads and sample slices share the
//! buffer handed to [`Mp4File::decode`].

pub mod adts;
pub mod demux;
pub mod error;
pub mod mp4;

pub use adts::AdtsHeader;
pub use demux::{extract, ExtractOptions, ExtractStats, OutputMode, Presentation, TrackSelector};
pub use error::{Error, Result};
pub use mp4::{FourCc, Mp4Box, Mp4File};
