//! Fraglift - audio track extraction from MP4 and fragmented MP4 files
//!
//! This library crate exposes the command implementations for integration
//! testing. The container handling lives in `fraglift-media`.

pub mod config;
pub mod extract;
pub mod inspect;
