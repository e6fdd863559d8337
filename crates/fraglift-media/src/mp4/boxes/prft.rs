//! Producer reference time box (`prft`).
//!
//! Pairs an NTP wall-clock time with a media time of a reference track.
//! Sits at the top level, before the `moof` it describes.

use super::{check_version, put_version_flags, put_versioned_time, read_versioned_time, BoxCodec};
use crate::mp4::{BoxReader, FourCc};
use crate::Result;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::time::Duration;

/// Seconds between the NTP epoch (1900) and the UNIX epoch (1970).
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

/// 64-bit NTP timestamp: 32 bits of seconds, 32 bits of fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpTimestamp(pub u64);

impl NtpTimestamp {
    pub fn seconds(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn fraction(&self) -> u32 {
        self.0 as u32
    }

    /// Time since the UNIX epoch, or `None` for timestamps before 1970.
    pub fn to_unix(&self) -> Option<Duration> {
        let secs = (self.seconds() as u64).checked_sub(NTP_UNIX_OFFSET_SECS)?;
        let nanos = ((self.fraction() as u64 * 1_000_000_000) >> 32) as u32;
        Some(Duration::new(secs, nanos))
    }

    /// Build from a time since the UNIX epoch.
    pub fn from_unix(since_epoch: Duration) -> Self {
        let secs = since_epoch.as_secs() + NTP_UNIX_OFFSET_SECS;
        let fraction = ((since_epoch.subsec_nanos() as u64) << 32) / 1_000_000_000;
        Self((secs << 32) | fraction)
    }
}

impl fmt::Display for NtpTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_unix() {
            Some(d) => write!(f, "{}.{:09}s since 1970", d.as_secs(), d.subsec_nanos()),
            None => write!(f, "{}.{}", self.seconds(), self.fraction()),
        }
    }
}

/// Well-known `prft` flag values: which moment the NTP time refers to.
pub struct PrftFlags;

impl PrftFlags {
    pub const ENCODER_INPUT: u32 = 0;
    pub const ENCODER_OUTPUT: u32 = 1;
    pub const MOOF_FINALIZED: u32 = 2;
    pub const MOOF_WRITTEN: u32 = 4;
    pub const ARBITRARY_CONSISTENT: u32 = 8;
    pub const CAPTURED: u32 = 24;
}

/// Producer reference time box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrftBox {
    /// 0 selects a 32-bit media time, 1 a 64-bit one.
    pub version: u8,
    /// 24-bit flags; see [`PrftFlags`].
    pub flags: u32,
    pub reference_track_id: u32,
    pub ntp_timestamp: NtpTimestamp,
    pub media_time: u64,
}

impl PrftBox {
    pub fn new(
        version: u8,
        flags: u32,
        reference_track_id: u32,
        ntp_timestamp: NtpTimestamp,
        media_time: u64,
    ) -> Self {
        Self {
            version,
            flags,
            reference_track_id,
            ntp_timestamp,
            media_time,
        }
    }

    /// Name of the moment the flags describe, `"unknown"` otherwise.
    pub fn interpret_flags(&self) -> &'static str {
        match self.flags {
            PrftFlags::ENCODER_INPUT => "time_encoder_input",
            PrftFlags::ENCODER_OUTPUT => "time_encoder_output",
            PrftFlags::MOOF_FINALIZED => "time_moof_finalized",
            PrftFlags::MOOF_WRITTEN => "time_moof_written",
            PrftFlags::ARBITRARY_CONSISTENT => "time_arbitrary_consistent",
            PrftFlags::CAPTURED => "time_captured",
            _ => "unknown",
        }
    }
}

impl BoxCodec for PrftBox {
    const BOX_TYPE: FourCc = FourCc::PRFT;

    // Versions other than 0 read with the wide layout: only two layouts
    // exist and the wide one is the superset.
    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        let reference_track_id = reader.read_u32()?;
        let ntp_timestamp = NtpTimestamp(reader.read_u64()?);
        let media_time = read_versioned_time(reader, version)?;
        Ok(Self {
            version,
            flags,
            reference_track_id,
            ntp_timestamp,
            media_time,
        })
    }

    fn payload_size(&self) -> u64 {
        if self.version == 0 {
            20
        } else {
            24
        }
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        check_version(Self::BOX_TYPE, self.version)?;
        put_version_flags(buf, self.version, self.flags);
        buf.put_u32(self.reference_track_id);
        buf.put_u64(self.ntp_timestamp.0);
        put_versioned_time(buf, Self::BOX_TYPE, self.version, self.media_time)
    }
}
