//! ADTS framing for raw AAC access units.
//!
//! Each AAC sample stored in an MP4 track is a bare access unit. Prefixing
//! a 7-byte ADTS header makes every frame self-describing, so the output
//! can be played without the container.
//!
//! Header layout (56 bits, no CRC):
//!
//! ```text
//! syncword(12)=0xFFF id(1)=0 layer(2)=0 protection_absent(1)=1
//! profile(2) sampling_frequency_index(4) private(1)=0 channel_config(3)
//! original(1)=0 home(1)=0 copyright_id(1)=0 copyright_start(1)=0
//! frame_length(13) buffer_fullness(11)=0x7FF raw_data_blocks(2)=0
//! ```

use crate::mp4::AudioSpecificConfig;
use crate::{Error, Result};
use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};

/// Length of an ADTS header without CRC.
pub const ADTS_HEADER_LEN: usize = 7;

/// Largest value of the 13-bit frame length field.
pub const MAX_FRAME_LEN: usize = (1 << 13) - 1;

/// Sampling frequencies addressed by the 4-bit sampling frequency index.
pub const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

const SYNCWORD: u16 = 0xFFF;
const VBR_FULLNESS: u16 = 0x7FF;

/// Index of `hz` in [`SAMPLE_RATES`], if it is one of the listed rates.
pub fn sample_rate_index(hz: u32) -> Option<u8> {
    SAMPLE_RATES.iter().position(|&r| r == hz).map(|i| i as u8)
}

/// The three parameters an ADTS header carries about the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct AdtsHeader {
    /// Audio object type minus one (1 = AAC LC).
    pub profile: u8,
    pub sample_rate_index: u8,
    /// Channel configuration; 0 means defined in-band.
    pub channel_config: u8,
}

impl AdtsHeader {
    /// AAC LC, 44.1 kHz, stereo.
    pub const DEFAULT: Self = Self {
        profile: 1,
        sample_rate_index: 4,
        channel_config: 2,
    };

    /// Validate and build header parameters.
    pub fn new(profile: u8, sample_rate_index: u8, channel_config: u8) -> Result<Self> {
        if profile > 3 {
            return Err(Error::invalid_audio_config(format!(
                "profile {profile} does not fit in 2 bits"
            )));
        }
        if sample_rate_index as usize >= SAMPLE_RATES.len() {
            return Err(Error::invalid_audio_config(format!(
                "sampling frequency index {sample_rate_index} is reserved or escape"
            )));
        }
        if channel_config > 7 {
            return Err(Error::invalid_audio_config(format!(
                "channel configuration {channel_config} does not fit in 3 bits"
            )));
        }
        Ok(Self {
            profile,
            sample_rate_index,
            channel_config,
        })
    }

    /// Parameters for the stream an AudioSpecificConfig describes.
    pub fn from_audio_specific_config(asc: &AudioSpecificConfig) -> Result<Self> {
        if asc.object_type == 0 || asc.object_type > 4 {
            return Err(Error::invalid_audio_config(format!(
                "audio object type {} cannot be carried in ADTS",
                asc.object_type
            )));
        }
        let index = if asc.sampling_frequency_index == 15 {
            sample_rate_index(asc.sampling_frequency).ok_or_else(|| {
                Error::invalid_audio_config(format!(
                    "sampling frequency {} Hz has no ADTS index",
                    asc.sampling_frequency
                ))
            })?
        } else {
            asc.sampling_frequency_index
        };
        Self::new(asc.object_type - 1, index, asc.channel_configuration)
    }

    /// Sampling frequency in Hz, or `None` for a reserved or escape index.
    pub fn sample_rate(&self) -> Option<u32> {
        SAMPLE_RATES.get(self.sample_rate_index as usize).copied()
    }

    /// Header for a frame carrying `payload_len` bytes.
    pub fn frame_header(&self, payload_len: usize) -> Result<[u8; ADTS_HEADER_LEN]> {
        let frame_len = payload_len
            .checked_add(ADTS_HEADER_LEN)
            .filter(|&len| len <= MAX_FRAME_LEN)
            .ok_or(Error::FrameTooLarge {
                length: payload_len,
            })?;
        // Fields are public, so a hand-built header is checked again here.
        Self::new(self.profile, self.sample_rate_index, self.channel_config)?;

        let mut out = [0u8; ADTS_HEADER_LEN];
        {
            let mut w = BitWriter::endian(&mut out[..], BigEndian);
            w.write(12, SYNCWORD)?;
            w.write_bit(false)?; // MPEG-4
            w.write(2, 0u8)?; // layer
            w.write_bit(true)?; // protection absent
            w.write(2, self.profile)?;
            w.write(4, self.sample_rate_index)?;
            w.write_bit(false)?; // private
            w.write(3, self.channel_config)?;
            w.write(4, 0u8)?; // original, home, copyright id and start
            w.write(13, frame_len as u16)?;
            w.write(11, VBR_FULLNESS)?;
            w.write(2, 0u8)?; // one raw data block
        }
        Ok(out)
    }

    /// Decode a header, returning the parameters and the frame length
    /// (header included).
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < ADTS_HEADER_LEN {
            return Err(Error::invalid_audio_config(format!(
                "ADTS header needs {ADTS_HEADER_LEN} bytes, got {}",
                data.len()
            )));
        }
        let bad = |e: std::io::Error| Error::invalid_audio_config(format!("ADTS header: {e}"));
        let mut r = BitReader::endian(data, BigEndian);

        let sync: u16 = r.read(12).map_err(bad)?;
        if sync != SYNCWORD {
            return Err(Error::invalid_audio_config(format!(
                "bad ADTS syncword 0x{sync:03x}"
            )));
        }
        r.skip(4).map_err(bad)?; // id, layer, protection absent
        let profile: u8 = r.read(2).map_err(bad)?;
        let sample_rate_index: u8 = r.read(4).map_err(bad)?;
        r.skip(1).map_err(bad)?;
        let channel_config: u8 = r.read(3).map_err(bad)?;
        r.skip(4).map_err(bad)?;
        let frame_len: u16 = r.read(13).map_err(bad)?;

        Ok((
            Self::new(profile, sample_rate_index, channel_config)?,
            frame_len as usize,
        ))
    }
}

impl Default for AdtsHeader {
    fn default() -> Self {
        Self::DEFAULT
    }
}
