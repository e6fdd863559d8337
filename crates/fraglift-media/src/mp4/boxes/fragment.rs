//! Movie fragment leaf boxes: `mfhd`, `trex`, `tfhd`, `tfdt`, `trun`.
//!
//! Optional fields of `tfhd` and `trun` are present exactly when their
//! flag bit is set. The flags word is authoritative: encoding fails if a
//! field's presence disagrees with it.

use super::{
    check_version, put_version_flags, put_versioned_time, read_versioned_time,
    versioned_time_width, BoxCodec, MAX_FIELDLESS_SAMPLES,
};
use crate::mp4::{BoxReader, FourCc};
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};

/// Movie fragment header box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MfhdBox {
    pub version: u8,
    pub flags: u32,
    pub sequence_number: u32,
}

impl BoxCodec for MfhdBox {
    const BOX_TYPE: FourCc = FourCc::MFHD;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        Ok(Self {
            version,
            flags,
            sequence_number: reader.read_u32()?,
        })
    }

    fn payload_size(&self) -> u64 {
        8
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        put_version_flags(buf, self.version, self.flags);
        buf.put_u32(self.sequence_number);
        Ok(())
    }
}

/// Track extends box: per-track defaults for fragments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrexBox {
    pub version: u8,
    pub flags: u32,
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

impl BoxCodec for TrexBox {
    const BOX_TYPE: FourCc = FourCc::TREX;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        Ok(Self {
            version,
            flags,
            track_id: reader.read_u32()?,
            default_sample_description_index: reader.read_u32()?,
            default_sample_duration: reader.read_u32()?,
            default_sample_size: reader.read_u32()?,
            default_sample_flags: reader.read_u32()?,
        })
    }

    fn payload_size(&self) -> u64 {
        24
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        put_version_flags(buf, self.version, self.flags);
        buf.put_u32(self.track_id);
        buf.put_u32(self.default_sample_description_index);
        buf.put_u32(self.default_sample_duration);
        buf.put_u32(self.default_sample_size);
        buf.put_u32(self.default_sample_flags);
        Ok(())
    }
}

/// Track fragment header box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TfhdBox {
    pub version: u8,
    pub flags: u32,
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
}

impl TfhdBox {
    pub const BASE_DATA_OFFSET: u32 = 0x000001;
    pub const SAMPLE_DESCRIPTION_INDEX: u32 = 0x000002;
    pub const DEFAULT_SAMPLE_DURATION: u32 = 0x000008;
    pub const DEFAULT_SAMPLE_SIZE: u32 = 0x000010;
    pub const DEFAULT_SAMPLE_FLAGS: u32 = 0x000020;
    pub const DURATION_IS_EMPTY: u32 = 0x010000;
    pub const DEFAULT_BASE_IS_MOOF: u32 = 0x020000;

    /// Header with `default-base-is-moof` and no optional fields.
    pub fn new(track_id: u32) -> Self {
        Self {
            flags: Self::DEFAULT_BASE_IS_MOOF,
            track_id,
            ..Default::default()
        }
    }

    pub fn with_default_sample_size(mut self, size: u32) -> Self {
        self.flags |= Self::DEFAULT_SAMPLE_SIZE;
        self.default_sample_size = Some(size);
        self
    }

    pub fn with_base_data_offset(mut self, offset: u64) -> Self {
        self.flags |= Self::BASE_DATA_OFFSET;
        self.flags &= !Self::DEFAULT_BASE_IS_MOOF;
        self.base_data_offset = Some(offset);
        self
    }

    /// Data offsets in this fragment are relative to the enclosing `moof`.
    ///
    /// True with `default-base-is-moof`, and also when no base offset is
    /// given at all: the base is then the `moof` of the first track fragment,
    /// which for single-`traf` fragments is the same thing.
    pub fn base_is_moof(&self) -> bool {
        self.flags & Self::DEFAULT_BASE_IS_MOOF != 0 || self.base_data_offset.is_none()
    }
}

fn present(flags: u32, bit: u32) -> bool {
    flags & bit != 0
}

fn read_if(reader: &mut BoxReader, flags: u32, bit: u32) -> Result<Option<u32>> {
    if present(flags, bit) {
        Ok(Some(reader.read_u32()?))
    } else {
        Ok(None)
    }
}

fn check_presence<T>(box_type: FourCc, flags: u32, bit: u32, field: &Option<T>, name: &str) -> Result<()> {
    if present(flags, bit) != field.is_some() {
        return Err(Error::invalid_box(
            box_type,
            0,
            format!("flag 0x{bit:06x} disagrees with presence of {name}"),
        ));
    }
    Ok(())
}

impl BoxCodec for TfhdBox {
    const BOX_TYPE: FourCc = FourCc::TFHD;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        let track_id = reader.read_u32()?;
        let base_data_offset = if present(flags, Self::BASE_DATA_OFFSET) {
            Some(reader.read_u64()?)
        } else {
            None
        };
        Ok(Self {
            version,
            flags,
            track_id,
            base_data_offset,
            sample_description_index: read_if(reader, flags, Self::SAMPLE_DESCRIPTION_INDEX)?,
            default_sample_duration: read_if(reader, flags, Self::DEFAULT_SAMPLE_DURATION)?,
            default_sample_size: read_if(reader, flags, Self::DEFAULT_SAMPLE_SIZE)?,
            default_sample_flags: read_if(reader, flags, Self::DEFAULT_SAMPLE_FLAGS)?,
        })
    }

    fn payload_size(&self) -> u64 {
        let mut size = 8;
        if self.base_data_offset.is_some() {
            size += 8;
        }
        for field in [
            self.sample_description_index,
            self.default_sample_duration,
            self.default_sample_size,
            self.default_sample_flags,
        ] {
            if field.is_some() {
                size += 4;
            }
        }
        size
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        let t = Self::BOX_TYPE;
        check_presence(t, self.flags, Self::BASE_DATA_OFFSET, &self.base_data_offset, "base_data_offset")?;
        check_presence(t, self.flags, Self::SAMPLE_DESCRIPTION_INDEX, &self.sample_description_index, "sample_description_index")?;
        check_presence(t, self.flags, Self::DEFAULT_SAMPLE_DURATION, &self.default_sample_duration, "default_sample_duration")?;
        check_presence(t, self.flags, Self::DEFAULT_SAMPLE_SIZE, &self.default_sample_size, "default_sample_size")?;
        check_presence(t, self.flags, Self::DEFAULT_SAMPLE_FLAGS, &self.default_sample_flags, "default_sample_flags")?;

        put_version_flags(buf, self.version, self.flags);
        buf.put_u32(self.track_id);
        if let Some(offset) = self.base_data_offset {
            buf.put_u64(offset);
        }
        for field in [
            self.sample_description_index,
            self.default_sample_duration,
            self.default_sample_size,
            self.default_sample_flags,
        ]
        .into_iter()
        .flatten()
        {
            buf.put_u32(field);
        }
        Ok(())
    }
}

/// Track fragment base media decode time box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TfdtBox {
    pub version: u8,
    pub flags: u32,
    pub base_media_decode_time: u64,
}

impl BoxCodec for TfdtBox {
    const BOX_TYPE: FourCc = FourCc::TFDT;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        Ok(Self {
            version,
            flags,
            base_media_decode_time: read_versioned_time(reader, version)?,
        })
    }

    fn payload_size(&self) -> u64 {
        4 + versioned_time_width(self.version)
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        check_version(Self::BOX_TYPE, self.version)?;
        put_version_flags(buf, self.version, self.flags);
        put_versioned_time(buf, Self::BOX_TYPE, self.version, self.base_media_decode_time)
    }
}

/// One entry of a track run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrunSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    /// Unsigned in version 0, signed in version 1; the bit pattern is kept.
    pub composition_time_offset: Option<i32>,
}

/// Track fragment run box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrunBox {
    pub version: u8,
    pub flags: u32,
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub samples: Vec<TrunSample>,
}

impl TrunBox {
    pub const DATA_OFFSET: u32 = 0x000001;
    pub const FIRST_SAMPLE_FLAGS: u32 = 0x000004;
    pub const SAMPLE_DURATION: u32 = 0x000100;
    pub const SAMPLE_SIZE: u32 = 0x000200;
    pub const SAMPLE_FLAGS: u32 = 0x000400;
    pub const SAMPLE_COMPOSITION_TIME_OFFSET: u32 = 0x000800;

    /// Run carrying only per-sample sizes.
    pub fn with_sizes(sizes: &[u32]) -> Self {
        Self {
            flags: Self::SAMPLE_SIZE,
            samples: sizes
                .iter()
                .map(|&size| TrunSample {
                    size: Some(size),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_data_offset(mut self, offset: i32) -> Self {
        self.flags |= Self::DATA_OFFSET;
        self.data_offset = Some(offset);
        self
    }

    pub fn sample_count(&self) -> u32 {
        self.samples.len() as u32
    }

    fn per_sample_len(flags: u32) -> u64 {
        [
            Self::SAMPLE_DURATION,
            Self::SAMPLE_SIZE,
            Self::SAMPLE_FLAGS,
            Self::SAMPLE_COMPOSITION_TIME_OFFSET,
        ]
        .iter()
        .filter(|bit| present(flags, **bit))
        .count() as u64
            * 4
    }
}

impl BoxCodec for TrunBox {
    const BOX_TYPE: FourCc = FourCc::TRUN;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        let sample_count = reader.read_u32()? as usize;
        let data_offset = if present(flags, Self::DATA_OFFSET) {
            Some(reader.read_i32()?)
        } else {
            None
        };
        let first_sample_flags = read_if(reader, flags, Self::FIRST_SAMPLE_FLAGS)?;

        let per_sample = Self::per_sample_len(flags) as usize;
        if per_sample == 0 && sample_count > MAX_FIELDLESS_SAMPLES {
            return Err(Error::invalid_box(
                Self::BOX_TYPE,
                reader.position(),
                format!("{sample_count} samples without per-sample fields"),
            ));
        }
        reader.ensure(sample_count.checked_mul(per_sample).unwrap_or(usize::MAX))?;

        let mut samples = Vec::with_capacity(sample_count);
        for _ in 0..sample_count {
            samples.push(TrunSample {
                duration: read_if(reader, flags, Self::SAMPLE_DURATION)?,
                size: read_if(reader, flags, Self::SAMPLE_SIZE)?,
                flags: read_if(reader, flags, Self::SAMPLE_FLAGS)?,
                composition_time_offset: read_if(reader, flags, Self::SAMPLE_COMPOSITION_TIME_OFFSET)?
                    .map(|v| v as i32),
            });
        }

        Ok(Self {
            version,
            flags,
            data_offset,
            first_sample_flags,
            samples,
        })
    }

    fn payload_size(&self) -> u64 {
        let mut size = 8;
        if self.data_offset.is_some() {
            size += 4;
        }
        if self.first_sample_flags.is_some() {
            size += 4;
        }
        size + Self::per_sample_len(self.flags) * self.samples.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        let t = Self::BOX_TYPE;
        check_presence(t, self.flags, Self::DATA_OFFSET, &self.data_offset, "data_offset")?;
        check_presence(t, self.flags, Self::FIRST_SAMPLE_FLAGS, &self.first_sample_flags, "first_sample_flags")?;
        for s in &self.samples {
            check_presence(t, self.flags, Self::SAMPLE_DURATION, &s.duration, "sample duration")?;
            check_presence(t, self.flags, Self::SAMPLE_SIZE, &s.size, "sample size")?;
            check_presence(t, self.flags, Self::SAMPLE_FLAGS, &s.flags, "sample flags")?;
            check_presence(
                t,
                self.flags,
                Self::SAMPLE_COMPOSITION_TIME_OFFSET,
                &s.composition_time_offset,
                "composition time offset",
            )?;
        }

        put_version_flags(buf, self.version, self.flags);
        buf.put_u32(self.sample_count());
        if let Some(offset) = self.data_offset {
            buf.put_i32(offset);
        }
        if let Some(flags) = self.first_sample_flags {
            buf.put_u32(flags);
        }
        for s in &self.samples {
            for field in [s.duration, s.size, s.flags, s.composition_time_offset.map(|v| v as u32)]
                .into_iter()
                .flatten()
            {
                buf.put_u32(field);
            }
        }
        Ok(())
    }
}
