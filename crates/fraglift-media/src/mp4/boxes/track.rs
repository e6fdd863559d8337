//! Track-level header boxes: `tkhd`, `mdhd`, `hdlr`.

use super::{
    check_version, put_version_flags, put_versioned_time, read_versioned_time,
    versioned_time_width, BoxCodec,
};
use crate::mp4::{BoxReader, FourCc};
use crate::Result;
use bytes::{BufMut, Bytes, BytesMut};

/// Unity transformation matrix.
pub const IDENTITY_MATRIX: [i32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

/// Track header box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TkhdBox {
    pub version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub reserved1: u32,
    pub duration: u64,
    pub reserved2: [u8; 8],
    pub layer: i16,
    pub alternate_group: i16,
    /// 8.8 fixed point; 0x0100 for audio tracks.
    pub volume: i16,
    pub reserved3: u16,
    pub matrix: [i32; 9],
    /// 16.16 fixed point.
    pub width: u32,
    /// 16.16 fixed point.
    pub height: u32,
}

impl TkhdBox {
    /// Enabled, in movie, in preview.
    pub const DEFAULT_FLAGS: u32 = 0x000007;

    pub fn new(track_id: u32) -> Self {
        Self {
            version: 0,
            flags: Self::DEFAULT_FLAGS,
            creation_time: 0,
            modification_time: 0,
            track_id,
            reserved1: 0,
            duration: 0,
            reserved2: [0; 8],
            layer: 0,
            alternate_group: 0,
            volume: 0,
            reserved3: 0,
            matrix: IDENTITY_MATRIX,
            width: 0,
            height: 0,
        }
    }
}

impl BoxCodec for TkhdBox {
    const BOX_TYPE: FourCc = FourCc::TKHD;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        let creation_time = read_versioned_time(reader, version)?;
        let modification_time = read_versioned_time(reader, version)?;
        let track_id = reader.read_u32()?;
        let reserved1 = reader.read_u32()?;
        let duration = read_versioned_time(reader, version)?;
        let reserved2 = reader.read_array()?;
        let layer = reader.read_i16()?;
        let alternate_group = reader.read_i16()?;
        let volume = reader.read_i16()?;
        let reserved3 = reader.read_u16()?;
        let mut matrix = [0i32; 9];
        for m in &mut matrix {
            *m = reader.read_i32()?;
        }
        let width = reader.read_u32()?;
        let height = reader.read_u32()?;
        Ok(Self {
            version,
            flags,
            creation_time,
            modification_time,
            track_id,
            reserved1,
            duration,
            reserved2,
            layer,
            alternate_group,
            volume,
            reserved3,
            matrix,
            width,
            height,
        })
    }

    fn payload_size(&self) -> u64 {
        4 + 3 * versioned_time_width(self.version) + 8 + 60
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        check_version(Self::BOX_TYPE, self.version)?;
        put_version_flags(buf, self.version, self.flags);
        put_versioned_time(buf, Self::BOX_TYPE, self.version, self.creation_time)?;
        put_versioned_time(buf, Self::BOX_TYPE, self.version, self.modification_time)?;
        buf.put_u32(self.track_id);
        buf.put_u32(self.reserved1);
        put_versioned_time(buf, Self::BOX_TYPE, self.version, self.duration)?;
        buf.put_slice(&self.reserved2);
        buf.put_i16(self.layer);
        buf.put_i16(self.alternate_group);
        buf.put_i16(self.volume);
        buf.put_u16(self.reserved3);
        for m in &self.matrix {
            buf.put_i32(*m);
        }
        buf.put_u32(self.width);
        buf.put_u32(self.height);
        Ok(())
    }
}

/// Media header box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdhdBox {
    pub version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    /// Packed ISO-639-2/T code, three 5-bit letters.
    pub language: u16,
    pub pre_defined: u16,
}

impl MdhdBox {
    pub fn new(timescale: u32) -> Self {
        Self {
            version: 0,
            flags: 0,
            creation_time: 0,
            modification_time: 0,
            timescale,
            duration: 0,
            language: 0x55C4, // "und"
            pre_defined: 0,
        }
    }

    /// Three-letter language code.
    pub fn language_code(&self) -> String {
        (0..3)
            .rev()
            .map(|i| (((self.language >> (i * 5)) & 0x1F) as u8 + 0x60) as char)
            .collect()
    }
}

impl BoxCodec for MdhdBox {
    const BOX_TYPE: FourCc = FourCc::MDHD;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        let creation_time = read_versioned_time(reader, version)?;
        let modification_time = read_versioned_time(reader, version)?;
        let timescale = reader.read_u32()?;
        let duration = read_versioned_time(reader, version)?;
        let language = reader.read_u16()?;
        let pre_defined = reader.read_u16()?;
        Ok(Self {
            version,
            flags,
            creation_time,
            modification_time,
            timescale,
            duration,
            language,
            pre_defined,
        })
    }

    fn payload_size(&self) -> u64 {
        4 + 3 * versioned_time_width(self.version) + 4 + 4
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        check_version(Self::BOX_TYPE, self.version)?;
        put_version_flags(buf, self.version, self.flags);
        put_versioned_time(buf, Self::BOX_TYPE, self.version, self.creation_time)?;
        put_versioned_time(buf, Self::BOX_TYPE, self.version, self.modification_time)?;
        buf.put_u32(self.timescale);
        put_versioned_time(buf, Self::BOX_TYPE, self.version, self.duration)?;
        buf.put_u16(self.language);
        buf.put_u16(self.pre_defined);
        Ok(())
    }
}

/// Handler reference box: declares the media type of a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdlrBox {
    pub version: u8,
    pub flags: u32,
    pub pre_defined: u32,
    /// `soun`, `vide`, `text`, ...
    pub handler_type: FourCc,
    pub reserved: [u8; 12],
    /// Raw name bytes, normally NUL-terminated UTF-8.
    pub name: Bytes,
}

impl HdlrBox {
    pub fn new(handler_type: FourCc, name: &str) -> Self {
        let mut raw = name.as_bytes().to_vec();
        raw.push(0);
        Self {
            version: 0,
            flags: 0,
            pre_defined: 0,
            handler_type,
            reserved: [0; 12],
            name: Bytes::from(raw),
        }
    }

    /// Name without the trailing NUL.
    pub fn name_str(&self) -> String {
        let raw = self.name.strip_suffix(&[0u8]).unwrap_or(&self.name[..]);
        String::from_utf8_lossy(raw).into_owned()
    }
}

impl BoxCodec for HdlrBox {
    const BOX_TYPE: FourCc = FourCc::HDLR;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        let pre_defined = reader.read_u32()?;
        let handler_type = reader.read_fourcc()?;
        let reserved = reader.read_array()?;
        let name = reader.read_to_end();
        Ok(Self {
            version,
            flags,
            pre_defined,
            handler_type,
            reserved,
            name,
        })
    }

    fn payload_size(&self) -> u64 {
        4 + 4 + 4 + 12 + self.name.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        put_version_flags(buf, self.version, self.flags);
        buf.put_u32(self.pre_defined);
        buf.put_slice(self.handler_type.as_bytes());
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.name);
        Ok(())
    }
}
