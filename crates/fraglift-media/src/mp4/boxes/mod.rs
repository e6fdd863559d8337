//! Typed leaf box codecs.
//!
//! Each codec keeps its decode, encode and size logic side by side so the
//! version-conditional layouts cannot drift apart.

mod fragment;
mod ftyp;
mod mdat;
mod prft;
mod sample_entry;
mod stbl;
mod track;

pub use fragment::{MfhdBox, TfdtBox, TfhdBox, TrexBox, TrunBox, TrunSample};
pub use ftyp::FtypBox;
pub use mdat::MdatBox;
pub use prft::{NtpTimestamp, PrftBox, PrftFlags};
pub use sample_entry::{AudioSpecificConfig, EsdsBox, Mp4aBox, StsdBox};
pub use stbl::{Co64Box, StcoBox, StscBox, StscEntry, StszBox};
pub use track::{HdlrBox, MdhdBox, TkhdBox};

use super::{BoxHeader, BoxReader, FourCc, Mp4Box};
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};

/// Codec for a box with a registered, typed layout.
pub trait BoxCodec: Sized {
    /// Type code this codec handles.
    const BOX_TYPE: FourCc;

    /// Decode the payload from a window covering exactly this box.
    fn decode_payload(reader: &mut BoxReader, depth: usize) -> Result<Self>;

    /// Payload length in bytes.
    fn payload_size(&self) -> u64;

    /// Write the payload (without header).
    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()>;

    /// Total size including header.
    fn size(&self) -> u64 {
        BoxHeader::for_payload(Self::BOX_TYPE, None, self.payload_size()).size
    }

    /// Write header and payload.
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        BoxHeader::for_payload(Self::BOX_TYPE, None, self.payload_size()).encode(buf);
        self.encode_payload(buf)
    }
}

/// Access to one variant of [`LeafBox`].
pub trait LeafVariant: BoxCodec {
    fn from_leaf(leaf: &LeafBox) -> Option<&Self>;
}

macro_rules! leaf_boxes {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// A decoded box with a typed layout.
        #[derive(Debug, Clone, PartialEq)]
        pub enum LeafBox {
            $($variant($ty),)*
        }

        impl LeafBox {
            pub fn box_type(&self) -> FourCc {
                match self {
                    $(Self::$variant(_) => <$ty as BoxCodec>::BOX_TYPE,)*
                }
            }

            pub fn size(&self) -> u64 {
                match self {
                    $(Self::$variant(b) => b.size(),)*
                }
            }

            pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
                match self {
                    $(Self::$variant(b) => b.encode(buf),)*
                }
            }
        }

        $(
            impl From<$ty> for LeafBox {
                fn from(b: $ty) -> Self {
                    Self::$variant(b)
                }
            }

            impl From<$ty> for Mp4Box {
                fn from(b: $ty) -> Self {
                    Mp4Box::Leaf(LeafBox::$variant(b))
                }
            }

            impl LeafVariant for $ty {
                fn from_leaf(leaf: &LeafBox) -> Option<&Self> {
                    match leaf {
                        LeafBox::$variant(b) => Some(b),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )*
    };
}

leaf_boxes! {
    Ftyp(FtypBox),
    Tkhd(TkhdBox),
    Mdhd(MdhdBox),
    Hdlr(HdlrBox),
    Stsd(StsdBox),
    Mp4a(Mp4aBox),
    Esds(EsdsBox),
    Stsz(StszBox),
    Stsc(StscBox),
    Stco(StcoBox),
    Co64(Co64Box),
    Trex(TrexBox),
    Mfhd(MfhdBox),
    Tfhd(TfhdBox),
    Tfdt(TfdtBox),
    Trun(TrunBox),
    Prft(PrftBox),
    Mdat(MdatBox),
}

impl LeafBox {
    /// Child boxes carried inside a leaf layout (sample entries).
    pub fn children(&self) -> &[Mp4Box] {
        match self {
            Self::Stsd(b) => &b.entries,
            Self::Mp4a(b) => &b.children,
            _ => &[],
        }
    }
}

/// Upper bound on samples described without per-sample bytes (a fieldless
/// `trun`, a uniform-size `stsz`), where the payload length cannot bound
/// the allocation.
pub(crate) const MAX_FIELDLESS_SAMPLES: usize = 1 << 20;

/// Write the combined version and flags word. Flags are masked to 24 bits.
pub(crate) fn put_version_flags(buf: &mut BytesMut, version: u8, flags: u32) {
    buf.put_u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
}

/// Reject encoding of versions with no defined layout.
pub(crate) fn check_version(box_type: FourCc, version: u8) -> Result<()> {
    if version > 1 {
        return Err(Error::UnsupportedVersion { box_type, version });
    }
    Ok(())
}

/// Read a time field that is 32 bits wide in version 0 and 64 bits wide
/// otherwise.
pub(crate) fn read_versioned_time(reader: &mut BoxReader, version: u8) -> Result<u64> {
    if version == 0 {
        Ok(reader.read_u32()? as u64)
    } else {
        reader.read_u64()
    }
}

/// Write a time field with the width selected by `version`.
pub(crate) fn put_versioned_time(
    buf: &mut BytesMut,
    box_type: FourCc,
    version: u8,
    value: u64,
) -> Result<()> {
    if version == 0 {
        let narrow = u32::try_from(value).map_err(|_| {
            Error::invalid_box(
                box_type,
                0,
                format!("value {value} does not fit the 32-bit version 0 layout"),
            )
        })?;
        buf.put_u32(narrow);
    } else {
        buf.put_u64(value);
    }
    Ok(())
}

/// Width in bytes of a versioned time field.
pub(crate) fn versioned_time_width(version: u8) -> u64 {
    if version == 0 {
        4
    } else {
        8
    }
}
