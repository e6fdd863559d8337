//! Universal box header codec.
//!
//! Layout: 32-bit size, four-character type, then a 64-bit size when the
//! 32-bit size is 1, then a 16-byte extended type when the type is `uuid`.

use super::{BoxReader, FourCc};
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};

/// Compact header length (size + type).
pub const COMPACT_HEADER_LEN: u64 = 8;

/// Parsed box header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Declared total size including the header. Zero means the box extends
    /// to the end of the input.
    pub size: u64,
    /// Box type code.
    pub box_type: FourCc,
    /// Whether the size is carried in the 64-bit extension.
    pub extended_size: bool,
    /// Extended type of `uuid` boxes.
    pub user_type: Option<[u8; 16]>,
}

impl BoxHeader {
    /// Build the header for a payload of `payload_len` bytes, using the
    /// compact size form unless the total does not fit in 32 bits.
    pub fn for_payload(box_type: FourCc, user_type: Option<[u8; 16]>, payload_len: u64) -> Self {
        let base = COMPACT_HEADER_LEN + if user_type.is_some() { 16 } else { 0 };
        let compact = base + payload_len;
        if compact > u32::MAX as u64 {
            Self {
                size: compact + 8,
                box_type,
                extended_size: true,
                user_type,
            }
        } else {
            Self {
                size: compact,
                box_type,
                extended_size: false,
                user_type,
            }
        }
    }

    /// Encoded header length (8, 16, 24 or 32 bytes).
    pub fn header_len(&self) -> u64 {
        let mut len = COMPACT_HEADER_LEN;
        if self.extended_size {
            len += 8;
        }
        if self.user_type.is_some() {
            len += 16;
        }
        len
    }

    /// Payload length, or `None` for a size-0 (to end of input) header.
    pub fn payload_len(&self) -> Option<u64> {
        (self.size != 0).then(|| self.size - self.header_len())
    }

    /// Decode a header, returning it with the number of bytes consumed.
    pub fn decode(reader: &mut BoxReader) -> Result<(Self, u64)> {
        let offset = reader.position();
        if reader.remaining() < COMPACT_HEADER_LEN as usize {
            return Err(Error::malformed_header(
                offset,
                format!("need 8 bytes, {} remain", reader.remaining()),
            ));
        }

        let size32 = reader.read_u32()?;
        let box_type = reader.read_fourcc()?;

        let (size, extended_size) = if size32 == 1 {
            if reader.remaining() < 8 {
                return Err(Error::malformed_header(
                    offset,
                    format!("'{box_type}' declares a 64-bit size but only {} bytes remain", reader.remaining()),
                ));
            }
            (reader.read_u64()?, true)
        } else {
            (size32 as u64, false)
        };

        let user_type = if box_type == FourCc::UUID {
            if reader.remaining() < 16 {
                return Err(Error::malformed_header(
                    offset,
                    "uuid box without its 16-byte extended type",
                ));
            }
            Some(reader.read_array::<16>()?)
        } else {
            None
        };

        let header = Self {
            size,
            box_type,
            extended_size,
            user_type,
        };

        if size != 0 && size < header.header_len() {
            return Err(Error::malformed_header(
                offset,
                format!(
                    "'{box_type}' size {size} is smaller than its {}-byte header",
                    header.header_len()
                ),
            ));
        }

        Ok((header, reader.position() - offset))
    }

    /// Encode the header.
    pub fn encode(&self, buf: &mut BytesMut) {
        if self.extended_size || self.size > u32::MAX as u64 {
            buf.put_u32(1);
            buf.put_slice(self.box_type.as_bytes());
            buf.put_u64(self.size);
        } else {
            buf.put_u32(self.size as u32);
            buf.put_slice(self.box_type.as_bytes());
        }
        if let Some(user_type) = &self.user_type {
            buf.put_slice(user_type);
        }
    }
}
