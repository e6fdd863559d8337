//! File type box (`ftyp`).

use super::BoxCodec;
use crate::mp4::{BoxReader, FourCc};
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};

/// File type box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtypBox {
    pub major_brand: FourCc,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCc>,
}

impl FtypBox {
    /// Whether `brand` is the major brand or listed as compatible.
    pub fn has_brand(&self, brand: FourCc) -> bool {
        self.major_brand == brand || self.compatible_brands.contains(&brand)
    }
}

impl BoxCodec for FtypBox {
    const BOX_TYPE: FourCc = FourCc::FTYP;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let major_brand = reader.read_fourcc()?;
        let minor_version = reader.read_u32()?;
        if reader.remaining() % 4 != 0 {
            return Err(Error::invalid_box(
                Self::BOX_TYPE,
                reader.position(),
                "compatible brand list is not a multiple of 4 bytes",
            ));
        }
        let mut compatible_brands = Vec::with_capacity(reader.remaining() / 4);
        while !reader.is_empty() {
            compatible_brands.push(reader.read_fourcc()?);
        }
        Ok(Self {
            major_brand,
            minor_version,
            compatible_brands,
        })
    }

    fn payload_size(&self) -> u64 {
        8 + 4 * self.compatible_brands.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(self.major_brand.as_bytes());
        buf.put_u32(self.minor_version);
        for brand in &self.compatible_brands {
            buf.put_slice(brand.as_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::boxes::test_util::round_trip;

    #[test]
    fn test_ftyp_round_trip() {
        let ftyp = FtypBox {
            major_brand: FourCc(*b"iso6"),
            minor_version: 0x200,
            compatible_brands: vec![FourCc(*b"iso6"), FourCc(*b"dash"), FourCc(*b"cmfc")],
        };
        let (decoded, bytes) = round_trip(&ftyp);
        assert_eq!(decoded, ftyp);
        assert_eq!(bytes.len(), 8 + 8 + 12);
        assert!(decoded.has_brand(FourCc(*b"dash")));
        assert!(!decoded.has_brand(FourCc(*b"mp42")));
    }
}
