//! Media data box (`mdat`).

use super::BoxCodec;
use crate::mp4::{BoxReader, FourCc};
use crate::Result;
use bytes::{BufMut, Bytes, BytesMut};

/// Raw sample bytes. The payload shares the input buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MdatBox {
    pub data: Bytes,
}

impl MdatBox {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl BoxCodec for MdatBox {
    const BOX_TYPE: FourCc = FourCc::MDAT;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        Ok(Self {
            data: reader.read_to_end(),
        })
    }

    fn payload_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(&self.data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::boxes::test_util::round_trip;

    #[test]
    fn test_mdat_round_trip() {
        let mdat = MdatBox::new(vec![1u8, 2, 3, 4, 5]);
        let (decoded, bytes) = round_trip(&mdat);
        assert_eq!(decoded, mdat);
        assert_eq!(&bytes[..8], b"\x00\x00\x00\x0dmdat");
    }
}
