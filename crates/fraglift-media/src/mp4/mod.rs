//! ISO base media file format box codec.
//!
//! A file is decoded once into a tree of [`Mp4Box`] values. Typed leaf
//! boxes, containers and unknown boxes all re-encode to the bytes they were
//! decoded from, as long as the input used canonical headers (compact size
//! form, no size-0 box).

mod atoms;
pub mod boxes;
mod header;
mod reader;
mod registry;
mod tree;

pub use atoms::FourCc;
pub use boxes::{
    AudioSpecificConfig, BoxCodec, Co64Box, EsdsBox, FtypBox, HdlrBox, LeafBox, LeafVariant,
    MdatBox, MdhdBox, MfhdBox, Mp4aBox, NtpTimestamp, PrftBox, PrftFlags, StcoBox, StscBox,
    StscEntry, StsdBox, StszBox, TfdtBox, TfhdBox, TkhdBox, TrexBox, TrunBox, TrunSample,
};
pub use header::{BoxHeader, COMPACT_HEADER_LEN};
pub use reader::BoxReader;
pub use registry::{decode_box, decode_children, is_registered, MAX_DEPTH};
pub use tree::{ContainerBox, Mp4Box, OpaqueBox};

use crate::Result;
use bytes::{Bytes, BytesMut};
use std::io::Write;

/// Position of a top-level box in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxSpan {
    /// Offset of the first header byte.
    pub offset: u64,
    /// Header length as found in the input.
    pub header_len: u64,
    /// Total length as found in the input.
    pub size: u64,
}

impl BoxSpan {
    /// Offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        self.offset + self.header_len
    }
}

/// A fully decoded file: the top-level box sequence and the buffer it was
/// decoded from.
#[derive(Debug, Clone)]
pub struct Mp4File {
    boxes: Vec<Mp4Box>,
    spans: Vec<BoxSpan>,
    source: Bytes,
}

impl Mp4File {
    /// Decode every top-level box of `source`.
    pub fn decode(source: Bytes) -> Result<Self> {
        let mut reader = BoxReader::new(source.clone());
        let mut boxes = Vec::new();
        let mut spans = Vec::new();

        while !reader.is_empty() {
            let offset = reader.position();
            let (header, _) = BoxHeader::decode(&mut reader.clone())?;
            let b = decode_box(&mut reader, 0)?;

            #[cfg(feature = "tracing")]
            tracing::trace!(box_type = %b.box_type(), offset, "decoded top-level box");

            spans.push(BoxSpan {
                offset,
                header_len: header.header_len(),
                size: reader.position() - offset,
            });
            boxes.push(b);
        }

        Ok(Self {
            boxes,
            spans,
            source,
        })
    }

    /// Build a file from boxes; the source buffer is their encoding.
    pub fn from_boxes(boxes: Vec<Mp4Box>) -> Result<Self> {
        let mut buf = BytesMut::new();
        let mut spans = Vec::with_capacity(boxes.len());
        for b in &boxes {
            let offset = buf.len() as u64;
            b.encode(&mut buf)?;
            let size = buf.len() as u64 - offset;
            let header = BoxHeader {
                size,
                box_type: b.box_type(),
                extended_size: size > u32::MAX as u64,
                user_type: user_type(b),
            };
            spans.push(BoxSpan {
                offset,
                header_len: header.header_len(),
                size,
            });
        }
        Ok(Self {
            boxes,
            spans,
            source: buf.freeze(),
        })
    }

    /// Top-level boxes in file order.
    pub fn boxes(&self) -> &[Mp4Box] {
        &self.boxes
    }

    /// Top-level boxes paired with their positions in the source.
    pub fn iter(&self) -> impl Iterator<Item = (&BoxSpan, &Mp4Box)> {
        self.spans.iter().zip(&self.boxes)
    }

    /// The buffer the boxes were decoded from.
    pub fn source(&self) -> &Bytes {
        &self.source
    }

    /// The movie box, if present.
    pub fn moov(&self) -> Option<&ContainerBox> {
        self.boxes
            .iter()
            .filter_map(Mp4Box::as_container)
            .find(|c| c.box_type == FourCc::MOOV)
    }

    /// First top-level leaf of type `T`.
    pub fn leaf<T: LeafVariant>(&self) -> Option<&T> {
        self.boxes.iter().find_map(Mp4Box::as_leaf::<T>)
    }

    /// Re-encode the box sequence.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.boxes.iter().map(|b| b.size() as usize).sum());
        for b in &self.boxes {
            b.encode(&mut buf)?;
        }
        Ok(buf.freeze())
    }

    /// Re-encode into `writer`, returning the number of bytes written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let bytes = self.encode()?;
        writer.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Visit every box depth-first with its nesting depth (0 for top-level).
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&Mp4Box, usize),
    {
        fn go<F: FnMut(&Mp4Box, usize)>(b: &Mp4Box, depth: usize, visit: &mut F) {
            visit(b, depth);
            for child in b.children() {
                go(child, depth + 1, visit);
            }
        }
        for b in &self.boxes {
            go(b, 0, &mut visit);
        }
    }
}

fn user_type(b: &Mp4Box) -> Option<[u8; 16]> {
    match b {
        Mp4Box::Opaque(o) => o.user_type,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> Mp4File {
        Mp4File::from_boxes(vec![
            FtypBox {
                major_brand: FourCc(*b"iso6"),
                minor_version: 0,
                compatible_brands: vec![FourCc(*b"dash")],
            }
            .into(),
            ContainerBox::new(
                FourCc::MOOF,
                vec![
                    MfhdBox {
                        sequence_number: 1,
                        ..Default::default()
                    }
                    .into(),
                    ContainerBox::new(
                        FourCc::TRAF,
                        vec![TfhdBox::new(1).into(), TrunBox::with_sizes(&[3, 4]).into()],
                    )
                    .into(),
                ],
            )
            .into(),
            MdatBox::new(vec![0u8; 7]).into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_decode_encode_identity() {
        let built = sample_file();
        let bytes = built.encode().unwrap();
        assert_eq!(&bytes, built.source());

        let decoded = Mp4File::decode(bytes.clone()).unwrap();
        assert_eq!(decoded.boxes(), built.boxes());
        assert_eq!(decoded.encode().unwrap(), bytes);
        let spans: Vec<_> = decoded.iter().map(|(s, _)| *s).collect();
        let built_spans: Vec<_> = built.iter().map(|(s, _)| *s).collect();
        assert_eq!(spans, built_spans);
    }

    #[test]
    fn test_spans() {
        let file = sample_file();
        let spans: Vec<_> = file.iter().map(|(s, _)| *s).collect();
        assert_eq!(spans[0].offset, 0);
        assert_eq!(spans[1].offset, spans[0].size);
        let mdat = spans[2];
        assert_eq!(mdat.header_len, 8);
        assert_eq!(mdat.size, 15);
        assert_eq!(mdat.payload_offset() + 7, file.source().len() as u64);
    }

    #[test]
    fn test_walk_depths() {
        let file = sample_file();
        let mut seen = Vec::new();
        file.walk(|b, depth| seen.push((b.box_type().to_string(), depth)));
        let expected = [
            ("ftyp", 0),
            ("moof", 0),
            ("mfhd", 1),
            ("traf", 1),
            ("tfhd", 2),
            ("trun", 2),
            ("mdat", 0),
        ];
        let expected: Vec<_> = expected.iter().map(|(t, d)| (t.to_string(), *d)).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_write_to() {
        let file = sample_file();
        let mut out = Vec::new();
        let written = file.write_to(&mut out).unwrap();
        assert_eq!(written, out.len() as u64);
        assert_eq!(&out[..], &file.source()[..]);
    }

    #[test]
    fn test_trailing_garbage_is_malformed() {
        let mut raw = sample_file().encode().unwrap().to_vec();
        raw.extend_from_slice(&[0, 0, 0]);
        assert!(matches!(
            Mp4File::decode(raw.into()),
            Err(crate::Error::MalformedHeader { .. })
        ));
    }
}
