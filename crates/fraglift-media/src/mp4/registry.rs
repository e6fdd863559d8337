//! Type-code registry and bounded recursive descent.
//!
//! Every box is decoded through [`decode_box`]: the header is read, the
//! declared size is checked against the parent window, and the payload is
//! handed to the registered decoder as a window of exactly that size.
//! Unregistered types are kept as [`OpaqueBox`].

use super::boxes::{
    BoxCodec, Co64Box, EsdsBox, FtypBox, HdlrBox, MdatBox, MdhdBox, MfhdBox, Mp4aBox, PrftBox,
    StcoBox, StscBox, StsdBox, StszBox, TfdtBox, TfhdBox, TkhdBox, TrexBox, TrunBox,
};
use super::{BoxHeader, BoxReader, ContainerBox, FourCc, Mp4Box, OpaqueBox, COMPACT_HEADER_LEN};
use crate::{Error, Result};

/// Maximum nesting depth accepted on decode.
pub const MAX_DEPTH: usize = 64;

/// Decoder for the payload window of one box type.
type DecodeFn = fn(&mut BoxReader, usize) -> Result<Mp4Box>;

static REGISTRY: &[(FourCc, DecodeFn)] = &[
    (FourCc::MOOV, decode_container as DecodeFn),
    (FourCc::TRAK, decode_container),
    (FourCc::MDIA, decode_container),
    (FourCc::MINF, decode_container),
    (FourCc::STBL, decode_container),
    (FourCc::DINF, decode_container),
    (FourCc::EDTS, decode_container),
    (FourCc::MVEX, decode_container),
    (FourCc::MOOF, decode_container),
    (FourCc::TRAF, decode_container),
    (FourCc::MFRA, decode_container),
    (FourCc::UDTA, decode_container),
    (FtypBox::BOX_TYPE, decode_leaf::<FtypBox>),
    (FourCc::STYP, decode_styp),
    (TkhdBox::BOX_TYPE, decode_leaf::<TkhdBox>),
    (MdhdBox::BOX_TYPE, decode_leaf::<MdhdBox>),
    (HdlrBox::BOX_TYPE, decode_leaf::<HdlrBox>),
    (StsdBox::BOX_TYPE, decode_leaf::<StsdBox>),
    (Mp4aBox::BOX_TYPE, decode_leaf::<Mp4aBox>),
    (EsdsBox::BOX_TYPE, decode_leaf::<EsdsBox>),
    (StszBox::BOX_TYPE, decode_leaf::<StszBox>),
    (StscBox::BOX_TYPE, decode_leaf::<StscBox>),
    (StcoBox::BOX_TYPE, decode_leaf::<StcoBox>),
    (Co64Box::BOX_TYPE, decode_leaf::<Co64Box>),
    (TrexBox::BOX_TYPE, decode_leaf::<TrexBox>),
    (MfhdBox::BOX_TYPE, decode_leaf::<MfhdBox>),
    (TfhdBox::BOX_TYPE, decode_leaf::<TfhdBox>),
    (TfdtBox::BOX_TYPE, decode_leaf::<TfdtBox>),
    (TrunBox::BOX_TYPE, decode_leaf::<TrunBox>),
    (PrftBox::BOX_TYPE, decode_leaf::<PrftBox>),
    (MdatBox::BOX_TYPE, decode_leaf::<MdatBox>),
];

/// Decoder registered for a type code.
fn lookup(box_type: FourCc) -> Option<DecodeFn> {
    REGISTRY
        .iter()
        .find(|(t, _)| *t == box_type)
        .map(|(_, decode)| *decode)
}

/// Whether a type code has a registered decoder.
pub fn is_registered(box_type: FourCc) -> bool {
    lookup(box_type).is_some()
}

/// Decode one box from `reader`, advancing it past the box.
///
/// `depth` is 0 for top-level boxes. A size of 0 ("to end of input") is
/// accepted only at depth 0.
pub fn decode_box(reader: &mut BoxReader, depth: usize) -> Result<Mp4Box> {
    let offset = reader.position();
    if depth > MAX_DEPTH {
        return Err(Error::invalid_box(
            reader.box_type(),
            offset,
            format!("nesting deeper than {MAX_DEPTH} levels"),
        ));
    }

    let (header, consumed) = BoxHeader::decode(reader)?;
    let payload_len = match header.payload_len() {
        Some(len) => len,
        None if depth == 0 => reader.remaining() as u64,
        None => {
            return Err(Error::malformed_header(
                offset,
                format!("'{}' has size 0 inside a container", header.box_type),
            ))
        }
    };

    if payload_len > reader.remaining() as u64 {
        return Err(Error::TruncatedBox {
            box_type: header.box_type,
            offset,
            declared: header.size,
            available: consumed + reader.remaining() as u64,
        });
    }
    let mut window = reader.take(payload_len as usize, header.box_type)?;

    match lookup(header.box_type) {
        Some(decode) if header.user_type.is_none() => decode(&mut window, depth),
        _ => Ok(Mp4Box::Opaque(OpaqueBox {
            box_type: header.box_type,
            user_type: header.user_type,
            payload: window.read_to_end(),
        })),
    }
}

/// Decode boxes until `reader` is exhausted, as children of a box at
/// `depth`.
pub fn decode_children(reader: &mut BoxReader, depth: usize) -> Result<Vec<Mp4Box>> {
    let mut children = Vec::new();
    while !reader.is_empty() {
        if reader.remaining() < COMPACT_HEADER_LEN as usize {
            return Err(Error::TruncatedBox {
                box_type: reader.box_type(),
                offset: reader.position(),
                declared: COMPACT_HEADER_LEN,
                available: reader.remaining() as u64,
            });
        }
        children.push(decode_box(reader, depth + 1)?);
    }
    Ok(children)
}

fn decode_container(reader: &mut BoxReader, depth: usize) -> Result<Mp4Box> {
    let box_type = reader.box_type();
    let children = decode_children(reader, depth)?;
    Ok(Mp4Box::Container(ContainerBox { box_type, children }))
}

fn decode_leaf<T>(reader: &mut BoxReader, depth: usize) -> Result<Mp4Box>
where
    T: BoxCodec + Into<Mp4Box>,
{
    let leaf = T::decode_payload(reader, depth)?;
    reader.finish()?;
    Ok(leaf.into())
}

/// `styp` shares the `ftyp` layout but keeps its own type code, so it is
/// kept opaque after validating the brand list.
fn decode_styp(reader: &mut BoxReader, depth: usize) -> Result<Mp4Box> {
    let payload = reader.clone().read_to_end();
    FtypBox::decode_payload(reader, depth)?;
    reader.finish()?;
    Ok(Mp4Box::Opaque(OpaqueBox::new(FourCc::STYP, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::boxes::{LeafBox, TfhdBox, TrunBox};
    use bytes::{Bytes, BytesMut};

    fn encode(b: &Mp4Box) -> Bytes {
        b.to_bytes().unwrap()
    }

    fn decode(bytes: Bytes) -> Result<Mp4Box> {
        decode_box(&mut BoxReader::new(bytes), 0)
    }

    fn sample_traf() -> Mp4Box {
        ContainerBox::new(
            FourCc::TRAF,
            vec![
                TfhdBox::new(1).into(),
                TrunBox::with_sizes(&[10, 20, 5]).into(),
            ],
        )
        .into()
    }

    #[test]
    fn test_container_round_trip() {
        let traf = sample_traf();
        let bytes = encode(&traf);
        let decoded = decode(bytes.clone()).unwrap();
        assert_eq!(decoded, traf);
        assert_eq!(encode(&decoded), bytes);
    }

    #[test]
    fn test_child_past_parent_bound() {
        let mut raw = BytesMut::from(&encode(&sample_traf())[..]);
        // Shrink the declared container size by one byte.
        let size = u32::from_be_bytes(raw[..4].try_into().unwrap());
        raw[..4].copy_from_slice(&(size - 1).to_be_bytes());
        raw.truncate(size as usize - 1);
        let err = decode(raw.freeze()).unwrap_err();
        assert!(matches!(err, Error::TruncatedBox { .. }), "{err:?}");
    }

    #[test]
    fn test_shrunken_parent_with_trailing_sibling_bytes() {
        // The parent claims one byte less but the input keeps going: the
        // last child must still not read into what follows the parent.
        let traf = encode(&sample_traf());
        let mut raw = BytesMut::from(&traf[..]);
        let size = u32::from_be_bytes(raw[..4].try_into().unwrap());
        raw[..4].copy_from_slice(&(size - 1).to_be_bytes());
        let err = decode(raw.freeze()).unwrap_err();
        assert!(matches!(err, Error::TruncatedBox { .. }), "{err:?}");
    }

    #[test]
    fn test_unknown_child_preserved() {
        let mut raw = BytesMut::new();
        let tfhd: Mp4Box = TfhdBox::new(9).into();
        let unknown = b"\x00\x00\x00\x0dzzzz\x01\x02\x03\x04\x05";
        let payload_len = tfhd.size() as usize + unknown.len();
        raw.extend_from_slice(&((8 + payload_len) as u32).to_be_bytes());
        raw.extend_from_slice(b"traf");
        tfhd.encode(&mut raw).unwrap();
        raw.extend_from_slice(unknown);
        let input = raw.freeze();

        let decoded = decode(input.clone()).unwrap();
        let children = decoded.children();
        assert_eq!(children.len(), 2);
        assert!(matches!(children[0], Mp4Box::Leaf(LeafBox::Tfhd(_))));
        assert!(children[1].is_opaque());
        assert_eq!(children[1].box_type(), FourCc(*b"zzzz"));
        assert_eq!(encode(&decoded), input);
    }

    #[test]
    fn test_leaf_leftover_bytes_rejected() {
        let mut raw = encode(&MfhdBox::default().into()).to_vec();
        raw.push(0);
        raw[3] += 1;
        assert!(matches!(
            decode(raw.into()),
            Err(Error::InvalidBox { box_type, .. }) if box_type == FourCc::MFHD
        ));
    }

    #[test]
    fn test_window_ending_mid_header() {
        let mut raw = b"\x00\x00\x00\x0ctraf".to_vec();
        raw.extend_from_slice(&[0, 0, 0, 8]);
        assert!(matches!(
            decode(raw.into()),
            Err(Error::TruncatedBox { box_type, .. }) if box_type == FourCc::TRAF
        ));
    }

    #[test]
    fn test_size_zero_only_at_top_level() {
        let top = decode(Bytes::from_static(b"\x00\x00\x00\x00free\x01\x02")).unwrap();
        assert_eq!(top.box_type(), FourCc::FREE);
        assert_eq!(top.size(), 10);

        let nested = b"\x00\x00\x00\x10moov\x00\x00\x00\x00free".to_vec();
        assert!(matches!(
            decode(nested.into()),
            Err(Error::MalformedHeader { offset: 8, .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let mut b: Mp4Box = ContainerBox::new(FourCc::MOOV, vec![]).into();
        for _ in 0..=MAX_DEPTH {
            b = ContainerBox::new(FourCc::MOOV, vec![b]).into();
        }
        assert!(matches!(
            decode(encode(&b)),
            Err(Error::InvalidBox { .. })
        ));
    }

    #[test]
    fn test_uuid_box_is_opaque() {
        let mut raw = b"\x00\x00\x00\x1auuid".to_vec();
        raw.extend_from_slice(&[0xAB; 16]);
        raw.extend_from_slice(&[1, 2]);
        let input = Bytes::from(raw);
        let decoded = decode(input.clone()).unwrap();
        match &decoded {
            Mp4Box::Opaque(o) => {
                assert_eq!(o.user_type, Some([0xAB; 16]));
                assert_eq!(&o.payload[..], &[1, 2]);
            }
            other => panic!("expected opaque, got {other:?}"),
        }
        assert_eq!(encode(&decoded), input);
    }

    #[test]
    fn test_styp_validated_and_preserved() {
        let input = Bytes::from_static(b"\x00\x00\x00\x10stypmsdh\x00\x00\x00\x00");
        let decoded = decode(input.clone()).unwrap();
        assert_eq!(decoded.box_type(), FourCc::STYP);
        assert_eq!(encode(&decoded), input);

        let bad = Bytes::from_static(b"\x00\x00\x00\x0astypms");
        assert!(decode(bad).is_err());
    }

    #[test]
    fn test_registry_lookup() {
        assert!(is_registered(FourCc::MOOV));
        assert!(is_registered(FourCc::PRFT));
        assert!(!is_registered(FourCc::FREE));
    }
}
