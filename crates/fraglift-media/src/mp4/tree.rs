//! The decoded box tree.

use super::boxes::{LeafBox, LeafVariant};
use super::{BoxHeader, FourCc};
use crate::Result;
use bytes::{BufMut, Bytes, BytesMut};

/// Any decoded box.
#[derive(Debug, Clone, PartialEq)]
pub enum Mp4Box {
    /// A box whose payload is a sequence of child boxes.
    Container(ContainerBox),
    /// A box with a registered typed layout.
    Leaf(LeafBox),
    /// A box with no registered decoder, kept verbatim.
    Opaque(OpaqueBox),
}

impl Mp4Box {
    pub fn box_type(&self) -> FourCc {
        match self {
            Self::Container(b) => b.box_type,
            Self::Leaf(b) => b.box_type(),
            Self::Opaque(b) => b.box_type,
        }
    }

    /// Total encoded size including header.
    pub fn size(&self) -> u64 {
        match self {
            Self::Container(b) => b.size(),
            Self::Leaf(b) => b.size(),
            Self::Opaque(b) => b.size(),
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Self::Container(b) => b.encode(buf),
            Self::Leaf(b) => b.encode(buf),
            Self::Opaque(b) => {
                b.encode(buf);
                Ok(())
            }
        }
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.size() as usize);
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Child boxes: a container's children, or the entries nested in a
    /// sample description leaf.
    pub fn children(&self) -> &[Mp4Box] {
        match self {
            Self::Container(b) => &b.children,
            Self::Leaf(b) => b.children(),
            Self::Opaque(_) => &[],
        }
    }

    pub fn as_container(&self) -> Option<&ContainerBox> {
        match self {
            Self::Container(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_leaf<T: LeafVariant>(&self) -> Option<&T> {
        match self {
            Self::Leaf(leaf) => T::from_leaf(leaf),
            _ => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::Opaque(_))
    }
}

/// A box holding only child boxes.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerBox {
    pub box_type: FourCc,
    pub children: Vec<Mp4Box>,
}

impl ContainerBox {
    pub fn new(box_type: FourCc, children: Vec<Mp4Box>) -> Self {
        Self { box_type, children }
    }

    fn header(&self) -> BoxHeader {
        let payload = self.children.iter().map(Mp4Box::size).sum();
        BoxHeader::for_payload(self.box_type, None, payload)
    }

    /// Header length plus the sum of the children's sizes.
    pub fn size(&self) -> u64 {
        self.header().size
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.header().encode(buf);
        for child in &self.children {
            child.encode(buf)?;
        }
        Ok(())
    }

    /// First child container of the given type.
    pub fn container(&self, box_type: FourCc) -> Option<&ContainerBox> {
        self.containers(box_type).next()
    }

    /// All child containers of the given type, in order.
    pub fn containers(&self, box_type: FourCc) -> impl Iterator<Item = &ContainerBox> {
        self.children
            .iter()
            .filter_map(Mp4Box::as_container)
            .filter(move |c| c.box_type == box_type)
    }

    /// First child leaf of type `T`.
    pub fn leaf<'a, T: LeafVariant + 'a>(&'a self) -> Option<&'a T> {
        self.leaves::<T>().next()
    }

    /// All child leaves of type `T`, in order.
    pub fn leaves<'a, T: LeafVariant + 'a>(&'a self) -> impl Iterator<Item = &'a T> {
        self.children.iter().filter_map(Mp4Box::as_leaf::<T>)
    }

    /// Follow a path of nested container types, e.g. `[mdia, minf, stbl]`.
    pub fn descend(&self, path: &[FourCc]) -> Option<&ContainerBox> {
        path.iter()
            .try_fold(self, |current, box_type| current.container(*box_type))
    }
}

/// A box kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueBox {
    pub box_type: FourCc,
    /// Extended type of `uuid` boxes.
    pub user_type: Option<[u8; 16]>,
    pub payload: Bytes,
}

impl OpaqueBox {
    pub fn new(box_type: FourCc, payload: impl Into<Bytes>) -> Self {
        Self {
            box_type,
            user_type: None,
            payload: payload.into(),
        }
    }

    fn header(&self) -> BoxHeader {
        BoxHeader::for_payload(self.box_type, self.user_type, self.payload.len() as u64)
    }

    pub fn size(&self) -> u64 {
        self.header().size
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        self.header().encode(buf);
        buf.put_slice(&self.payload);
    }
}

impl From<ContainerBox> for Mp4Box {
    fn from(b: ContainerBox) -> Self {
        Mp4Box::Container(b)
    }
}

impl From<OpaqueBox> for Mp4Box {
    fn from(b: OpaqueBox) -> Self {
        Mp4Box::Opaque(b)
    }
}
