//! Length-bounded cursor over a shared input buffer.
//!
//! A [`BoxReader`] is a window `[pos, end)` onto one `Bytes` allocation.
//! Taking a sub-reader narrows the window and advances the parent past it,
//! so a child decoder can never see bytes that belong to a sibling or to
//! the parent's trailer. Payload slices handed out by [`BoxReader::read_bytes`]
//! share the input allocation instead of copying it.

use super::FourCc;
use crate::{Error, Result};
use bytes::Bytes;

/// Bounded big-endian reader.
#[derive(Debug, Clone)]
pub struct BoxReader {
    buf: Bytes,
    pos: usize,
    end: usize,
    box_type: FourCc,
}

impl BoxReader {
    /// Create a reader over the whole buffer.
    pub fn new(buf: Bytes) -> Self {
        let end = buf.len();
        Self {
            buf,
            pos: 0,
            end,
            box_type: FourCc([0; 4]),
        }
    }

    /// Absolute offset of the next byte.
    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    /// Bytes left in this window.
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    /// Whether the window is exhausted.
    pub fn is_empty(&self) -> bool {
        self.pos == self.end
    }

    /// Type of the box whose payload this window covers.
    pub fn box_type(&self) -> FourCc {
        self.box_type
    }

    /// Split off the next `len` bytes as a window for a box of `box_type`.
    ///
    /// The parent advances past the window whether or not the child
    /// consumes all of it.
    pub fn take(&mut self, len: usize, box_type: FourCc) -> Result<BoxReader> {
        self.ensure(len)?;
        let child = BoxReader {
            buf: self.buf.clone(),
            pos: self.pos,
            end: self.pos + len,
            box_type,
        };
        self.pos += len;
        Ok(child)
    }

    /// Check that `len` more bytes are available.
    pub fn ensure(&self, len: usize) -> Result<()> {
        if len > self.remaining() {
            return Err(Error::TruncatedBox {
                box_type: self.box_type,
                offset: self.position(),
                declared: len as u64,
                available: self.remaining() as u64,
            });
        }
        Ok(())
    }

    /// Fail unless the window has been fully consumed.
    pub fn finish(&self) -> Result<()> {
        if !self.is_empty() {
            return Err(Error::invalid_box(
                self.box_type,
                self.position(),
                format!("{} unparsed trailing bytes", self.remaining()),
            ));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let [a, b, c] = self.read_array()?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Read a four-character code.
    pub fn read_fourcc(&mut self) -> Result<FourCc> {
        Ok(FourCc(self.read_array()?))
    }

    /// Read the combined version (top byte) and 24-bit flags word.
    pub fn read_version_flags(&mut self) -> Result<(u8, u32)> {
        let word = self.read_u32()?;
        Ok(((word >> 24) as u8, word & 0x00FF_FFFF))
    }

    /// Read a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Read `len` bytes as a shared slice of the input.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        let out = self.buf.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(out)
    }

    /// Read everything left in the window.
    pub fn read_to_end(&mut self) -> Bytes {
        let out = self.buf.slice(self.pos..self.end);
        self.pos = self.end;
        out
    }

    /// Read a count and check that `count * entry_size` bytes remain, so
    /// a hostile count cannot trigger a huge allocation.
    pub fn read_entry_count(&mut self, entry_size: usize) -> Result<usize> {
        let count = self.read_u32()? as usize;
        let needed = count.checked_mul(entry_size).unwrap_or(usize::MAX);
        self.ensure(needed)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_integers() {
        let mut r = BoxReader::new(Bytes::from_static(&[
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09,
        ]));
        assert_eq!(r.read_u8().unwrap(), 0x01);
        assert_eq!(r.read_u24().unwrap(), 0x020304);
        assert_eq!(r.read_u32().unwrap(), 0x05060708);
        assert_eq!(r.remaining(), 1);
        assert!(r.read_u16().is_err());
    }

    #[test]
    fn test_take_bounds_child() {
        let mut r = BoxReader::new(Bytes::from_static(&[1, 2, 3, 4, 5, 6]));
        let mut child = r.take(4, FourCc::FREE).unwrap();
        assert_eq!(r.position(), 4);
        assert_eq!(child.read_u16().unwrap(), 0x0102);
        assert_eq!(child.read_u16().unwrap(), 0x0304);
        // The parent's bytes 5 and 6 are invisible to the child.
        let err = child.read_u8().unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedBox { box_type, offset: 4, .. } if box_type == FourCc::FREE
        ));
        assert_eq!(r.read_u16().unwrap(), 0x0506);
    }

    #[test]
    fn test_take_past_end() {
        let mut r = BoxReader::new(Bytes::from_static(&[1, 2, 3]));
        assert!(matches!(
            r.take(4, FourCc::FREE),
            Err(Error::TruncatedBox { declared: 4, available: 3, .. })
        ));
    }

    #[test]
    fn test_entry_count_rejects_huge_counts() {
        let mut r = BoxReader::new(Bytes::from_static(&[0xFF, 0xFF, 0xFF, 0xFF, 0, 0]));
        assert!(r.read_entry_count(4).is_err());
    }

    #[test]
    fn test_read_bytes_shares_buffer() {
        let buf = Bytes::from_static(b"abcdef");
        let mut r = BoxReader::new(buf.clone());
        r.read_u8().unwrap();
        let slice = r.read_bytes(3).unwrap();
        assert_eq!(&slice[..], b"bcd");
        assert_eq!(slice.as_ptr(), buf[1..].as_ptr());
    }

    #[test]
    fn test_finish_reports_leftovers() {
        let mut r = BoxReader::new(Bytes::from_static(&[0, 0, 0]));
        r.read_u16().unwrap();
        assert!(matches!(r.finish(), Err(Error::InvalidBox { .. })));
    }
}
