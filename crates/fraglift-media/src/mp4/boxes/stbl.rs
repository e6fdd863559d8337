//! Sample table leaf boxes: `stsz`, `stsc`, `stco`, `co64`.

use super::{put_version_flags, BoxCodec, MAX_FIELDLESS_SAMPLES};
use crate::mp4::{BoxReader, FourCc};
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};

/// Sample size box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StszBox {
    pub version: u8,
    pub flags: u32,
    /// Size shared by every sample, or 0 when `entry_sizes` is used.
    pub sample_size: u32,
    pub sample_count: u32,
    /// Per-sample sizes; empty when `sample_size` is non-zero.
    pub entry_sizes: Vec<u32>,
}

impl StszBox {
    /// Table with one entry per sample.
    pub fn with_sizes(sizes: Vec<u32>) -> Self {
        Self {
            version: 0,
            flags: 0,
            sample_size: 0,
            sample_count: sizes.len() as u32,
            entry_sizes: sizes,
        }
    }

    /// Size of sample `index` (0-based).
    pub fn size_of(&self, index: u32) -> Option<u32> {
        if index >= self.sample_count {
            return None;
        }
        if self.sample_size != 0 {
            Some(self.sample_size)
        } else {
            self.entry_sizes.get(index as usize).copied()
        }
    }

    /// All sample sizes, expanding a uniform size.
    pub fn sizes(&self) -> Result<Vec<u32>> {
        if self.sample_size == 0 {
            return Ok(self.entry_sizes.clone());
        }
        check_uniform_count(self.sample_count, 0)?;
        Ok(vec![self.sample_size; self.sample_count as usize])
    }
}

fn check_uniform_count(sample_count: u32, offset: u64) -> Result<()> {
    if sample_count as usize > MAX_FIELDLESS_SAMPLES {
        return Err(Error::invalid_box(
            FourCc::STSZ,
            offset,
            format!("{sample_count} samples of uniform size"),
        ));
    }
    Ok(())
}

impl BoxCodec for StszBox {
    const BOX_TYPE: FourCc = FourCc::STSZ;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        let sample_size = reader.read_u32()?;
        let sample_count = reader.read_u32()?;
        let entry_sizes = if sample_size == 0 {
            let count = sample_count as usize;
            reader.ensure(count.checked_mul(4).unwrap_or(usize::MAX))?;
            let mut sizes = Vec::with_capacity(count);
            for _ in 0..count {
                sizes.push(reader.read_u32()?);
            }
            sizes
        } else {
            check_uniform_count(sample_count, reader.position())?;
            Vec::new()
        };
        Ok(Self {
            version,
            flags,
            sample_size,
            sample_count,
            entry_sizes,
        })
    }

    fn payload_size(&self) -> u64 {
        12 + if self.sample_size == 0 {
            4 * self.entry_sizes.len() as u64
        } else {
            0
        }
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        if self.sample_size == 0 && self.entry_sizes.len() != self.sample_count as usize {
            return Err(Error::invalid_box(
                Self::BOX_TYPE,
                0,
                format!(
                    "sample_count {} does not match {} entry sizes",
                    self.sample_count,
                    self.entry_sizes.len()
                ),
            ));
        }
        put_version_flags(buf, self.version, self.flags);
        buf.put_u32(self.sample_size);
        buf.put_u32(self.sample_count);
        if self.sample_size == 0 {
            for size in &self.entry_sizes {
                buf.put_u32(*size);
            }
        }
        Ok(())
    }
}

/// One run of chunks sharing a samples-per-chunk value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StscEntry {
    /// 1-based index of the first chunk in the run.
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// Sample-to-chunk box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StscBox {
    pub version: u8,
    pub flags: u32,
    pub entries: Vec<StscEntry>,
}

impl BoxCodec for StscBox {
    const BOX_TYPE: FourCc = FourCc::STSC;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        let count = reader.read_entry_count(12)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(StscEntry {
                first_chunk: reader.read_u32()?,
                samples_per_chunk: reader.read_u32()?,
                sample_description_index: reader.read_u32()?,
            });
        }
        Ok(Self {
            version,
            flags,
            entries,
        })
    }

    fn payload_size(&self) -> u64 {
        8 + 12 * self.entries.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        put_version_flags(buf, self.version, self.flags);
        buf.put_u32(self.entries.len() as u32);
        for e in &self.entries {
            buf.put_u32(e.first_chunk);
            buf.put_u32(e.samples_per_chunk);
            buf.put_u32(e.sample_description_index);
        }
        Ok(())
    }
}

/// 32-bit chunk offset box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StcoBox {
    pub version: u8,
    pub flags: u32,
    pub chunk_offsets: Vec<u32>,
}

impl BoxCodec for StcoBox {
    const BOX_TYPE: FourCc = FourCc::STCO;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        let count = reader.read_entry_count(4)?;
        let mut chunk_offsets = Vec::with_capacity(count);
        for _ in 0..count {
            chunk_offsets.push(reader.read_u32()?);
        }
        Ok(Self {
            version,
            flags,
            chunk_offsets,
        })
    }

    fn payload_size(&self) -> u64 {
        8 + 4 * self.chunk_offsets.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        put_version_flags(buf, self.version, self.flags);
        buf.put_u32(self.chunk_offsets.len() as u32);
        for offset in &self.chunk_offsets {
            buf.put_u32(*offset);
        }
        Ok(())
    }
}

/// 64-bit chunk offset box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Co64Box {
    pub version: u8,
    pub flags: u32,
    pub chunk_offsets: Vec<u64>,
}

impl BoxCodec for Co64Box {
    const BOX_TYPE: FourCc = FourCc::CO64;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        let count = reader.read_entry_count(8)?;
        let mut chunk_offsets = Vec::with_capacity(count);
        for _ in 0..count {
            chunk_offsets.push(reader.read_u64()?);
        }
        Ok(Self {
            version,
            flags,
            chunk_offsets,
        })
    }

    fn payload_size(&self) -> u64 {
        8 + 8 * self.chunk_offsets.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        put_version_flags(buf, self.version, self.flags);
        buf.put_u32(self.chunk_offsets.len() as u32);
        for offset in &self.chunk_offsets {
            buf.put_u64(*offset);
        }
        Ok(())
    }
}
