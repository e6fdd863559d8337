//! Sample description boxes: `stsd`, the `mp4a` audio sample entry, and
//! its `esds` elementary stream descriptor.

use super::{put_version_flags, BoxCodec};
use crate::adts::SAMPLE_RATES;
use crate::mp4::{decode_children, BoxReader, FourCc, Mp4Box};
use crate::{Error, Result};
use bitstream_io::{BigEndian, BitRead, BitReader};
use bytes::{BufMut, Bytes, BytesMut};

/// Sample description box. Entries are decoded through the registry, so
/// unregistered codecs (`avc1`, `Opus`, ...) are kept as opaque boxes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StsdBox {
    pub version: u8,
    pub flags: u32,
    pub entries: Vec<Mp4Box>,
}

impl StsdBox {
    /// Type code of the first sample entry.
    pub fn first_entry_type(&self) -> Option<FourCc> {
        self.entries.first().map(Mp4Box::box_type)
    }

    /// The first `mp4a` entry, if any.
    pub fn mp4a(&self) -> Option<&Mp4aBox> {
        self.entries.iter().find_map(|e| e.as_leaf::<Mp4aBox>())
    }
}

impl BoxCodec for StsdBox {
    const BOX_TYPE: FourCc = FourCc::STSD;

    fn decode_payload(reader: &mut BoxReader, depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        let offset = reader.position();
        let entry_count = reader.read_u32()?;
        let entries = decode_children(reader, depth)?;
        if entries.len() != entry_count as usize {
            return Err(Error::invalid_box(
                Self::BOX_TYPE,
                offset,
                format!("entry_count {entry_count} but {} entries", entries.len()),
            ));
        }
        Ok(Self {
            version,
            flags,
            entries,
        })
    }

    fn payload_size(&self) -> u64 {
        8 + self.entries.iter().map(Mp4Box::size).sum::<u64>()
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        put_version_flags(buf, self.version, self.flags);
        buf.put_u32(self.entries.len() as u32);
        for entry in &self.entries {
            entry.encode(buf)?;
        }
        Ok(())
    }
}

/// MPEG-4 audio sample entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Mp4aBox {
    pub reserved: [u8; 6],
    pub data_reference_index: u16,
    /// QuickTime sound description version (0, 1 or 2).
    pub sound_version: u16,
    pub revision_level: u16,
    pub vendor: u32,
    pub channel_count: u16,
    pub sample_size: u16,
    pub compression_id: u16,
    pub packet_size: u16,
    /// 16.16 fixed point.
    pub sample_rate: u32,
    /// Extra fields of QuickTime sound description versions 1 and 2.
    pub qt_extension: Bytes,
    pub children: Vec<Mp4Box>,
}

impl Mp4aBox {
    pub fn new(channel_count: u16, sample_rate_hz: u16, esds: EsdsBox) -> Self {
        Self {
            reserved: [0; 6],
            data_reference_index: 1,
            sound_version: 0,
            revision_level: 0,
            vendor: 0,
            channel_count,
            sample_size: 16,
            compression_id: 0,
            packet_size: 0,
            sample_rate: (sample_rate_hz as u32) << 16,
            qt_extension: Bytes::new(),
            children: vec![esds.into()],
        }
    }

    /// Integer part of the sample rate.
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate >> 16
    }

    pub fn esds(&self) -> Option<&EsdsBox> {
        self.children.iter().find_map(|c| c.as_leaf::<EsdsBox>())
    }
}

impl BoxCodec for Mp4aBox {
    const BOX_TYPE: FourCc = FourCc::MP4A;

    fn decode_payload(reader: &mut BoxReader, depth: usize) -> Result<Self> {
        let reserved = reader.read_array()?;
        let data_reference_index = reader.read_u16()?;
        let sound_version = reader.read_u16()?;
        let revision_level = reader.read_u16()?;
        let vendor = reader.read_u32()?;
        let channel_count = reader.read_u16()?;
        let sample_size = reader.read_u16()?;
        let compression_id = reader.read_u16()?;
        let packet_size = reader.read_u16()?;
        let sample_rate = reader.read_u32()?;
        let qt_extension = match sound_version {
            1 => reader.read_bytes(16)?,
            2 => reader.read_bytes(36)?,
            _ => Bytes::new(),
        };
        let children = decode_children(reader, depth)?;
        Ok(Self {
            reserved,
            data_reference_index,
            sound_version,
            revision_level,
            vendor,
            channel_count,
            sample_size,
            compression_id,
            packet_size,
            sample_rate,
            qt_extension,
            children,
        })
    }

    fn payload_size(&self) -> u64 {
        28 + self.qt_extension.len() as u64 + self.children.iter().map(Mp4Box::size).sum::<u64>()
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(&self.reserved);
        buf.put_u16(self.data_reference_index);
        buf.put_u16(self.sound_version);
        buf.put_u16(self.revision_level);
        buf.put_u32(self.vendor);
        buf.put_u16(self.channel_count);
        buf.put_u16(self.sample_size);
        buf.put_u16(self.compression_id);
        buf.put_u16(self.packet_size);
        buf.put_u32(self.sample_rate);
        buf.put_slice(&self.qt_extension);
        for child in &self.children {
            child.encode(buf)?;
        }
        Ok(())
    }
}

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_TAG: u8 = 0x04;
const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;

/// Elementary stream descriptor box. The descriptor bytes are kept raw and
/// interpreted on demand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EsdsBox {
    pub version: u8,
    pub flags: u32,
    pub descriptors: Bytes,
}

impl EsdsBox {
    /// Minimal descriptor chain for an AAC stream with the given
    /// AudioSpecificConfig bytes.
    pub fn for_aac(audio_specific_config: &[u8]) -> Self {
        let mut dsi = vec![DECODER_SPECIFIC_INFO_TAG, audio_specific_config.len() as u8];
        dsi.extend_from_slice(audio_specific_config);

        let mut dcd = vec![DECODER_CONFIG_TAG, (13 + dsi.len()) as u8];
        dcd.push(0x40); // MPEG-4 audio
        dcd.push(0x15); // audio stream
        dcd.extend_from_slice(&[0; 3 + 4 + 4]);
        dcd.extend_from_slice(&dsi);

        let mut es = vec![ES_DESCRIPTOR_TAG, (3 + dcd.len() + 3) as u8];
        es.extend_from_slice(&[0, 1, 0]);
        es.extend_from_slice(&dcd);
        es.extend_from_slice(&[0x06, 0x01, 0x02]); // SL config: predefined MP4

        Self {
            version: 0,
            flags: 0,
            descriptors: Bytes::from(es),
        }
    }

    /// Object type indication from the decoder config (0x40 = MPEG-4 audio,
    /// 0x6B = MP3).
    pub fn object_type_indication(&self) -> Option<u8> {
        self.decoder_config().and_then(|dcd| dcd.first().copied())
    }

    /// Decoded AudioSpecificConfig, if the descriptors carry one.
    pub fn audio_specific_config(&self) -> Option<AudioSpecificConfig> {
        let dcd = self.decoder_config()?;
        let mut rest = dcd.get(13..)?;
        while !rest.is_empty() {
            let (tag, body, next) = split_descriptor(rest)?;
            if tag == DECODER_SPECIFIC_INFO_TAG {
                return AudioSpecificConfig::parse(body).ok();
            }
            rest = next;
        }
        None
    }

    fn decoder_config(&self) -> Option<&[u8]> {
        let (tag, es, _) = split_descriptor(&self.descriptors)?;
        if tag != ES_DESCRIPTOR_TAG || es.len() < 3 {
            return None;
        }
        let flags = es[2];
        let mut pos = 3;
        if flags & 0x80 != 0 {
            pos += 2;
        }
        if flags & 0x40 != 0 {
            pos += 1 + *es.get(pos)? as usize;
        }
        if flags & 0x20 != 0 {
            pos += 2;
        }
        let mut rest = es.get(pos..)?;
        while !rest.is_empty() {
            let (tag, body, next) = split_descriptor(rest)?;
            if tag == DECODER_CONFIG_TAG {
                return Some(body);
            }
            rest = next;
        }
        None
    }
}

/// Split one descriptor into (tag, body, remainder). The length uses up to
/// four 7-bit groups with a continuation bit.
fn split_descriptor(data: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    let (&tag, mut rest) = data.split_first()?;
    let mut len = 0usize;
    for _ in 0..4 {
        let (&b, next) = rest.split_first()?;
        rest = next;
        len = (len << 7) | (b & 0x7F) as usize;
        if b & 0x80 == 0 {
            break;
        }
    }
    if len > rest.len() {
        return None;
    }
    Some((tag, &rest[..len], &rest[len..]))
}

impl BoxCodec for EsdsBox {
    const BOX_TYPE: FourCc = FourCc::ESDS;

    fn decode_payload(reader: &mut BoxReader, _depth: usize) -> Result<Self> {
        let (version, flags) = reader.read_version_flags()?;
        Ok(Self {
            version,
            flags,
            descriptors: reader.read_to_end(),
        })
    }

    fn payload_size(&self) -> u64 {
        4 + self.descriptors.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        put_version_flags(buf, self.version, self.flags);
        buf.put_slice(&self.descriptors);
        Ok(())
    }
}

/// Leading fields of an MPEG-4 AudioSpecificConfig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Audio object type (2 = AAC LC).
    pub object_type: u8,
    /// Index into the standard rate table, 15 for an explicit rate.
    pub sampling_frequency_index: u8,
    pub sampling_frequency: u32,
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let bad = |e: std::io::Error| Error::invalid_audio_config(format!("AudioSpecificConfig: {e}"));
        let mut r = BitReader::endian(data, BigEndian);

        let mut object_type: u8 = r.read(5).map_err(bad)?;
        if object_type == 31 {
            object_type = 32 + r.read::<u8>(6).map_err(bad)?;
        }
        let sampling_frequency_index: u8 = r.read(4).map_err(bad)?;
        let sampling_frequency = if sampling_frequency_index == 15 {
            r.read::<u32>(24).map_err(bad)?
        } else {
            *SAMPLE_RATES
                .get(sampling_frequency_index as usize)
                .ok_or_else(|| {
                    Error::invalid_audio_config(format!(
                        "reserved sampling frequency index {sampling_frequency_index}"
                    ))
                })?
        };
        let channel_configuration: u8 = r.read(4).map_err(bad)?;

        Ok(Self {
            object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
        })
    }
}
