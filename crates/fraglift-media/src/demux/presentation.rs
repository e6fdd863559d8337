//! Track and fragment locator.
//!
//! Turns a decoded [`Mp4File`] into the list of tracks declared in `moov`
//! and the ordered list of movie fragments (`moof` + `mdat` pairs).

use crate::mp4::{
    AudioSpecificConfig, Co64Box, ContainerBox, FourCc, HdlrBox, MdatBox, MdhdBox, MfhdBox, Mp4Box,
    Mp4File, StcoBox, StscBox, StscEntry, StsdBox, StszBox, TfhdBox, TkhdBox, TrexBox, TrunBox,
};
use crate::{Error, Result};
use bytes::Bytes;
use std::collections::HashSet;

/// Sample tables of a non-fragmented track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleTable {
    /// One size per sample, expanded from a uniform `stsz` size.
    pub sizes: Vec<u32>,
    /// Sample-to-chunk runs.
    pub chunks: Vec<StscEntry>,
    /// Absolute chunk offsets from `stco` or `co64`.
    pub chunk_offsets: Vec<u64>,
}

impl SampleTable {
    fn from_stbl(stbl: &ContainerBox) -> Result<Self> {
        let sizes = match stbl.leaf::<StszBox>() {
            Some(stsz) => stsz.sizes()?,
            None => Vec::new(),
        };
        let chunks = stbl
            .leaf::<StscBox>()
            .map(|stsc| stsc.entries.clone())
            .unwrap_or_default();
        let chunk_offsets = match (stbl.leaf::<StcoBox>(), stbl.leaf::<Co64Box>()) {
            (_, Some(co64)) => co64.chunk_offsets.clone(),
            (Some(stco), None) => stco.chunk_offsets.iter().map(|&o| o as u64).collect(),
            (None, None) => Vec::new(),
        };
        Ok(Self {
            sizes,
            chunks,
            chunk_offsets,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.sizes.len()
    }
}

/// Audio properties declared by an `mp4a` sample entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    pub channel_count: u16,
    pub sample_rate: u32,
    /// Decoder configuration from `esds`, when present and well formed.
    pub config: Option<AudioSpecificConfig>,
}

/// One track declared in `moov`.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub track_id: u32,
    /// `soun`, `vide`, ...
    pub handler_type: FourCc,
    /// Type of the first sample entry (`mp4a`, `avc1`, ...).
    pub sample_entry: Option<FourCc>,
    pub timescale: Option<u32>,
    pub sample_table: SampleTable,
    pub audio: Option<AudioParams>,
    /// Fragment defaults from `mvex/trex`.
    pub defaults: Option<TrexBox>,
}

impl Track {
    fn from_trak(trak: &ContainerBox) -> Result<Self> {
        let tkhd = trak
            .leaf::<TkhdBox>()
            .ok_or_else(|| Error::invalid_box(FourCc::TRAK, 0, "track without tkhd"))?;
        let mdia = trak
            .container(FourCc::MDIA)
            .ok_or_else(|| Error::invalid_box(FourCc::TRAK, 0, "track without mdia"))?;
        let hdlr = mdia.leaf::<HdlrBox>().ok_or_else(|| {
            Error::invalid_box(
                FourCc::MDIA,
                0,
                format!("track {} has no handler", tkhd.track_id),
            )
        })?;

        let stbl = mdia.descend(&[FourCc::MINF, FourCc::STBL]);
        let stsd = stbl.and_then(|s| s.leaf::<StsdBox>());
        let audio = stsd.and_then(StsdBox::mp4a).map(|mp4a| AudioParams {
            channel_count: mp4a.channel_count,
            sample_rate: mp4a.sample_rate_hz(),
            config: mp4a.esds().and_then(|esds| esds.audio_specific_config()),
        });

        Ok(Self {
            track_id: tkhd.track_id,
            handler_type: hdlr.handler_type,
            sample_entry: stsd.and_then(StsdBox::first_entry_type),
            timescale: mdia.leaf::<MdhdBox>().map(|m| m.timescale),
            sample_table: stbl.map(SampleTable::from_stbl).transpose()?.unwrap_or_default(),
            audio,
            defaults: None,
        })
    }
}

/// One `traf`: its header and runs in encoded order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFragment {
    pub header: TfhdBox,
    pub runs: Vec<TrunBox>,
}

impl TrackFragment {
    pub fn track_id(&self) -> u32 {
        self.header.track_id
    }

    pub fn sample_count(&self) -> usize {
        self.runs.iter().map(|r| r.samples.len()).sum()
    }
}

/// A movie fragment and the media data that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub sequence_number: u32,
    /// Offset of the first byte of the `moof` header.
    pub moof_offset: u64,
    /// Payload of the `mdat` that follows the `moof`.
    pub media_data: Bytes,
    /// Offset of the first payload byte of that `mdat`.
    pub media_data_offset: u64,
    pub track_fragments: Vec<TrackFragment>,
}

impl Fragment {
    fn from_moof(moof: &ContainerBox, moof_offset: u64) -> Result<Self> {
        let mut track_fragments = Vec::new();
        for traf in moof.containers(FourCc::TRAF) {
            let header = traf.leaf::<TfhdBox>().ok_or_else(|| {
                Error::invalid_box(FourCc::TRAF, moof_offset, "track fragment without tfhd")
            })?;
            track_fragments.push(TrackFragment {
                header: header.clone(),
                runs: traf.leaves::<TrunBox>().cloned().collect(),
            });
        }
        Ok(Self {
            sequence_number: moof.leaf::<MfhdBox>().map_or(0, |m| m.sequence_number),
            moof_offset,
            media_data: Bytes::new(),
            media_data_offset: moof_offset,
            track_fragments,
        })
    }

    /// Track fragments belonging to `track_id`, in encoded order.
    pub fn track_fragments_for(&self, track_id: u32) -> impl Iterator<Item = &TrackFragment> {
        self.track_fragments
            .iter()
            .filter(move |t| t.track_id() == track_id)
    }

    pub fn contains_track(&self, track_id: u32) -> bool {
        self.track_fragments_for(track_id).next().is_some()
    }
}

/// Tracks and fragments of one file.
#[derive(Debug, Clone)]
pub struct Presentation {
    pub tracks: Vec<Track>,
    pub fragments: Vec<Fragment>,
    /// Payload offset of the first `mdat` not claimed by a fragment.
    pub media_data_offset: Option<u64>,
    source: Bytes,
}

impl Presentation {
    /// Locate tracks and fragments in a decoded file.
    pub fn from_file(file: &Mp4File) -> Result<Self> {
        let mut tracks = Vec::new();
        if let Some(moov) = file.moov() {
            let mut seen = HashSet::new();
            for trak in moov.containers(FourCc::TRAK) {
                let track = Track::from_trak(trak)?;
                if !seen.insert(track.track_id) {
                    return Err(Error::invalid_box(
                        FourCc::TKHD,
                        0,
                        format!("duplicate track ID {}", track.track_id),
                    ));
                }
                tracks.push(track);
            }
            if let Some(mvex) = moov.container(FourCc::MVEX) {
                for trex in mvex.leaves::<TrexBox>() {
                    if let Some(track) = tracks.iter_mut().find(|t| t.track_id == trex.track_id) {
                        track.defaults = Some(trex.clone());
                    }
                }
            }
        }

        let mut fragments = Vec::new();
        let mut pending: Option<Fragment> = None;
        let mut media_data_offset = None;
        for (span, b) in file.iter() {
            match b {
                Mp4Box::Container(moof) if moof.box_type == FourCc::MOOF => {
                    if let Some(orphan) = pending.take() {
                        fragments.push(orphan);
                    }
                    pending = Some(Fragment::from_moof(moof, span.offset)?);
                }
                Mp4Box::Leaf(_) if b.box_type() == FourCc::MDAT => {
                    let data = b.as_leaf::<MdatBox>().map(|m| m.data.clone());
                    match pending.take() {
                        Some(mut fragment) => {
                            fragment.media_data = data.unwrap_or_default();
                            fragment.media_data_offset = span.payload_offset();
                            fragments.push(fragment);
                        }
                        None => {
                            media_data_offset.get_or_insert(span.payload_offset());
                        }
                    }
                }
                _ => {}
            }
        }
        fragments.extend(pending);

        let presentation = Self {
            tracks,
            fragments,
            media_data_offset,
            source: file.source().clone(),
        };
        presentation.check_fragment_tracks()?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            tracks = presentation.tracks.len(),
            fragments = presentation.fragments.len(),
            "located presentation"
        );

        Ok(presentation)
    }

    /// Every track fragment must refer to a track declared in `moov`.
    fn check_fragment_tracks(&self) -> Result<()> {
        for fragment in &self.fragments {
            for traf in &fragment.track_fragments {
                if !self.tracks.iter().any(|t| t.track_id == traf.track_id()) {
                    return Err(Error::invalid_box(
                        FourCc::TFHD,
                        fragment.moof_offset,
                        format!("fragment refers to undeclared track {}", traf.track_id()),
                    ));
                }
            }
        }
        Ok(())
    }

    /// The whole input buffer.
    pub fn source(&self) -> &Bytes {
        &self.source
    }

    pub fn is_fragmented(&self) -> bool {
        !self.fragments.is_empty()
    }

    /// All tracks with the given handler type.
    pub fn tracks_with_handler(&self, handler: FourCc) -> impl Iterator<Item = &Track> {
        self.tracks
            .iter()
            .filter(move |t| t.handler_type == handler)
    }

    /// First track with the given handler type.
    pub fn track_by_handler(&self, handler: FourCc) -> Result<&Track> {
        self.tracks_with_handler(handler)
            .next()
            .ok_or(Error::UnknownTrack { handler })
    }

    pub fn track_by_id(&self, track_id: u32) -> Result<&Track> {
        self.tracks
            .iter()
            .find(|t| t.track_id == track_id)
            .ok_or(Error::UnknownTrackId { track_id })
    }

    /// Number of samples of `track`, counting fragments when present.
    pub fn sample_count(&self, track: &Track) -> usize {
        if self.is_fragmented() {
            self.fragments
                .iter()
                .flat_map(|f| f.track_fragments_for(track.track_id))
                .map(TrackFragment::sample_count)
                .sum()
        } else {
            track.sample_table.sample_count()
        }
    }
}
