//! Sample location resolver.
//!
//! Computes where each sample of a track lives. Flat tracks resolve to
//! absolute offsets into the input buffer; fragmented tracks resolve to
//! offsets into each fragment's media data. Every range is checked against
//! its buffer before anything is sliced.

use super::presentation::{Fragment, Presentation, Track, TrackFragment};
use crate::mp4::{FourCc, TrunBox};
use crate::{Error, Result};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Location of one sample inside a specific buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSample {
    pub offset: u64,
    pub length: u32,
}

impl ResolvedSample {
    /// Fail with `SampleRangeOverflow` unless the range fits in `buffer_len`.
    pub fn check(&self, buffer_len: u64) -> Result<()> {
        let fits = self
            .offset
            .checked_add(self.length as u64)
            .is_some_and(|end| end <= buffer_len);
        if !fits {
            return Err(Error::SampleRangeOverflow {
                offset: self.offset,
                length: self.length,
                buffer_len,
            });
        }
        Ok(())
    }
}

/// Resolved samples borrowing the buffer they point into.
#[derive(Debug, Clone)]
pub struct SampleRun<'a> {
    data: &'a [u8],
    samples: Vec<ResolvedSample>,
}

impl<'a> SampleRun<'a> {
    /// Pair samples with their buffer, checking every range.
    pub fn new(data: &'a [u8], samples: Vec<ResolvedSample>) -> Result<Self> {
        for sample in &samples {
            sample.check(data.len() as u64)?;
        }
        Ok(Self { data, samples })
    }

    pub fn samples(&self) -> &[ResolvedSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sum of the sample lengths.
    pub fn payload_len(&self) -> u64 {
        self.samples.iter().map(|s| s.length as u64).sum()
    }

    /// Sample payloads in order, without copying.
    pub fn payloads(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        let data = self.data;
        self.samples.iter().map(move |s| {
            let start = s.offset as usize;
            &data[start..start + s.length as usize]
        })
    }
}

/// Resolve a non-fragmented track to absolute offsets.
///
/// With a chunk offset table, samples are laid out chunk by chunk as
/// `stsc` describes. Without one, samples are assumed contiguous from
/// `media_data_offset`.
pub fn resolve_flat(track: &Track, media_data_offset: Option<u64>) -> Result<Vec<ResolvedSample>> {
    let table = &track.sample_table;
    if table.chunk_offsets.is_empty() {
        if table.sizes.is_empty() {
            return Ok(Vec::new());
        }
        let base = media_data_offset.ok_or_else(|| {
            Error::invalid_box(FourCc::MDAT, 0, format!("no media data for track {}", track.track_id))
        })?;
        return contiguous(base, table.sizes.iter().copied());
    }

    if table.chunks.is_empty() {
        return Err(Error::invalid_box(
            FourCc::STSC,
            0,
            format!("track {} has chunk offsets but no sample-to-chunk table", track.track_id),
        ));
    }

    let mut resolved = Vec::with_capacity(table.sizes.len());
    let mut sizes = table.sizes.iter().copied();
    let chunk_count = table.chunk_offsets.len();

    for (i, entry) in table.chunks.iter().enumerate() {
        let first = entry.first_chunk as usize;
        let next_first = table
            .chunks
            .get(i + 1)
            .map_or(chunk_count + 1, |e| e.first_chunk as usize);
        if first == 0 || next_first <= first || next_first > chunk_count + 1 {
            return Err(Error::invalid_box(
                FourCc::STSC,
                0,
                format!("entry {i} has invalid chunk range {first}..{next_first}"),
            ));
        }
        for chunk in first..next_first {
            let mut offset = table.chunk_offsets[chunk - 1];
            for _ in 0..entry.samples_per_chunk {
                let Some(length) = sizes.next() else {
                    return Ok(resolved);
                };
                resolved.push(ResolvedSample { offset, length });
                offset = advance(offset, length, u64::MAX)?;
            }
        }
    }

    if resolved.len() < table.sizes.len() {
        return Err(Error::invalid_box(
            FourCc::STSC,
            0,
            format!(
                "chunks hold {} of {} samples",
                resolved.len(),
                table.sizes.len()
            ),
        ));
    }
    Ok(resolved)
}

fn contiguous(base: u64, sizes: impl Iterator<Item = u32>) -> Result<Vec<ResolvedSample>> {
    let mut offset = base;
    sizes
        .map(|length| {
            let sample = ResolvedSample { offset, length };
            offset = advance(offset, length, u64::MAX)?;
            Ok(sample)
        })
        .collect()
}

/// Offset just past a sample, failing instead of wrapping. Flat offsets
/// are absolute, so their only bound is the address space.
fn advance(offset: u64, length: u32, buffer_len: u64) -> Result<u64> {
    offset
        .checked_add(length as u64)
        .ok_or(Error::SampleRangeOverflow {
            offset,
            length,
            buffer_len,
        })
}

/// Resolve the samples of `track` in one fragment, relative to the
/// fragment's media data.
///
/// The running offset starts at 0. A run with a data offset restarts it at
/// the position the data offset designates. The first run of a track
/// fragment with an explicit base but no data offset starts at the base.
pub fn resolve_fragment(fragment: &Fragment, track: &Track) -> Result<Vec<ResolvedSample>> {
    let mut resolved = Vec::new();
    let mut offset = 0u64;
    let buffer_len = fragment.media_data.len() as u64;
    for traf in fragment.track_fragments_for(track.track_id) {
        for (n, run) in traf.runs.iter().enumerate() {
            if let Some(start) = run_start(fragment, traf, run, n == 0)? {
                offset = start;
            }
            for (i, sample) in run.samples.iter().enumerate() {
                let length = sample
                    .size
                    .or(traf.header.default_sample_size)
                    .or(track.defaults.as_ref().map(|d| d.default_sample_size))
                    .ok_or_else(|| {
                        Error::invalid_box(
                            FourCc::TRUN,
                            fragment.moof_offset,
                            format!("no size for sample {i} of track {}", track.track_id),
                        )
                    })?;
                resolved.push(ResolvedSample { offset, length });
                offset = advance(offset, length, buffer_len)?;
            }
        }
    }
    Ok(resolved)
}

/// Offset into the media data where `run` begins, if its data offset or
/// an explicit base pins it.
fn run_start(
    fragment: &Fragment,
    traf: &TrackFragment,
    run: &TrunBox,
    first_in_traf: bool,
) -> Result<Option<u64>> {
    let explicit_base = traf.header.base_data_offset;
    let absolute = match (run.data_offset, explicit_base) {
        // An explicit base wins; otherwise the base is the enclosing moof.
        (Some(data_offset), _) => {
            explicit_base.unwrap_or(fragment.moof_offset) as i128 + data_offset as i128
        }
        (None, Some(base)) if first_in_traf => base as i128,
        (None, _) => return Ok(None),
    };
    let relative = absolute - fragment.media_data_offset as i128;
    u64::try_from(relative).map(Some).map_err(|_| {
        Error::invalid_box(
            FourCc::TRUN,
            fragment.moof_offset,
            format!("run at absolute offset {absolute} starts before the media data"),
        )
    })
}

/// Resolve `track` across every fragment, one run per fragment that
/// carries the track, in fragment order.
pub fn fragment_runs<'a>(presentation: &'a Presentation, track: &Track) -> Result<Vec<SampleRun<'a>>> {
    let fragments: Vec<&Fragment> = presentation
        .fragments
        .iter()
        .filter(|f| f.contains_track(track.track_id))
        .collect();

    let resolve = |fragment: &&'a Fragment| -> Result<SampleRun<'a>> {
        let fragment: &'a Fragment = *fragment;
        let samples = resolve_fragment(fragment, track)?;
        SampleRun::new(&fragment.media_data, samples)
    };

    #[cfg(feature = "parallel")]
    let runs = fragments.par_iter().map(resolve).collect();
    #[cfg(not(feature = "parallel"))]
    let runs = fragments.iter().map(resolve).collect();

    runs
}

/// Resolve `track` as one run over the whole input.
pub fn flat_run<'a>(presentation: &'a Presentation, track: &Track) -> Result<SampleRun<'a>> {
    let samples = resolve_flat(track, presentation.media_data_offset)?;
    SampleRun::new(presentation.source(), samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::presentation::SampleTable;
    use crate::mp4::{StscEntry, TfhdBox, TrexBox, TrunSample};
    use bytes::Bytes;

    fn track(track_id: u32) -> Track {
        Track {
            track_id,
            handler_type: FourCc::SOUN,
            sample_entry: Some(FourCc::MP4A),
            timescale: None,
            sample_table: SampleTable::default(),
            audio: None,
            defaults: None,
        }
    }

    fn fragment(media_data: &'static [u8], trafs: Vec<TrackFragment>) -> Fragment {
        Fragment {
            sequence_number: 1,
            moof_offset: 100,
            media_data: Bytes::from_static(media_data),
            media_data_offset: 200,
            track_fragments: trafs,
        }
    }

    fn traf(track_id: u32, runs: Vec<TrunBox>) -> TrackFragment {
        TrackFragment {
            header: TfhdBox::new(track_id),
            runs,
        }
    }

    #[test]
    fn test_offsets_follow_sizes() {
        let f = fragment(&[0; 40], vec![traf(1, vec![TrunBox::with_sizes(&[10, 20, 5])])]);
        let samples = resolve_fragment(&f, &track(1)).unwrap();
        let offsets: Vec<_> = samples.iter().map(|s| s.offset).collect();
        let lengths: Vec<_> = samples.iter().map(|s| s.length).collect();
        assert_eq!(offsets, vec![0, 10, 30]);
        assert_eq!(lengths, vec![10, 20, 5]);

        let run = SampleRun::new(&f.media_data, samples).unwrap();
        assert_eq!(run.payload_len(), 35);
    }

    #[test]
    fn test_overflow_checked_before_slicing() {
        let f = fragment(&[0; 34], vec![traf(1, vec![TrunBox::with_sizes(&[10, 20, 5])])]);
        let samples = resolve_fragment(&f, &track(1)).unwrap();
        let err = SampleRun::new(&f.media_data, samples).unwrap_err();
        assert!(matches!(
            err,
            Error::SampleRangeOverflow {
                offset: 30,
                length: 5,
                buffer_len: 34
            }
        ));
    }

    #[test]
    fn test_overflow_on_wrapping_offset() {
        let sample = ResolvedSample {
            offset: u64::MAX,
            length: 2,
        };
        assert!(sample.check(u64::MAX).is_err());
    }

    #[test]
    fn test_data_offset_relative_to_moof() {
        // moof at 100, media data at 200: data offset 108 starts 8 bytes in.
        let f = fragment(
            &[0; 32],
            vec![
                traf(2, vec![TrunBox::with_sizes(&[8]).with_data_offset(100)]),
                traf(1, vec![TrunBox::with_sizes(&[4, 4]).with_data_offset(108)]),
            ],
        );
        let samples = resolve_fragment(&f, &track(1)).unwrap();
        assert_eq!(
            samples,
            vec![
                ResolvedSample { offset: 8, length: 4 },
                ResolvedSample { offset: 12, length: 4 },
            ]
        );
    }

    #[test]
    fn test_data_offset_with_explicit_base() {
        let mut t = traf(1, vec![TrunBox::with_sizes(&[4]).with_data_offset(16)]);
        t.header = TfhdBox::new(1).with_base_data_offset(190);
        let f = fragment(&[0; 32], vec![t]);
        let samples = resolve_fragment(&f, &track(1)).unwrap();
        assert_eq!(samples[0].offset, 6);
    }

    #[test]
    fn test_explicit_base_without_data_offset() {
        // Media data at 200, base 208: the run starts 8 bytes in.
        let mut t = traf(1, vec![TrunBox::with_sizes(&[4, 4])]);
        t.header = TfhdBox::new(1).with_base_data_offset(208);
        let f = fragment(&[0; 16], vec![t]);
        let samples = resolve_fragment(&f, &track(1)).unwrap();
        let offsets: Vec<_> = samples.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![8, 12]);

        // Later runs without a data offset still continue.
        let mut t = traf(1, vec![TrunBox::with_sizes(&[4]), TrunBox::with_sizes(&[2])]);
        t.header = TfhdBox::new(1).with_base_data_offset(204);
        let f = fragment(&[0; 16], vec![t]);
        let offsets: Vec<_> = resolve_fragment(&f, &track(1))
            .unwrap()
            .iter()
            .map(|s| s.offset)
            .collect();
        assert_eq!(offsets, vec![4, 8]);

        let mut t = traf(1, vec![TrunBox::with_sizes(&[4])]);
        t.header = TfhdBox::new(1).with_base_data_offset(150);
        let f = fragment(&[0; 16], vec![t]);
        assert!(matches!(
            resolve_fragment(&f, &track(1)),
            Err(Error::InvalidBox { .. })
        ));
    }

    #[test]
    fn test_fragment_offset_wrap_rejected() {
        // Base plus data offset lands 4 bytes short of u64::MAX in the media data.
        let mut t = traf(1, vec![TrunBox::with_sizes(&[16, 16]).with_data_offset(200)]);
        t.header = TfhdBox::new(1).with_base_data_offset(u64::MAX - 4);
        let f = fragment(&[0; 32], vec![t]);
        assert!(matches!(
            resolve_fragment(&f, &track(1)),
            Err(Error::SampleRangeOverflow {
                offset,
                length: 16,
                buffer_len: 32,
            }) if offset == u64::MAX - 4
        ));
    }

    #[test]
    fn test_data_offset_before_media_data() {
        let f = fragment(&[0; 8], vec![traf(1, vec![TrunBox::with_sizes(&[4]).with_data_offset(50)])]);
        assert!(matches!(
            resolve_fragment(&f, &track(1)),
            Err(Error::InvalidBox { .. })
        ));
    }

    #[test]
    fn test_default_sizes() {
        let run = TrunBox {
            samples: vec![TrunSample::default(); 3],
            ..Default::default()
        };
        let mut t = traf(1, vec![run.clone()]);
        t.header = TfhdBox::new(1).with_default_sample_size(6);
        let f = fragment(&[0; 18], vec![t]);
        let lengths: Vec<_> = resolve_fragment(&f, &track(1))
            .unwrap()
            .iter()
            .map(|s| s.length)
            .collect();
        assert_eq!(lengths, vec![6, 6, 6]);

        let f = fragment(&[0; 18], vec![traf(1, vec![run.clone()])]);
        assert!(resolve_fragment(&f, &track(1)).is_err());

        let mut with_trex = track(1);
        with_trex.defaults = Some(TrexBox {
            track_id: 1,
            default_sample_size: 5,
            ..Default::default()
        });
        let samples = resolve_fragment(&f, &with_trex).unwrap();
        assert_eq!(samples[2].offset, 10);
    }

    #[test]
    fn test_other_tracks_ignored() {
        let f = fragment(&[0; 8], vec![traf(2, vec![TrunBox::with_sizes(&[8])])]);
        assert!(resolve_fragment(&f, &track(1)).unwrap().is_empty());
    }

    #[test]
    fn test_flat_contiguous() {
        let mut t = track(1);
        t.sample_table.sizes = vec![3, 4, 5];
        let samples = resolve_flat(&t, Some(40)).unwrap();
        let offsets: Vec<_> = samples.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![40, 43, 47]);
        assert!(resolve_flat(&t, None).is_err());
    }

    #[test]
    fn test_flat_chunked() {
        let mut t = track(1);
        t.sample_table = SampleTable {
            sizes: vec![1, 2, 3, 4, 5],
            chunks: vec![
                StscEntry {
                    first_chunk: 1,
                    samples_per_chunk: 2,
                    sample_description_index: 1,
                },
                StscEntry {
                    first_chunk: 3,
                    samples_per_chunk: 1,
                    sample_description_index: 1,
                },
            ],
            chunk_offsets: vec![100, 200, 300],
        };
        let samples = resolve_flat(&t, None).unwrap();
        let offsets: Vec<_> = samples.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![100, 101, 200, 203, 300]);
    }

    #[test]
    fn test_flat_chunks_too_few() {
        let mut t = track(1);
        t.sample_table = SampleTable {
            sizes: vec![1, 2, 3],
            chunks: vec![StscEntry {
                first_chunk: 1,
                samples_per_chunk: 1,
                sample_description_index: 1,
            }],
            chunk_offsets: vec![10, 20],
        };
        assert!(matches!(
            resolve_flat(&t, None),
            Err(Error::InvalidBox { box_type, .. }) if box_type == FourCc::STSC
        ));
    }

    #[test]
    fn test_flat_offset_wrap_rejected() {
        let mut t = track(1);
        t.sample_table = SampleTable {
            sizes: vec![16, 16],
            chunks: vec![StscEntry {
                first_chunk: 1,
                samples_per_chunk: 2,
                sample_description_index: 1,
            }],
            chunk_offsets: vec![u64::MAX - 4],
        };
        assert!(matches!(
            resolve_flat(&t, None),
            Err(Error::SampleRangeOverflow {
                offset,
                length: 16,
                ..
            }) if offset == u64::MAX - 4
        ));

        let mut t = track(1);
        t.sample_table.sizes = vec![16, 16];
        assert!(matches!(
            resolve_flat(&t, Some(u64::MAX - 4)),
            Err(Error::SampleRangeOverflow { .. })
        ));
    }
}
