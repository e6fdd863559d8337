//! Synthesized MP4 files for integration tests.
//!
//! [`FragmentedBuilder`] produces an `ftyp` + `moov` + (`moof` + `mdat`)*
//! file with an AAC track and a video track sharing every fragment.
//! [`flat_audio`] produces a non-fragmented file with one AAC track whose
//! samples sit in a single chunk.

#![allow(dead_code)]

use bytes::Bytes;
use fraglift_media::mp4::{
    ContainerBox, EsdsBox, FtypBox, HdlrBox, MdatBox, MdhdBox, MfhdBox, Mp4aBox, OpaqueBox,
    StcoBox, StscBox, StscEntry, StsdBox, StszBox, TfdtBox, TfhdBox, TkhdBox, TrexBox, TrunBox,
};
use fraglift_media::{FourCc, Mp4Box, Mp4File};
use std::path::{Path, PathBuf};

pub const AUDIO_TRACK: u32 = 1;
pub const VIDEO_TRACK: u32 = 2;

/// AAC LC, 48 kHz, stereo.
pub const AAC_LC_48K_STEREO: [u8; 2] = [0x11, 0x90];

pub fn ftyp(major: &[u8; 4]) -> Mp4Box {
    FtypBox {
        major_brand: FourCc(*major),
        minor_version: 0,
        compatible_brands: vec![FourCc(*b"isom"), FourCc(*b"iso6")],
    }
    .into()
}

fn audio_stsd() -> StsdBox {
    StsdBox {
        entries: vec![Mp4aBox::new(2, 48_000, EsdsBox::for_aac(&AAC_LC_48K_STEREO)).into()],
        ..Default::default()
    }
}

fn video_stsd() -> StsdBox {
    StsdBox {
        entries: vec![OpaqueBox::new(FourCc(*b"avc1"), vec![0u8; 78]).into()],
        ..Default::default()
    }
}

pub fn trak(track_id: u32, handler: FourCc, stsd: StsdBox, tables: Vec<Mp4Box>) -> Mp4Box {
    let mut stbl = vec![stsd.into()];
    stbl.extend(tables);
    let minf = ContainerBox::new(
        FourCc::MINF,
        vec![ContainerBox::new(FourCc::STBL, stbl).into()],
    );
    let mdia = ContainerBox::new(
        FourCc::MDIA,
        vec![
            MdhdBox::new(48_000).into(),
            HdlrBox::new(handler, "fraglift test").into(),
            minf.into(),
        ],
    );
    ContainerBox::new(
        FourCc::TRAK,
        vec![TkhdBox::new(track_id).into(), mdia.into()],
    )
    .into()
}

fn trex(track_id: u32, default_sample_size: u32) -> Mp4Box {
    TrexBox {
        track_id,
        default_sample_description_index: 1,
        default_sample_size,
        ..Default::default()
    }
    .into()
}

/// One fragment: the audio samples and the video samples it carries.
#[derive(Debug, Clone, Default)]
pub struct FragmentSpec {
    pub audio: Vec<Vec<u8>>,
    pub video: Vec<Vec<u8>>,
}

/// Builds fragmented files. Video data precedes audio data in each `mdat`,
/// so audio is only found through its moof-relative data offset.
#[derive(Debug, Clone, Default)]
pub struct FragmentedBuilder {
    fragments: Vec<FragmentSpec>,
    with_audio: bool,
    with_video: bool,
    uuid_box: bool,
}

impl FragmentedBuilder {
    pub fn new() -> Self {
        Self {
            with_audio: true,
            with_video: true,
            ..Default::default()
        }
    }

    pub fn audio_only(mut self) -> Self {
        self.with_video = false;
        self
    }

    pub fn video_only(mut self) -> Self {
        self.with_audio = false;
        self
    }

    /// Insert a `uuid` box between the movie box and the first fragment.
    pub fn with_uuid_box(mut self) -> Self {
        self.uuid_box = true;
        self
    }

    pub fn fragment(mut self, audio: &[&[u8]], video: &[&[u8]]) -> Self {
        self.fragments.push(FragmentSpec {
            audio: audio.iter().map(|s| s.to_vec()).collect(),
            video: video.iter().map(|s| s.to_vec()).collect(),
        });
        self
    }

    pub fn boxes(&self) -> Vec<Mp4Box> {
        let mut traks = Vec::new();
        let mut trexes = Vec::new();
        if self.with_audio {
            traks.push(trak(AUDIO_TRACK, FourCc::SOUN, audio_stsd(), vec![]));
            trexes.push(trex(AUDIO_TRACK, 0));
        }
        if self.with_video {
            traks.push(trak(VIDEO_TRACK, FourCc::VIDE, video_stsd(), vec![]));
            trexes.push(trex(VIDEO_TRACK, 0));
        }
        let mut moov = traks;
        moov.push(ContainerBox::new(FourCc::MVEX, trexes).into());

        let mut boxes = vec![ftyp(b"iso6"), ContainerBox::new(FourCc::MOOV, moov).into()];
        if self.uuid_box {
            let mut uuid = OpaqueBox::new(FourCc::UUID, vec![0x42; 12]);
            uuid.user_type = Some([0x5a; 16]);
            boxes.push(uuid.into());
        }

        for (i, spec) in self.fragments.iter().enumerate() {
            let (moof, mdat) = self.fragment_boxes(i as u32 + 1, spec);
            boxes.push(moof);
            boxes.push(mdat);
        }
        boxes
    }

    fn fragment_boxes(&self, sequence_number: u32, spec: &FragmentSpec) -> (Mp4Box, Mp4Box) {
        let video_len: usize = spec.video.iter().map(Vec::len).sum();
        let audio_sizes: Vec<u32> = spec.audio.iter().map(|s| s.len() as u32).collect();
        let video_sizes: Vec<u32> = spec.video.iter().map(|s| s.len() as u32).collect();

        let build = |moof_size: u32| {
            let payload_start = moof_size as i32 + 8;
            let mut children = vec![MfhdBox {
                sequence_number,
                ..Default::default()
            }
            .into()];
            if self.with_video {
                children.push(
                    ContainerBox::new(
                        FourCc::TRAF,
                        vec![
                            TfhdBox::new(VIDEO_TRACK).into(),
                            TrunBox::with_sizes(&video_sizes)
                                .with_data_offset(payload_start)
                                .into(),
                        ],
                    )
                    .into(),
                );
            }
            if !self.with_audio {
                return ContainerBox::new(FourCc::MOOF, children);
            }
            children.push(
                ContainerBox::new(
                    FourCc::TRAF,
                    vec![
                        TfhdBox::new(AUDIO_TRACK).into(),
                        TfdtBox {
                            base_media_decode_time: u64::from(sequence_number - 1) * 1024,
                            ..Default::default()
                        }
                        .into(),
                        TrunBox::with_sizes(&audio_sizes)
                            .with_data_offset(payload_start + video_len as i32)
                            .into(),
                    ],
                )
                .into(),
            );
            ContainerBox::new(FourCc::MOOF, children)
        };

        let moof_size = build(0).size() as u32;
        let moof = build(moof_size);

        let mut data = Vec::new();
        for sample in spec.video.iter().chain(&spec.audio) {
            data.extend_from_slice(sample);
        }
        (moof.into(), MdatBox::new(data).into())
    }

    pub fn build(&self) -> Bytes {
        Mp4File::from_boxes(self.boxes())
            .expect("encode fixture")
            .source()
            .clone()
    }
}

/// Non-fragmented file with one AAC track; all samples in one chunk.
pub fn flat_audio(samples: &[&[u8]]) -> Bytes {
    let sizes: Vec<u32> = samples.iter().map(|s| s.len() as u32).collect();
    let boxes = |chunk_offset: u32| {
        let tables = vec![
            StszBox::with_sizes(sizes.clone()).into(),
            StscBox {
                entries: vec![StscEntry {
                    first_chunk: 1,
                    samples_per_chunk: samples.len() as u32,
                    sample_description_index: 1,
                }],
                ..Default::default()
            }
            .into(),
            StcoBox {
                chunk_offsets: vec![chunk_offset],
                ..Default::default()
            }
            .into(),
        ];
        let moov = ContainerBox::new(
            FourCc::MOOV,
            vec![trak(AUDIO_TRACK, FourCc::SOUN, audio_stsd(), tables)],
        );
        let data: Vec<u8> = samples.concat();
        vec![ftyp(b"isom"), moov.into(), MdatBox::new(data).into()]
    };

    let draft = boxes(0);
    let payload_offset = (draft[0].size() + draft[1].size() + 8) as u32;
    Mp4File::from_boxes(boxes(payload_offset))
        .expect("encode fixture")
        .source()
        .clone()
}

/// A typical two-fragment file: two audio samples per fragment, interleaved
/// with video.
pub fn two_fragment_file() -> Bytes {
    FragmentedBuilder::new()
        .fragment(&[b"AAAA", b"BB"], &[b"vvvvvv"])
        .fragment(&[b"CCC"], &[b"ww", b"xx"])
        .build()
}

pub fn write_fixture(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).expect("write fixture");
    path
}
