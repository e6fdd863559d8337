//! Human and JSON views of a decoded file: the box tree and the track list.

use fraglift_media::mp4::LeafBox;
use fraglift_media::{FourCc, Mp4Box, Mp4File, Presentation};
use serde::Serialize;
use std::fmt::Write;

/// One box of the tree, for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct BoxNode {
    #[serde(rename = "type")]
    pub box_type: FourCc,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BoxNode>,
}

impl BoxNode {
    fn from_box(b: &Mp4Box, offset: Option<u64>) -> Self {
        Self {
            box_type: b.box_type(),
            size: b.size(),
            offset,
            summary: summarize(b),
            children: b.children().iter().map(|c| Self::from_box(c, None)).collect(),
        }
    }
}

/// The box tree of `file`; top-level nodes carry their input offsets.
pub fn box_tree(file: &Mp4File) -> Vec<BoxNode> {
    file.iter()
        .map(|(span, b)| BoxNode::from_box(b, Some(span.offset)))
        .collect()
}

/// One line per box, indented by depth.
pub fn render_tree(file: &Mp4File) -> String {
    let mut out = String::new();
    file.walk(|b, depth| {
        let _ = write!(out, "{:indent$}{} ({} bytes)", "", b.box_type(), b.size(), indent = depth * 2);
        if let Some(summary) = summarize(b) {
            let _ = write!(out, " {}", summary);
        }
        out.push('\n');
    });
    out
}

/// Short description of the fields of a known box.
pub fn summarize(b: &Mp4Box) -> Option<String> {
    let leaf = match b {
        Mp4Box::Leaf(leaf) => leaf,
        Mp4Box::Opaque(opaque) => {
            return opaque
                .user_type
                .map(|ut| ut.iter().map(|byte| format!("{byte:02x}")).collect::<String>())
                .map(|hex| format!("user_type={hex}"));
        }
        Mp4Box::Container(_) => return None,
    };

    let summary = match leaf {
        LeafBox::Ftyp(b) => {
            let brands: Vec<String> = b.compatible_brands.iter().map(|c| c.to_string()).collect();
            format!(
                "major={} minor={} compatible=[{}]",
                b.major_brand,
                b.minor_version,
                brands.join(",")
            )
        }
        LeafBox::Tkhd(b) => format!("track_id={} duration={}", b.track_id, b.duration),
        LeafBox::Mdhd(b) => format!(
            "timescale={} duration={} language={}",
            b.timescale,
            b.duration,
            b.language_code()
        ),
        LeafBox::Hdlr(b) => format!("handler={} name={:?}", b.handler_type, b.name_str()),
        LeafBox::Stsd(b) => format!("entries={}", b.entries.len()),
        LeafBox::Mp4a(b) => format!(
            "channels={} sample_rate={}",
            b.channel_count,
            b.sample_rate_hz()
        ),
        LeafBox::Esds(b) => match b.audio_specific_config() {
            Some(asc) => format!(
                "object_type={} sample_rate={} channels={}",
                asc.object_type, asc.sampling_frequency, asc.channel_configuration
            ),
            None => format!("descriptors={} bytes", b.descriptors.len()),
        },
        LeafBox::Stsz(b) => format!("samples={} fixed_size={}", b.sample_count, b.sample_size),
        LeafBox::Stsc(b) => format!("entries={}", b.entries.len()),
        LeafBox::Stco(b) => format!("chunks={}", b.chunk_offsets.len()),
        LeafBox::Co64(b) => format!("chunks={}", b.chunk_offsets.len()),
        LeafBox::Trex(b) => format!(
            "track_id={} default_size={}",
            b.track_id, b.default_sample_size
        ),
        LeafBox::Mfhd(b) => format!("sequence={}", b.sequence_number),
        LeafBox::Tfhd(b) => {
            let mut s = format!("track_id={}", b.track_id);
            if let Some(base) = b.base_data_offset {
                let _ = write!(s, " base_data_offset={base}");
            }
            if let Some(size) = b.default_sample_size {
                let _ = write!(s, " default_size={size}");
            }
            s
        }
        LeafBox::Tfdt(b) => format!("base_media_decode_time={}", b.base_media_decode_time),
        LeafBox::Trun(b) => match b.data_offset {
            Some(offset) => format!("samples={} data_offset={}", b.sample_count(), offset),
            None => format!("samples={}", b.sample_count()),
        },
        LeafBox::Prft(b) => format!(
            "{} track={} ntp={} media_time={}",
            b.interpret_flags(),
            b.reference_track_id,
            b.ntp_timestamp,
            b.media_time
        ),
        LeafBox::Mdat(b) => format!("payload={} bytes", b.data.len()),
    };
    Some(summary)
}

/// A row of the track listing.
#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    pub track_id: u32,
    pub handler: FourCc,
    pub sample_entry: Option<FourCc>,
    pub timescale: Option<u32>,
    pub samples: usize,
    pub fragments: usize,
}

pub fn track_summaries(presentation: &Presentation) -> Vec<TrackSummary> {
    presentation
        .tracks
        .iter()
        .map(|track| TrackSummary {
            track_id: track.track_id,
            handler: track.handler_type,
            sample_entry: track.sample_entry,
            timescale: track.timescale,
            samples: presentation.sample_count(track),
            fragments: presentation
                .fragments
                .iter()
                .filter(|f| f.contains_track(track.track_id))
                .count(),
        })
        .collect()
}

pub fn render_tracks(tracks: &[TrackSummary]) -> String {
    let mut out = String::new();
    for t in tracks {
        let entry = t.sample_entry.map(|e| e.to_string()).unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "[{}] {} {} samples={} fragments={}",
            t.track_id, t.handler, entry, t.samples, t.fragments
        );
    }
    out
}
