//! Elementary stream extraction.
//!
//! Writes the samples of one track, in order, to any [`Write`]. AAC samples
//! get an ADTS header each; other codecs are written as bare payloads.

use super::presentation::{Presentation, Track};
use super::resolve::{flat_run, fragment_runs, SampleRun};
use crate::adts::{sample_rate_index, AdtsHeader, ADTS_HEADER_LEN};
use crate::mp4::FourCc;
use crate::Result;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// How samples are framed on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum OutputMode {
    /// ADTS for `mp4a` tracks, raw otherwise.
    #[default]
    Auto,
    /// ADTS header before every sample.
    Adts,
    /// Payloads concatenated as-is.
    Raw,
}

impl OutputMode {
    /// Concrete mode for a track with the given sample entry.
    pub fn resolve(self, sample_entry: Option<FourCc>) -> Self {
        match self {
            Self::Auto if sample_entry == Some(FourCc::MP4A) => Self::Adts,
            Self::Auto => Self::Raw,
            other => other,
        }
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "adts" => Ok(Self::Adts),
            "raw" => Ok(Self::Raw),
            other => Err(format!("unknown output mode '{other}' (expected auto, adts or raw)")),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Adts => "adts",
            Self::Raw => "raw",
        })
    }
}

/// Which track to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSelector {
    /// First track with this handler type.
    Handler(FourCc),
    TrackId(u32),
}

impl Default for TrackSelector {
    fn default() -> Self {
        Self::Handler(FourCc::SOUN)
    }
}

/// Extraction settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    pub track: TrackSelector,
    pub mode: OutputMode,
    /// Parameters used when the track does not declare them.
    pub adts_defaults: AdtsHeader,
}

/// Counters reported after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct ExtractStats {
    /// Tracks matching the selector.
    pub tracks_found: usize,
    /// Fragments that carried the extracted track.
    pub fragments: usize,
    pub samples_extracted: u64,
    pub bytes_written: u64,
}

/// File extension conventionally used for a track's elementary stream.
pub fn default_extension(sample_entry: Option<FourCc>) -> &'static str {
    match sample_entry.map(|t| t.0) {
        Some(t) if t == *b"mp4a" => "aac",
        Some(t) if t == *b"mp3 " || t == *b".mp3" => "mp3",
        _ => "audio",
    }
}

/// ADTS parameters for `track`: from its AudioSpecificConfig when usable,
/// then from the `mp4a` entry fields, then from `defaults`.
pub fn adts_params(track: &Track, defaults: AdtsHeader) -> AdtsHeader {
    let Some(audio) = track.audio else {
        return defaults;
    };
    if let Some(asc) = &audio.config {
        match AdtsHeader::from_audio_specific_config(asc) {
            Ok(header) => return header,
            #[cfg(feature = "tracing")]
            Err(e) => tracing::debug!(track_id = track.track_id, error = %e, "ignoring AudioSpecificConfig"),
            #[cfg(not(feature = "tracing"))]
            Err(_) => {}
        }
    }

    let sample_rate_index = sample_rate_index(audio.sample_rate).unwrap_or(defaults.sample_rate_index);
    let channel_config = match audio.channel_count {
        1..=6 => audio.channel_count as u8,
        8 => 7,
        _ => defaults.channel_config,
    };
    AdtsHeader {
        profile: defaults.profile,
        sample_rate_index,
        channel_config,
    }
}

/// Writes samples to an output stream, framing them as configured.
pub struct SampleWriter<W> {
    out: W,
    header: Option<AdtsHeader>,
    samples: u64,
    bytes: u64,
}

impl<W: Write> SampleWriter<W> {
    /// Writer that prefixes each sample with an ADTS header built from
    /// `header`, or writes bare payloads when `header` is `None`.
    pub fn new(out: W, header: Option<AdtsHeader>) -> Self {
        Self {
            out,
            header,
            samples: 0,
            bytes: 0,
        }
    }

    pub fn write_sample(&mut self, payload: &[u8]) -> Result<()> {
        if let Some(header) = &self.header {
            let frame_header = header.frame_header(payload.len())?;
            self.out.write_all(&frame_header)?;
            self.bytes += ADTS_HEADER_LEN as u64;
        }
        self.out.write_all(payload)?;
        self.bytes += payload.len() as u64;
        self.samples += 1;
        Ok(())
    }

    pub fn write_run(&mut self, run: &SampleRun<'_>) -> Result<()> {
        for payload in run.payloads() {
            self.write_sample(payload)?;
        }
        Ok(())
    }

    /// Samples written so far.
    pub fn samples_written(&self) -> u64 {
        self.samples
    }

    /// Bytes written so far, headers included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Flush and return the output.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Extract one track of `presentation` into `out`.
///
/// Track selection, sample resolution and frame size checks finish before
/// the first byte is written, so a missing track or a bad sample range
/// leaves `out` untouched.
pub fn extract<W: Write>(
    presentation: &Presentation,
    options: &ExtractOptions,
    out: W,
) -> Result<ExtractStats> {
    let (track, tracks_found) = match options.track {
        TrackSelector::Handler(handler) => (
            presentation.track_by_handler(handler)?,
            presentation.tracks_with_handler(handler).count(),
        ),
        TrackSelector::TrackId(id) => (presentation.track_by_id(id)?, 1),
    };

    let runs = if presentation.is_fragmented() {
        fragment_runs(presentation, track)?
    } else {
        vec![flat_run(presentation, track)?]
    };

    let header = match options.mode.resolve(track.sample_entry) {
        OutputMode::Adts => Some(adts_params(track, options.adts_defaults)),
        _ => None,
    };

    if let Some(header) = &header {
        for sample in runs.iter().flat_map(SampleRun::samples) {
            header.frame_header(sample.length as usize)?;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        track_id = track.track_id,
        runs = runs.len(),
        adts = header.is_some(),
        "extracting track"
    );

    let mut writer = SampleWriter::new(out, header);
    for run in &runs {
        writer.write_run(run)?;
    }
    let stats = ExtractStats {
        tracks_found,
        fragments: if presentation.is_fragmented() { runs.len() } else { 0 },
        samples_extracted: writer.samples_written(),
        bytes_written: writer.bytes_written(),
    };
    writer.finish()?;
    Ok(stats)
}

/// Payload of every sample of `track`, in output order, without framing.
pub fn sample_payloads<'a>(presentation: &'a Presentation, track: &Track) -> Result<Vec<&'a [u8]>> {
    let runs = if presentation.is_fragmented() {
        fragment_runs(presentation, track)?
    } else {
        vec![flat_run(presentation, track)?]
    };
    Ok(runs.iter().flat_map(|r| r.payloads()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::presentation::AudioParams;
    use crate::demux::SampleTable;
    use crate::mp4::AudioSpecificConfig;

    fn aac_track(config: Option<AudioSpecificConfig>) -> Track {
        Track {
            track_id: 1,
            handler_type: FourCc::SOUN,
            sample_entry: Some(FourCc::MP4A),
            timescale: Some(48_000),
            sample_table: SampleTable::default(),
            audio: Some(AudioParams {
                channel_count: 1,
                sample_rate: 48_000,
                config,
            }),
            defaults: None,
        }
    }

    #[test]
    fn test_mode_resolution() {
        assert_eq!(OutputMode::Auto.resolve(Some(FourCc::MP4A)), OutputMode::Adts);
        assert_eq!(OutputMode::Auto.resolve(Some(FourCc(*b"Opus"))), OutputMode::Raw);
        assert_eq!(OutputMode::Raw.resolve(Some(FourCc::MP4A)), OutputMode::Raw);
        assert_eq!("ADTS".parse::<OutputMode>().unwrap(), OutputMode::Adts);
        assert!("wav".parse::<OutputMode>().is_err());
        assert_eq!(OutputMode::Raw.to_string(), "raw");
    }

    #[test]
    fn test_extensions() {
        assert_eq!(default_extension(Some(FourCc::MP4A)), "aac");
        assert_eq!(default_extension(Some(FourCc(*b".mp3"))), "mp3");
        assert_eq!(default_extension(Some(FourCc(*b"Opus"))), "audio");
        assert_eq!(default_extension(None), "audio");
    }

    #[test]
    fn test_adts_params_precedence() {
        let asc = AudioSpecificConfig {
            object_type: 2,
            sampling_frequency_index: 8,
            sampling_frequency: 16_000,
            channel_configuration: 2,
        };
        let from_asc = adts_params(&aac_track(Some(asc)), AdtsHeader::DEFAULT);
        assert_eq!(from_asc, AdtsHeader::new(1, 8, 2).unwrap());

        let from_entry = adts_params(&aac_track(None), AdtsHeader::DEFAULT);
        assert_eq!(from_entry, AdtsHeader::new(1, 3, 1).unwrap());

        let mut bare = aac_track(None);
        bare.audio = None;
        let defaults = AdtsHeader::new(0, 6, 2).unwrap();
        assert_eq!(adts_params(&bare, defaults), defaults);
    }

    #[test]
    fn test_writer_counts() {
        let mut writer = SampleWriter::new(Vec::new(), Some(AdtsHeader::DEFAULT));
        writer.write_sample(&[1, 2, 3]).unwrap();
        writer.write_sample(&[4]).unwrap();
        assert_eq!(writer.samples_written(), 2);
        assert_eq!(writer.bytes_written(), 2 * 7 + 4);
        let out = writer.finish().unwrap();
        assert_eq!(out.len(), 18);
        assert_eq!(&out[7..10], &[1, 2, 3]);
        let (_, frame_len) = AdtsHeader::parse(&out[10..]).unwrap();
        assert_eq!(frame_len, 8);
    }

    #[test]
    fn test_raw_writer() {
        let mut writer = SampleWriter::new(Vec::new(), None);
        writer.write_sample(&[1, 2]).unwrap();
        writer.write_sample(&[3]).unwrap();
        assert_eq!(writer.finish().unwrap(), vec![1, 2, 3]);
    }
}
