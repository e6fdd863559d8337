//! File-level extraction: read the input, pick the track, write the
//! elementary stream next to it.

use crate::config::{handler_code, Config};
use anyhow::{Context, Result};
use bytes::Bytes;
use fraglift_media::demux::default_extension;
use fraglift_media::{
    extract, ExtractOptions, ExtractStats, FourCc, Mp4File, OutputMode, Presentation,
    TrackSelector,
};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// What the user asked for on the command line.
#[derive(Debug, Clone, Default)]
pub struct ExtractRequest {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub track_id: Option<u32>,
    pub handler: Option<String>,
    pub mode: Option<OutputMode>,
}

/// Outcome of a completed extraction.
#[derive(Debug, Clone)]
pub struct ExtractReport {
    pub output: PathBuf,
    pub track_id: u32,
    /// Framing actually used for the track
    pub mode: OutputMode,
    pub stats: ExtractStats,
}

/// Read a whole file and decode its box tree.
pub fn open_file(path: &Path) -> Result<Mp4File> {
    if !path.exists() {
        anyhow::bail!("Input file does not exist: {:?}", path);
    }
    let data = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    tracing::debug!("Read {} bytes from {:?}", data.len(), path);

    Mp4File::decode(Bytes::from(data)).with_context(|| format!("Failed to parse {:?}", path))
}

/// Read a file and locate its tracks and fragments.
pub fn open_presentation(path: &Path) -> Result<Presentation> {
    let file = open_file(path)?;
    Presentation::from_file(&file).with_context(|| format!("Failed to read tracks of {:?}", path))
}

/// Combine command line choices with config defaults.
pub fn extract_options(request: &ExtractRequest, config: &Config) -> Result<ExtractOptions> {
    let track = match (request.track_id, &request.handler) {
        (Some(id), _) => TrackSelector::TrackId(id),
        (None, Some(handler)) => TrackSelector::Handler(handler_code(handler)?),
        (None, None) => TrackSelector::Handler(handler_code(&config.extract.handler)?),
    };

    Ok(ExtractOptions {
        track,
        mode: request.mode.unwrap_or(config.extract.mode),
        adts_defaults: config.adts.to_header()?,
    })
}

/// `<input stem>.<ext>` in the input's directory.
pub fn default_output_path(input: &Path, sample_entry: Option<FourCc>) -> PathBuf {
    input.with_extension(default_extension(sample_entry))
}

/// Extract the requested track of `request.input`.
///
/// The output is written to a temporary file in the destination directory
/// and renamed into place once extraction succeeds, so a failed run leaves
/// no partial file behind.
pub fn run_extract(request: &ExtractRequest, config: &Config) -> Result<ExtractReport> {
    let presentation = open_presentation(&request.input)?;
    let options = extract_options(request, config)?;

    let track = match options.track {
        TrackSelector::Handler(handler) => presentation.track_by_handler(handler),
        TrackSelector::TrackId(id) => presentation.track_by_id(id),
    }
    .with_context(|| format!("No track to extract in {:?}", request.input))?;

    let output = match &request.output {
        Some(path) => path.clone(),
        None => default_output_path(&request.input, track.sample_entry),
    };
    if output == request.input {
        anyhow::bail!("Output would overwrite the input file: {:?}", output);
    }

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create output in {:?}", dir))?;

    tracing::info!(
        "Extracting track {} ({}) from {:?}",
        track.track_id,
        track.handler_type,
        request.input
    );

    let stats = extract(&presentation, &options, BufWriter::new(&mut tmp))
        .with_context(|| format!("Failed to extract track {}", track.track_id))?;

    tmp.persist(&output)
        .with_context(|| format!("Failed to write {:?}", output))?;

    tracing::info!(
        samples = stats.samples_extracted,
        bytes = stats.bytes_written,
        fragments = stats.fragments,
        "Wrote {:?}",
        output
    );

    Ok(ExtractReport {
        output,
        track_id: track.track_id,
        mode: options.mode.resolve(track.sample_entry),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        let path = default_output_path(Path::new("/media/show.m4s"), Some(FourCc::MP4A));
        assert_eq!(path, PathBuf::from("/media/show.aac"));

        let path = default_output_path(Path::new("clip.mp4"), Some(FourCc(*b"Opus")));
        assert_eq!(path, PathBuf::from("clip.audio"));
    }

    #[test]
    fn test_options_precedence() {
        let mut config = Config::default();
        config.extract.handler = "vide".to_string();
        config.extract.mode = OutputMode::Raw;

        let request = ExtractRequest::default();
        let options = extract_options(&request, &config).unwrap();
        assert_eq!(options.track, TrackSelector::Handler(FourCc::VIDE));
        assert_eq!(options.mode, OutputMode::Raw);

        let request = ExtractRequest {
            handler: Some("soun".to_string()),
            mode: Some(OutputMode::Adts),
            ..Default::default()
        };
        let options = extract_options(&request, &config).unwrap();
        assert_eq!(options.track, TrackSelector::Handler(FourCc::SOUN));
        assert_eq!(options.mode, OutputMode::Adts);

        let request = ExtractRequest {
            track_id: Some(7),
            handler: Some("soun".to_string()),
            ..Default::default()
        };
        let options = extract_options(&request, &config).unwrap();
        assert_eq!(options.track, TrackSelector::TrackId(7));
    }

    #[test]
    fn test_missing_input() {
        let err = open_file(Path::new("/nonexistent/input.mp4")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
