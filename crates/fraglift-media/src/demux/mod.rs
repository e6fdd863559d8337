//! Track location, sample resolution and elementary stream extraction.

mod extract;
mod presentation;
mod resolve;

pub use extract::{
    adts_params, default_extension, extract, sample_payloads, ExtractOptions, ExtractStats,
    OutputMode, SampleWriter, TrackSelector,
};
pub use presentation::{AudioParams, Fragment, Presentation, SampleTable, Track, TrackFragment};
pub use resolve::{
    flat_run, fragment_runs, resolve_flat, resolve_fragment, ResolvedSample, SampleRun,
};
