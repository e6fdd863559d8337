use fraglift_media::{AdtsHeader, OutputMode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub adts: AdtsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractConfig {
    /// Handler type of the track extracted when no track ID is given
    #[serde(default = "default_handler")]
    pub handler: String,

    /// Output framing when the command line does not choose one
    #[serde(default)]
    pub mode: OutputMode,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            handler: default_handler(),
            mode: OutputMode::default(),
        }
    }
}

/// ADTS parameters used when a track declares none of its own.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct AdtsConfig {
    /// Audio object type minus one (1 = AAC LC)
    #[serde(default = "default_profile")]
    pub profile: u8,

    /// Index into the ADTS sampling frequency table (4 = 44.1 kHz)
    #[serde(default = "default_sample_rate_index")]
    pub sample_rate_index: u8,

    #[serde(default = "default_channel_config")]
    pub channel_config: u8,
}

impl Default for AdtsConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            sample_rate_index: default_sample_rate_index(),
            channel_config: default_channel_config(),
        }
    }
}

impl AdtsConfig {
    pub fn to_header(&self) -> fraglift_media::Result<AdtsHeader> {
        AdtsHeader::new(self.profile, self.sample_rate_index, self.channel_config)
    }
}

fn default_handler() -> String {
    "soun".to_string()
}

fn default_profile() -> u8 {
    AdtsHeader::DEFAULT.profile
}

fn default_sample_rate_index() -> u8 {
    AdtsHeader::DEFAULT.sample_rate_index
}

fn default_channel_config() -> u8 {
    AdtsHeader::DEFAULT.channel_config
}
