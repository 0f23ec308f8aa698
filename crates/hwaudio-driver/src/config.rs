use hwaudio_core::audio::{DEFAULT_CHANNEL_COUNT, TARGET_SAMPLE_RATE};
use serde::{Deserialize, Serialize};

/// Defaults applied to session parameters the caller leaves at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub default_sample_rate: u32,
    pub default_channel_count: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            default_sample_rate: TARGET_SAMPLE_RATE,
            default_channel_count: DEFAULT_CHANNEL_COUNT,
        }
    }
}

impl DriverConfig {
    /// Replaces unspecified (zero) parameters with the configured defaults.
    pub fn resolve(&self, sample_rate: u32, channel_count: u32) -> (u32, u32) {
        let sample_rate = match sample_rate {
            0 => self.default_sample_rate,
            v => v,
        };

        let channel_count = match channel_count {
            0 => self.default_channel_count,
            v => v,
        };

        (sample_rate, channel_count)
    }
}
