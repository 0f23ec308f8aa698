use serde::{Deserialize, Serialize};

/// Sample rate sessions are opened at when the caller leaves it unspecified.
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Smallest number of frames per device buffer.
pub const TARGET_SAMPLE_COUNT: u32 = 240;

/// Largest channel layout the driver negotiates.
pub const CHANNEL_COUNT_MAX: u32 = 6;

/// Channel count sessions are opened with when the caller leaves it unspecified.
pub const DEFAULT_CHANNEL_COUNT: u32 = 2;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    PcmInt8,
    PcmInt16,
    PcmInt24,
    PcmInt32,
    PcmFloat,
    Adpcm,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}
