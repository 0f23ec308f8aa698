mod config;
mod driver;
mod error;
pub mod negotiator;
mod session;

#[cfg(test)]
mod tests;

pub use hwaudio_core::audio::{
    Direction, SampleFormat, CHANNEL_COUNT_MAX, TARGET_SAMPLE_COUNT, TARGET_SAMPLE_RATE,
};
pub use hwaudio_core::sync::Event;

pub use crate::config::DriverConfig;
pub use crate::driver::HardwareDeviceDriver;
pub use crate::error::{Error, Result};
pub use crate::session::{AudioBuffer, HardwareDeviceSession, SessionId};
