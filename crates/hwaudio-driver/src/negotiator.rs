//! Opens device streams, accepting only exact matches of the requested spec.

use hwaudio_core::audio::{
    SampleFormat, CHANNEL_COUNT_MAX, TARGET_SAMPLE_COUNT, TARGET_SAMPLE_RATE,
};
use hwaudio_core::backend::{Backend, Device as _, DeviceSpec, NativeFormat, OutCallback};

use crate::{Error, Result};

pub fn native_format(format: SampleFormat) -> Result<NativeFormat> {
    match format {
        SampleFormat::PcmInt8 => Ok(NativeFormat::S8),
        SampleFormat::PcmInt16 => Ok(NativeFormat::S16),
        SampleFormat::PcmInt32 => Ok(NativeFormat::S32),
        SampleFormat::PcmFloat => Ok(NativeFormat::F32),
        SampleFormat::PcmInt24 | SampleFormat::Adpcm => {
            Err(Error::UnsupportedSampleFormat(format))
        }
    }
}

pub fn desired_spec(
    format: SampleFormat,
    sample_rate: u32,
    channel_count: u32,
    sample_count: u32,
) -> Result<DeviceSpec> {
    let channels = u8::try_from(channel_count).map_err(|_| Error::InvalidParameter {
        name: "channel count",
        value: channel_count.into(),
    })?;

    let samples = u16::try_from(sample_count).map_err(|_| Error::InvalidParameter {
        name: "sample count",
        value: sample_count.into(),
    })?;

    Ok(DeviceSpec {
        format: native_format(format)?,
        freq: sample_rate,
        channels,
        samples,
    })
}

/// Opens the default output device with the given parameters.
///
/// Returns `Ok(None)` if the device could not be opened or granted anything
/// but the requested format, rate and channel count. A mismatching device is
/// closed before returning.
pub fn open_stream<B: Backend>(
    backend: &B,
    format: SampleFormat,
    sample_rate: u32,
    channel_count: u32,
    sample_count: u32,
    callback: Option<OutCallback>,
) -> Result<Option<B::Device>> {
    let desired = desired_spec(format, sample_rate, channel_count, sample_count)?;

    let device = match backend.open_output_device(&desired, callback) {
        Ok(device) => device,
        Err(error) => {
            tracing::debug!(?error, ?desired, "failed to open output device");
            return Ok(None);
        }
    };

    let granted = device.spec();
    if !desired.matches(&granted) {
        tracing::debug!(?desired, ?granted, "output device granted a different spec");
        drop(device);
        return Ok(None);
    }

    Ok(Some(device))
}

/// Probes whether the backend can open a stream with the canonical parameters.
///
/// The probe stream is closed right away.
pub fn is_supported<B: Backend>(backend: &B) -> bool {
    let device = open_stream(
        backend,
        SampleFormat::PcmInt16,
        TARGET_SAMPLE_RATE,
        CHANNEL_COUNT_MAX,
        TARGET_SAMPLE_COUNT,
        None,
    );

    matches!(device, Ok(Some(_)))
}
