use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, SampleRate, SizedSample, StreamConfig, SupportedBufferSize, SupportedStreamConfig,
    SupportedStreamConfigRange,
};
use hwaudio_core::backend::{DeviceSpec, NativeFormat, OutCallback};
use slotmap::SlotMap;

use crate::{Error, Result};

slotmap::new_key_type! {
    pub struct StreamId;
}

pub enum Message {
    OpenOutDevice {
        sender: oneshot::Sender<Result<(StreamId, DeviceSpec)>>,
        desired: DeviceSpec,
        callback: Option<OutCallback>,
    },
    SetOutDevicePaused {
        sender: oneshot::Sender<Result<()>>,
        id: StreamId,
        paused: bool,
    },
    DestroyOutDevice {
        id: StreamId,
    },
    Terminate,
}

#[derive(Clone)]
pub struct Handle {
    sender: async_channel::Sender<Message>,
}

impl Handle {
    pub fn new() -> (Handle, async_channel::Receiver<Message>) {
        let (sender, receiver) = async_channel::unbounded();
        (Handle { sender }, receiver)
    }

    fn send(&self, message: Message) -> Result<()> {
        self.sender
            .send_blocking(message)
            .map_err(|_| Error::ThreadCrashed)
    }

    fn send_recv<T>(&self, recv: oneshot::Receiver<Result<T>>, message: Message) -> Result<T> {
        self.send(message)?;
        recv.recv().map_err(|_| Error::ThreadCrashed)?
    }

    pub fn terminate(&self) -> Result<()> {
        self.send(Message::Terminate)
    }

    pub fn open_out_device(
        &self,
        desired: DeviceSpec,
        callback: Option<OutCallback>,
    ) -> Result<(StreamId, DeviceSpec)> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(
            receiver,
            Message::OpenOutDevice {
                sender,
                desired,
                callback,
            },
        )
    }

    pub fn set_out_device_paused(&self, id: StreamId, paused: bool) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::SetOutDevicePaused { sender, id, paused })
    }

    pub fn destroy_out_device(&self, id: StreamId) -> Result<()> {
        self.send(Message::DestroyOutDevice { id })
    }
}

pub struct CpalThread {
    host: cpal::Host,
    out_streams: SlotMap<StreamId, cpal::Stream>,
}

impl CpalThread {
    pub fn new() -> CpalThread {
        let host = cpal::default_host();
        tracing::debug!(host = ?host.id(), "cpal backend started");

        CpalThread {
            host,
            out_streams: SlotMap::default(),
        }
    }

    pub fn run(mut self, receiver: async_channel::Receiver<Message>) {
        while let Ok(message) = receiver.recv_blocking() {
            if !self.handle_message(message) {
                break;
            }
        }

        tracing::debug!(streams = self.out_streams.len(), "cpal backend stopped");
    }

    fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::OpenOutDevice {
                sender,
                desired,
                callback,
            } => {
                let _ = sender.send(self.open_out_device(&desired, callback));
            }
            Message::SetOutDevicePaused { sender, id, paused } => {
                let _ = sender.send(self.set_out_device_paused(id, paused));
            }
            Message::DestroyOutDevice { id } => self.destroy_out_device(id),
            Message::Terminate => return false,
        }

        true
    }

    fn open_out_device(
        &mut self,
        desired: &DeviceSpec,
        callback: Option<OutCallback>,
    ) -> Result<(StreamId, DeviceSpec)> {
        let device = self
            .host
            .default_output_device()
            .ok_or(Error::NoDefaultDevice)?;

        let supported = match select_config(desired, device.supported_output_configs()?) {
            Some(supported) => supported,
            None => device.default_output_config()?,
        };

        let (config, granted) = granted_config(desired, &supported)?;
        let silence = granted.format.silence();

        let stream = match granted.format {
            NativeFormat::U8 => build_stream::<u8>(&device, &config, callback, silence)?,
            NativeFormat::S8 => build_stream::<i8>(&device, &config, callback, silence)?,
            NativeFormat::U16 => build_stream::<u16>(&device, &config, callback, silence)?,
            NativeFormat::S16 => build_stream::<i16>(&device, &config, callback, silence)?,
            NativeFormat::S32 => build_stream::<i32>(&device, &config, callback, silence)?,
            NativeFormat::F32 => build_stream::<f32>(&device, &config, callback, silence)?,
        };

        stream.pause()?;

        tracing::debug!(?desired, ?granted, "opened output stream");

        let id = self.out_streams.insert(stream);
        Ok((id, granted))
    }

    fn set_out_device_paused(&mut self, id: StreamId, paused: bool) -> Result<()> {
        let stream = self.out_streams.get(id).ok_or(Error::InvalidStreamId)?;

        if paused {
            stream.pause()?;
        } else {
            stream.play()?;
        }

        Ok(())
    }

    fn destroy_out_device(&mut self, id: StreamId) {
        self.out_streams.remove(id);
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut callback: Option<OutCallback>,
    silence: u8,
) -> Result<cpal::Stream>
where
    T: SizedSample + bytemuck::Pod,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
            let bytes: &mut [u8] = bytemuck::cast_slice_mut(data);
            match &mut callback {
                Some(callback) => callback(bytes),
                None => bytes.fill(silence),
            }
        },
        |error| tracing::warn!(%error, "output stream error"),
        None,
    )?;

    Ok(stream)
}

fn native_format(format: cpal::SampleFormat) -> Option<NativeFormat> {
    match format {
        cpal::SampleFormat::U8 => Some(NativeFormat::U8),
        cpal::SampleFormat::I8 => Some(NativeFormat::S8),
        cpal::SampleFormat::U16 => Some(NativeFormat::U16),
        cpal::SampleFormat::I16 => Some(NativeFormat::S16),
        cpal::SampleFormat::I32 => Some(NativeFormat::S32),
        cpal::SampleFormat::F32 => Some(NativeFormat::F32),
        _ => None,
    }
}

/// Picks the supported range that runs the desired format, channel count and
/// rate, if any.
fn select_config<I>(desired: &DeviceSpec, ranges: I) -> Option<SupportedStreamConfig>
where
    I: IntoIterator<Item = SupportedStreamConfigRange>,
{
    ranges
        .into_iter()
        .find(|range| {
            native_format(range.sample_format()) == Some(desired.format)
                && range.channels() == u16::from(desired.channels)
                && range.min_sample_rate().0 <= desired.freq
                && desired.freq <= range.max_sample_rate().0
        })
        .map(|range| range.with_sample_rate(SampleRate(desired.freq)))
}

/// Builds the stream config for `supported` and the spec it grants.
///
/// The desired buffer size is used when the device accepts it, otherwise the
/// device picks one and the granted spec reports zero samples.
fn granted_config(
    desired: &DeviceSpec,
    supported: &SupportedStreamConfig,
) -> Result<(StreamConfig, DeviceSpec)> {
    let format = native_format(supported.sample_format()).ok_or(Error::UnsupportedFormat)?;
    let channels = u8::try_from(supported.channels()).map_err(|_| Error::UnsupportedFormat)?;

    let frames = u32::from(desired.samples);
    let fixed = match supported.buffer_size() {
        SupportedBufferSize::Range { min, max } => (*min..=*max).contains(&frames),
        SupportedBufferSize::Unknown => false,
    };

    let mut config = supported.config();
    config.buffer_size = if fixed {
        BufferSize::Fixed(frames)
    } else {
        BufferSize::Default
    };

    let granted = DeviceSpec {
        format,
        freq: supported.sample_rate().0,
        channels,
        samples: if fixed { desired.samples } else { 0 },
    };

    Ok((config, granted))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired() -> DeviceSpec {
        DeviceSpec {
            format: NativeFormat::S16,
            freq: 48000,
            channels: 2,
            samples: 240,
        }
    }

    fn range(
        channels: u16,
        min: u32,
        max: u32,
        format: cpal::SampleFormat,
    ) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Range { min: 64, max: 4096 },
            format,
        )
    }

    #[test]
    fn format_mapping() {
        assert_eq!(native_format(cpal::SampleFormat::I16), Some(NativeFormat::S16));
        assert_eq!(native_format(cpal::SampleFormat::F32), Some(NativeFormat::F32));
        assert_eq!(native_format(cpal::SampleFormat::I8), Some(NativeFormat::S8));
        assert_eq!(native_format(cpal::SampleFormat::F64), None);
        assert_eq!(native_format(cpal::SampleFormat::I64), None);
    }

    #[test]
    fn select_matching_range() {
        let ranges = vec![
            range(2, 8000, 192000, cpal::SampleFormat::F32),
            range(6, 8000, 192000, cpal::SampleFormat::I16),
            range(2, 8000, 44100, cpal::SampleFormat::I16),
            range(2, 44100, 96000, cpal::SampleFormat::I16),
        ];

        let selected = select_config(&desired(), ranges).unwrap();
        assert_eq!(selected.channels(), 2);
        assert_eq!(selected.sample_rate(), SampleRate(48000));
        assert_eq!(selected.sample_format(), cpal::SampleFormat::I16);
    }

    #[test]
    fn select_without_match() {
        let ranges = vec![
            range(2, 8000, 192000, cpal::SampleFormat::F32),
            range(1, 8000, 192000, cpal::SampleFormat::I16),
        ];

        assert!(select_config(&desired(), ranges).is_none());
    }

    #[test]
    fn granted_fixed_buffer() {
        let supported = range(2, 8000, 192000, cpal::SampleFormat::I16)
            .with_sample_rate(SampleRate(48000));

        let (config, granted) = granted_config(&desired(), &supported).unwrap();
        assert_eq!(config.buffer_size, BufferSize::Fixed(240));
        assert_eq!(granted, desired());
    }

    #[test]
    fn granted_default_config() {
        let supported = SupportedStreamConfig::new(
            2,
            SampleRate(44100),
            SupportedBufferSize::Unknown,
            cpal::SampleFormat::F32,
        );

        let (config, granted) = granted_config(&desired(), &supported).unwrap();
        assert_eq!(config.buffer_size, BufferSize::Default);
        assert_eq!(config.sample_rate, SampleRate(44100));
        assert_eq!(granted.format, NativeFormat::F32);
        assert_eq!(granted.freq, 44100);
        assert_eq!(granted.samples, 0);
        assert!(!desired().matches(&granted));
    }

    #[test]
    fn granted_rejects_unmapped_format() {
        let supported = SupportedStreamConfig::new(
            2,
            SampleRate(48000),
            SupportedBufferSize::Unknown,
            cpal::SampleFormat::F64,
        );

        assert!(matches!(
            granted_config(&desired(), &supported),
            Err(Error::UnsupportedFormat)
        ));
    }
}
