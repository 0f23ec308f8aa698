use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use hwaudio_core::audio::{SampleFormat, TARGET_SAMPLE_COUNT};
use hwaudio_core::backend::{Backend, Device as _, DeviceSpec, NativeFormat, OutCallback};
use hwaudio_core::sync::Event;
use parking_lot::Mutex;

use crate::driver::DriverInner;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl From<u64> for SessionId {
    fn from(v: u64) -> SessionId {
        SessionId(v)
    }
}

/// Interleaved PCM data in the session's sample format.
#[derive(Debug, Clone, Default)]
pub struct AudioBuffer {
    /// Caller-chosen identifier, see [`HardwareDeviceSession::was_buffer_fully_consumed`].
    pub tag: u64,
    pub data: Vec<u8>,
}

/// Output stream opened through a [`HardwareDeviceDriver`](crate::HardwareDeviceDriver).
///
/// The device stream is negotiated when the first buffer is queued. Dropping
/// the session disposes it.
pub struct HardwareDeviceSession<B: Backend, M> {
    core: Arc<SessionCore<B>>,
    memory_manager: M,
}

impl<B: Backend, M> HardwareDeviceSession<B, M> {
    pub(crate) fn new(core: Arc<SessionCore<B>>, memory_manager: M) -> Self {
        HardwareDeviceSession {
            core,
            memory_manager,
        }
    }

    pub fn id(&self) -> SessionId {
        self.core.id
    }

    pub fn memory_manager(&self) -> &M {
        &self.memory_manager
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.core.sample_format
    }

    pub fn sample_rate(&self) -> u32 {
        self.core.sample_rate
    }

    pub fn channel_count(&self) -> u32 {
        self.core.channel_count
    }

    pub fn start(&self) -> Result<()> {
        self.core.set_started(true)
    }

    pub fn stop(&self) -> Result<()> {
        self.core.set_started(false)
    }

    pub fn is_started(&self) -> bool {
        self.core.stream.lock().started
    }

    pub fn queue_buffer(&self, buffer: AudioBuffer) -> Result<()> {
        self.core.queue_buffer(buffer)
    }

    /// Whether the buffer with `tag` is no longer waiting to be played.
    pub fn was_buffer_fully_consumed(&self, tag: u64) -> bool {
        let queue = self.core.playback.queue.lock();
        !queue.buffers.iter().any(|b| b.tag == tag)
    }

    pub fn queued_buffer_count(&self) -> usize {
        self.core.playback.queue.lock().buffers.len()
    }

    pub fn played_sample_count(&self) -> u64 {
        self.core.playback.played_samples.load(Ordering::Acquire)
    }

    pub fn volume(&self) -> f32 {
        self.core.playback.volume()
    }

    pub fn set_volume(&self, volume: f32) {
        self.core.playback.set_volume(volume);
    }

    /// Whether a device stream is currently open.
    pub fn has_stream(&self) -> bool {
        self.core.stream.lock().device.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Closes the device stream and unregisters from the driver.
    pub fn dispose(&self) {
        self.core.dispose();
    }
}

impl<B: Backend, M> Drop for HardwareDeviceSession<B, M> {
    fn drop(&mut self) {
        self.core.dispose();
    }
}

pub(crate) struct SessionCore<B: Backend> {
    id: SessionId,
    driver: Weak<DriverInner<B>>,
    sample_format: SampleFormat,
    sample_rate: u32,
    channel_count: u32,
    playback: Arc<Playback>,
    stream: Mutex<StreamState<B::Device>>,
    disposed: AtomicBool,
}

struct StreamState<D> {
    device: Option<D>,
    sample_count: u32,
    started: bool,
}

pub(crate) struct SessionParams {
    pub id: SessionId,
    pub sample_format: SampleFormat,
    pub spec: DeviceSpec,
    pub sample_rate: u32,
    pub channel_count: u32,
    pub pause_event: Event,
    pub update_required_event: Event,
}

impl<B: Backend> SessionCore<B> {
    pub fn new(driver: Weak<DriverInner<B>>, params: SessionParams) -> SessionCore<B> {
        SessionCore {
            id: params.id,
            driver,
            sample_format: params.sample_format,
            sample_rate: params.sample_rate,
            channel_count: params.channel_count,
            playback: Arc::new(Playback {
                format: params.spec.format,
                frame_size: params.spec.frame_size(),
                pause_event: params.pause_event,
                update_required_event: params.update_required_event,
                volume: AtomicU32::new(1.0f32.to_bits()),
                played_samples: AtomicU64::new(0),
                queue: Mutex::new(Queue::default()),
            }),
            stream: Mutex::new(StreamState {
                device: None,
                sample_count: 0,
                started: false,
            }),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn set_started(&self, started: bool) -> Result<()> {
        let mut stream = self.stream.lock();

        // Checked under the lock, dispose sets the flag before taking it.
        if self.is_disposed() {
            return Err(Error::Disposed);
        }

        if stream.started == started {
            return Ok(());
        }

        if let Some(device) = &stream.device {
            device.set_paused(!started).map_err(Error::new_backend)?;
        }

        stream.started = started;
        Ok(())
    }

    fn queue_buffer(&self, buffer: AudioBuffer) -> Result<()> {
        let sample_count = buffer.data.len() / self.playback.frame_size;

        let mut stream = self.stream.lock();
        if self.is_disposed() {
            return Err(Error::Disposed);
        }

        self.ensure_stream(
            &mut stream,
            u32::try_from(sample_count).unwrap_or(u32::MAX),
        )?;

        if stream.device.is_some() && sample_count > 0 {
            let mut queue = self.playback.queue.lock();
            queue.buffers.push_back(QueuedBuffer {
                tag: buffer.tag,
                sample_count: sample_count as u64,
                played: 0,
            });
            let len = sample_count * self.playback.frame_size;
            queue.data.extend(&buffer.data[..len]);
        } else {
            self.playback
                .played_samples
                .fetch_add(sample_count as u64, Ordering::AcqRel);
            self.playback.update_required_event.set();
        }

        Ok(())
    }

    /// Opens a device stream if there is none, or reopens it with a smaller
    /// buffer when the caller starts queueing smaller buffers.
    fn ensure_stream(
        &self,
        stream: &mut StreamState<B::Device>,
        buffer_sample_count: u32,
    ) -> Result<()> {
        let needs_setup = stream.device.is_none()
            || (buffer_sample_count >= TARGET_SAMPLE_COUNT
                && buffer_sample_count < stream.sample_count);

        if !needs_setup {
            return Ok(());
        }

        let sample_count = buffer_sample_count
            .max(TARGET_SAMPLE_COUNT)
            .min(u32::from(u16::MAX));

        let driver = self.driver.upgrade().ok_or(Error::Disposed)?;

        let playback = self.playback.clone();
        let callback: OutCallback = Box::new(move |out| playback.render(out));

        let device = driver.open_stream(
            self.sample_format,
            self.sample_rate,
            self.channel_count,
            sample_count,
            Some(callback),
        )?;

        let Some(device) = device else {
            tracing::error!(
                session = ?self.id,
                sample_count,
                "failed to open an audio stream, buffers will be dropped"
            );
            return Ok(());
        };

        if let Err(error) = device.set_paused(!stream.started) {
            tracing::error!(?error, session = ?self.id, "failed to set stream state");
        }

        stream.device = Some(device);
        stream.sample_count = sample_count;

        tracing::info!(session = ?self.id, sample_count, "new audio stream setup");

        Ok(())
    }

    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let device = self.stream.lock().device.take();
        drop(device);

        self.playback.queue.lock().clear();

        if let Some(driver) = self.driver.upgrade() {
            driver.unregister(self.id);
        }
    }
}

/// Playback state shared with the audio callback.
struct Playback {
    format: NativeFormat,
    frame_size: usize,
    pause_event: Event,
    update_required_event: Event,
    volume: AtomicU32,
    played_samples: AtomicU64,
    queue: Mutex<Queue>,
}

#[derive(Default)]
struct Queue {
    data: VecDeque<u8>,
    buffers: VecDeque<QueuedBuffer>,
}

impl Queue {
    fn clear(&mut self) {
        self.data.clear();
        self.buffers.clear();
    }
}

struct QueuedBuffer {
    tag: u64,
    sample_count: u64,
    played: u64,
}

impl Playback {
    fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    fn set_volume(&self, volume: f32) {
        let volume = if volume.is_finite() {
            volume.max(0.0)
        } else {
            0.0
        };

        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn render(&self, out: &mut [u8]) {
        let silence = self.format.silence();

        if !self.pause_event.is_set() {
            out.fill(silence);
            return;
        }

        let mut queue = self.queue.lock();

        let max_frames = out.len() / self.frame_size;
        let frames = max_frames.min(queue.data.len() / self.frame_size);
        let len = frames * self.frame_size;

        for (dst, src) in out[..len].iter_mut().zip(queue.data.drain(..len)) {
            *dst = src;
        }

        out[len..].fill(silence);

        if frames == 0 {
            return;
        }

        apply_volume(self.format, &mut out[..len], self.volume());

        let mut remaining = frames as u64;
        let mut retired = false;

        while remaining > 0 {
            let Some(buffer) = queue.buffers.front_mut() else {
                break;
            };

            let played = (buffer.sample_count - buffer.played).min(remaining);
            buffer.played += played;
            remaining -= played;

            self.played_samples.fetch_add(played, Ordering::AcqRel);

            if buffer.played == buffer.sample_count {
                queue.buffers.pop_front();
                retired = true;
            }
        }

        drop(queue);

        if retired {
            self.update_required_event.set();
        }
    }
}

fn apply_volume(format: NativeFormat, data: &mut [u8], volume: f32) {
    if volume == 1.0 {
        return;
    }

    match format {
        NativeFormat::U8 => {
            for byte in data {
                let v = (f32::from(*byte) - 128.0) * volume + 128.0;
                *byte = v.round().clamp(0.0, 255.0) as u8;
            }
        }
        NativeFormat::S8 => {
            for byte in data {
                let v = f32::from(*byte as i8) * volume;
                *byte = v.round().clamp(-128.0, 127.0) as i8 as u8;
            }
        }
        NativeFormat::U16 => {
            for chunk in data.chunks_exact_mut(2) {
                let s = u16::from_ne_bytes([chunk[0], chunk[1]]);
                let v = (f32::from(s) - 32768.0) * volume + 32768.0;
                let v = v.round().clamp(0.0, 65535.0) as u16;
                chunk.copy_from_slice(&v.to_ne_bytes());
            }
        }
        NativeFormat::S16 => {
            for chunk in data.chunks_exact_mut(2) {
                let s = i16::from_ne_bytes([chunk[0], chunk[1]]);
                let v = (f32::from(s) * volume).round().clamp(-32768.0, 32767.0) as i16;
                chunk.copy_from_slice(&v.to_ne_bytes());
            }
        }
        NativeFormat::S32 => {
            for chunk in data.chunks_exact_mut(4) {
                let s = i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let v = (f64::from(s) * f64::from(volume))
                    .round()
                    .clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
                chunk.copy_from_slice(&v.to_ne_bytes());
            }
        }
        NativeFormat::F32 => {
            for chunk in data.chunks_exact_mut(4) {
                let s = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                chunk.copy_from_slice(&(s * volume).to_ne_bytes());
            }
        }
    }
}
