use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use hwaudio_core::audio::{Direction, SampleFormat, TARGET_SAMPLE_COUNT};
use hwaudio_core::backend::{Backend, OutCallback};
use hwaudio_core::collections::DashMap;
use hwaudio_core::sync::Event;
use parking_lot::RwLock;
use tracing::instrument;

use crate::negotiator;
use crate::session::{HardwareDeviceSession, SessionCore, SessionId, SessionParams};
use crate::{DriverConfig, Error, Result};

/// Owns the output sessions opened on a backend and the events they share.
///
/// The pause event starts set (playback allowed) and the update-required
/// event starts unset. Dropping the driver disposes it.
pub struct HardwareDeviceDriver<B: Backend> {
    inner: Arc<DriverInner<B>>,
}

pub(crate) struct DriverInner<B: Backend> {
    backend: RwLock<Option<B>>,
    config: DriverConfig,
    sessions: DashMap<SessionId, Arc<SessionCore<B>>>,
    session_counter: AtomicU64,
    pause_event: Event,
    update_required_event: Event,
    disposed: AtomicBool,
}

impl<B: Backend> HardwareDeviceDriver<B> {
    pub fn new(backend: B) -> HardwareDeviceDriver<B> {
        HardwareDeviceDriver::with_config(backend, DriverConfig::default())
    }

    pub fn with_config(backend: B, config: DriverConfig) -> HardwareDeviceDriver<B> {
        HardwareDeviceDriver {
            inner: Arc::new(DriverInner {
                backend: RwLock::new(Some(backend)),
                config,
                sessions: DashMap::default(),
                session_counter: AtomicU64::new(0),
                pause_event: Event::new(true),
                update_required_event: Event::new(false),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Checks whether `backend` can open an output stream at all.
    pub fn is_supported(backend: &B) -> bool {
        negotiator::is_supported(backend)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    /// Set while sessions may produce audio.
    pub fn pause_event(&self) -> &Event {
        &self.inner.pause_event
    }

    /// Set when sessions have something for their owner to re-evaluate.
    ///
    /// The driver never resets it; that is up to whoever consumes it.
    pub fn update_required_event(&self) -> &Event {
        &self.inner.update_required_event
    }

    pub fn pause(&self) {
        self.inner.pause_event.reset();
    }

    pub fn resume(&self) {
        self.inner.pause_event.set();
    }

    pub fn is_paused(&self) -> bool {
        !self.inner.pause_event.is_set()
    }

    /// Opens a session and registers it with the driver.
    ///
    /// A zero `sample_rate` or `channel_count` is replaced with the configured
    /// default. Only [`Direction::Output`] is implemented.
    #[instrument(skip(self, memory_manager))]
    pub fn open_device_session<M>(
        &self,
        direction: Direction,
        memory_manager: M,
        sample_format: SampleFormat,
        sample_rate: u32,
        channel_count: u32,
    ) -> Result<HardwareDeviceSession<B, M>> {
        let (sample_rate, channel_count) = self.inner.config.resolve(sample_rate, channel_count);

        if direction != Direction::Output {
            return Err(Error::InputNotImplemented);
        }

        if channel_count == 0 {
            return Err(Error::InvalidParameter {
                name: "channel count",
                value: 0,
            });
        }

        let spec = negotiator::desired_spec(
            sample_format,
            sample_rate,
            channel_count,
            TARGET_SAMPLE_COUNT,
        )?;

        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed);
        }

        let id = SessionId::from(self.inner.session_counter.fetch_add(1, Ordering::Relaxed));

        let core = Arc::new(SessionCore::new(
            Arc::downgrade(&self.inner),
            SessionParams {
                id,
                sample_format,
                spec,
                sample_rate,
                channel_count,
                pause_event: self.inner.pause_event.clone(),
                update_required_event: self.inner.update_required_event.clone(),
            },
        ));

        self.inner.sessions.insert(id, core.clone());

        // A concurrent dispose may have taken its snapshot before the insert.
        if self.inner.disposed.load(Ordering::Acquire) {
            core.dispose();
            return Err(Error::Disposed);
        }

        tracing::debug!(session = ?id, "opened device session");

        Ok(HardwareDeviceSession::new(core, memory_manager))
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn is_registered(&self, id: SessionId) -> bool {
        self.inner.sessions.contains_key(&id)
    }

    pub fn supports_sample_rate(&self, _sample_rate: u32) -> bool {
        true
    }

    pub fn supports_sample_format(&self, sample_format: SampleFormat) -> bool {
        sample_format != SampleFormat::PcmInt24
    }

    pub fn supports_channel_count(&self, _channel_count: u32) -> bool {
        true
    }

    pub fn supports_direction(&self, direction: Direction) -> bool {
        direction == Direction::Output
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Disposes every registered session, then releases the backend.
    ///
    /// Calling it again is a no-op.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl<B: Backend> Drop for HardwareDeviceDriver<B> {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl<B: Backend> DriverInner<B> {
    pub fn open_stream(
        &self,
        sample_format: SampleFormat,
        sample_rate: u32,
        channel_count: u32,
        sample_count: u32,
        callback: Option<OutCallback>,
    ) -> Result<Option<B::Device>> {
        let backend = self.backend.read();
        let backend = backend.as_ref().ok_or(Error::Disposed)?;

        negotiator::open_stream(
            backend,
            sample_format,
            sample_rate,
            channel_count,
            sample_count,
            callback,
        )
    }

    /// Removes a session from the registry.
    ///
    /// Returns `false` if the session was not registered.
    pub fn unregister(&self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    #[instrument(skip(self))]
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let sessions = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();

        tracing::debug!(count = sessions.len(), "disposing sessions");

        for session in sessions {
            session.dispose();
        }

        drop(self.backend.write().take());

        self.pause_event.close();
    }
}
