use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use hwaudio_core::backend::{Backend, Device, DeviceSpec, OutCallback};
use parking_lot::Mutex;

#[derive(Debug, thiserror::Error)]
#[error("fake device unavailable")]
pub struct FakeError;

type Grant = Box<dyn Fn(&DeviceSpec) -> Option<DeviceSpec> + Send + Sync>;

/// Scripted backend that records every device it opens.
pub struct FakeBackend {
    state: Arc<FakeState>,
}

struct FakeState {
    grant: Mutex<Grant>,
    open_devices: AtomicUsize,
    opened_total: AtomicUsize,
    released: AtomicUsize,
    last_desired: Mutex<Option<DeviceSpec>>,
    last_device: Mutex<Weak<FakeDeviceShared>>,
}

impl FakeBackend {
    fn new(grant: Grant) -> FakeBackend {
        FakeBackend {
            state: Arc::new(FakeState {
                grant: Mutex::new(grant),
                open_devices: AtomicUsize::new(0),
                opened_total: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                last_desired: Mutex::new(None),
                last_device: Mutex::new(Weak::new()),
            }),
        }
    }

    pub fn exact() -> FakeBackend {
        FakeBackend::new(Box::new(|desired| Some(*desired)))
    }

    pub fn granting<F>(grant: F) -> FakeBackend
    where
        F: Fn(&DeviceSpec) -> DeviceSpec + Send + Sync + 'static,
    {
        FakeBackend::new(Box::new(move |desired| Some(grant(desired))))
    }

    pub fn failing() -> FakeBackend {
        FakeBackend::new(Box::new(|_| None))
    }

    pub fn probe(&self) -> Probe {
        Probe {
            state: self.state.clone(),
        }
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl Backend for FakeBackend {
    type Error = FakeError;
    type Device = FakeDevice;

    fn open_output_device(
        &self,
        desired: &DeviceSpec,
        callback: Option<OutCallback>,
    ) -> Result<FakeDevice, FakeError> {
        *self.state.last_desired.lock() = Some(*desired);

        let spec = {
            let grant = self.state.grant.lock();
            (*grant)(desired).ok_or(FakeError)?
        };

        self.state.open_devices.fetch_add(1, Ordering::SeqCst);
        self.state.opened_total.fetch_add(1, Ordering::SeqCst);

        let shared = Arc::new(FakeDeviceShared {
            spec,
            paused: AtomicBool::new(true),
            callback: Mutex::new(callback),
        });

        *self.state.last_device.lock() = Arc::downgrade(&shared);

        Ok(FakeDevice {
            shared,
            state: self.state.clone(),
        })
    }
}

struct FakeDeviceShared {
    spec: DeviceSpec,
    paused: AtomicBool,
    callback: Mutex<Option<OutCallback>>,
}

pub struct FakeDevice {
    shared: Arc<FakeDeviceShared>,
    state: Arc<FakeState>,
}

impl Device for FakeDevice {
    type Error = FakeError;

    fn spec(&self) -> DeviceSpec {
        self.shared.spec
    }

    fn set_paused(&self, paused: bool) -> Result<(), FakeError> {
        self.shared.paused.store(paused, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.state.open_devices.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Observes a [`FakeBackend`] after it has been handed to a driver.
#[derive(Clone)]
pub struct Probe {
    state: Arc<FakeState>,
}

impl Probe {
    pub fn open_devices(&self) -> usize {
        self.state.open_devices.load(Ordering::SeqCst)
    }

    pub fn opened_total(&self) -> usize {
        self.state.opened_total.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    pub fn last_desired(&self) -> Option<DeviceSpec> {
        *self.state.last_desired.lock()
    }

    pub fn set_failing(&self) {
        *self.state.grant.lock() = Box::new(|_| None);
    }

    /// Whether the most recently opened device is alive and paused.
    pub fn last_device_paused(&self) -> Option<bool> {
        let device = self.state.last_device.lock().upgrade()?;
        Some(device.paused.load(Ordering::SeqCst))
    }

    /// Runs the callback of the most recently opened device over `len` bytes.
    ///
    /// The buffer starts out filled with `0xAA` so untouched bytes stand out.
    pub fn render(&self, len: usize) -> Option<Vec<u8>> {
        let device = self.state.last_device.lock().upgrade()?;
        let mut callback = device.callback.lock();
        let callback = callback.as_mut()?;

        let mut buffer = vec![0xAA; len];
        callback(&mut buffer);
        Some(buffer)
    }
}
