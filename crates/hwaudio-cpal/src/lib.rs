//! [`Backend`](hwaudio_core::backend::Backend) on top of cpal's default host.

mod error;
mod internal;

use hwaudio_core::backend::{self, DeviceSpec, OutCallback};

pub use crate::error::{Error, Result};
use crate::internal::{CpalThread, Handle, StreamId};

/// Owns the thread that talks to the platform audio host.
///
/// cpal streams can't leave the thread they were built on, so every device
/// lives there and is driven through messages.
pub struct CpalBackend {
    handle: Handle,
}

impl CpalBackend {
    pub fn new() -> Result<CpalBackend> {
        let (handle, receiver) = Handle::new();

        std::thread::Builder::new()
            .name("cpal-backend".into())
            .spawn(move || CpalThread::new().run(receiver))
            .map_err(Error::ThreadSpawn)?;

        Ok(CpalBackend { handle })
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        let _ = self.handle.terminate();
    }
}

impl backend::Backend for CpalBackend {
    type Error = Error;
    type Device = CpalDevice;

    fn open_output_device(
        &self,
        desired: &DeviceSpec,
        callback: Option<OutCallback>,
    ) -> Result<CpalDevice> {
        let (id, spec) = self.handle.open_out_device(*desired, callback)?;
        Ok(CpalDevice {
            id,
            spec,
            handle: self.handle.clone(),
        })
    }
}

pub struct CpalDevice {
    id: StreamId,
    spec: DeviceSpec,
    handle: Handle,
}

impl backend::Device for CpalDevice {
    type Error = Error;

    fn spec(&self) -> DeviceSpec {
        self.spec
    }

    fn set_paused(&self, paused: bool) -> Result<()> {
        self.handle.set_out_device_paused(self.id, paused)
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        let _ = self.handle.destroy_out_device(self.id);
    }
}
