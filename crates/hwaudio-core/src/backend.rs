//! Boundary between the driver and a platform audio library.

/// Sample encodings a platform device may run with.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum NativeFormat {
    U8,
    S8,
    U16,
    S16,
    S32,
    F32,
}

impl NativeFormat {
    pub fn sample_size(self) -> usize {
        match self {
            NativeFormat::U8 | NativeFormat::S8 => 1,
            NativeFormat::U16 | NativeFormat::S16 => 2,
            NativeFormat::S32 | NativeFormat::F32 => 4,
        }
    }

    /// Byte pattern of a silent sample.
    pub fn silence(self) -> u8 {
        match self {
            NativeFormat::U8 => 0x80,
            _ => 0,
        }
    }
}

/// Stream parameters, both as requested and as granted by the device.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DeviceSpec {
    pub format: NativeFormat,
    pub freq: u32,
    pub channels: u8,
    /// Frames per device buffer.
    pub samples: u16,
}

impl DeviceSpec {
    /// Whether `granted` runs with the same format, frequency and channel count.
    ///
    /// The buffer size is not compared, devices are free to pick their own.
    pub fn matches(&self, granted: &DeviceSpec) -> bool {
        self.format == granted.format
            && self.freq == granted.freq
            && self.channels == granted.channels
    }

    pub fn frame_size(&self) -> usize {
        self.format.sample_size() * usize::from(self.channels)
    }
}

/// Fills the interleaved output buffer of a device, in its native format.
///
/// Runs on a thread owned by the platform.
pub type OutCallback = Box<dyn FnMut(&mut [u8]) + Send + 'static>;

pub trait Backend: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;
    type Device: Device<Error = Self::Error>;

    /// Opens the default output device, paused.
    ///
    /// The backend may grant a spec other than `desired`; the granted one is
    /// reported by [`Device::spec`]. Without a callback the device plays
    /// silence. Dropping the device closes it.
    fn open_output_device(
        &self,
        desired: &DeviceSpec,
        callback: Option<OutCallback>,
    ) -> Result<Self::Device, Self::Error>;
}

pub trait Device: Send + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn spec(&self) -> DeviceSpec;

    fn set_paused(&self, paused: bool) -> Result<(), Self::Error>;
}
