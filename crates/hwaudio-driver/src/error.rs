use std::fmt::Display;

use hwaudio_core::audio::SampleFormat;

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("unsupported sample format {0:?}")]
    UnsupportedSampleFormat(SampleFormat),

    #[error("input direction is not implemented")]
    InputNotImplemented,

    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: u64 },

    #[error("driver is disposed")]
    Disposed,

    #[error("backend error: {message}")]
    Backend { message: String },
}

impl Error {
    #[cold]
    pub fn new_backend<E: Display>(error: E) -> Error {
        Error::Backend {
            message: error.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
