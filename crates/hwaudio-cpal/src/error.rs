use std::io;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to spawn thread")]
    ThreadSpawn(#[source] io::Error),

    #[error("thread crashed")]
    ThreadCrashed,

    #[error("invalid stream ID")]
    InvalidStreamId,

    #[error("no default output device")]
    NoDefaultDevice,

    #[error("device runs with an unsupported format")]
    UnsupportedFormat,

    #[error(transparent)]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error(transparent)]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error(transparent)]
    PauseStream(#[from] cpal::PauseStreamError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
