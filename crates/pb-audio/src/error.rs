use thiserror::Error;

/// Errors originating from the audio module.
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio input device found.
    #[error("no audio input device found")]
    NoInputDevice,

    /// The requested input device does not exist.
    #[error("no input device matches '{0}'")]
    DeviceNotFound(String),

    /// Audio stream error.
    #[error("audio stream error: {0}")]
    StreamError(String),
}
