//! Error type shared by the sound wrapper and its host bindings.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SoundError>;

/// Everything that can go wrong between a sound and the host audio subsystem.
///
/// Cloneable so one load outcome can be handed to every queued load callback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SoundError {
    /// The asset request finished with a status other than 200 (or 0).
    #[error("Sound could not be loaded: {uri} answered with status {status}")]
    Status { uri: String, status: u16 },

    /// The request itself failed before a response was available.
    #[error("Sound could not be loaded: {0}")]
    Fetch(String),

    /// The host refused to decode the downloaded bytes.
    #[error("decode audio failed: {0}")]
    Decode(String),

    /// A previous load failed; the sound will not download again until
    /// `load` is called explicitly.
    #[error("sound {0} failed to load earlier")]
    Unavailable(String),

    /// The host audio graph rejected an operation (node creation, ramp, start...).
    #[error("Audio graph error: {0}")]
    Graph(String),

    /// Browser globals (window, audio context) are missing.
    #[error("Host unavailable: {0}")]
    Host(String),

    /// Invalid settings passed at the JavaScript boundary.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for SoundError {
    fn from(err: serde_json::Error) -> Self {
        SoundError::Config(err.to_string())
    }
}
