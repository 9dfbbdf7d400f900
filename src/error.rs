use thiserror::Error;

/// Failures of the external pitch detector. None of these are fatal to the
/// tuner: they surface as `is_recording = false` and the caller may retry.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector used before initialize()")]
    NotInitialized,

    #[error("detector is already running")]
    AlreadyRunning,

    #[error("detector failed to start: {0}")]
    StartFailed(String),
}
