use thiserror::Error;

/// Recoverable failures of the detector's own plumbing.
///
/// Detected races are not errors; they are recorded on the monitored value.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("race report buffer is full (capacity {capacity})")]
    CaptureFull { capacity: usize },

    #[error("race report channel is disconnected")]
    CaptureDisconnected,

    #[error("failed to spawn monitored thread: {0}")]
    Spawn(#[from] std::io::Error),
}
