use crate::error::DetectorError;
use crate::report::RaceReport;
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

/// Bounded, lock-free queue of race reports
pub struct RaceCapture {
    sender: Sender<RaceReport>,
    receiver: Receiver<RaceReport>,
    capacity: usize,
}

impl RaceCapture {
    pub fn new(buffer_size: usize) -> Self {
        let (sender, receiver) = bounded(buffer_size);
        Self {
            sender,
            receiver,
            capacity: buffer_size,
        }
    }

    /// Capture a report (non-blocking)
    pub fn capture(&self, report: RaceReport) -> Result<(), DetectorError> {
        self.sender.try_send(report).map_err(|e| match e {
            TrySendError::Full(_) => DetectorError::CaptureFull {
                capacity: self.capacity,
            },
            TrySendError::Disconnected(_) => DetectorError::CaptureDisconnected,
        })
    }

    /// Get a receiver for consuming reports as they arrive
    pub fn receiver(&self) -> Receiver<RaceReport> {
        self.receiver.clone()
    }

    /// Drain all pending reports
    pub fn drain(&self) -> Vec<RaceReport> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
