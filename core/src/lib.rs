pub mod access;
pub mod capture;
pub mod clock;
pub mod config;
pub mod context;
pub mod detector;
pub mod error;
pub mod monitored;
pub mod report;
pub mod sync;

pub use access::{AccessKey, AccessKind, ThreadIdentity};
pub use capture::RaceCapture;
pub use clock::ClockTable;
pub use config::DetectorConfig;
pub use context::ThreadContext;
pub use detector::{Detector, ValueRaceStats};
pub use error::DetectorError;
pub use monitored::{Conflict, MonitoredValue, ValueId};
pub use report::{ConflictingAccess, RaceReport};
pub use sync::{synchronized, SynchronizedSection};
