use crate::access::{AccessKey, AccessKind};
use crate::monitored::{Conflict, ValueId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The earlier access the flagged thread had not synchronized with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictingAccess {
    pub thread: String,
    pub access: AccessKind,
    pub authoritative: u64,
    /// Counter the flagged thread last saw for this key, `None` if it never saw it
    pub observed: Option<u64>,
}

/// A single flagged access on a monitored value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceReport {
    pub id: Uuid,
    pub value_id: ValueId,
    pub label: Option<String>,
    pub thread: String,
    pub thread_name: Option<String>,
    pub access: AccessKind,
    pub conflicting: ConflictingAccess,
    pub timestamp: DateTime<Utc>,
}

impl RaceReport {
    /// Build a report for an access by the calling thread
    pub fn new(value_id: ValueId, label: Option<&str>, key: AccessKey, conflict: &Conflict) -> Self {
        Self {
            id: Uuid::new_v4(),
            value_id,
            label: label.map(str::to_owned),
            thread: key.thread().to_string(),
            thread_name: std::thread::current().name().map(str::to_owned),
            access: key.kind(),
            conflicting: ConflictingAccess {
                thread: conflict.key.thread().to_string(),
                access: conflict.key.kind(),
                authoritative: conflict.authoritative,
                observed: conflict.observed,
            },
            timestamp: Utc::now(),
        }
    }

    /// True if the thread had synchronized once but fell behind afterwards
    pub fn is_stale(&self) -> bool {
        self.conflicting.observed.is_some()
    }
}
