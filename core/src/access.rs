use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread::ThreadId;

/// Type of access performed on a monitored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    /// Returns true unless both accesses are reads
    pub fn conflicts_with(self, other: AccessKind) -> bool {
        !matches!((self, other), (AccessKind::Read, AccessKind::Read))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of an OS thread for the whole of its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadIdentity(ThreadId);

impl ThreadIdentity {
    /// Identity of the calling thread
    pub fn current() -> Self {
        Self(std::thread::current().id())
    }

    pub fn thread_id(self) -> ThreadId {
        self.0
    }
}

impl From<ThreadId> for ThreadIdentity {
    fn from(id: ThreadId) -> Self {
        Self(id)
    }
}

impl fmt::Display for ThreadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// One (thread, access kind) combination; the key of every clock table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessKey {
    thread: ThreadIdentity,
    kind: AccessKind,
}

impl AccessKey {
    pub fn new(thread: ThreadIdentity, kind: AccessKind) -> Self {
        Self { thread, kind }
    }

    /// Key for an access of `kind` by the calling thread
    pub fn current(kind: AccessKind) -> Self {
        Self::new(ThreadIdentity::current(), kind)
    }

    pub fn thread(&self) -> ThreadIdentity {
        self.thread
    }

    pub fn kind(&self) -> AccessKind {
        self.kind
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.thread, self.kind)
    }
}
