//! The monitored value wrapper and its race predicate.
//!
//! Every access runs under the value's re-entrant lock and goes through
//! [`MonitoredValue::record_and_check`]:
//!
//! 1. bump the authoritative counter for `(current thread, kind)`
//! 2. copy the new counter into the calling thread's snapshot for this value
//! 3. compare the authoritative table against that snapshot
//! 4. flag the thread if any conflicting entry is missing or stale
//!
//! Races are attributed to the later thread only. The first unsynchronized
//! writer in a chain had no way of knowing that a conflicting access would
//! follow, so it is never flagged itself.

use crate::access::{AccessKey, AccessKind, ThreadIdentity};
use crate::clock::ClockTable;
use crate::context;
use crate::detector::RaceSink;
use crate::report::RaceReport;
use crate::sync::SynchronizedSection;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use serde::{Deserialize, Serialize};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Process-wide unique identity of a monitored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(Uuid);

impl ValueId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// First clock entry a thread's snapshot has not caught up with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    pub key: AccessKey,
    pub authoritative: u64,
    pub observed: Option<u64>,
}

pub(crate) struct ValueState<T> {
    pub(crate) payload: T,
    pub(crate) clock: ClockTable,
    pub(crate) racing_threads: HashSet<ThreadIdentity>,
}

pub(crate) type StateGuard<'a, T> = ReentrantMutexGuard<'a, RefCell<ValueState<T>>>;

/// A value whose accesses are checked for data races.
///
/// Reads and writes are serialized by a per-value lock, so the payload itself
/// is never corrupted. What the detector reports is whether two threads touched
/// the value without ordering their accesses through [`synchronized`].
///
/// Closures passed to [`read_with`](Self::read_with) and
/// [`update`](Self::update) must not access the same value again.
///
/// [`synchronized`]: crate::synchronized
pub struct MonitoredValue<T> {
    id: ValueId,
    label: Option<String>,
    detection_enabled: bool,
    sink: Option<Arc<RaceSink>>,
    state: ReentrantMutex<RefCell<ValueState<T>>>,
}

impl<T> MonitoredValue<T> {
    /// Wrap `payload` with detection enabled and no report sink
    pub fn new(payload: T) -> Self {
        Self::with_options(payload, None, true, None)
    }

    pub(crate) fn with_options(
        payload: T,
        label: Option<String>,
        detection_enabled: bool,
        sink: Option<Arc<RaceSink>>,
    ) -> Self {
        let id = ValueId::generate();
        tracing::debug!(
            value = %id,
            label = label.as_deref().unwrap_or(""),
            detection_enabled,
            "monitoring new value"
        );

        Self {
            id,
            label,
            detection_enabled,
            sink,
            state: ReentrantMutex::new(RefCell::new(ValueState {
                payload,
                clock: ClockTable::new(),
                racing_threads: HashSet::new(),
            })),
        }
    }

    pub fn id(&self) -> ValueId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Read the payload
    pub fn read(&self) -> T
    where
        T: Clone,
    {
        self.read_with(|payload| payload.clone())
    }

    /// Inspect the payload in place, recorded as a read
    pub fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.lock_state();
        let mut state = self.state_mut(&guard);
        self.record_and_check(&mut state, AccessKind::Read);
        f(&state.payload)
    }

    /// Replace the payload
    pub fn write(&self, payload: T) {
        self.update(|current| *current = payload);
    }

    /// Replace the payload and hand back the previous one, recorded as one write
    pub fn replace(&self, payload: T) -> T {
        self.update(|current| std::mem::replace(current, payload))
    }

    /// Mutate the payload in place, recorded as one write
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let guard = self.lock_state();
        let mut state = self.state_mut(&guard);
        self.record_and_check(&mut state, AccessKind::Write);
        f(&mut state.payload)
    }

    /// Run `block` with this thread's view of the value synchronized.
    ///
    /// See [`crate::synchronized`].
    pub fn synchronized<R>(&self, block: impl FnOnce() -> R) -> R {
        let _section = SynchronizedSection::enter(self);
        block()
    }

    /// Threads flagged as racing so far. Never shrinks.
    pub fn racing_threads(&self) -> HashSet<ThreadIdentity> {
        self.state_ref(&self.lock_state()).racing_threads.clone()
    }

    pub fn race_count(&self) -> usize {
        self.state_ref(&self.lock_state()).racing_threads.len()
    }

    pub fn is_racing(&self, thread: ThreadIdentity) -> bool {
        self.state_ref(&self.lock_state()).racing_threads.contains(&thread)
    }

    /// Copy of the authoritative clock table
    pub fn clock(&self) -> ClockTable {
        self.state_ref(&self.lock_state()).clock.clone()
    }

    pub fn into_inner(self) -> T {
        self.state.into_inner().into_inner().payload
    }

    pub(crate) fn lock_state(&self) -> StateGuard<'_, T> {
        self.state.lock()
    }

    fn state_mut<'g>(&self, guard: &'g StateGuard<'_, T>) -> RefMut<'g, ValueState<T>> {
        match guard.try_borrow_mut() {
            Ok(state) => state,
            Err(_) => reentrant_access(self.id),
        }
    }

    fn state_ref<'g>(&self, guard: &'g StateGuard<'_, T>) -> Ref<'g, ValueState<T>> {
        match guard.try_borrow() {
            Ok(state) => state,
            Err(_) => reentrant_access(self.id),
        }
    }

    fn record_and_check(&self, state: &mut ValueState<T>, kind: AccessKind) {
        if !self.detection_enabled {
            return;
        }

        let key = AccessKey::current(kind);
        let counter = state.clock.increment(key);
        tracing::trace!(value = %self.id, key = %key, counter, "recorded access");

        let authoritative = &state.clock;
        let conflict = context::with_current(|thread| {
            thread.record(self.id, key, counter);
            let Some(snapshot) = thread.snapshot(&self.id) else {
                missing_snapshot(self.id, key)
            };
            find_conflict(authoritative, snapshot, kind)
        });

        if let Some(conflict) = conflict {
            state.racing_threads.insert(key.thread());
            self.flag(key, &conflict);
        }
    }

    fn flag(&self, key: AccessKey, conflict: &Conflict) {
        tracing::warn!(
            value = %self.id,
            label = self.label.as_deref().unwrap_or(""),
            thread = %key.thread(),
            access = %key.kind(),
            conflicting = %conflict.key,
            authoritative = conflict.authoritative,
            observed = ?conflict.observed,
            "data race detected"
        );

        if let Some(sink) = &self.sink {
            sink.record_race(RaceReport::new(self.id, self.label(), key, conflict));
        }
    }
}

impl<T> fmt::Debug for MonitoredValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("MonitoredValue");
        d.field("id", &self.id).field("label", &self.label);
        match self.state.try_lock() {
            Some(guard) => match guard.try_borrow() {
                Ok(state) => {
                    d.field("clock_entries", &state.clock.len())
                        .field("racing_threads", &state.racing_threads.len());
                }
                Err(_) => {
                    d.field("state", &format_args!("<borrowed>"));
                }
            },
            None => {
                d.field("state", &format_args!("<locked>"));
            }
        }
        d.finish_non_exhaustive()
    }
}

/// Race predicate: scan the authoritative table for an entry that conflicts with
/// an access of `kind` and that the snapshot is missing or holds a different
/// counter for.
pub(crate) fn find_conflict(
    authoritative: &ClockTable,
    snapshot: &ClockTable,
    kind: AccessKind,
) -> Option<Conflict> {
    authoritative.iter().find_map(|(key, counter)| {
        if !kind.conflicts_with(key.kind()) {
            return None;
        }
        match snapshot.get(key) {
            Some(observed) if observed == counter => None,
            observed => Some(Conflict {
                key: *key,
                authoritative: counter,
                observed,
            }),
        }
    })
}

/// A `read_with`/`update` closure reached back into the value it was handed.
#[cold]
fn reentrant_access(value: ValueId) -> ! {
    tracing::error!(value = %value, "monitored value accessed from inside its own access closure");
    panic!(
        "monitored value {value} accessed again from inside its own read_with/update closure; \
         copy what you need out of the closure first"
    );
}

/// The bookkeeping step always writes the snapshot before the predicate runs.
/// Reaching this means the detector itself is broken.
#[cold]
fn missing_snapshot(value: ValueId, key: AccessKey) -> ! {
    tracing::error!(value = %value, key = %key, "race predicate ran without a thread snapshot");
    panic!("clockwatch invariant violated: no snapshot of value {value} for {key}");
}
