use crate::access::{AccessKey, ThreadIdentity};
use crate::clock::ClockTable;
use crate::error::DetectorError;
use crate::monitored::ValueId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::thread::{self, JoinHandle, Scope, ScopedJoinHandle};

thread_local! {
    static THREAD_CONTEXT: RefCell<Option<ThreadContext>> = const { RefCell::new(None) };
}

/// What one thread has observed of every monitored value it touched.
///
/// Only the owning thread ever reads or writes its context, so the snapshots
/// need no locking of their own.
#[derive(Debug)]
pub struct ThreadContext {
    identity: ThreadIdentity,
    name: Option<String>,
    snapshots: HashMap<ValueId, ClockTable>,
}

impl ThreadContext {
    pub fn new(identity: ThreadIdentity, name: Option<String>) -> Self {
        Self {
            identity,
            name,
            snapshots: HashMap::new(),
        }
    }

    pub fn for_current_thread() -> Self {
        let current = thread::current();
        Self::new(
            ThreadIdentity::from(current.id()),
            current.name().map(str::to_owned),
        )
    }

    pub fn identity(&self) -> ThreadIdentity {
        self.identity
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Store this thread's own latest counter for `key`
    pub fn record(&mut self, value: ValueId, key: AccessKey, counter: u64) {
        self.snapshots.entry(value).or_default().set(key, counter);
    }

    /// Replace the whole snapshot for `value` with the authoritative table
    pub fn replace(&mut self, value: ValueId, authoritative: ClockTable) {
        self.snapshots.insert(value, authoritative);
    }

    pub fn snapshot(&self, value: &ValueId) -> Option<&ClockTable> {
        self.snapshots.get(value)
    }

    pub fn forget(&mut self, value: &ValueId) -> Option<ClockTable> {
        self.snapshots.remove(value)
    }

    /// Number of monitored values this thread holds a snapshot for
    pub fn tracked_values(&self) -> usize {
        self.snapshots.len()
    }
}

/// Run `f` against the calling thread's context, attaching one on first use.
///
/// `f` must not call back into this function.
pub fn with_current<R>(f: impl FnOnce(&mut ThreadContext) -> R) -> R {
    THREAD_CONTEXT.with(|slot| {
        let mut slot = slot.borrow_mut();
        let context = slot.get_or_insert_with(|| {
            let context = ThreadContext::for_current_thread();
            tracing::debug!(
                thread = %context.identity(),
                name = context.name().unwrap_or("<unnamed>"),
                "attached thread context"
            );
            context
        });
        f(context)
    })
}

/// Install `context` for the calling thread, returning whatever was there before
pub fn attach(context: ThreadContext) -> Option<ThreadContext> {
    tracing::debug!(
        thread = %context.identity(),
        name = context.name().unwrap_or("<unnamed>"),
        "attached thread context"
    );
    THREAD_CONTEXT.with(|slot| slot.borrow_mut().replace(context))
}

/// Copy of the calling thread's snapshot for `value`, if it has one
pub fn snapshot_of(value: ValueId) -> Option<ClockTable> {
    THREAD_CONTEXT.with(|slot| {
        slot.borrow()
            .as_ref()
            .and_then(|context| context.snapshot(&value).cloned())
    })
}

/// Spawn a named thread that starts with a fresh context bound to it
pub fn spawn<F, T>(name: impl Into<String>, f: F) -> Result<JoinHandle<T>, DetectorError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let name = name.into();
    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            attach(ThreadContext::new(ThreadIdentity::current(), Some(name)));
            f()
        })?;
    Ok(handle)
}

/// Scoped variant of [`spawn`]
pub fn spawn_scoped<'scope, 'env, F, T>(
    scope: &'scope Scope<'scope, 'env>,
    name: impl Into<String>,
    f: F,
) -> Result<ScopedJoinHandle<'scope, T>, DetectorError>
where
    F: FnOnce() -> T + Send + 'scope,
    T: Send + 'scope,
{
    let name = name.into();
    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn_scoped(scope, move || {
            attach(ThreadContext::new(ThreadIdentity::current(), Some(name)));
            f()
        })?;
    Ok(handle)
}
