/*!
The one synchronization primitive the detector recognizes.

Entering a section on a value takes that value's lock and replaces the calling
thread's snapshot of the value with the authoritative clock table. Any access
made afterwards by this thread is judged against everything that happened
before the section began. The lock is re-entrant, so the block may freely read
and write the same value.

Coordination through anything else (channels, barriers, joins, other locks) is
invisible to the detector and still reported as a race.

```rust
use clockwatch_core::{synchronized, MonitoredValue};
use std::thread;

let balance = MonitoredValue::new(100);

thread::scope(|scope| {
    for _ in 0..4 {
        scope.spawn(|| {
            synchronized(&balance, || balance.update(|b| *b -= 10));
        });
    }
});

assert!(balance.racing_threads().is_empty());

// This thread never synchronized with the writers, so a bare read is flagged.
assert_eq!(balance.read(), 60);
assert_eq!(balance.race_count(), 1);

// Once it has synchronized, its reads are clean again.
let before = balance.race_count();
assert_eq!(synchronized(&balance, || balance.read()), 60);
assert_eq!(balance.read(), 60);
assert_eq!(balance.race_count(), before);
```
*/

use crate::context;
use crate::monitored::{MonitoredValue, StateGuard};
use std::ops::Deref;

/// Execute `block` while holding `value`'s lock with a synchronized view of it.
///
/// The lock is released on every exit path, including a panic unwinding out of
/// `block`.
pub fn synchronized<T, R>(value: &MonitoredValue<T>, block: impl FnOnce() -> R) -> R {
    value.synchronized(block)
}

/// RAII guard for a synchronized section.
///
/// While the guard is alive the value's lock is held by this thread. Dropping
/// the guard releases it.
pub struct SynchronizedSection<'a, T> {
    value: &'a MonitoredValue<T>,
    _guard: StateGuard<'a, T>,
}

impl<'a, T> SynchronizedSection<'a, T> {
    /// Lock `value` and publish its authoritative clock to the calling thread
    pub fn enter(value: &'a MonitoredValue<T>) -> Self {
        let guard = value.lock_state();
        let authoritative = guard.borrow().clock.clone();
        tracing::debug!(
            value = %value.id(),
            label = value.label().unwrap_or(""),
            entries = authoritative.len(),
            "entering synchronized section"
        );

        context::with_current(|thread| thread.replace(value.id(), authoritative));

        Self {
            value,
            _guard: guard,
        }
    }
}

impl<'a, T> Deref for SynchronizedSection<'a, T> {
    type Target = MonitoredValue<T>;

    fn deref(&self) -> &MonitoredValue<T> {
        self.value
    }
}

impl<'a, T> Drop for SynchronizedSection<'a, T> {
    fn drop(&mut self) {
        tracing::trace!(value = %self.value.id(), "leaving synchronized section");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessKey, AccessKind};
    use std::panic::{self, AssertUnwindSafe};
    use std::thread;

    #[test]
    fn test_section_publishes_full_clock() {
        let value = MonitoredValue::new(0);
        value.write(1);

        let snapshot = thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _section = SynchronizedSection::enter(&value);
                    context::snapshot_of(value.id()).unwrap()
                })
                .join()
                .unwrap()
        });

        assert_eq!(snapshot, value.clock());
    }

    #[test]
    fn test_block_may_reenter_value() {
        let value = MonitoredValue::new(10);
        let seen = synchronized(&value, || {
            value.write(11);
            value.update(|v| *v += 1);
            value.read()
        });
        assert_eq!(seen, 12);
    }

    #[test]
    fn test_guard_derefs_to_value() {
        let value = MonitoredValue::new(String::from("x"));
        let section = SynchronizedSection::enter(&value);
        section.write(String::from("y"));
        assert_eq!(section.read(), "y");
        drop(section);
        assert_eq!(value.race_count(), 0);
    }

    #[test]
    fn test_lock_released_after_panic() {
        let value = MonitoredValue::new(0);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            synchronized(&value, || {
                value.write(5);
                panic!("boom");
            })
        }));
        assert!(result.is_err());

        let observed = thread::scope(|scope| {
            scope
                .spawn(|| synchronized(&value, || value.read()))
                .join()
                .unwrap()
        });
        assert_eq!(observed, 5);
        assert_eq!(value.race_count(), 0);
    }

    #[test]
    fn test_nested_sections_on_same_value() {
        let value = MonitoredValue::new(0);
        value.write(1);

        let seen = thread::scope(|scope| {
            scope
                .spawn(|| {
                    synchronized(&value, || {
                        value.write(2);
                        synchronized(&value, || {
                            value.update(|v| *v += 1);
                            let _inner = SynchronizedSection::enter(&value);
                            value.read()
                        })
                    })
                })
                .join()
                .unwrap()
        });

        assert_eq!(seen, 3);
        assert_eq!(value.race_count(), 0);
    }

    #[test]
    fn test_unsynchronized_reader_after_synchronized_writers() {
        let value = MonitoredValue::new(100);
        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| synchronized(&value, || value.update(|v| *v -= 10)));
            }
        });
        assert!(value.racing_threads().is_empty());

        assert_eq!(value.read(), 60);
        assert_eq!(value.race_count(), 1);

        assert_eq!(synchronized(&value, || value.read()), 60);
        assert_eq!(value.read(), 60);
        assert_eq!(value.race_count(), 1);
    }

    #[test]
    fn test_section_replaces_rather_than_merges() {
        let value = MonitoredValue::new(0);
        let own_read = AccessKey::current(AccessKind::Read);

        value.read();
        // A stale entry the authoritative table will never contain.
        context::with_current(|thread| {
            let mut bogus = thread.snapshot(&value.id()).cloned().unwrap_or_default();
            bogus.set(own_read, 99);
            thread.replace(value.id(), bogus);
        });

        value.synchronized(|| ());
        let snapshot = context::snapshot_of(value.id()).unwrap();
        assert_eq!(snapshot.get(&own_read), Some(1));
    }
}
