//! # Concurrency
//!
//! Two mechanisms keep the occupancy counter honest under concurrent
//! commands:
//!
//! - [`ClassLocks`] serializes read-check-commit sequences per class.
//!   Multi-class commands lock in ascending `ClassId` order, so two
//!   opposite-direction transfers can never deadlock.
//! - [`retry_on_conflict`] re-runs a command whose commit lost a
//!   compare-and-swap race (for example the same student being assigned to
//!   two different classes at once).

use crate::primitives::MAX_CONFLICT_RETRIES;
use crate::{ClassId, RombelError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// =============================================================================
// CLASS LOCKS
// =============================================================================

/// Lock table with one mutex per class.
///
/// Entries are created lazily and never removed; class ids are never reused,
/// so the table is bounded by the number of classes ever created.
#[derive(Debug, Default)]
pub struct ClassLocks {
    table: Mutex<BTreeMap<ClassId, Arc<Mutex<()>>>>,
}

impl ClassLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the locks of every class in `ids`.
    ///
    /// Ids are sorted and de-duplicated before locking. Locks are released
    /// when `f` returns.
    pub fn with_classes<T>(&self, ids: &[ClassId], f: impl FnOnce() -> T) -> T {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mutexes: Vec<Arc<Mutex<()>>> = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            ids.iter()
                .map(|id| Arc::clone(table.entry(*id).or_default()))
                .collect()
        };

        // The guarded value is `()`, so a poisoned lock carries no broken state.
        let _guards: Vec<MutexGuard<'_, ()>> = mutexes
            .iter()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
            .collect();

        f()
    }

    /// Number of classes that have been locked at least once.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// =============================================================================
// CONFLICT RETRY
// =============================================================================

/// Run `op`, re-running it while it fails with a retryable error.
///
/// `op` receives the zero-based attempt number. After
/// `MAX_CONFLICT_RETRIES` retries the last error is returned unchanged.
/// Non-retryable errors are returned immediately.
pub fn retry_on_conflict<T>(
    operation: &'static str,
    mut op: impl FnMut(usize) -> Result<T, RombelError>,
) -> Result<T, RombelError> {
    let mut attempt = 0;
    loop {
        match op(attempt) {
            Err(err) if err.is_retryable() && attempt < MAX_CONFLICT_RETRIES => {
                attempt += 1;
                tracing::debug!(operation, attempt, error = %err, "retrying after conflict");
            }
            result => return result,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn conflict_retried_until_success() {
        let mut calls = 0;
        let result = retry_on_conflict("test", |attempt| {
            calls += 1;
            if attempt < 2 {
                Err(RombelError::Conflict("race".into()))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result, Ok(2));
        assert_eq!(calls, 3);
    }

    #[test]
    fn persistent_conflict_surfaces_after_budget() {
        let mut calls = 0;
        let result: Result<(), _> = retry_on_conflict("test", |_| {
            calls += 1;
            Err(RombelError::Conflict("race".into()))
        });
        assert!(matches!(result, Err(RombelError::Conflict(_))));
        assert_eq!(calls, MAX_CONFLICT_RETRIES + 1);
    }

    #[test]
    fn domain_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = retry_on_conflict("test", |_| {
            calls += 1;
            Err(RombelError::ClassFull {
                class: ClassId(1),
                capacity: 1,
            })
        });
        assert!(matches!(result, Err(RombelError::ClassFull { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn locks_serialize_critical_sections() {
        let locks = Arc::new(ClassLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    for _ in 0..50 {
                        locks.with_classes(&[ClassId(1)], || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.tracked(), 1);
    }

    #[test]
    fn opposite_lock_orders_do_not_deadlock() {
        let locks = Arc::new(ClassLocks::new());
        let forward = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                for _ in 0..200 {
                    locks.with_classes(&[ClassId(1), ClassId(2)], || ());
                }
            })
        };
        let backward = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                for _ in 0..200 {
                    locks.with_classes(&[ClassId(2), ClassId(1), ClassId(2)], || ());
                }
            })
        };
        forward.join().expect("forward");
        backward.join().expect("backward");
        assert_eq!(locks.tracked(), 2);
    }
}
