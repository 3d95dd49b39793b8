//! # Registry
//!
//! The single owner of the enrollment store for a process.
//!
//! A `Registry` is built once at startup, wrapped in an `Arc` and handed to
//! every component (directory, ledger, workflows, history). It bundles:
//! - the storage backend behind a `RwLock` (reads share, commits exclude)
//! - the per-class lock table
//! - id sequences seeded from the highest ids already stored
//! - the clock that stamps record dates
//! - the student directory used for existence checks

use crate::concurrency::ClassLocks;
use crate::formats::Snapshot;
use crate::store::{Changeset, EnrollmentStore, MemoryStore, StorageBackend};
use crate::students::{OpenStudentDirectory, StudentDirectory};
use crate::{AcademicYear, ClassId, EnrollmentId, ExitId, RombelError, TransferId};
use chrono::{Days, NaiveDate};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

// =============================================================================
// CLOCK
// =============================================================================

/// Source of "today" for assigned, transfer, exit and approval dates.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn today(&self) -> NaiveDate;
}

/// The local calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// A manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    date: Mutex<NaiveDate>,
}

impl FixedClock {
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Mutex::new(date),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        *self.date.lock().unwrap_or_else(PoisonError::into_inner) = date;
    }

    /// Move the clock forward by `days`.
    pub fn advance(&self, days: u64) {
        let mut date = self.date.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = date.checked_add_days(Days::new(days)) {
            *date = next;
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.date.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}

// =============================================================================
// ID SEQUENCES
// =============================================================================

/// Monotonic id counters. A failed commit leaves a gap; ids are never reused.
#[derive(Debug, Default)]
struct Sequences {
    class: AtomicU64,
    enrollment: AtomicU64,
    transfer: AtomicU64,
    exit: AtomicU64,
}

impl Sequences {
    fn seeded(store: &impl EnrollmentStore) -> Result<Self, RombelError> {
        let max = store.max_ids()?;
        Ok(Self {
            class: AtomicU64::new(max.class),
            enrollment: AtomicU64::new(max.enrollment),
            transfer: AtomicU64::new(max.transfer),
            exit: AtomicU64::new(max.exit),
        })
    }

    fn next(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Shared, lifecycle-owned enrollment store.
#[derive(Debug)]
pub struct Registry {
    store: RwLock<StorageBackend>,
    locks: ClassLocks,
    sequences: Sequences,
    clock: Box<dyn Clock>,
    students: Box<dyn StudentDirectory>,
}

impl Registry {
    /// Wrap an existing backend, seeding id sequences from its contents.
    pub fn with_backend(backend: StorageBackend) -> Result<Self, RombelError> {
        let sequences = Sequences::seeded(&backend)?;
        Ok(Self {
            store: RwLock::new(backend),
            locks: ClassLocks::new(),
            sequences,
            clock: Box::new(SystemClock),
            students: Box::new(OpenStudentDirectory),
        })
    }

    /// Empty, volatile registry.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            store: RwLock::new(StorageBackend::default()),
            locks: ClassLocks::new(),
            sequences: Sequences::default(),
            clock: Box::new(SystemClock),
            students: Box::new(OpenStudentDirectory),
        }
    }

    /// Open or create a redb database at `path`.
    pub fn open_redb(path: impl AsRef<Path>) -> Result<Self, RombelError> {
        let store = crate::store::RedbStore::open(path)?;
        Self::with_backend(StorageBackend::Persistent(store))
    }

    /// In-memory registry loaded from a snapshot.
    ///
    /// Refuses snapshots whose occupancy counters disagree with their
    /// active records.
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self, RombelError> {
        snapshot.validate()?;
        let mut store = MemoryStore::new();
        store.commit(&snapshot.to_changeset())?;
        Self::with_backend(StorageBackend::InMemory(store))
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Replace the student directory.
    #[must_use]
    pub fn with_students(mut self, students: impl StudentDirectory + 'static) -> Self {
        self.students = Box::new(students);
        self
    }

    // -------------------------------------------------------------------------
    // Store access
    // -------------------------------------------------------------------------

    /// Run a read-only closure against a consistent view of the store.
    pub fn read<T>(
        &self,
        f: impl FnOnce(&StorageBackend) -> Result<T, RombelError>,
    ) -> Result<T, RombelError> {
        let store = self
            .store
            .read()
            .map_err(|_| RombelError::Storage("store lock poisoned".to_string()))?;
        f(&store)
    }

    /// Apply a changeset under the store write lock.
    pub fn commit(&self, changeset: &Changeset) -> Result<(), RombelError> {
        let mut store = self
            .store
            .write()
            .map_err(|_| RombelError::Storage("store lock poisoned".to_string()))?;
        store.commit(changeset)
    }

    /// Copy every table into a snapshot.
    pub fn snapshot(&self) -> Result<Snapshot, RombelError> {
        self.read(|store| Snapshot::capture(store))
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.store
            .read()
            .map(|store| store.is_persistent())
            .unwrap_or(false)
    }

    // -------------------------------------------------------------------------
    // Collaborators
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn locks(&self) -> &ClassLocks {
        &self.locks
    }

    #[must_use]
    pub fn students(&self) -> &dyn StudentDirectory {
        self.students.as_ref()
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Academic year opened by today's date.
    pub fn current_academic_year(&self) -> Result<AcademicYear, RombelError> {
        AcademicYear::starting_in(self.today())
    }

    // -------------------------------------------------------------------------
    // Id allocation
    // -------------------------------------------------------------------------

    pub fn next_class_id(&self) -> ClassId {
        ClassId(Sequences::next(&self.sequences.class))
    }

    pub fn next_enrollment_id(&self) -> EnrollmentId {
        EnrollmentId(Sequences::next(&self.sequences.enrollment))
    }

    pub fn next_transfer_id(&self) -> TransferId {
        TransferId(Sequences::next(&self.sequences.transfer))
    }

    pub fn next_exit_id(&self) -> ExitId {
        ExitId(Sequences::next(&self.sequences.exit))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::in_memory()
    }
}

// =============================================================================
// TESTS
// =============================================================================
