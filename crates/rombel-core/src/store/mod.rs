//! # Enrollment Store
//!
//! The persistence seam for the Rombel core.
//!
//! All reads go through point lookups and scans; all writes go through a
//! single entry point, [`EnrollmentStore::commit`], which takes a
//! [`Changeset`] and applies it all-or-nothing.
//!
//! ## Storage Backends
//!
//! - `InMemory`: `MemoryStore`, `BTreeMap` tables (fast, volatile unless snapshotted)
//! - `Persistent`: `RedbStore`, one redb write transaction per commit

mod changeset;
mod memory;
mod redb_store;

pub use changeset::{ActiveExpectation, Changeset, ClassWrite};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;

pub(crate) use changeset::{CommitView, check_changeset};

use crate::{
    ClassId, ClassRecord, EnrollmentId, EnrollmentRecord, ExitRecord, RombelError, StudentId,
    TransferRecord,
};

// =============================================================================
// ENROLLMENT STORE TRAIT
// =============================================================================

/// Highest identifier in use per table (0 when the table is empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaxIds {
    pub class: u64,
    pub enrollment: u64,
    pub transfer: u64,
    pub exit: u64,
}

/// The EnrollmentStore trait defines the durable tables behind the core.
///
/// Scans return records in ascending id order, which is creation order.
/// All fallible operations return `Result<T, RombelError>` so in-memory and
/// persistent backends are interchangeable.
pub trait EnrollmentStore {
    /// Lookup a class by id.
    fn class(&self, id: ClassId) -> Result<Option<ClassRecord>, RombelError>;

    /// All classes.
    fn classes(&self) -> Result<Vec<ClassRecord>, RombelError>;

    /// Lookup an enrollment record by id.
    fn enrollment(&self, id: EnrollmentId) -> Result<Option<EnrollmentRecord>, RombelError>;

    /// The student's single active enrollment, if any.
    fn active_enrollment(
        &self,
        student: StudentId,
    ) -> Result<Option<EnrollmentRecord>, RombelError>;

    /// Every enrollment record of a student, any status.
    fn enrollments_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<EnrollmentRecord>, RombelError>;

    /// Every enrollment record that ever referenced a class, any status.
    fn enrollments_for_class(&self, class: ClassId)
    -> Result<Vec<EnrollmentRecord>, RombelError>;

    /// All enrollment records.
    fn enrollments(&self) -> Result<Vec<EnrollmentRecord>, RombelError>;

    /// All transfer audit records.
    fn transfers(&self) -> Result<Vec<TransferRecord>, RombelError>;

    /// All exit audit records.
    fn exits(&self) -> Result<Vec<ExitRecord>, RombelError>;

    /// Highest ids in use, for seeding id sequences at startup.
    fn max_ids(&self) -> Result<MaxIds, RombelError>;

    /// Validate every precondition in `changeset`, then apply every write.
    ///
    /// Either the whole changeset lands or nothing does. A failed
    /// precondition returns `RombelError::Conflict`.
    fn commit(&mut self, changeset: &Changeset) -> Result<(), RombelError>;
}

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Storage backend owned by a `Registry`.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory tables (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed tables using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl StorageBackend {
    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            StorageBackend::InMemory($store) => $call,
            StorageBackend::Persistent($store) => $call,
        }
    };
}

impl EnrollmentStore for StorageBackend {
    fn class(&self, id: ClassId) -> Result<Option<ClassRecord>, RombelError> {
        dispatch!(self, s => s.class(id))
    }

    fn classes(&self) -> Result<Vec<ClassRecord>, RombelError> {
        dispatch!(self, s => s.classes())
    }

    fn enrollment(&self, id: EnrollmentId) -> Result<Option<EnrollmentRecord>, RombelError> {
        dispatch!(self, s => s.enrollment(id))
    }

    fn active_enrollment(
        &self,
        student: StudentId,
    ) -> Result<Option<EnrollmentRecord>, RombelError> {
        dispatch!(self, s => s.active_enrollment(student))
    }

    fn enrollments_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<EnrollmentRecord>, RombelError> {
        dispatch!(self, s => s.enrollments_for_student(student))
    }

    fn enrollments_for_class(
        &self,
        class: ClassId,
    ) -> Result<Vec<EnrollmentRecord>, RombelError> {
        dispatch!(self, s => s.enrollments_for_class(class))
    }

    fn enrollments(&self) -> Result<Vec<EnrollmentRecord>, RombelError> {
        dispatch!(self, s => s.enrollments())
    }

    fn transfers(&self) -> Result<Vec<TransferRecord>, RombelError> {
        dispatch!(self, s => s.transfers())
    }

    fn exits(&self) -> Result<Vec<ExitRecord>, RombelError> {
        dispatch!(self, s => s.exits())
    }

    fn max_ids(&self) -> Result<MaxIds, RombelError> {
        dispatch!(self, s => s.max_ids())
    }

    fn commit(&mut self, changeset: &Changeset) -> Result<(), RombelError> {
        dispatch!(self, s => s.commit(changeset))
    }
}
