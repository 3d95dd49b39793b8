//! # rombel-core
//!
//! The enrollment lifecycle engine for Rombel - THE LOGIC.
//!
//! This crate assigns students to classes, transfers them between classes
//! and records their exits, while keeping every class's occupancy counter
//! equal to its set of active enrollments.
//!
//! ## Layers
//!
//! - `types`, `primitives`: records, identifiers, errors, constants
//! - `store`: the `EnrollmentStore` seam (in-memory and redb backends)
//! - `registry`, `concurrency`: shared ownership, per-class locks, retry
//! - `class_directory`, `ledger`, `transfer`, `exit`, `bulk`, `history`:
//!   the operations
//! - `service`: the facade the app layer talks to
//!
//! ## Architectural Constraints
//!
//! - Every command commits exactly one changeset (all-or-nothing)
//! - Callers are pre-authorized; no auth logic lives here
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod bulk;
pub mod class_directory;
pub mod concurrency;
pub mod exit;
pub mod formats;
pub mod history;
pub mod ledger;
pub mod primitives;
pub mod registry;
pub mod service;
pub mod store;
pub mod students;
pub mod transfer;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AcademicYear, AssignmentType, ClassId, ClassRecord, ClassStatus, EnrollmentId,
    EnrollmentRecord, EnrollmentStatus, ExitId, ExitRecord, ExitType, RombelError, StudentId,
    TransferId, TransferRecord,
};

// =============================================================================
// RE-EXPORTS: Operations
// =============================================================================

pub use bulk::{BulkAssignError, BulkAssignOutcome, BulkAssigner};
pub use class_directory::{ClassDirectory, ClassFilter, ClassPatch, NewClass, plan_occupancy};
pub use exit::{ExitOutcome, ExitRequest, ExitWorkflow};
pub use history::{
    ClassYearStats, ExitFilter, HistoryEvent, HistoryService, IntegrityReport, OccupancyMismatch,
    RegistrySummary, TransferFilter,
};
pub use ledger::{AssignRequest, EnrollmentLedger};
pub use service::EnrollmentService;
pub use transfer::{TransferOutcome, TransferRequest, TransferWorkflow};

// =============================================================================
// RE-EXPORTS: Storage and Lifecycle
// =============================================================================

pub use concurrency::{ClassLocks, retry_on_conflict};
pub use registry::{Clock, FixedClock, Registry, SystemClock};
pub use store::{Changeset, EnrollmentStore, MemoryStore, RedbStore, StorageBackend};
pub use students::{OpenStudentDirectory, StudentDirectory, StudentRoster};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{Snapshot, SnapshotHeader, snapshot_from_bytes, snapshot_to_bytes};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::class_directory::NewClass;
    use crate::registry::{FixedClock, Registry};
    use crate::AcademicYear;
    use chrono::NaiveDate;
    use std::sync::Arc;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    /// In-memory registry pinned to the first day of the 2024/2025 year.
    pub fn registry() -> Arc<Registry> {
        Arc::new(Registry::in_memory().with_clock(FixedClock::new(date(2024, 7, 15))))
    }

    pub fn new_class(name: &str, capacity: u32) -> NewClass {
        NewClass {
            name: name.to_string(),
            grade: 10,
            track: None,
            academic_year: AcademicYear::new(2024).expect("year"),
            homeroom_teacher: None,
            capacity,
        }
    }
}
