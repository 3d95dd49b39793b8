//! # Core Type Definitions
//!
//! This module contains all core types for the Rombel enrollment engine:
//! - Identifiers (`StudentId`, `ClassId`, `EnrollmentId`, `TransferId`, `ExitId`)
//! - Lifecycle enums (`ClassStatus`, `AssignmentType`, `EnrollmentStatus`, `ExitType`)
//! - Records (`ClassRecord`, `EnrollmentRecord`, `TransferRecord`, `ExitRecord`)
//! - Error types (`RombelError`)
//!
//! ## Ordering Guarantees
//!
//! Every identifier implements `Ord` so tables can live in `BTreeMap`s and
//! iterate in creation order. Records never carry floating-point fields.

mod academic_year;

pub use academic_year::AcademicYear;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Get the raw identifier value.
            #[must_use]
            pub const fn value(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of a student, owned by the Student Directory.
    StudentId
);
record_id!(
    /// Identifier of a class (rombel) in the Class Directory.
    ClassId
);
record_id!(
    /// Identifier of an enrollment record in the ledger.
    EnrollmentId
);
record_id!(
    /// Identifier of a transfer audit record.
    TransferId
);
record_id!(
    /// Identifier of an exit audit record.
    ExitId
);

// =============================================================================
// LIFECYCLE ENUMS
// =============================================================================

/// Whether a class accepts new enrollments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassStatus {
    Active,
    Inactive,
}

impl ClassStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl FromStr for ClassStatus {
    type Err = RombelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(RombelError::InvalidRequest(format!(
                "Unknown class status: {}",
                other
            ))),
        }
    }
}

/// How a student came to be placed in a class.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    /// First placement (new admission).
    #[default]
    Initial,
    /// Receiving half of a transfer.
    TransferIn,
    /// Placement into the next grade.
    Promotion,
}

impl AssignmentType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::TransferIn => "transfer_in",
            Self::Promotion => "promotion",
        }
    }
}

impl FromStr for AssignmentType {
    type Err = RombelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // "ppdb" is the admission intake term used by school staff.
            "initial" | "ppdb" => Ok(Self::Initial),
            "transfer_in" => Ok(Self::TransferIn),
            "promotion" => Ok(Self::Promotion),
            other => Err(RombelError::InvalidRequest(format!(
                "Unknown assignment type: {}",
                other
            ))),
        }
    }
}

/// Live status of an enrollment record.
///
/// `Active` is the only non-terminal state. A record leaves it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Transferred,
    Exited,
}

impl EnrollmentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Transferred => "transferred",
            Self::Exited => "exited",
        }
    }
}

/// Why a student left the school.
///
/// Serialized as its label, so `"graduated"` and any free-form label share
/// one representation with the `FromStr` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExitType {
    Graduated,
    MovedOut,
    DroppedOut,
    Other(String),
}

impl ExitType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Graduated => "graduated",
            Self::MovedOut => "moved_out",
            Self::DroppedOut => "dropped_out",
            Self::Other(label) => label,
        }
    }
}

impl FromStr for ExitType {
    type Err = RombelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "" => Err(RombelError::InvalidRequest(
                "Exit type must not be empty".to_string(),
            )),
            "graduated" => Ok(Self::Graduated),
            "moved_out" => Ok(Self::MovedOut),
            "dropped_out" => Ok(Self::DroppedOut),
            other => Ok(Self::Other(other.to_string())),
        }
    }
}

impl fmt::Display for ExitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ExitType {
    type Error = RombelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExitType> for String {
    fn from(exit_type: ExitType) -> Self {
        match exit_type {
            ExitType::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

// =============================================================================
// CLASS RECORD
// =============================================================================

/// A class in the Class Directory.
///
/// `current_occupancy` is a denormalized counter. It must always equal the
/// number of `Active` enrollment records that reference this class, and it
/// never exceeds `capacity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub id: ClassId,
    pub name: String,
    pub grade: u8,
    /// Vocational track (jurusan); `None` for general classes.
    pub track: Option<String>,
    pub academic_year: AcademicYear,
    pub homeroom_teacher: Option<String>,
    pub capacity: u32,
    pub current_occupancy: u32,
    pub status: ClassStatus,
    /// Bumped on every committed write; used for compare-and-swap.
    pub version: u64,
}

impl ClassRecord {
    /// Seats still available.
    #[must_use]
    pub const fn free_seats(&self) -> u32 {
        self.capacity.saturating_sub(self.current_occupancy)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ClassStatus::Active
    }
}

// =============================================================================
// ENROLLMENT RECORD
// =============================================================================

/// The binding of one student to one class for one academic year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub id: EnrollmentId,
    pub student_id: StudentId,
    pub class_id: ClassId,
    pub academic_year: AcademicYear,
    pub assignment_type: AssignmentType,
    pub assigned_date: NaiveDate,
    pub status: EnrollmentStatus,
    pub notes: String,
}

impl EnrollmentRecord {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }
}

// =============================================================================
// AUDIT RECORDS
// =============================================================================

/// Write-once fact describing one successful transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: TransferId,
    pub student_id: StudentId,
    pub from_class_id: ClassId,
    pub to_class_id: ClassId,
    /// The `transfer_in` record this transfer opened.
    pub opened_enrollment_id: EnrollmentId,
    pub transfer_date: NaiveDate,
    pub reason: String,
    pub approved_by: String,
    pub approved_date: NaiveDate,
    pub notes: String,
}

/// Write-once fact describing one student exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRecord {
    pub id: ExitId,
    pub student_id: StudentId,
    /// The record this exit closed.
    pub closed_enrollment_id: EnrollmentId,
    pub exit_date: NaiveDate,
    pub exit_type: ExitType,
    pub destination: Option<String>,
    pub reason: String,
    pub approved_by: String,
    pub approved_date: NaiveDate,
    pub notes: String,
    pub last_class_id: ClassId,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Rombel core.
///
/// - No silent failures
/// - Single-item commands return these unmodified
/// - `Conflict` is retried by the concurrency layer before it surfaces
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RombelError {
    /// An unknown student, class or record id.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: u64 },

    /// The student already holds an active enrollment somewhere.
    #[error("Student {student} is already enrolled in class {class}")]
    AlreadyEnrolled { student: StudentId, class: ClassId },

    /// The occupancy increment would exceed the class capacity.
    #[error("Class {class} is full (capacity {capacity})")]
    ClassFull { class: ClassId, capacity: u32 },

    /// Transfer source does not match the student's active enrollment.
    #[error("Student {student} is not actively enrolled in class {class}")]
    NotEnrolledInSourceClass { student: StudentId, class: ClassId },

    /// Exit requested for a student with nothing to exit.
    #[error("Student {0} has no active enrollment")]
    NoActiveEnrollment(StudentId),

    /// Delete guard: the class still holds students.
    #[error("Class {class} still has {occupancy} active students")]
    HasActiveStudents { class: ClassId, occupancy: u32 },

    /// The class is not accepting enrollments.
    #[error("Class {0} is inactive")]
    ClassInactive(ClassId),

    /// A concurrent writer changed the state this command was based on.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// The request itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The backing store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A record or snapshot could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RombelError {
    #[must_use]
    pub const fn class_not_found(id: ClassId) -> Self {
        Self::NotFound {
            entity: "Class",
            id: id.0,
        }
    }

    #[must_use]
    pub const fn student_not_found(id: StudentId) -> Self {
        Self::NotFound {
            entity: "Student",
            id: id.0,
        }
    }

    /// Whether the concurrency layer may transparently retry this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Stable snake_case code for callers that report errors as data.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyEnrolled { .. } => "already_enrolled",
            Self::ClassFull { .. } => "class_full",
            Self::NotEnrolledInSourceClass { .. } => "not_enrolled_in_source_class",
            Self::NoActiveEnrollment(_) => "no_active_enrollment",
            Self::HasActiveStudents { .. } => "has_active_students",
            Self::ClassInactive(_) => "class_inactive",
            Self::Conflict(_) => "conflict",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
