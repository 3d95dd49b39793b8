//! # History
//!
//! Read-only queries over the enrollment ledger and the audit records.
//!
//! Every query runs inside a single store read, so it observes one
//! consistent snapshot even while commands are committing.

use crate::registry::Registry;
use crate::store::EnrollmentStore;
use crate::{
    AcademicYear, AssignmentType, ClassId, ClassRecord, EnrollmentId, EnrollmentRecord,
    EnrollmentStatus, ExitRecord, ExitType, RombelError, StudentId, TransferRecord,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// HISTORY EVENTS
// =============================================================================

/// One entry of a student's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEvent {
    Assigned(EnrollmentRecord),
    Transferred(TransferRecord),
    Exited(ExitRecord),
}

impl HistoryEvent {
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Assigned(r) => r.assigned_date,
            Self::Transferred(r) => r.transfer_date,
            Self::Exited(r) => r.exit_date,
        }
    }

    /// Sort key: date, then the enrollment record the event is anchored to,
    /// then its position around that record.
    ///
    /// A student's enrollment ids grow in commit order, so a transfer sorts
    /// just before the record it opened and an exit just after the record
    /// it closed, even when several events share a date.
    fn sort_key(&self) -> (NaiveDate, EnrollmentId, u8) {
        match self {
            Self::Transferred(r) => (r.transfer_date, r.opened_enrollment_id, 0),
            Self::Assigned(r) => (r.assigned_date, r.id, 1),
            Self::Exited(r) => (r.exit_date, r.closed_enrollment_id, 2),
        }
    }
}

// =============================================================================
// FILTERS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferFilter {
    pub student_id: Option<StudentId>,
    pub from_class_id: Option<ClassId>,
    pub to_class_id: Option<ClassId>,
}

impl TransferFilter {
    #[must_use]
    pub fn matches(&self, record: &TransferRecord) -> bool {
        self.student_id.is_none_or(|s| s == record.student_id)
            && self.from_class_id.is_none_or(|c| c == record.from_class_id)
            && self.to_class_id.is_none_or(|c| c == record.to_class_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitFilter {
    pub student_id: Option<StudentId>,
    pub exit_type: Option<ExitType>,
}

impl ExitFilter {
    #[must_use]
    pub fn matches(&self, record: &ExitRecord) -> bool {
        self.student_id.is_none_or(|s| s == record.student_id)
            && self
                .exit_type
                .as_ref()
                .is_none_or(|t| *t == record.exit_type)
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Per-class counts for one academic year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassYearStats {
    pub class_id: ClassId,
    pub academic_year: AcademicYear,
    pub total_enrollments: usize,
    pub active: usize,
    pub transferred_out: usize,
    pub exited: usize,
    pub initial: usize,
    pub transfers_in: usize,
    pub promotions: usize,
    pub current_occupancy: u32,
    pub capacity: u32,
}

// =============================================================================
// INTEGRITY REPORT
// =============================================================================

/// A class whose counter disagrees with its active records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyMismatch {
    pub class_id: ClassId,
    pub recorded: u32,
    pub actual: usize,
}

/// Result of auditing the occupancy and single-active invariants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub classes_checked: usize,
    pub enrollments_checked: usize,
    pub occupancy_mismatches: Vec<OccupancyMismatch>,
    pub over_capacity: Vec<ClassId>,
    /// Students holding more than one active record.
    pub multiple_active: Vec<StudentId>,
    /// Active records pointing at a class that no longer exists.
    pub orphaned_active: Vec<EnrollmentId>,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.occupancy_mismatches.is_empty()
            && self.over_capacity.is_empty()
            && self.multiple_active.is_empty()
            && self.orphaned_active.is_empty()
    }

    /// Audit a set of class and enrollment records against each other.
    #[must_use]
    pub fn audit(classes: &[ClassRecord], enrollments: &[EnrollmentRecord]) -> Self {
        let mut per_class: BTreeMap<ClassId, usize> = BTreeMap::new();
        let mut per_student: BTreeMap<StudentId, usize> = BTreeMap::new();
        let mut report = Self {
            classes_checked: classes.len(),
            enrollments_checked: enrollments.len(),
            ..Self::default()
        };

        for record in enrollments.iter().filter(|r| r.is_active()) {
            *per_class.entry(record.class_id).or_default() += 1;
            *per_student.entry(record.student_id).or_default() += 1;
            if !classes.iter().any(|c| c.id == record.class_id) {
                report.orphaned_active.push(record.id);
            }
        }

        for class in classes {
            let actual = per_class.get(&class.id).copied().unwrap_or(0);
            if actual != class.current_occupancy as usize {
                report.occupancy_mismatches.push(OccupancyMismatch {
                    class_id: class.id,
                    recorded: class.current_occupancy,
                    actual,
                });
            }
            if class.current_occupancy > class.capacity {
                report.over_capacity.push(class.id);
            }
        }

        report.multiple_active = per_student
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(student, _)| student)
            .collect();
        report
    }

    /// One-line description of every divergence, for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        for m in &self.occupancy_mismatches {
            parts.push(format!(
                "class {} records occupancy {} but has {} active",
                m.class_id, m.recorded, m.actual
            ));
        }
        for class in &self.over_capacity {
            parts.push(format!("class {} is over capacity", class));
        }
        for student in &self.multiple_active {
            parts.push(format!("student {} has several active enrollments", student));
        }
        for enrollment in &self.orphaned_active {
            parts.push(format!("enrollment {} points at a missing class", enrollment));
        }
        parts.join("; ")
    }
}

// =============================================================================
// SUMMARY
// =============================================================================

/// Store-wide counts for status displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub classes: usize,
    pub active_classes: usize,
    pub total_capacity: u64,
    pub total_occupancy: u64,
    pub enrollments: usize,
    pub active_enrollments: usize,
    pub transfers: usize,
    pub exits: usize,
}

// =============================================================================
// HISTORY SERVICE
// =============================================================================

#[derive(Debug, Clone)]
pub struct HistoryService {
    registry: Arc<Registry>,
}

impl HistoryService {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    fn require_student(&self, student: StudentId) -> Result<(), RombelError> {
        if self.registry.students().contains(student) {
            Ok(())
        } else {
            Err(RombelError::student_not_found(student))
        }
    }

    /// Students currently placed in a class, in enrollment order.
    pub fn class_roster(&self, class_id: ClassId) -> Result<Vec<EnrollmentRecord>, RombelError> {
        self.registry.read(|store| {
            store
                .class(class_id)?
                .ok_or(RombelError::class_not_found(class_id))?;
            let mut roster: Vec<_> = store
                .enrollments_for_class(class_id)?
                .into_iter()
                .filter(EnrollmentRecord::is_active)
                .collect();
            roster.sort_by_key(|r| r.id);
            Ok(roster)
        })
    }

    /// Assignments, transfers and exits of a student, oldest first.
    pub fn student_history(&self, student: StudentId) -> Result<Vec<HistoryEvent>, RombelError> {
        self.require_student(student)?;
        let mut events = self.registry.read(|store| {
            let mut events: Vec<HistoryEvent> = store
                .enrollments_for_student(student)?
                .into_iter()
                .map(HistoryEvent::Assigned)
                .collect();
            events.extend(
                store
                    .transfers()?
                    .into_iter()
                    .filter(|t| t.student_id == student)
                    .map(HistoryEvent::Transferred),
            );
            events.extend(
                store
                    .exits()?
                    .into_iter()
                    .filter(|e| e.student_id == student)
                    .map(HistoryEvent::Exited),
            );
            Ok(events)
        })?;
        events.sort_by_key(HistoryEvent::sort_key);
        Ok(events)
    }

    /// Every record that ever placed a student in the class, any status.
    pub fn class_history(&self, class_id: ClassId) -> Result<Vec<EnrollmentRecord>, RombelError> {
        self.registry.read(|store| {
            store
                .class(class_id)?
                .ok_or(RombelError::class_not_found(class_id))?;
            let mut records = store.enrollments_for_class(class_id)?;
            records.sort_by_key(|r| r.id);
            Ok(records)
        })
    }

    /// Counts of the class's records for one academic year.
    pub fn class_stats_by_year(
        &self,
        class_id: ClassId,
        academic_year: AcademicYear,
    ) -> Result<ClassYearStats, RombelError> {
        self.registry.read(|store| {
            let class = store
                .class(class_id)?
                .ok_or(RombelError::class_not_found(class_id))?;
            let mut stats = ClassYearStats {
                class_id,
                academic_year,
                total_enrollments: 0,
                active: 0,
                transferred_out: 0,
                exited: 0,
                initial: 0,
                transfers_in: 0,
                promotions: 0,
                current_occupancy: class.current_occupancy,
                capacity: class.capacity,
            };
            for record in store.enrollments_for_class(class_id)? {
                if record.academic_year != academic_year {
                    continue;
                }
                stats.total_enrollments += 1;
                match record.status {
                    EnrollmentStatus::Active => stats.active += 1,
                    EnrollmentStatus::Transferred => stats.transferred_out += 1,
                    EnrollmentStatus::Exited => stats.exited += 1,
                }
                match record.assignment_type {
                    AssignmentType::Initial => stats.initial += 1,
                    AssignmentType::TransferIn => stats.transfers_in += 1,
                    AssignmentType::Promotion => stats.promotions += 1,
                }
            }
            Ok(stats)
        })
    }

    /// Transfer records matching `filter`, in id order.
    pub fn transfers(&self, filter: &TransferFilter) -> Result<Vec<TransferRecord>, RombelError> {
        let transfers = self.registry.read(|store| store.transfers())?;
        Ok(transfers.into_iter().filter(|t| filter.matches(t)).collect())
    }

    /// Exit records matching `filter`, in id order.
    pub fn exits(&self, filter: &ExitFilter) -> Result<Vec<ExitRecord>, RombelError> {
        let exits = self.registry.read(|store| store.exits())?;
        Ok(exits.into_iter().filter(|e| filter.matches(e)).collect())
    }

    /// Counts across every table, taken from one consistent view.
    pub fn summary(&self) -> Result<RegistrySummary, RombelError> {
        self.registry.read(|store| {
            let classes = store.classes()?;
            let enrollments = store.enrollments()?;
            Ok(RegistrySummary {
                classes: classes.len(),
                active_classes: classes.iter().filter(|c| c.is_active()).count(),
                total_capacity: classes.iter().map(|c| u64::from(c.capacity)).sum(),
                total_occupancy: classes.iter().map(|c| u64::from(c.current_occupancy)).sum(),
                enrollments: enrollments.len(),
                active_enrollments: enrollments.iter().filter(|r| r.is_active()).count(),
                transfers: store.transfers()?.len(),
                exits: store.exits()?.len(),
            })
        })
    }

    /// Audit the occupancy and single-active invariants across the store.
    pub fn integrity_report(&self) -> Result<IntegrityReport, RombelError> {
        let report = self.registry.read(|store| {
            Ok(IntegrityReport::audit(&store.classes()?, &store.enrollments()?))
        })?;

        if !report.is_clean() {
            tracing::warn!(
                event = "integrity",
                mismatches = report.occupancy_mismatches.len(),
                multiple_active = report.multiple_active.len(),
                orphaned = report.orphaned_active.len(),
                "integrity check found divergences"
            );
        }
        Ok(report)
    }
}

// =============================================================================
// TESTS
// =============================================================================
