//! # In-Memory Store
//!
//! `BTreeMap`-backed tables. Used directly in tests and as the working set
//! of the file backend, which snapshots it to disk after each command.

use super::{Changeset, ClassWrite, CommitView, EnrollmentStore, MaxIds, check_changeset};
use crate::{
    ClassId, ClassRecord, EnrollmentId, EnrollmentRecord, ExitId, ExitRecord, RombelError,
    StudentId, TransferId, TransferRecord,
};
use std::collections::{BTreeMap, BTreeSet};

/// Volatile enrollment tables.
///
/// Secondary indexes (`by_student`, `by_class`, `active`) are maintained on
/// every commit so lookups never scan the whole ledger.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    classes: BTreeMap<ClassId, ClassRecord>,
    enrollments: BTreeMap<EnrollmentId, EnrollmentRecord>,
    transfers: BTreeMap<TransferId, TransferRecord>,
    exits: BTreeMap<ExitId, ExitRecord>,
    by_student: BTreeMap<StudentId, BTreeSet<EnrollmentId>>,
    by_class: BTreeMap<ClassId, BTreeSet<EnrollmentId>>,
    active: BTreeMap<StudentId, EnrollmentId>,
}

impl MemoryStore {
    /// Create empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(&self, ids: Option<&BTreeSet<EnrollmentId>>) -> Vec<EnrollmentRecord> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.enrollments.get(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }

    fn apply(&mut self, changeset: &Changeset) {
        for write in &changeset.classes {
            match write {
                ClassWrite::Put { record, .. } => {
                    self.classes.insert(record.id, record.clone());
                }
                ClassWrite::Remove { id, .. } => {
                    self.classes.remove(id);
                }
            }
        }

        for record in &changeset.enrollments {
            self.by_student
                .entry(record.student_id)
                .or_default()
                .insert(record.id);
            self.by_class
                .entry(record.class_id)
                .or_default()
                .insert(record.id);
            if record.is_active() {
                self.active.insert(record.student_id, record.id);
            } else if self.active.get(&record.student_id) == Some(&record.id) {
                self.active.remove(&record.student_id);
            }
            self.enrollments.insert(record.id, record.clone());
        }

        for transfer in &changeset.transfers {
            self.transfers.insert(transfer.id, transfer.clone());
        }
        for exit in &changeset.exits {
            self.exits.insert(exit.id, exit.clone());
        }
    }
}

impl CommitView for MemoryStore {
    fn class_version(&self, id: ClassId) -> Result<Option<u64>, RombelError> {
        Ok(self.classes.get(&id).map(|c| c.version))
    }

    fn enrollment_record(
        &self,
        id: EnrollmentId,
    ) -> Result<Option<EnrollmentRecord>, RombelError> {
        Ok(self.enrollments.get(&id).cloned())
    }

    fn active_of(&self, student: StudentId) -> Result<Option<EnrollmentId>, RombelError> {
        Ok(self.active.get(&student).copied())
    }

    fn has_transfer(&self, id: TransferId) -> Result<bool, RombelError> {
        Ok(self.transfers.contains_key(&id))
    }

    fn has_exit(&self, id: ExitId) -> Result<bool, RombelError> {
        Ok(self.exits.contains_key(&id))
    }
}

impl EnrollmentStore for MemoryStore {
    fn class(&self, id: ClassId) -> Result<Option<ClassRecord>, RombelError> {
        Ok(self.classes.get(&id).cloned())
    }

    fn classes(&self) -> Result<Vec<ClassRecord>, RombelError> {
        Ok(self.classes.values().cloned().collect())
    }

    fn enrollment(&self, id: EnrollmentId) -> Result<Option<EnrollmentRecord>, RombelError> {
        Ok(self.enrollments.get(&id).cloned())
    }

    fn active_enrollment(
        &self,
        student: StudentId,
    ) -> Result<Option<EnrollmentRecord>, RombelError> {
        Ok(self
            .active
            .get(&student)
            .and_then(|id| self.enrollments.get(id))
            .cloned())
    }

    fn enrollments_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<EnrollmentRecord>, RombelError> {
        Ok(self.collect(self.by_student.get(&student)))
    }

    fn enrollments_for_class(
        &self,
        class: ClassId,
    ) -> Result<Vec<EnrollmentRecord>, RombelError> {
        Ok(self.collect(self.by_class.get(&class)))
    }

    fn enrollments(&self) -> Result<Vec<EnrollmentRecord>, RombelError> {
        Ok(self.enrollments.values().cloned().collect())
    }

    fn transfers(&self) -> Result<Vec<TransferRecord>, RombelError> {
        Ok(self.transfers.values().cloned().collect())
    }

    fn exits(&self) -> Result<Vec<ExitRecord>, RombelError> {
        Ok(self.exits.values().cloned().collect())
    }

    fn max_ids(&self) -> Result<MaxIds, RombelError> {
        Ok(MaxIds {
            class: self.classes.keys().next_back().map_or(0, |id| id.0),
            enrollment: self.enrollments.keys().next_back().map_or(0, |id| id.0),
            transfer: self.transfers.keys().next_back().map_or(0, |id| id.0),
            exit: self.exits.keys().next_back().map_or(0, |id| id.0),
        })
    }

    fn commit(&mut self, changeset: &Changeset) -> Result<(), RombelError> {
        check_changeset(self, changeset)?;
        self.apply(changeset);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AcademicYear, AssignmentType, ClassStatus, EnrollmentStatus};
    use chrono::NaiveDate;

    fn class(id: u64, capacity: u32) -> ClassRecord {
        ClassRecord {
            id: ClassId(id),
            name: format!("X-{}", id),
            grade: 10,
            track: None,
            academic_year: AcademicYear::new(2024).expect("year"),
            homeroom_teacher: None,
            capacity,
            current_occupancy: 0,
            status: ClassStatus::Active,
            version: 0,
        }
    }

    fn enrollment(id: u64, student: u64, class: u64) -> EnrollmentRecord {
        EnrollmentRecord {
            id: EnrollmentId(id),
            student_id: StudentId(student),
            class_id: ClassId(class),
            academic_year: AcademicYear::new(2024).expect("year"),
            assignment_type: AssignmentType::Initial,
            assigned_date: NaiveDate::from_ymd_opt(2024, 7, 15).expect("date"),
            status: EnrollmentStatus::Active,
            notes: String::new(),
        }
    }

    #[test]
    fn commit_creates_class_and_rejects_duplicate_create() {
        let mut store = MemoryStore::new();
        let mut cs = Changeset::new();
        cs.create_class(class(1, 30));
        store.commit(&cs).expect("commit");

        assert!(store.class(ClassId(1)).expect("get").is_some());
        assert!(matches!(store.commit(&cs), Err(RombelError::Conflict(_))));
    }

    #[test]
    fn stale_class_version_is_a_conflict() {
        let mut store = MemoryStore::new();
        let original = class(1, 30);
        let mut cs = Changeset::new();
        cs.create_class(original.clone());
        store.commit(&cs).expect("create");

        let mut first = Changeset::new();
        let mut bumped = original.clone();
        bumped.capacity = 31;
        first.update_class(&original, bumped.clone());
        store.commit(&first).expect("first update");

        // Second writer still holds version 0.
        let mut second = Changeset::new();
        second.update_class(&original, bumped);
        assert!(matches!(store.commit(&second), Err(RombelError::Conflict(_))));
        assert_eq!(store.class(ClassId(1)).expect("get").map(|c| c.version), Some(1));
    }

    #[test]
    fn second_active_enrollment_rejected_atomically() {
        let mut store = MemoryStore::new();
        let mut cs = Changeset::new();
        cs.create_class(class(1, 30))
            .put_enrollment(enrollment(1, 7, 1));
        store.commit(&cs).expect("commit");

        let mut again = Changeset::new();
        again
            .create_class(class(2, 30))
            .put_enrollment(enrollment(2, 7, 2));
        assert!(matches!(store.commit(&again), Err(RombelError::Conflict(_))));

        // Nothing from the failed changeset landed.
        assert!(store.class(ClassId(2)).expect("get").is_none());
        assert_eq!(store.enrollments().expect("scan").len(), 1);
    }

    #[test]
    fn status_transition_updates_active_index() {
        let mut store = MemoryStore::new();
        let mut cs = Changeset::new();
        cs.create_class(class(1, 30))
            .put_enrollment(enrollment(1, 7, 1));
        store.commit(&cs).expect("commit");

        let mut exited = enrollment(1, 7, 1);
        exited.status = EnrollmentStatus::Exited;
        let mut close = Changeset::new();
        close
            .expect_active(StudentId(7), Some(EnrollmentId(1)))
            .put_enrollment(exited.clone());
        store.commit(&close).expect("close");

        assert!(store.active_enrollment(StudentId(7)).expect("get").is_none());
        // Closed records cannot be reopened.
        let mut reopen = Changeset::new();
        reopen.put_enrollment(enrollment(1, 7, 1));
        assert!(store.commit(&reopen).is_err());
    }

    #[test]
    fn enrollment_fields_other_than_status_are_immutable() {
        let mut store = MemoryStore::new();
        let mut cs = Changeset::new();
        cs.create_class(class(1, 30))
            .put_enrollment(enrollment(1, 7, 1));
        store.commit(&cs).expect("commit");

        let mut moved = enrollment(1, 7, 1);
        moved.notes = "rewritten".to_string();
        let mut edit = Changeset::new();
        edit.put_enrollment(moved);
        assert!(matches!(
            store.commit(&edit),
            Err(RombelError::InvalidRequest(_))
        ));
    }

    #[test]
    fn max_ids_track_highest_keys() {
        let mut store = MemoryStore::new();
        let mut cs = Changeset::new();
        cs.create_class(class(4, 30))
            .put_enrollment(enrollment(9, 1, 4));
        store.commit(&cs).expect("commit");

        let max = store.max_ids().expect("max");
        assert_eq!(max.class, 4);
        assert_eq!(max.enrollment, 9);
        assert_eq!(max.transfer, 0);
    }
}
