//! # Class Directory
//!
//! Owns class records: capacity, occupancy and status.
//!
//! Occupancy only moves through [`plan_occupancy`]. The enrollment ledger and
//! the transfer/exit workflows call it while staging their own changesets;
//! [`ClassDirectory::adjust_occupancy`] is the standalone form used for
//! administrative reconciliation.

use crate::concurrency::retry_on_conflict;
use crate::primitives::validate_name;
use crate::registry::Registry;
use crate::store::{Changeset, EnrollmentStore};
use crate::{AcademicYear, ClassId, ClassRecord, ClassStatus, RombelError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lowest and highest grade a class may carry (SD 1 through SMA/SMK 12).
const GRADE_RANGE: std::ops::RangeInclusive<u8> = 1..=12;

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// Fields for a new class. New classes start active and empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClass {
    pub name: String,
    pub grade: u8,
    #[serde(default)]
    pub track: Option<String>,
    pub academic_year: AcademicYear,
    #[serde(default)]
    pub homeroom_teacher: Option<String>,
    pub capacity: u32,
}

/// Partial update of a class. Occupancy is not patchable.
///
/// An empty `track` or `homeroom_teacher` clears the field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassPatch {
    pub name: Option<String>,
    pub grade: Option<u8>,
    pub track: Option<String>,
    pub academic_year: Option<AcademicYear>,
    pub homeroom_teacher: Option<String>,
    pub capacity: Option<u32>,
    pub status: Option<ClassStatus>,
}

/// Listing filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassFilter {
    pub grade: Option<u8>,
    pub academic_year: Option<AcademicYear>,
    pub track: Option<String>,
    pub status: Option<ClassStatus>,
    /// Case-insensitive match on name, track or homeroom teacher.
    pub search: Option<String>,
}

impl ClassFilter {
    #[must_use]
    pub fn matches(&self, class: &ClassRecord) -> bool {
        if self.grade.is_some_and(|g| g != class.grade) {
            return false;
        }
        if self.academic_year.is_some_and(|y| y != class.academic_year) {
            return false;
        }
        if self.status.is_some_and(|s| s != class.status) {
            return false;
        }
        if let Some(track) = &self.track {
            if class.track.as_deref() != Some(track.as_str()) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = |field: Option<&str>| {
                field.is_some_and(|value| value.to_lowercase().contains(&needle))
            };
            if !hit(Some(class.name.as_str()))
                && !hit(class.track.as_deref())
                && !hit(class.homeroom_teacher.as_deref())
            {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// OCCUPANCY PLANNING
// =============================================================================

/// The class record after applying `delta` to its occupancy.
///
/// Fails with `ClassFull` if the result would exceed capacity and with
/// `InvalidRequest` if it would drop below zero. Does not touch the store.
pub fn plan_occupancy(class: &ClassRecord, delta: i32) -> Result<ClassRecord, RombelError> {
    let next = i64::from(class.current_occupancy) + i64::from(delta);
    if next < 0 {
        return Err(RombelError::InvalidRequest(format!(
            "Occupancy of class {} cannot drop below zero",
            class.id
        )));
    }
    if next > i64::from(class.capacity) {
        return Err(RombelError::ClassFull {
            class: class.id,
            capacity: class.capacity,
        });
    }
    let mut after = class.clone();
    after.current_occupancy = next as u32;
    Ok(after)
}

fn optional_name(field: &str, value: Option<String>) -> Result<Option<String>, RombelError> {
    match value {
        Some(v) if v.trim().is_empty() => Ok(None),
        Some(v) => {
            validate_name(field, &v)?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}

fn validate_grade(grade: u8) -> Result<(), RombelError> {
    if !GRADE_RANGE.contains(&grade) {
        return Err(RombelError::InvalidRequest(format!(
            "Grade {} out of range {}..={}",
            grade,
            GRADE_RANGE.start(),
            GRADE_RANGE.end()
        )));
    }
    Ok(())
}

// =============================================================================
// CLASS DIRECTORY
// =============================================================================

/// CRUD and occupancy operations over class records.
#[derive(Debug, Clone)]
pub struct ClassDirectory {
    registry: Arc<Registry>,
}

impl ClassDirectory {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Lookup a class; unknown ids are `NotFound`.
    pub fn get(&self, id: ClassId) -> Result<ClassRecord, RombelError> {
        self.registry
            .read(|store| store.class(id))?
            .ok_or(RombelError::class_not_found(id))
    }

    /// Classes matching `filter`, in id order.
    pub fn list(&self, filter: &ClassFilter) -> Result<Vec<ClassRecord>, RombelError> {
        let classes = self.registry.read(|store| store.classes())?;
        Ok(classes.into_iter().filter(|c| filter.matches(c)).collect())
    }

    /// Active classes with at least `min_free` free seats.
    pub fn available(&self, min_free: u32) -> Result<Vec<ClassRecord>, RombelError> {
        let classes = self.registry.read(|store| store.classes())?;
        Ok(classes
            .into_iter()
            .filter(|c| c.is_active() && c.free_seats() >= min_free)
            .collect())
    }

    /// Create an active, empty class. A capacity of zero is allowed and
    /// refuses every placement.
    pub fn create(&self, new: NewClass) -> Result<ClassRecord, RombelError> {
        validate_name("name", &new.name)?;
        validate_grade(new.grade)?;

        let record = ClassRecord {
            id: self.registry.next_class_id(),
            name: new.name,
            grade: new.grade,
            track: optional_name("track", new.track)?,
            academic_year: new.academic_year,
            homeroom_teacher: optional_name("homeroom_teacher", new.homeroom_teacher)?,
            capacity: new.capacity,
            current_occupancy: 0,
            status: ClassStatus::Active,
            version: 0,
        };

        let mut changeset = Changeset::new();
        changeset.create_class(record.clone());
        self.registry.commit(&changeset)?;

        tracing::info!(
            event = "class_create",
            class = %record.id,
            capacity = record.capacity,
            "class created"
        );
        Ok(record)
    }

    /// Apply `patch` to a class.
    ///
    /// Lowering capacity below the current occupancy is `InvalidRequest`.
    pub fn update(&self, id: ClassId, patch: ClassPatch) -> Result<ClassRecord, RombelError> {
        if let Some(name) = &patch.name {
            validate_name("name", name)?;
        }
        if let Some(grade) = patch.grade {
            validate_grade(grade)?;
        }
        let track = patch.track.map(|t| optional_name("track", Some(t))).transpose()?;
        let teacher = patch
            .homeroom_teacher
            .map(|t| optional_name("homeroom_teacher", Some(t)))
            .transpose()?;

        self.registry.locks().with_classes(&[id], || {
            retry_on_conflict("class_update", |_| {
                let before = self.get(id)?;
                let mut after = before.clone();
                if let Some(name) = &patch.name {
                    after.name.clone_from(name);
                }
                if let Some(grade) = patch.grade {
                    after.grade = grade;
                }
                if let Some(track) = &track {
                    after.track.clone_from(track);
                }
                if let Some(year) = patch.academic_year {
                    after.academic_year = year;
                }
                if let Some(teacher) = &teacher {
                    after.homeroom_teacher.clone_from(teacher);
                }
                if let Some(status) = patch.status {
                    after.status = status;
                }
                if let Some(capacity) = patch.capacity {
                    if capacity < before.current_occupancy {
                        return Err(RombelError::InvalidRequest(format!(
                            "Capacity {} is below current occupancy {} of class {}",
                            capacity, before.current_occupancy, id
                        )));
                    }
                    after.capacity = capacity;
                }

                self.commit_update(&before, after)
            })
        })
        .inspect(|class| {
            tracing::info!(event = "class_update", class = %id, version = class.version, "class updated");
        })
    }

    /// Remove an empty class. Fails with `HasActiveStudents` otherwise.
    pub fn delete(&self, id: ClassId) -> Result<ClassRecord, RombelError> {
        let removed = self.registry.locks().with_classes(&[id], || {
            retry_on_conflict("class_delete", |_| {
                let before = self.get(id)?;
                if before.current_occupancy > 0 {
                    return Err(RombelError::HasActiveStudents {
                        class: id,
                        occupancy: before.current_occupancy,
                    });
                }
                let mut changeset = Changeset::new();
                changeset.remove_class(&before);
                self.registry.commit(&changeset)?;
                Ok(before)
            })
        });

        match &removed {
            Ok(_) => tracing::info!(event = "class_delete", class = %id, "class deleted"),
            Err(err) => tracing::warn!(event = "class_delete", class = %id, error = %err, "class delete rejected"),
        }
        removed
    }

    /// Atomically add `delta` to a class's occupancy.
    ///
    /// This bypasses the enrollment ledger, so the occupancy invariant only
    /// holds if the caller is reconciling a known divergence.
    pub fn adjust_occupancy(&self, id: ClassId, delta: i32) -> Result<ClassRecord, RombelError> {
        self.registry.locks().with_classes(&[id], || {
            retry_on_conflict("adjust_occupancy", |_| {
                let before = self.get(id)?;
                let after = plan_occupancy(&before, delta)?;
                self.commit_update(&before, after)
            })
        })
        .inspect(|class| {
            tracing::info!(
                event = "adjust_occupancy",
                class = %id,
                delta,
                occupancy = class.current_occupancy,
                "occupancy adjusted"
            );
        })
    }

    fn commit_update(
        &self,
        before: &ClassRecord,
        mut after: ClassRecord,
    ) -> Result<ClassRecord, RombelError> {
        let mut changeset = Changeset::new();
        changeset.update_class(before, after.clone());
        self.registry.commit(&changeset)?;
        after.version = before.version.saturating_add(1);
        Ok(after)
    }
}

// =============================================================================
// TESTS
// =============================================================================
