//! # Student Directory
//!
//! Student records are owned elsewhere; the core only needs to know whether
//! an id exists before it writes an enrollment for it.

use crate::StudentId;
use std::collections::BTreeSet;

/// Existence checks against the system that owns student records.
pub trait StudentDirectory: Send + Sync + std::fmt::Debug {
    fn contains(&self, student: StudentId) -> bool;
}

/// Accepts every student id.
///
/// Used when the caller has already validated students upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenStudentDirectory;

impl StudentDirectory for OpenStudentDirectory {
    fn contains(&self, _student: StudentId) -> bool {
        true
    }
}

/// An explicit set of known students.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentRoster {
    ids: BTreeSet<StudentId>,
}

impl StudentRoster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, student: StudentId) -> bool {
        self.ids.insert(student)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<StudentId> for StudentRoster {
    fn from_iter<I: IntoIterator<Item = StudentId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl StudentDirectory for StudentRoster {
    fn contains(&self, student: StudentId) -> bool {
        self.ids.contains(&student)
    }
}
