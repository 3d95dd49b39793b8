//! # Enrollment Service
//!
//! The caller-facing entry point. Bundles every component over one shared
//! [`Registry`] so adapters (CLI, HTTP) hold a single handle.

use crate::bulk::{BulkAssignOutcome, BulkAssigner};
use crate::class_directory::ClassDirectory;
use crate::exit::{ExitOutcome, ExitRequest, ExitWorkflow};
use crate::history::{ClassYearStats, HistoryEvent, HistoryService};
use crate::ledger::{AssignRequest, EnrollmentLedger};
use crate::registry::Registry;
use crate::transfer::{TransferOutcome, TransferRequest, TransferWorkflow};
use crate::{AcademicYear, ClassId, EnrollmentRecord, RombelError, StudentId};
use std::sync::Arc;

/// All enrollment operations over one registry. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EnrollmentService {
    registry: Arc<Registry>,
    classes: ClassDirectory,
    ledger: EnrollmentLedger,
    transfers: TransferWorkflow,
    exits: ExitWorkflow,
    bulk: BulkAssigner,
    history: HistoryService,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        let ledger = EnrollmentLedger::new(Arc::clone(&registry));
        Self {
            classes: ClassDirectory::new(Arc::clone(&registry)),
            transfers: TransferWorkflow::new(Arc::clone(&registry)),
            exits: ExitWorkflow::new(Arc::clone(&registry)),
            bulk: BulkAssigner::new(ledger.clone()),
            history: HistoryService::new(Arc::clone(&registry)),
            ledger,
            registry,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Class CRUD, listing and occupancy.
    #[must_use]
    pub fn classes(&self) -> &ClassDirectory {
        &self.classes
    }

    #[must_use]
    pub fn ledger(&self) -> &EnrollmentLedger {
        &self.ledger
    }

    /// Read-only queries, including audit filters and the integrity report.
    #[must_use]
    pub fn history(&self) -> &HistoryService {
        &self.history
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    pub fn assign(&self, request: &AssignRequest) -> Result<EnrollmentRecord, RombelError> {
        self.ledger.assign(request)
    }

    pub fn bulk_assign(
        &self,
        students: &[StudentId],
        class_id: ClassId,
        notes: &str,
    ) -> Result<BulkAssignOutcome, RombelError> {
        self.bulk.bulk_assign(students, class_id, notes)
    }

    pub fn bulk_assign_each(
        &self,
        students: &[StudentId],
        class_id: ClassId,
        notes: &str,
        on_item: impl FnMut(StudentId, Result<&EnrollmentRecord, &RombelError>),
    ) -> Result<BulkAssignOutcome, RombelError> {
        self.bulk.bulk_assign_each(students, class_id, notes, on_item)
    }

    pub fn transfer(&self, request: &TransferRequest) -> Result<TransferOutcome, RombelError> {
        self.transfers.transfer(request)
    }

    pub fn exit(&self, request: &ExitRequest) -> Result<ExitOutcome, RombelError> {
        self.exits.exit(request)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn class_roster(&self, class_id: ClassId) -> Result<Vec<EnrollmentRecord>, RombelError> {
        self.history.class_roster(class_id)
    }

    pub fn student_history(&self, student: StudentId) -> Result<Vec<HistoryEvent>, RombelError> {
        self.history.student_history(student)
    }

    pub fn class_history(&self, class_id: ClassId) -> Result<Vec<EnrollmentRecord>, RombelError> {
        self.history.class_history(class_id)
    }

    pub fn class_stats_by_year(
        &self,
        class_id: ClassId,
        academic_year: AcademicYear,
    ) -> Result<ClassYearStats, RombelError> {
        self.history.class_stats_by_year(class_id, academic_year)
    }
}
