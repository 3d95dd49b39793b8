//! # redb-backed Enrollment Storage
//!
//! A disk-backed store using the redb embedded database, providing:
//! - ACID transactions (one write transaction per changeset)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Records are encoded with postcard. Secondary indexes are composite keys
//! so per-student and per-class lookups are range scans.

use super::{Changeset, ClassWrite, CommitView, EnrollmentStore, MaxIds, check_changeset};
use crate::{
    ClassId, ClassRecord, EnrollmentId, EnrollmentRecord, ExitId, ExitRecord, RombelError,
    StudentId, TransferId, TransferRecord,
};
use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

type RecordTable = TableDefinition<'static, u64, &'static [u8]>;
type IndexTable = TableDefinition<'static, (u64, u64), ()>;

/// Table for classes: ClassId(u64) -> serialized ClassRecord
const CLASSES: RecordTable = TableDefinition::new("classes");

/// Table for enrollments: EnrollmentId(u64) -> serialized EnrollmentRecord
const ENROLLMENTS: RecordTable = TableDefinition::new("enrollments");

/// Table for transfers: TransferId(u64) -> serialized TransferRecord
const TRANSFERS: RecordTable = TableDefinition::new("transfers");

/// Table for exits: ExitId(u64) -> serialized ExitRecord
const EXITS: RecordTable = TableDefinition::new("exits");

/// Index: (student_id, enrollment_id) -> ()
const STUDENT_INDEX: IndexTable = TableDefinition::new("student_index");

/// Index: (class_id, enrollment_id) -> ()
const CLASS_INDEX: IndexTable = TableDefinition::new("class_index");

/// Live state: student_id -> active enrollment_id
const ACTIVE: TableDefinition<u64, u64> = TableDefinition::new("active");

fn storage_err(e: impl std::fmt::Display) -> RombelError {
    RombelError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, RombelError> {
    postcard::to_stdvec(value).map_err(|e| RombelError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RombelError> {
    postcard::from_bytes(bytes).map_err(|e| RombelError::Serialization(e.to_string()))
}

/// A disk-backed enrollment store using redb.
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RombelError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path).map_err(storage_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_err)?;
            for table in [CLASSES, ENROLLMENTS, TRANSFERS, EXITS] {
                write_txn.open_table(table).map_err(storage_err)?;
            }
            for index in [STUDENT_INDEX, CLASS_INDEX] {
                write_txn.open_table(index).map_err(storage_err)?;
            }
            write_txn.open_table(ACTIVE).map_err(storage_err)?;
            write_txn.commit().map_err(storage_err)?;
        }

        tracing::debug!(path = %path.display(), "opened redb store");
        Ok(Self { db, path })
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get_record<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        id: u64,
    ) -> Result<Option<T>, RombelError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(table).map_err(storage_err)?;
        match table.get(id).map_err(storage_err)? {
            Some(bytes) => decode(bytes.value()).map(Some),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, table: RecordTable) -> Result<Vec<T>, RombelError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(table).map_err(storage_err)?;
        let mut records = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (_, bytes) = entry.map_err(storage_err)?;
            records.push(decode(bytes.value())?);
        }
        Ok(records)
    }

    /// Enrollment records whose index key starts with `key`.
    fn indexed(&self, index: IndexTable, key: u64) -> Result<Vec<EnrollmentRecord>, RombelError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let index = read_txn.open_table(index).map_err(storage_err)?;
        let enrollments = read_txn.open_table(ENROLLMENTS).map_err(storage_err)?;

        let mut records = Vec::new();
        for entry in index
            .range((key, 0u64)..=(key, u64::MAX))
            .map_err(storage_err)?
        {
            let (composite, _) = entry.map_err(storage_err)?;
            let (_, enrollment_id) = composite.value();
            if let Some(bytes) = enrollments.get(enrollment_id).map_err(storage_err)? {
                records.push(decode(bytes.value())?);
            }
        }
        Ok(records)
    }

    fn last_key(&self, table: RecordTable) -> Result<u64, RombelError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(table).map_err(storage_err)?;
        Ok(table
            .last()
            .map_err(storage_err)?
            .map(|(key, _)| key.value())
            .unwrap_or(0))
    }

    fn apply(txn: &WriteTransaction, changeset: &Changeset) -> Result<(), RombelError> {
        {
            let mut classes = txn.open_table(CLASSES).map_err(storage_err)?;
            for write in &changeset.classes {
                match write {
                    ClassWrite::Put { record, .. } => {
                        let bytes = encode(record)?;
                        classes
                            .insert(record.id.0, bytes.as_slice())
                            .map_err(storage_err)?;
                    }
                    ClassWrite::Remove { id, .. } => {
                        classes.remove(id.0).map_err(storage_err)?;
                    }
                }
            }
        }
        {
            let mut enrollments = txn.open_table(ENROLLMENTS).map_err(storage_err)?;
            let mut by_student = txn.open_table(STUDENT_INDEX).map_err(storage_err)?;
            let mut by_class = txn.open_table(CLASS_INDEX).map_err(storage_err)?;
            let mut active = txn.open_table(ACTIVE).map_err(storage_err)?;
            for record in &changeset.enrollments {
                let bytes = encode(record)?;
                enrollments
                    .insert(record.id.0, bytes.as_slice())
                    .map_err(storage_err)?;
                by_student
                    .insert((record.student_id.0, record.id.0), ())
                    .map_err(storage_err)?;
                by_class
                    .insert((record.class_id.0, record.id.0), ())
                    .map_err(storage_err)?;

                if record.is_active() {
                    active
                        .insert(record.student_id.0, record.id.0)
                        .map_err(storage_err)?;
                } else {
                    let current = active
                        .get(record.student_id.0)
                        .map_err(storage_err)?
                        .map(|v| v.value());
                    if current == Some(record.id.0) {
                        active.remove(record.student_id.0).map_err(storage_err)?;
                    }
                }
            }
        }
        {
            let mut transfers = txn.open_table(TRANSFERS).map_err(storage_err)?;
            for transfer in &changeset.transfers {
                let bytes = encode(transfer)?;
                transfers
                    .insert(transfer.id.0, bytes.as_slice())
                    .map_err(storage_err)?;
            }
        }
        {
            let mut exits = txn.open_table(EXITS).map_err(storage_err)?;
            for exit in &changeset.exits {
                let bytes = encode(exit)?;
                exits
                    .insert(exit.id.0, bytes.as_slice())
                    .map_err(storage_err)?;
            }
        }
        Ok(())
    }
}

/// Precondition reads inside the commit's own write transaction.
struct TxnView<'a> {
    txn: &'a WriteTransaction,
}

impl TxnView<'_> {
    fn contains(&self, table: RecordTable, id: u64) -> Result<bool, RombelError> {
        let table = self.txn.open_table(table).map_err(storage_err)?;
        Ok(table.get(id).map_err(storage_err)?.is_some())
    }
}

impl CommitView for TxnView<'_> {
    fn class_version(&self, id: ClassId) -> Result<Option<u64>, RombelError> {
        let table = self.txn.open_table(CLASSES).map_err(storage_err)?;
        match table.get(id.0).map_err(storage_err)? {
            Some(bytes) => decode::<ClassRecord>(bytes.value()).map(|c| Some(c.version)),
            None => Ok(None),
        }
    }

    fn enrollment_record(
        &self,
        id: EnrollmentId,
    ) -> Result<Option<EnrollmentRecord>, RombelError> {
        let table = self.txn.open_table(ENROLLMENTS).map_err(storage_err)?;
        match table.get(id.0).map_err(storage_err)? {
            Some(bytes) => decode(bytes.value()).map(Some),
            None => Ok(None),
        }
    }

    fn active_of(&self, student: StudentId) -> Result<Option<EnrollmentId>, RombelError> {
        let table = self.txn.open_table(ACTIVE).map_err(storage_err)?;
        Ok(table
            .get(student.0)
            .map_err(storage_err)?
            .map(|v| EnrollmentId(v.value())))
    }

    fn has_transfer(&self, id: TransferId) -> Result<bool, RombelError> {
        self.contains(TRANSFERS, id.0)
    }

    fn has_exit(&self, id: ExitId) -> Result<bool, RombelError> {
        self.contains(EXITS, id.0)
    }
}

impl EnrollmentStore for RedbStore {
    fn class(&self, id: ClassId) -> Result<Option<ClassRecord>, RombelError> {
        self.get_record(CLASSES, id.0)
    }

    fn classes(&self) -> Result<Vec<ClassRecord>, RombelError> {
        self.scan(CLASSES)
    }

    fn enrollment(&self, id: EnrollmentId) -> Result<Option<EnrollmentRecord>, RombelError> {
        self.get_record(ENROLLMENTS, id.0)
    }

    fn active_enrollment(
        &self,
        student: StudentId,
    ) -> Result<Option<EnrollmentRecord>, RombelError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let active = read_txn.open_table(ACTIVE).map_err(storage_err)?;
        let Some(enrollment_id) = active
            .get(student.0)
            .map_err(storage_err)?
            .map(|v| v.value())
        else {
            return Ok(None);
        };
        let enrollments = read_txn.open_table(ENROLLMENTS).map_err(storage_err)?;
        match enrollments.get(enrollment_id).map_err(storage_err)? {
            Some(bytes) => decode(bytes.value()).map(Some),
            None => Err(RombelError::Storage(format!(
                "active index points at missing enrollment {}",
                enrollment_id
            ))),
        }
    }

    fn enrollments_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<EnrollmentRecord>, RombelError> {
        self.indexed(STUDENT_INDEX, student.0)
    }

    fn enrollments_for_class(
        &self,
        class: ClassId,
    ) -> Result<Vec<EnrollmentRecord>, RombelError> {
        self.indexed(CLASS_INDEX, class.0)
    }

    fn enrollments(&self) -> Result<Vec<EnrollmentRecord>, RombelError> {
        self.scan(ENROLLMENTS)
    }

    fn transfers(&self) -> Result<Vec<TransferRecord>, RombelError> {
        self.scan(TRANSFERS)
    }

    fn exits(&self) -> Result<Vec<ExitRecord>, RombelError> {
        self.scan(EXITS)
    }

    fn max_ids(&self) -> Result<MaxIds, RombelError> {
        Ok(MaxIds {
            class: self.last_key(CLASSES)?,
            enrollment: self.last_key(ENROLLMENTS)?,
            transfer: self.last_key(TRANSFERS)?,
            exit: self.last_key(EXITS)?,
        })
    }

    fn commit(&mut self, changeset: &Changeset) -> Result<(), RombelError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        // An early return drops the transaction uncommitted, which aborts it.
        check_changeset(&TxnView { txn: &write_txn }, changeset)?;
        Self::apply(&write_txn, changeset)?;
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
