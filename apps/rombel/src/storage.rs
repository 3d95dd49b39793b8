//! # Backend Loading
//!
//! Opens the enrollment service for the configured backend and writes the
//! snapshot file back for the `file` backend.

use crate::config::{Backend, Settings};
use rombel_core::{
    EnrollmentService, Registry, RombelError, formats::MAX_SNAPSHOT_SIZE, snapshot_from_bytes,
    snapshot_to_bytes,
};
use std::path::Path;
use std::sync::Arc;

/// Open the service described by `settings`.
///
/// - `redb`: opens or creates the database file
/// - `file`: loads the snapshot file if it exists, else starts empty
/// - `memory`: starts empty
pub fn open_service(settings: &Settings) -> Result<EnrollmentService, RombelError> {
    let registry = match settings.backend {
        Backend::Redb => Registry::open_redb(&settings.database)?,
        Backend::File => {
            if settings.database.exists() {
                load_snapshot_file(&settings.database)?
            } else {
                Registry::in_memory()
            }
        }
        Backend::Memory => Registry::in_memory(),
    };

    let registry = match settings.student_roster() {
        Some(roster) => {
            tracing::info!(students = roster.len(), "using configured student roster");
            registry.with_students(roster)
        }
        None => registry,
    };

    Ok(EnrollmentService::new(Arc::new(registry)))
}

/// Persist the service state if the backend needs it.
///
/// Only the `file` backend writes anything; redb commits on every command
/// and memory never persists.
pub fn save_service(service: &EnrollmentService, settings: &Settings) -> Result<(), RombelError> {
    match settings.backend {
        Backend::File => save_snapshot_file(service, &settings.database),
        Backend::Redb | Backend::Memory => Ok(()),
    }
}

/// Read a snapshot file into an in-memory registry.
pub fn load_snapshot_file(path: &Path) -> Result<Registry, RombelError> {
    let data = read_bounded(path, MAX_SNAPSHOT_SIZE as u64)?;
    Registry::from_snapshot(&snapshot_from_bytes(&data)?)
}

/// Write the service state to `path`, replacing it atomically.
pub fn save_snapshot_file(service: &EnrollmentService, path: &Path) -> Result<(), RombelError> {
    let data = snapshot_to_bytes(&service.registry().snapshot()?)?;

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &data)
        .map_err(|e| RombelError::Storage(format!("Write {}: {}", tmp.display(), e)))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| RombelError::Storage(format!("Rename to {}: {}", path.display(), e)))?;

    tracing::debug!(path = %path.display(), bytes = data.len(), "snapshot written");
    Ok(())
}

/// Read a whole file, refusing anything larger than `max_size`.
pub fn read_bounded(path: &Path, max_size: u64) -> Result<Vec<u8>, RombelError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        RombelError::Storage(format!("Cannot read '{}': {}", path.display(), e))
    })?;
    if metadata.len() > max_size {
        return Err(RombelError::Serialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    std::fs::read(path)
        .map_err(|e| RombelError::Storage(format!("Read {}: {}", path.display(), e)))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, Overrides};
    use rombel_core::{AcademicYear, AssignRequest, NewClass, StudentId};

    fn settings(backend: Backend, database: &Path) -> Settings {
        Settings::resolve(
            FileConfig::default(),
            Overrides {
                database: Some(database.to_path_buf()),
                backend: Some(backend),
                ..Overrides::default()
            },
        )
    }

    fn seed(service: &EnrollmentService) {
        let class = service
            .classes()
            .create(NewClass {
                name: "X IPA 1".to_string(),
                grade: 10,
                track: Some("IPA".to_string()),
                academic_year: AcademicYear::new(2024).expect("year"),
                homeroom_teacher: None,
                capacity: 32,
            })
            .expect("create");
        service
            .assign(&AssignRequest::new(StudentId(7), class.id))
            .expect("assign");
    }

    #[test]
    fn file_backend_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(Backend::File, &dir.path().join("rombel.snap"));

        let service = open_service(&settings).expect("open");
        seed(&service);
        save_service(&service, &settings).expect("save");

        let reopened = open_service(&settings).expect("reopen");
        assert_eq!(
            reopened.registry().snapshot().expect("snapshot"),
            service.registry().snapshot().expect("snapshot")
        );
    }

    #[test]
    fn memory_backend_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rombel.snap");
        let settings = settings(Backend::Memory, &path);

        let service = open_service(&settings).expect("open");
        seed(&service);
        save_service(&service, &settings).expect("save");
        assert!(!path.exists());
    }

    #[test]
    fn roster_restricts_students() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = settings(Backend::Memory, &dir.path().join("unused"));
        settings.roster = Some(vec![StudentId(7)]);

        let service = open_service(&settings).expect("open");
        seed(&service);
        assert!(matches!(
            service.ledger().active_enrollment(StudentId(8)),
            Err(RombelError::NotFound { .. })
        ));
    }

    #[test]
    fn oversized_files_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("big");
        std::fs::write(&path, vec![0u8; 16]).expect("write");
        assert!(matches!(
            read_bounded(&path, 8),
            Err(RombelError::Serialization(_))
        ));
    }
}
