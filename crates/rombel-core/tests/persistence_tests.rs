//! # Persistence Tests
//!
//! The redb backend and the snapshot format must carry the full enrollment
//! state across restarts.

use chrono::NaiveDate;
use rombel_core::{
    AcademicYear, AssignRequest, ClassId, EnrollmentService, ExitFilter, ExitRequest, ExitType,
    FixedClock, NewClass, Registry, RombelError, StudentId, TransferRequest,
    snapshot_from_bytes, snapshot_to_bytes,
};
use std::sync::Arc;
use tempfile::tempdir;

fn new_class(name: &str, capacity: u32) -> NewClass {
    NewClass {
        name: name.to_string(),
        grade: 12,
        track: Some("Multimedia".to_string()),
        academic_year: AcademicYear::new(2024).expect("year"),
        homeroom_teacher: Some("Ahmad Fauzi, S.Pd".to_string()),
        capacity,
    }
}

fn populate(service: &EnrollmentService) -> (ClassId, ClassId) {
    let a = service.classes().create(new_class("XII MM 1", 30)).expect("a").id;
    let b = service.classes().create(new_class("XII MM 2", 30)).expect("b").id;
    service
        .bulk_assign(&[StudentId(1), StudentId(2), StudentId(3)], a, "PPDB")
        .expect("bulk");
    service
        .transfer(&TransferRequest {
            student_id: StudentId(2),
            from_class_id: a,
            to_class_id: b,
            reason: "Jadwal".to_string(),
            approved_by: "Wakasek".to_string(),
            notes: String::new(),
        })
        .expect("transfer");
    service
        .exit(&ExitRequest {
            student_id: StudentId(3),
            exit_type: ExitType::Other("mutasi luar negeri".to_string()),
            destination: Some("Singapore".to_string()),
            reason: "Ikut orang tua".to_string(),
            approved_by: "Kepala Sekolah".to_string(),
            notes: String::new(),
        })
        .expect("exit");
    (a, b)
}

#[test]
fn redb_state_survives_reopen() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("rombel.redb");

    let (a, b) = {
        let service = EnrollmentService::new(Arc::new(Registry::open_redb(&path).expect("open")));
        assert!(service.registry().is_persistent());
        populate(&service)
    };

    let service = EnrollmentService::new(Arc::new(Registry::open_redb(&path).expect("reopen")));
    assert_eq!(service.classes().get(a).expect("get").current_occupancy, 1);
    assert_eq!(service.classes().get(b).expect("get").current_occupancy, 1);
    assert_eq!(service.student_history(StudentId(2)).expect("history").len(), 3);
    let exits = service.history().exits(&ExitFilter::default()).expect("exits");
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].exit_type.as_str(), "mutasi luar negeri");
    assert!(service.history().integrity_report().expect("report").is_clean());

    // Sequences resume after the stored ids.
    let c = service.classes().create(new_class("XII MM 3", 30)).expect("c");
    assert_eq!(c.id, ClassId(3));
    let record = service
        .assign(&AssignRequest::new(StudentId(9), c.id))
        .expect("assign");
    assert_eq!(record.id.value(), 5);
}

#[test]
fn snapshot_export_import_preserves_state() {
    let source = EnrollmentService::new(Arc::new(Registry::in_memory()));
    let (a, _) = populate(&source);

    let bytes = snapshot_to_bytes(&source.registry().snapshot().expect("snapshot")).expect("encode");
    let restored = Registry::from_snapshot(&snapshot_from_bytes(&bytes).expect("decode"))
        .expect("restore");
    let target = EnrollmentService::new(Arc::new(restored));

    assert_eq!(
        source.class_roster(a).expect("roster"),
        target.class_roster(a).expect("roster")
    );
    assert_eq!(
        source.registry().snapshot().expect("snapshot"),
        target.registry().snapshot().expect("snapshot")
    );
}

#[test]
fn inconsistent_snapshots_are_refused() {
    let source = EnrollmentService::new(Arc::new(Registry::in_memory()));
    let (a, _) = populate(&source);
    let clean = source.registry().snapshot().expect("snapshot");
    clean.validate().expect("clean snapshot");

    // Counter no longer matches the active records.
    let mut drifted = clean.clone();
    let class = drifted.classes.iter_mut().find(|c| c.id == a).expect("class");
    class.current_occupancy = 0;
    assert!(matches!(
        Registry::from_snapshot(&drifted),
        Err(RombelError::Serialization(msg)) if msg.contains("occupancy")
    ));

    // Counter matches but exceeds capacity.
    let mut crowded = clean.clone();
    let class = crowded.classes.iter_mut().find(|c| c.id == a).expect("class");
    class.capacity = 0;
    assert!(matches!(
        Registry::from_snapshot(&crowded),
        Err(RombelError::Serialization(msg)) if msg.contains("over capacity")
    ));

    // Active record left pointing at a class that was removed.
    let mut orphaned = clean;
    orphaned.classes.retain(|c| c.id != a);
    assert!(Registry::from_snapshot(&orphaned).is_err());
}

#[test]
fn redb_and_memory_backends_agree() {
    let today = NaiveDate::from_ymd_opt(2025, 1, 6).expect("date");
    let dir = tempdir().expect("tempdir");
    let disk = EnrollmentService::new(Arc::new(
        Registry::open_redb(dir.path().join("rombel.redb"))
            .expect("open")
            .with_clock(FixedClock::new(today)),
    ));
    let memory = EnrollmentService::new(Arc::new(
        Registry::in_memory().with_clock(FixedClock::new(today)),
    ));

    populate(&disk);
    populate(&memory);

    assert_eq!(
        disk.registry().snapshot().expect("snapshot"),
        memory.registry().snapshot().expect("snapshot")
    );
}
