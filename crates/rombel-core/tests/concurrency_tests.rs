//! # Concurrency Tests
//!
//! Many threads hammering the same classes must never overbook a class or
//! leave a student with two active records.

use rombel_core::{
    AcademicYear, AssignRequest, ClassId, EnrollmentService, NewClass, Registry, RombelError,
    StudentId, TransferRequest,
};
use std::sync::{Arc, Barrier};
use std::thread;

fn service() -> EnrollmentService {
    EnrollmentService::new(Arc::new(Registry::in_memory()))
}

fn class(service: &EnrollmentService, name: &str, capacity: u32) -> ClassId {
    service
        .classes()
        .create(NewClass {
            name: name.to_string(),
            grade: 11,
            track: None,
            academic_year: AcademicYear::new(2024).expect("year"),
            homeroom_teacher: None,
            capacity,
        })
        .expect("create")
        .id
}

#[test]
fn concurrent_assignments_never_overbook() {
    let service = service();
    let c = class(&service, "XI-1", 5);
    let barrier = Arc::new(Barrier::new(20));

    let handles: Vec<_> = (0..20u64)
        .map(|student| {
            let service = service.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.assign(&AssignRequest::new(StudentId(student), c))
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 5);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, RombelError::ClassFull { .. }))
    );
    assert_eq!(service.classes().get(c).expect("get").current_occupancy, 5);
    assert!(service.history().integrity_report().expect("report").is_clean());
}

#[test]
fn same_student_racing_into_two_classes_gets_one_seat() {
    for _ in 0..20 {
        let service = service();
        let a = class(&service, "XI-1", 5);
        let b = class(&service, "XI-2", 5);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [a, b]
            .into_iter()
            .map(|target| {
                let service = service.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    service.assign(&AssignRequest::new(StudentId(1), target))
                })
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, RombelError::AlreadyEnrolled { .. }))
        );
        assert!(service.history().integrity_report().expect("report").is_clean());
    }
}

#[test]
fn opposite_direction_transfers_do_not_deadlock() {
    let service = service();
    let a = class(&service, "XI-1", 10);
    let b = class(&service, "XI-2", 10);
    for student in 0..4u64 {
        service
            .assign(&AssignRequest::new(StudentId(student), a))
            .expect("assign a");
        service
            .assign(&AssignRequest::new(StudentId(student + 100), b))
            .expect("assign b");
    }

    let spawn_mover = |student: u64, start: ClassId, other: ClassId| {
        let service = service.clone();
        thread::spawn(move || {
            let (mut from, mut to) = (start, other);
            for _ in 0..25 {
                service
                    .transfer(&TransferRequest {
                        student_id: StudentId(student),
                        from_class_id: from,
                        to_class_id: to,
                        reason: "rotasi".to_string(),
                        approved_by: "admin".to_string(),
                        notes: String::new(),
                    })
                    .expect("transfer");
                std::mem::swap(&mut from, &mut to);
            }
        })
    };

    let mut handles = Vec::new();
    for student in 0..4u64 {
        handles.push(spawn_mover(student, a, b));
        handles.push(spawn_mover(student + 100, b, a));
    }
    for handle in handles {
        handle.join().expect("thread");
    }

    // 25 moves is odd, so every student ends in the class they did not start in.
    assert_eq!(service.classes().get(a).expect("get").current_occupancy, 4);
    assert_eq!(service.classes().get(b).expect("get").current_occupancy, 4);
    let mut in_a: Vec<StudentId> = service
        .class_roster(a)
        .expect("roster")
        .into_iter()
        .map(|r| r.student_id)
        .collect();
    in_a.sort();
    assert_eq!(in_a, (100..104).map(StudentId).collect::<Vec<_>>());
    assert!(service.history().integrity_report().expect("report").is_clean());
}

#[test]
fn readers_see_consistent_snapshots_during_writes() {
    let service = service();
    let c = class(&service, "XI-1", 200);

    let writer = {
        let service = service.clone();
        thread::spawn(move || {
            for student in 0..200u64 {
                service
                    .assign(&AssignRequest::new(StudentId(student), c))
                    .expect("assign");
            }
        })
    };
    let reader = {
        let service = service.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                let report = service.history().integrity_report().expect("report");
                assert!(report.is_clean(), "{:?}", report);
            }
        })
    };

    writer.join().expect("writer");
    reader.join().expect("reader");
    assert_eq!(service.class_roster(c).expect("roster").len(), 200);
}
