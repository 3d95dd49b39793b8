//! # Ledger Benchmarks
//!
//! Throughput of the enrollment commands on the in-memory backend.
//!
//! Run with: `cargo bench -p rombel-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rombel_core::{
    AcademicYear, AssignRequest, ClassId, EnrollmentService, NewClass, Registry, StudentId,
    TransferRequest,
};
use std::hint::black_box;
use std::sync::Arc;

fn service_with_class(capacity: u32) -> (EnrollmentService, ClassId) {
    let service = EnrollmentService::new(Arc::new(Registry::in_memory()));
    let class = service
        .classes()
        .create(NewClass {
            name: "X-1".to_string(),
            grade: 10,
            track: None,
            academic_year: AcademicYear::new(2024).expect("year"),
            homeroom_teacher: None,
            capacity,
        })
        .expect("create")
        .id;
    (service, class)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_assign(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign");

    for size in [10u64, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let (service, class) = service_with_class(size as u32);
                for student in 0..size {
                    let _ = service.assign(&AssignRequest::new(StudentId(student), class));
                }
                black_box(service)
            });
        });
    }

    group.finish();
}

fn bench_bulk_assign(c: &mut Criterion) {
    let ids: Vec<StudentId> = (0..1000).map(StudentId).collect();
    c.bench_function("bulk_assign_1000", |b| {
        b.iter(|| {
            let (service, class) = service_with_class(1000);
            black_box(service.bulk_assign(&ids, class, "").expect("bulk"))
        });
    });
}

fn bench_transfer(c: &mut Criterion) {
    let (service, a) = service_with_class(10);
    let b_class = service
        .classes()
        .create(NewClass {
            name: "X-2".to_string(),
            grade: 10,
            track: None,
            academic_year: AcademicYear::new(2024).expect("year"),
            homeroom_teacher: None,
            capacity: 10,
        })
        .expect("create")
        .id;
    service
        .assign(&AssignRequest::new(StudentId(1), a))
        .expect("assign");

    let mut from = a;
    let mut to = b_class;
    c.bench_function("transfer_round_trip", |b| {
        b.iter(|| {
            let outcome = service
                .transfer(&TransferRequest {
                    student_id: StudentId(1),
                    from_class_id: from,
                    to_class_id: to,
                    reason: "bench".to_string(),
                    approved_by: "bench".to_string(),
                    notes: String::new(),
                })
                .expect("transfer");
            std::mem::swap(&mut from, &mut to);
            black_box(outcome)
        });
    });
}

criterion_group!(benches, bench_assign, bench_bulk_assign, bench_transfer);
criterion_main!(benches);
