//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Every command opens the configured backend, runs one core operation and,
//! for the `file` backend, writes the snapshot back after a mutation.

use super::ClassCommand;
use crate::api::{self, AppState};
use crate::config::{Backend, Settings};
use crate::storage::{open_service, read_bounded, save_service, save_snapshot_file};
use rombel_core::{
    AcademicYear, AssignRequest, AssignmentType, ClassFilter, ClassId, ClassPatch, ClassRecord,
    EnrollmentRecord, EnrollmentService, ExitFilter, ExitRequest, ExitType, HistoryEvent,
    NewClass, Registry, RombelError, Snapshot, StudentId, TransferFilter, TransferRequest,
    formats::MAX_SNAPSHOT_SIZE, snapshot_from_bytes, snapshot_to_bytes,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a student id list for `bulk-assign --file` (1 MB).
const MAX_ID_FILE_SIZE: u64 = 1024 * 1024;

/// Validate an input path: it must exist and be a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, RombelError> {
    let canonical = path.canonicalize().map_err(|e| {
        RombelError::Storage(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(RombelError::Storage(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate an output path: its parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, RombelError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        RombelError::Storage(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(RombelError::Storage(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| RombelError::Storage("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// OUTPUT
// =============================================================================

/// Output mode chosen with `--json-mode`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// Print `value` as pretty JSON, or hand it to `human` for text output.
    fn emit<T: Serialize>(self, value: &T, human: impl FnOnce(&T)) -> Result<(), RombelError> {
        if self.json {
            let text = serde_json::to_string_pretty(value)
                .map_err(|e| RombelError::Serialization(e.to_string()))?;
            println!("{}", text);
        } else {
            human(value);
        }
        Ok(())
    }
}

fn print_class(class: &ClassRecord) {
    println!(
        "{:>4}  {:<20} grade {:>2}  {}  {:>3}/{:<3} {:<8} {}",
        class.id,
        class.name,
        class.grade,
        class.academic_year,
        class.current_occupancy,
        class.capacity,
        class.status.as_str(),
        class.track.as_deref().unwrap_or("-"),
    );
}

fn print_classes(classes: &[ClassRecord]) {
    if classes.is_empty() {
        println!("No classes");
        return;
    }
    for class in classes {
        print_class(class);
    }
}

fn print_enrollment(record: &EnrollmentRecord) {
    println!(
        "{:>6}  student {:<8} class {:<5} {}  {:<11} {:<11} {}",
        record.id,
        record.student_id,
        record.class_id,
        record.academic_year,
        record.assignment_type.as_str(),
        record.status.as_str(),
        record.assigned_date,
    );
}

fn print_enrollments(records: &[EnrollmentRecord]) {
    if records.is_empty() {
        println!("No enrollment records");
        return;
    }
    for record in records {
        print_enrollment(record);
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(settings: &Settings) -> Result<(), RombelError> {
    let service = open_service(settings)?;
    let state = match settings.backend {
        Backend::File => AppState::with_snapshot_file(service, settings.database.clone()),
        Backend::Redb | Backend::Memory => AppState::new(service),
    };

    println!("Rombel Enrollment Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", settings.host);
    println!("  Port:     {}", settings.port);
    println!("  Backend:  {}", settings.backend);
    println!("  Database: {:?}", settings.database);
    println!();
    println!("Endpoints:");
    println!("  GET  /classes               - List classes");
    println!("  POST /enrollments           - Assign a student");
    println!("  POST /enrollments/bulk      - Assign a batch");
    println!("  POST /transfers             - Transfer a student");
    println!("  POST /exits                 - Record an exit");
    println!("  GET  /students/{{id}}/history - Student timeline");
    println!("  GET  /integrity             - Invariant audit");
    println!("  GET  /health                - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&settings.bind_address(), state).await
}

// =============================================================================
// STATUS / CHECK COMMANDS
// =============================================================================

/// Show store-wide counts.
pub fn cmd_status(settings: &Settings, out: Output) -> Result<(), RombelError> {
    let service = open_service(settings)?;
    let summary = service.history().summary()?;
    let year = service.registry().current_academic_year()?;

    let output = serde_json::json!({
        "database": settings.database.to_string_lossy(),
        "backend": settings.backend.to_string(),
        "academic_year": year.to_string(),
        "summary": summary,
    });
    out.emit(&output, |_| {
        println!("Rombel Status");
        println!("=============");
        println!("Database: {:?}", settings.database);
        println!("Backend:  {}", settings.backend);
        println!("Year:     {}", year);
        println!();
        println!(
            "Classes:      {} ({} active)",
            summary.classes, summary.active_classes
        );
        println!(
            "Seats:        {} / {} occupied",
            summary.total_occupancy, summary.total_capacity
        );
        println!(
            "Enrollments:  {} ({} active)",
            summary.enrollments, summary.active_enrollments
        );
        println!("Transfers:    {}", summary.transfers);
        println!("Exits:        {}", summary.exits);
    })
}

/// Audit the occupancy and single-active invariants.
pub fn cmd_check(settings: &Settings, out: Output) -> Result<(), RombelError> {
    let service = open_service(settings)?;
    let report = service.history().integrity_report()?;

    out.emit(&report, |report| {
        println!(
            "Checked {} classes, {} enrollment records",
            report.classes_checked, report.enrollments_checked
        );
        if report.is_clean() {
            println!("OK: every occupancy counter matches its active records");
            return;
        }
        for m in &report.occupancy_mismatches {
            println!(
                "  class {}: counter {} but {} active records",
                m.class_id, m.recorded, m.actual
            );
        }
        for class in &report.over_capacity {
            println!("  class {}: over capacity", class);
        }
        for student in &report.multiple_active {
            println!("  student {}: more than one active record", student);
        }
        for record in &report.orphaned_active {
            println!("  enrollment {}: active in a missing class", record);
        }
    })
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(settings: &Settings, force: bool) -> Result<(), RombelError> {
    let path = &settings.database;
    if settings.backend == Backend::Memory {
        println!("Memory backend keeps no database; nothing to initialize");
        return Ok(());
    }
    prepare_target(path, force)?;

    match settings.backend {
        Backend::Redb => {
            let _registry = Registry::open_redb(path)?;
            println!("Initialized new redb database at {:?}", path);
        }
        _ => {
            let service = EnrollmentService::new(Arc::new(Registry::in_memory()));
            save_snapshot_file(&service, path)?;
            println!("Initialized new snapshot file at {:?}", path);
        }
    }

    Ok(())
}

/// Refuse to touch an existing database unless `force` is set, in which case
/// it is removed.
fn prepare_target(path: &Path, force: bool) -> Result<(), RombelError> {
    if !path.exists() {
        return Ok(());
    }
    if !force {
        return Err(RombelError::InvalidRequest(
            "Database already exists. Use --force to overwrite.".to_string(),
        ));
    }
    std::fs::remove_file(path)
        .map_err(|e| RombelError::Storage(format!("Remove {}: {}", path.display(), e)))?;
    tracing::warn!(path = %path.display(), "existing database removed");
    Ok(())
}

// =============================================================================
// CLASS COMMANDS
// =============================================================================

/// Run a `class` subcommand.
pub fn cmd_class(settings: &Settings, out: Output, action: ClassCommand) -> Result<(), RombelError> {
    let service = open_service(settings)?;

    match action {
        ClassCommand::Create {
            name,
            grade,
            capacity,
            track,
            year,
            teacher,
        } => {
            let academic_year = match year {
                Some(year) => year,
                None => service.registry().current_academic_year()?,
            };
            let class = service.classes().create(NewClass {
                name,
                grade,
                track,
                academic_year,
                homeroom_teacher: teacher,
                capacity,
            })?;
            save_service(&service, settings)?;
            out.emit(&class, |c| {
                print!("Created class: ");
                print_class(c);
            })
        }
        ClassCommand::Update {
            id,
            name,
            grade,
            capacity,
            track,
            year,
            teacher,
            status,
        } => {
            let class = service.classes().update(
                ClassId(id),
                ClassPatch {
                    name,
                    grade,
                    track,
                    academic_year: year,
                    homeroom_teacher: teacher,
                    capacity,
                    status,
                },
            )?;
            save_service(&service, settings)?;
            out.emit(&class, |c| {
                print!("Updated class: ");
                print_class(c);
            })
        }
        ClassCommand::Delete { id } => {
            let class = service.classes().delete(ClassId(id))?;
            save_service(&service, settings)?;
            out.emit(&class, |c| println!("Deleted class {} ({})", c.id, c.name))
        }
        ClassCommand::Show { id } => {
            let class = service.classes().get(ClassId(id))?;
            out.emit(&class, |c| {
                println!("Class {}", c.id);
                println!("  Name:      {}", c.name);
                println!("  Grade:     {}", c.grade);
                println!("  Track:     {}", c.track.as_deref().unwrap_or("-"));
                println!("  Year:      {}", c.academic_year);
                println!(
                    "  Homeroom:  {}",
                    c.homeroom_teacher.as_deref().unwrap_or("-")
                );
                println!(
                    "  Occupancy: {} / {} ({} free)",
                    c.current_occupancy,
                    c.capacity,
                    c.free_seats()
                );
                println!("  Status:    {}", c.status.as_str());
            })
        }
        ClassCommand::List {
            grade,
            year,
            track,
            status,
            search,
        } => {
            let classes = service.classes().list(&ClassFilter {
                grade,
                academic_year: year,
                track,
                status,
                search,
            })?;
            out.emit(&classes, |c| print_classes(c))
        }
        ClassCommand::Available { min_free } => {
            let classes = service.classes().available(min_free)?;
            out.emit(&classes, |c| print_classes(c))
        }
        ClassCommand::Adjust { id, delta } => {
            let class = service.classes().adjust_occupancy(ClassId(id), delta)?;
            save_service(&service, settings)?;
            out.emit(&class, |c| {
                print!("Adjusted occupancy: ");
                print_class(c);
            })
        }
    }
}

// =============================================================================
// ENROLLMENT COMMANDS
// =============================================================================

/// Assign one student.
pub fn cmd_assign(
    settings: &Settings,
    out: Output,
    student: u64,
    class: u64,
    assignment_type: AssignmentType,
    year: Option<AcademicYear>,
    notes: String,
) -> Result<(), RombelError> {
    let service = open_service(settings)?;

    let mut request = AssignRequest::new(StudentId(student), ClassId(class))
        .with_type(assignment_type)
        .with_notes(notes);
    if let Some(year) = year {
        request = request.in_year(year);
    }

    let record = service.assign(&request)?;
    save_service(&service, settings)?;
    out.emit(&record, |r| {
        println!(
            "Assigned student {} to class {} (enrollment {}, {})",
            r.student_id, r.class_id, r.id, r.academic_year
        );
    })
}

/// Parse a student id list: one id per line, blank lines and `#` comments
/// ignored.
pub fn parse_student_ids(text: &str) -> Result<Vec<StudentId>, RombelError> {
    text.lines()
        .enumerate()
        .map(|(n, line)| (n, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| {
            line.parse::<u64>().map(StudentId).map_err(|_| {
                RombelError::InvalidRequest(format!(
                    "Line {}: invalid student id {:?}",
                    n + 1,
                    line
                ))
            })
        })
        .collect()
}

/// Assign a batch of students to one class.
pub fn cmd_bulk_assign(
    settings: &Settings,
    out: Output,
    class: u64,
    students: Vec<u64>,
    file: Option<&Path>,
    notes: &str,
) -> Result<(), RombelError> {
    let mut ids: Vec<StudentId> = students.into_iter().map(StudentId).collect();
    if let Some(file) = file {
        let path = validate_file_path(file)?;
        let data = read_bounded(&path, MAX_ID_FILE_SIZE)?;
        ids.extend(parse_student_ids(&String::from_utf8_lossy(&data))?);
    }
    if ids.is_empty() {
        return Err(RombelError::InvalidRequest(
            "No students given. Use --students or --file.".to_string(),
        ));
    }

    let service = open_service(settings)?;
    let outcome = service.bulk_assign_each(&ids, ClassId(class), notes, |student, result| {
        if out.json {
            return;
        }
        match result {
            Ok(record) => println!("  ok      student {} -> enrollment {}", student, record.id),
            Err(err) => println!("  FAILED  student {}: {}", student, err),
        }
    })?;
    save_service(&service, settings)?;

    out.emit(&outcome, |o| {
        println!();
        println!(
            "Bulk assignment to class {}: {} succeeded, {} failed",
            class, o.success_count, o.failure_count
        );
    })
}

/// Transfer a student between classes.
pub fn cmd_transfer(
    settings: &Settings,
    out: Output,
    request: TransferRequest,
) -> Result<(), RombelError> {
    let service = open_service(settings)?;
    let outcome = service.transfer(&request)?;
    save_service(&service, settings)?;
    out.emit(&outcome, |o| {
        println!(
            "Transferred student {} from class {} to class {} (transfer {}, new enrollment {})",
            o.transfer.student_id,
            o.transfer.from_class_id,
            o.transfer.to_class_id,
            o.transfer.id,
            o.opened.id
        );
    })
}

/// Record a student's exit.
pub fn cmd_exit(settings: &Settings, out: Output, request: ExitRequest) -> Result<(), RombelError> {
    let service = open_service(settings)?;
    let outcome = service.exit(&request)?;
    save_service(&service, settings)?;
    out.emit(&outcome, |o| {
        println!(
            "Student {} exited from class {} ({}, exit record {})",
            o.exit.student_id, o.exit.last_class_id, o.exit.exit_type, o.exit.id
        );
    })
}

// =============================================================================
// QUERY COMMANDS
// =============================================================================

pub fn cmd_roster(settings: &Settings, out: Output, class: u64) -> Result<(), RombelError> {
    let service = open_service(settings)?;
    let roster = service.class_roster(ClassId(class))?;
    out.emit(&roster, |r| print_enrollments(r))
}

pub fn cmd_history(settings: &Settings, out: Output, student: u64) -> Result<(), RombelError> {
    let service = open_service(settings)?;
    let events = service.student_history(StudentId(student))?;
    out.emit(&events, |events| {
        if events.is_empty() {
            println!("No history for student {}", student);
        }
        for event in events {
            match event {
                HistoryEvent::Assigned(r) => println!(
                    "{}  assigned     class {} ({}, {}, now {})",
                    r.assigned_date,
                    r.class_id,
                    r.academic_year,
                    r.assignment_type.as_str(),
                    r.status.as_str()
                ),
                HistoryEvent::Transferred(t) => println!(
                    "{}  transferred  class {} -> {} ({}; approved by {})",
                    t.transfer_date, t.from_class_id, t.to_class_id, t.reason, t.approved_by
                ),
                HistoryEvent::Exited(e) => println!(
                    "{}  exited       class {} ({}; {})",
                    e.exit_date,
                    e.last_class_id,
                    e.exit_type,
                    e.destination.as_deref().unwrap_or("-")
                ),
            }
        }
    })
}

pub fn cmd_class_history(settings: &Settings, out: Output, class: u64) -> Result<(), RombelError> {
    let service = open_service(settings)?;
    let records = service.class_history(ClassId(class))?;
    out.emit(&records, |r| print_enrollments(r))
}

pub fn cmd_stats(
    settings: &Settings,
    out: Output,
    class: u64,
    year: Option<AcademicYear>,
) -> Result<(), RombelError> {
    let service = open_service(settings)?;
    let year = match year {
        Some(year) => year,
        None => service.registry().current_academic_year()?,
    };
    let stats = service.class_stats_by_year(ClassId(class), year)?;
    out.emit(&stats, |s| {
        println!("Class {} in {}", s.class_id, s.academic_year);
        println!("  Enrollments:     {}", s.total_enrollments);
        println!("  Active:          {}", s.active);
        println!("  Transferred out: {}", s.transferred_out);
        println!("  Exited:          {}", s.exited);
        println!(
            "  By type:         {} initial, {} transfer in, {} promotion",
            s.initial, s.transfers_in, s.promotions
        );
        println!("  Occupancy:       {} / {}", s.current_occupancy, s.capacity);
    })
}

pub fn cmd_transfers(
    settings: &Settings,
    out: Output,
    student: Option<u64>,
    from: Option<u64>,
    to: Option<u64>,
) -> Result<(), RombelError> {
    let service = open_service(settings)?;
    let transfers = service.history().transfers(&TransferFilter {
        student_id: student.map(StudentId),
        from_class_id: from.map(ClassId),
        to_class_id: to.map(ClassId),
    })?;
    out.emit(&transfers, |transfers| {
        if transfers.is_empty() {
            println!("No transfers");
        }
        for t in transfers {
            println!(
                "{:>5}  {}  student {:<8} {} -> {}  {} (approved by {})",
                t.id,
                t.transfer_date,
                t.student_id,
                t.from_class_id,
                t.to_class_id,
                t.reason,
                t.approved_by
            );
        }
    })
}

pub fn cmd_exits(
    settings: &Settings,
    out: Output,
    student: Option<u64>,
    exit_type: Option<ExitType>,
) -> Result<(), RombelError> {
    let service = open_service(settings)?;
    let exits = service.history().exits(&ExitFilter {
        student_id: student.map(StudentId),
        exit_type,
    })?;
    out.emit(&exits, |exits| {
        if exits.is_empty() {
            println!("No exits");
        }
        for e in exits {
            println!(
                "{:>5}  {}  student {:<8} {:<12} from class {}  {}",
                e.id,
                e.exit_date,
                e.student_id,
                e.exit_type,
                e.last_class_id,
                e.destination.as_deref().unwrap_or("-")
            );
        }
    })
}

// =============================================================================
// EXPORT / IMPORT COMMANDS
// =============================================================================

/// Export every record.
pub fn cmd_export(settings: &Settings, output: &Path, format: &str) -> Result<(), RombelError> {
    let validated_output = validate_output_path(output)?;
    let service = open_service(settings)?;
    let snapshot = service.registry().snapshot()?;

    let data = match format {
        "snapshot" => snapshot_to_bytes(&snapshot)?,
        "json" => serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| RombelError::Serialization(e.to_string()))?,
        _ => {
            return Err(RombelError::InvalidRequest(format!(
                "Unknown format: {}. Use: snapshot, json",
                format
            )));
        }
    };

    std::fs::write(&validated_output, &data)
        .map_err(|e| RombelError::Storage(format!("Write file: {}", e)))?;

    println!(
        "Exported {} classes, {} enrollments ({} bytes) to {:?}",
        snapshot.classes.len(),
        snapshot.enrollments.len(),
        data.len(),
        validated_output
    );
    Ok(())
}

/// Decode an export in either format.
pub fn decode_export(data: &[u8]) -> Result<Snapshot, RombelError> {
    match snapshot_from_bytes(data) {
        Ok(snapshot) => Ok(snapshot),
        Err(binary_err) => serde_json::from_slice::<Snapshot>(data).map_err(|_| binary_err),
    }
}

/// Import an export into a fresh database.
pub fn cmd_import(settings: &Settings, input: &Path, force: bool) -> Result<(), RombelError> {
    let validated_path = validate_file_path(input)?;
    let data = read_bounded(&validated_path, MAX_SNAPSHOT_SIZE as u64)?;
    let snapshot = decode_export(&data)?;
    snapshot.validate()?;

    let path = &settings.database;
    match settings.backend {
        Backend::Memory => {
            return Err(RombelError::InvalidRequest(
                "Import needs a persistent backend (redb or file)".to_string(),
            ));
        }
        Backend::Redb => {
            prepare_target(path, force)?;
            let registry = Registry::open_redb(path)?;
            registry.commit(&snapshot.to_changeset())?;
        }
        Backend::File => {
            let registry = Registry::from_snapshot(&snapshot)?;
            prepare_target(path, force)?;
            save_snapshot_file(&EnrollmentService::new(Arc::new(registry)), path)?;
        }
    }

    println!(
        "Imported {} classes, {} enrollments, {} transfers, {} exits into {:?}",
        snapshot.classes.len(),
        snapshot.enrollments.len(),
        snapshot.transfers.len(),
        snapshot.exits.len(),
        path
    );
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, Overrides};

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

    fn create_class(settings: &Settings, name: &str, capacity: u32) {
        cmd_class(
            settings,
            Output::default(),
            ClassCommand::Create {
                name: name.to_string(),
                grade: 10,
                capacity,
                track: None,
                year: Some(AcademicYear::new(2024).expect("year")),
                teacher: None,
            },
        )
        .expect("create class");
    }

    #[test]
    fn student_id_files_skip_comments() {
        let ids = parse_student_ids("# angkatan 2024\n101\n\n 102 \n").expect("parse");
        assert_eq!(ids, vec![StudentId(101), StudentId(102)]);

        assert!(matches!(
            parse_student_ids("101\nabc\n"),
            Err(RombelError::InvalidRequest(msg)) if msg.contains("Line 2")
        ));
    }

    #[test]
    fn file_backend_commands_persist_between_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(Backend::File, &dir.path().join("rombel.snap"));

        create_class(&settings, "X-1", 2);
        cmd_bulk_assign(&settings, Output { json: true }, 1, vec![1, 2, 3], None, "PPDB")
            .expect("bulk");

        let service = open_service(&settings).expect("open");
        assert_eq!(service.class_roster(ClassId(1)).expect("roster").len(), 2);
        assert!(service.history().integrity_report().expect("report").is_clean());
    }

    #[test]
    fn redb_export_import_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = settings(Backend::Redb, &dir.path().join("source.redb"));
        create_class(&source, "X-1", 5);
        cmd_assign(
            &source,
            Output::default(),
            7,
            1,
            AssignmentType::Initial,
            None,
            String::new(),
        )
        .expect("assign");

        let export = dir.path().join("export.json");
        cmd_export(&source, &export, "json").expect("export");

        let target = settings(Backend::Redb, &dir.path().join("target.redb"));
        cmd_import(&target, &export, false).expect("import");

        let a = open_service(&source).expect("open source");
        let b = open_service(&target).expect("open target");
        assert_eq!(
            a.registry().snapshot().expect("snapshot"),
            b.registry().snapshot().expect("snapshot")
        );
    }

    #[test]
    fn import_refuses_edited_occupancy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = settings(Backend::Redb, &dir.path().join("source.redb"));
        create_class(&source, "X-1", 5);
        cmd_assign(
            &source,
            Output::default(),
            7,
            1,
            AssignmentType::Initial,
            None,
            String::new(),
        )
        .expect("assign");

        let export = dir.path().join("export.json");
        cmd_export(&source, &export, "json").expect("export");
        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&export).expect("read")).expect("json");
        doc["classes"][0]["current_occupancy"] = serde_json::json!(0);
        std::fs::write(&export, serde_json::to_vec(&doc).expect("encode")).expect("write");

        let target_path = dir.path().join("target.redb");
        let target = settings(Backend::Redb, &target_path);
        assert!(matches!(
            cmd_import(&target, &export, false),
            Err(RombelError::Serialization(msg)) if msg.contains("occupancy")
        ));
        assert!(!target_path.exists());

        let file_target = settings(Backend::File, &dir.path().join("target.snap"));
        assert!(cmd_import(&file_target, &export, false).is_err());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(Backend::File, &dir.path().join("rombel.snap"));

        cmd_init(&settings, false).expect("init");
        assert!(matches!(
            cmd_init(&settings, false),
            Err(RombelError::InvalidRequest(_))
        ));
        cmd_init(&settings, true).expect("forced init");
    }

    #[test]
    fn unknown_export_format_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(Backend::Memory, &dir.path().join("unused"));
        assert!(matches!(
            cmd_export(&settings, &dir.path().join("out"), "csv"),
            Err(RombelError::InvalidRequest(_))
        ));
    }
}
