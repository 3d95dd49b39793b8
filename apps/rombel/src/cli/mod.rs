//! # Rombel CLI Module
//!
//! This module implements the CLI interface for Rombel.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show store-wide counts
//! - `check` - Audit occupancy counters against active enrollments
//! - `init` - Initialize a new database
//! - `class` - Create, update, delete, show and list classes
//! - `assign` / `bulk-assign` - Place students into a class
//! - `transfer` - Move a student between classes
//! - `exit` - Record a student leaving the school
//! - `roster`, `history`, `class-history`, `stats` - Read-only views
//! - `transfers`, `exits` - Audit trail listings
//! - `export` / `import` - Snapshot files

mod commands;

use crate::config::{Backend, FileConfig, Overrides, Settings};
use clap::{Parser, Subcommand};
use rombel_core::{AcademicYear, AssignmentType, ClassStatus, ExitType, RombelError};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Rombel - student enrollment lifecycle manager
///
/// Assigns students to classes, transfers them between classes and records
/// their exits while keeping every class's occupancy exact.
#[derive(Parser, Debug)]
#[command(name = "rombel")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the configuration file (default: ./rombel.toml if present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend (overrides the config file)
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show store status
    Status,

    /// Audit occupancy and single-active invariants
    Check,

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Manage classes
    Class {
        #[command(subcommand)]
        action: ClassCommand,
    },

    /// Assign a student to a class
    Assign {
        #[arg(short, long)]
        student: u64,

        #[arg(short = 'k', long)]
        class: u64,

        /// initial (ppdb), transfer_in or promotion
        #[arg(short = 't', long, default_value = "initial")]
        assignment_type: AssignmentType,

        /// Academic year, e.g. 2024/2025 (default: current year)
        #[arg(short = 'y', long)]
        year: Option<AcademicYear>,

        #[arg(short, long, default_value = "")]
        notes: String,
    },

    /// Assign many students to one class
    BulkAssign {
        #[arg(short = 'k', long)]
        class: u64,

        /// Student ids (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        students: Vec<u64>,

        /// File with one student id per line
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(short, long, default_value = "")]
        notes: String,
    },

    /// Transfer a student between classes
    Transfer {
        #[arg(short, long)]
        student: u64,

        #[arg(long)]
        from: u64,

        #[arg(long)]
        to: u64,

        #[arg(short, long)]
        reason: String,

        #[arg(short, long)]
        approved_by: String,

        #[arg(short, long, default_value = "")]
        notes: String,
    },

    /// Record a student leaving the school
    Exit {
        #[arg(short, long)]
        student: u64,

        /// graduated, moved_out, dropped_out or a free-form label
        #[arg(short = 't', long)]
        exit_type: ExitType,

        /// Destination school, if any
        #[arg(short, long)]
        destination: Option<String>,

        #[arg(short, long)]
        reason: String,

        #[arg(short, long)]
        approved_by: String,

        #[arg(short, long, default_value = "")]
        notes: String,
    },

    /// Students currently placed in a class
    Roster {
        #[arg(short = 'k', long)]
        class: u64,
    },

    /// A student's assignments, transfers and exits
    History {
        #[arg(short, long)]
        student: u64,
    },

    /// Every enrollment record of a class
    ClassHistory {
        #[arg(short = 'k', long)]
        class: u64,
    },

    /// Per-year statistics of a class
    Stats {
        #[arg(short = 'k', long)]
        class: u64,

        /// Academic year, e.g. 2024/2025 (default: current year)
        #[arg(short = 'y', long)]
        year: Option<AcademicYear>,
    },

    /// List transfer records
    Transfers {
        #[arg(short, long)]
        student: Option<u64>,

        #[arg(long)]
        from: Option<u64>,

        #[arg(long)]
        to: Option<u64>,
    },

    /// List exit records
    Exits {
        #[arg(short, long)]
        student: Option<u64>,

        #[arg(short = 't', long)]
        exit_type: Option<ExitType>,
    },

    /// Export all records to a file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (snapshot, json)
        #[arg(short = 't', long, default_value = "snapshot")]
        format: String,
    },

    /// Import records from a snapshot or JSON export into an empty database
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },
}

/// Class directory subcommands.
#[derive(Subcommand, Debug)]
pub enum ClassCommand {
    /// Create a class
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        grade: u8,

        /// Seats in the class
        #[arg(long)]
        capacity: u32,

        /// Vocational track (jurusan)
        #[arg(short, long)]
        track: Option<String>,

        /// Academic year, e.g. 2024/2025 (default: current year)
        #[arg(short = 'y', long)]
        year: Option<AcademicYear>,

        /// Homeroom teacher (wali kelas)
        #[arg(short = 'w', long)]
        teacher: Option<String>,
    },

    /// Update a class; an empty track or teacher clears it
    Update {
        id: u64,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        grade: Option<u8>,

        #[arg(long)]
        capacity: Option<u32>,

        #[arg(short, long)]
        track: Option<String>,

        #[arg(short = 'y', long)]
        year: Option<AcademicYear>,

        #[arg(short = 'w', long)]
        teacher: Option<String>,

        /// active or inactive
        #[arg(short, long)]
        status: Option<ClassStatus>,
    },

    /// Delete an empty class
    Delete { id: u64 },

    /// Show one class
    Show { id: u64 },

    /// List classes
    List {
        #[arg(short, long)]
        grade: Option<u8>,

        #[arg(short = 'y', long)]
        year: Option<AcademicYear>,

        #[arg(short, long)]
        track: Option<String>,

        #[arg(short, long)]
        status: Option<ClassStatus>,

        /// Case-insensitive match on name, track or teacher
        #[arg(long)]
        search: Option<String>,
    },

    /// Active classes with free seats
    Available {
        #[arg(short, long, default_value = "1")]
        min_free: u32,
    },

    /// Administrative occupancy correction
    Adjust {
        id: u64,

        /// Signed change, e.g. 1 or -1
        #[arg(short, long, allow_hyphen_values = true)]
        delta: i32,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolve settings from the config file and CLI flags.
pub fn resolve_settings(cli: &Cli) -> Result<Settings, RombelError> {
    let file = FileConfig::discover(cli.config.as_deref())?;
    let (host, port) = match &cli.command {
        Some(Commands::Server { host, port }) => (host.clone(), *port),
        _ => (None, None),
    };
    Ok(Settings::resolve(
        file,
        Overrides {
            database: cli.database.clone(),
            backend: cli.backend,
            host,
            port,
        },
    ))
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), RombelError> {
    let settings = resolve_settings(&cli)?;
    let out = Output {
        json: cli.json_mode,
    };

    match cli.command {
        Some(Commands::Server { .. }) => cmd_server(&settings).await,
        Some(Commands::Status) | None => cmd_status(&settings, out),
        Some(Commands::Check) => cmd_check(&settings, out),
        Some(Commands::Init { force }) => cmd_init(&settings, force),
        Some(Commands::Class { action }) => cmd_class(&settings, out, action),
        Some(Commands::Assign {
            student,
            class,
            assignment_type,
            year,
            notes,
        }) => cmd_assign(
            &settings,
            out,
            student,
            class,
            assignment_type,
            year,
            notes,
        ),
        Some(Commands::BulkAssign {
            class,
            students,
            file,
            notes,
        }) => cmd_bulk_assign(&settings, out, class, students, file.as_deref(), &notes),
        Some(Commands::Transfer {
            student,
            from,
            to,
            reason,
            approved_by,
            notes,
        }) => cmd_transfer(
            &settings,
            out,
            rombel_core::TransferRequest {
                student_id: rombel_core::StudentId(student),
                from_class_id: rombel_core::ClassId(from),
                to_class_id: rombel_core::ClassId(to),
                reason,
                approved_by,
                notes,
            },
        ),
        Some(Commands::Exit {
            student,
            exit_type,
            destination,
            reason,
            approved_by,
            notes,
        }) => cmd_exit(
            &settings,
            out,
            rombel_core::ExitRequest {
                student_id: rombel_core::StudentId(student),
                exit_type,
                destination,
                reason,
                approved_by,
                notes,
            },
        ),
        Some(Commands::Roster { class }) => cmd_roster(&settings, out, class),
        Some(Commands::History { student }) => cmd_history(&settings, out, student),
        Some(Commands::ClassHistory { class }) => cmd_class_history(&settings, out, class),
        Some(Commands::Stats { class, year }) => cmd_stats(&settings, out, class, year),
        Some(Commands::Transfers { student, from, to }) => {
            cmd_transfers(&settings, out, student, from, to)
        }
        Some(Commands::Exits { student, exit_type }) => {
            cmd_exits(&settings, out, student, exit_type)
        }
        Some(Commands::Export { output, format }) => cmd_export(&settings, &output, &format),
        Some(Commands::Import { input, force }) => cmd_import(&settings, &input, force),
    }
}
