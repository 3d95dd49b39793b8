//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API that are not
//! core types. Commands accept the core request types (`NewClass`,
//! `AssignRequest`, `TransferRequest`, `ExitRequest`) directly.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rombel_core::{
    AcademicYear, ClassFilter, ClassId, ClassStatus, EnrollmentRecord, ExitFilter, RegistrySummary,
    RombelError, StudentId,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Registry status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub persistent: bool,
    pub academic_year: AcademicYear,
    #[serde(flatten)]
    pub summary: RegistrySummary,
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable snake_case code, e.g. `class_full`.
    pub code: String,
    pub error: String,
}

/// A core error on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub RombelError);

impl From<RombelError> for ApiError {
    fn from(err: RombelError) -> Self {
        Self(err)
    }
}

/// HTTP status for a core error.
///
/// Domain rejections are 409 because the request was well-formed but the
/// current state refuses it.
pub fn status_for(err: &RombelError) -> StatusCode {
    match err {
        RombelError::NotFound { .. } => StatusCode::NOT_FOUND,
        RombelError::AlreadyEnrolled { .. }
        | RombelError::ClassFull { .. }
        | RombelError::NotEnrolledInSourceClass { .. }
        | RombelError::NoActiveEnrollment(_)
        | RombelError::HasActiveStudents { .. }
        | RombelError::ClassInactive(_)
        | RombelError::Conflict(_) => StatusCode::CONFLICT,
        RombelError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        RombelError::Storage(_) | RombelError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(code = self.0.kind(), "request failed: {}", self.0);
        }
        let body = ErrorResponse {
            code: self.0.kind().to_string(),
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// CLASS REQUESTS
// =============================================================================

/// Query string of `GET /classes`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassListQuery {
    pub grade: Option<u8>,
    pub academic_year: Option<AcademicYear>,
    pub track: Option<String>,
    pub status: Option<ClassStatus>,
    pub search: Option<String>,
    /// Only active classes with at least this many free seats.
    pub min_free: Option<u32>,
}

impl ClassListQuery {
    #[must_use]
    pub fn filter(&self) -> ClassFilter {
        ClassFilter {
            grade: self.grade,
            academic_year: self.academic_year,
            track: self.track.clone(),
            status: self.status,
            search: self.search.clone(),
        }
    }
}

/// Body of `POST /classes/{id}/occupancy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyRequest {
    pub delta: i32,
}

/// Query string of `GET /classes/{id}/stats`. The year defaults to the
/// current academic year.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsQuery {
    pub academic_year: Option<AcademicYear>,
}

// =============================================================================
// ENROLLMENT REQUESTS
// =============================================================================

/// Body of `POST /enrollments/bulk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkAssignRequest {
    pub class_id: ClassId,
    pub student_ids: Vec<StudentId>,
    #[serde(default)]
    pub notes: String,
}

/// Response of `GET /students/{id}/enrollment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveEnrollmentResponse {
    pub student_id: StudentId,
    pub enrollment: Option<EnrollmentRecord>,
}

// =============================================================================
// AUDIT QUERIES
// =============================================================================

/// Query string of `GET /exits`.
///
/// `exit_type` accepts the well-known names or any free-form label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitQuery {
    pub student_id: Option<StudentId>,
    pub exit_type: Option<String>,
}

impl ExitQuery {
    pub fn filter(&self) -> Result<ExitFilter, RombelError> {
        Ok(ExitFilter {
            student_id: self.student_id,
            exit_type: self.exit_type.as_deref().map(str::parse).transpose()?,
        })
    }
}
