//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Core calls are synchronous and may touch disk, so every handler runs its
//! work on the blocking pool. Mutating handlers also persist the snapshot
//! file when the server runs on the `file` backend.

use super::{
    AppState,
    types::{
        ActiveEnrollmentResponse, ApiError, BulkAssignRequest, ClassListQuery, ExitQuery,
        HealthResponse, OccupancyRequest, StatsQuery, StatusResponse,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use rombel_core::{
    AssignRequest, BulkAssignOutcome, ClassId, ClassPatch, ClassRecord, ClassYearStats,
    EnrollmentRecord, EnrollmentService, ExitOutcome, ExitRecord, ExitRequest, HistoryEvent,
    IntegrityReport, NewClass, RombelError, StudentId, TransferFilter, TransferOutcome,
    TransferRecord, TransferRequest,
};

type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// BLOCKING HELPERS
// =============================================================================

/// Run a read on the blocking pool.
async fn read<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&EnrollmentService) -> Result<T, RombelError> + Send + 'static,
{
    let service = state.service.clone();
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| RombelError::Storage(format!("Worker failed: {}", e)))?
        .map_err(ApiError)
}

/// Run a command on the blocking pool, then persist if it succeeded.
async fn write<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&EnrollmentService) -> Result<T, RombelError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || -> Result<T, RombelError> {
        let out = f(&state.service)?;
        state.persist()?;
        Ok(out)
    })
    .await
    .map_err(|e| RombelError::Storage(format!("Worker failed: {}", e)))?
    .map_err(ApiError)
}

// =============================================================================
// HEALTH / STATUS HANDLERS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Store-wide counts.
pub async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let response = read(&state, |service| {
        Ok(StatusResponse {
            persistent: service.registry().is_persistent(),
            academic_year: service.registry().current_academic_year()?,
            summary: service.history().summary()?,
        })
    })
    .await?;
    Ok(Json(response))
}

/// Occupancy and single-active audit.
pub async fn integrity_handler(State(state): State<AppState>) -> ApiResult<IntegrityReport> {
    let report = read(&state, |service| service.history().integrity_report()).await?;
    Ok(Json(report))
}

// =============================================================================
// CLASS HANDLERS
// =============================================================================

/// List classes, optionally only those with free seats.
pub async fn list_classes_handler(
    State(state): State<AppState>,
    Query(query): Query<ClassListQuery>,
) -> ApiResult<Vec<ClassRecord>> {
    let classes = read(&state, move |service| {
        let filter = query.filter();
        let classes = match query.min_free {
            Some(min_free) => service.classes().available(min_free)?,
            None => service.classes().list(&filter)?,
        };
        Ok(classes.into_iter().filter(|c| filter.matches(c)).collect())
    })
    .await?;
    Ok(Json(classes))
}

/// Create a class.
pub async fn create_class_handler(
    State(state): State<AppState>,
    Json(request): Json<NewClass>,
) -> Result<impl IntoResponse, ApiError> {
    let class = write(&state, move |service| service.classes().create(request)).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

pub async fn get_class_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<ClassRecord> {
    let class = read(&state, move |service| service.classes().get(ClassId(id))).await?;
    Ok(Json(class))
}

pub async fn update_class_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(patch): Json<ClassPatch>,
) -> ApiResult<ClassRecord> {
    let class = write(&state, move |service| {
        service.classes().update(ClassId(id), patch)
    })
    .await?;
    Ok(Json(class))
}

/// Delete an empty class. Returns the removed record.
pub async fn delete_class_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<ClassRecord> {
    let class = write(&state, move |service| service.classes().delete(ClassId(id))).await?;
    Ok(Json(class))
}

/// Administrative occupancy correction.
pub async fn adjust_occupancy_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<OccupancyRequest>,
) -> ApiResult<ClassRecord> {
    let class = write(&state, move |service| {
        service.classes().adjust_occupancy(ClassId(id), request.delta)
    })
    .await?;
    Ok(Json(class))
}

pub async fn class_roster_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Vec<EnrollmentRecord>> {
    let roster = read(&state, move |service| service.class_roster(ClassId(id))).await?;
    Ok(Json(roster))
}

pub async fn class_history_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Vec<EnrollmentRecord>> {
    let records = read(&state, move |service| service.class_history(ClassId(id))).await?;
    Ok(Json(records))
}

pub async fn class_stats_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<ClassYearStats> {
    let stats = read(&state, move |service| {
        let year = match query.academic_year {
            Some(year) => year,
            None => service.registry().current_academic_year()?,
        };
        service.class_stats_by_year(ClassId(id), year)
    })
    .await?;
    Ok(Json(stats))
}

// =============================================================================
// ENROLLMENT HANDLERS
// =============================================================================

/// Assign one student.
pub async fn assign_handler(
    State(state): State<AppState>,
    Json(request): Json<AssignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = write(&state, move |service| service.assign(&request)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Assign a batch. Per-student failures are reported in the body with 200.
pub async fn bulk_assign_handler(
    State(state): State<AppState>,
    Json(request): Json<BulkAssignRequest>,
) -> ApiResult<BulkAssignOutcome> {
    let outcome = write(&state, move |service| {
        service.bulk_assign(&request.student_ids, request.class_id, &request.notes)
    })
    .await?;
    Ok(Json(outcome))
}

// =============================================================================
// TRANSFER / EXIT HANDLERS
// =============================================================================

pub async fn list_transfers_handler(
    State(state): State<AppState>,
    Query(filter): Query<TransferFilter>,
) -> ApiResult<Vec<TransferRecord>> {
    let transfers = read(&state, move |service| service.history().transfers(&filter)).await?;
    Ok(Json(transfers))
}

pub async fn transfer_handler(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome: TransferOutcome =
        write(&state, move |service| service.transfer(&request)).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn list_exits_handler(
    State(state): State<AppState>,
    Query(query): Query<ExitQuery>,
) -> ApiResult<Vec<ExitRecord>> {
    let exits = read(&state, move |service| {
        service.history().exits(&query.filter()?)
    })
    .await?;
    Ok(Json(exits))
}

pub async fn exit_handler(
    State(state): State<AppState>,
    Json(request): Json<ExitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome: ExitOutcome = write(&state, move |service| service.exit(&request)).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

// =============================================================================
// STUDENT HANDLERS
// =============================================================================

pub async fn student_history_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Vec<HistoryEvent>> {
    let events = read(&state, move |service| service.student_history(StudentId(id))).await?;
    Ok(Json(events))
}

pub async fn student_enrollment_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<ActiveEnrollmentResponse> {
    let student_id = StudentId(id);
    let enrollment = read(&state, move |service| {
        service.ledger().active_enrollment(student_id)
    })
    .await?;
    Ok(Json(ActiveEnrollmentResponse {
        student_id,
        enrollment,
    }))
}
