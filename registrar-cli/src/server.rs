use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;

use registrar_core::client::{Registrar, RegistrarStatistics};
use registrar_core::config::RegistrarConfig;
use registrar_core::enrollment::{EnrollmentOutcome, EnrollmentResult};
use registrar_core::infrastructure::{DomainEvent, EventSink};
use registrar_core::infrastructure_in_memory::InMemoryEventLog;
use registrar_core::scheduler::{OptimizationReport, ScheduleRecord, ScheduleRequest, ScheduleResult};
use registrar_core::types::{LockInfo, Person, Room, Section};
use registrar_core::RegistrarError;

use crate::handlers::*;

/// Requests served at once before callers queue
const MAX_IN_FLIGHT: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub registrar: Arc<Registrar>,
    pub events: Arc<InMemoryEventLog>,
}

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health is always open (no auth)
        .route("/health", get(health))
        .route("/people", post(register_person).get(list_people))
        .route("/sections", post(register_section).get(list_sections))
        .route("/rooms", post(register_room).get(list_rooms))
        .route("/enrollments", post(enroll))
        .route("/enrollments/{section_id}/{student_id}", delete(drop_enrollment))
        .route("/students/{id}/enrollments", get(student_enrollments))
        .route("/sections/{id}/waitlist", get(section_waitlist))
        .route("/schedules", post(create_schedule))
        .route("/schedules/{id}", get(get_schedule).delete(cancel_schedule))
        .route("/optimize", post(optimize))
        .route("/locks", post(acquire_lock))
        .route("/locks/{id}", delete(release_lock))
        .route("/resources/{id}/locks", get(resource_locks))
        .route("/events", get(list_events))
        .route("/stats", get(stats))
        .layer(middleware::from_fn(auth_middleware))
        .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(host: &str, port: u16, storage: &str, config: RegistrarConfig) -> Result<(), String> {
    let events = Arc::new(InMemoryEventLog::new());
    let registrar = Arc::new(create_registrar(storage, config, events.clone()));
    let sweeper = registrar.start_expiry_sweeper();

    let app = router(AppState { registrar, events });
    let addr = format!("{}:{}", host, port);

    if std::env::var("REGISTRAR_API_KEY").is_ok() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!("No REGISTRAR_API_KEY set, server is open (dev mode)");
    }

    tracing::info!("Registrar server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("failed to bind {}: {}", addr, e))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await;

    sweeper.shutdown();
    served.map_err(|e| format!("server error: {}", e))
}

// ─── Auth Middleware ────────────────────────────────────────────────────────

async fn auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected_key = match std::env::var("REGISTRAR_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => return Ok(next.run(request).await),
    };

    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if token == expected_key {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Unauthorized request to {}", request.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}

// ─── Error Mapping ──────────────────────────────────────────────────────────

fn status_for(error: &RegistrarError) -> StatusCode {
    match error {
        RegistrarError::NotFound { .. } => StatusCode::NOT_FOUND,
        RegistrarError::Validation(_) => StatusCode::BAD_REQUEST,
        RegistrarError::Concurrency(_) => StatusCode::CONFLICT,
        RegistrarError::Scheduling(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RegistrarError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        RegistrarError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure<T: Serialize>(error: RegistrarError) -> Reply<T> {
    (status_for(&error), Json(ApiResponse::err(error.to_string())))
}

fn invalid<T: Serialize>(message: String) -> Reply<T> {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::err(message)))
}

fn reply<T: Serialize>(status: StatusCode, result: registrar_core::Result<T>) -> Reply<T> {
    match result {
        Ok(data) => (status, Json(ApiResponse::ok(data))),
        Err(e) => failure(e),
    }
}

/// Engine calls may sleep between lock retries, so they run off the async workers.
async fn blocking<T, F>(state: &AppState, f: F) -> registrar_core::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Registrar) -> registrar_core::Result<T> + Send + 'static,
{
    let registrar = state.registrar.clone();
    tokio::task::spawn_blocking(move || f(&registrar))
        .await
        .map_err(|e| RegistrarError::Persistence(format!("worker task failed: {}", e)))?
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        active_locks: state.registrar.lock_manager().active_lock_count(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn register_person(State(state): State<AppState>, Json(person): Json<Person>) -> Reply<Person> {
    // Re-run construction checks that deserialization skips
    let person = match Person::new(
        person.id,
        person.first_name,
        person.last_name,
        person.email,
        person.kind,
    ) {
        Ok(person) => person,
        Err(e) => return failure(e),
    };
    if let Err(e) = require("id", &person.id) {
        return invalid(e);
    }
    let saved = state.registrar.register_person(&person).map(|()| person);
    if let Ok(person) = &saved {
        tracing::info!(person_id = %person.id, kind = person.kind.key(), "Person registered");
    }
    reply(StatusCode::CREATED, saved)
}

async fn list_people(State(state): State<AppState>) -> Reply<Vec<Person>> {
    reply(StatusCode::OK, state.registrar.people())
}

async fn register_section(State(state): State<AppState>, Json(section): Json<Section>) -> Reply<Section> {
    let mut checked = match Section::new(
        section.id,
        section.course_id,
        section.section_number,
        section.capacity,
    ) {
        Ok(checked) => checked,
        Err(e) => return failure(e),
    };
    checked.instructor_id = section.instructor_id;
    if let Err(e) = require("id", &checked.id) {
        return invalid(e);
    }
    let saved = state.registrar.register_section(&checked).map(|()| checked);
    reply(StatusCode::CREATED, saved)
}

async fn list_sections(State(state): State<AppState>) -> Reply<Vec<Section>> {
    reply(StatusCode::OK, state.registrar.sections())
}

async fn register_room(State(state): State<AppState>, Json(room): Json<Room>) -> Reply<Room> {
    if let Err(e) = require("id", &room.id) {
        return invalid(e);
    }
    let saved = state.registrar.register_room(room.clone()).map(|()| room);
    reply(StatusCode::CREATED, saved)
}

async fn list_rooms(State(state): State<AppState>) -> Reply<Vec<Room>> {
    reply(StatusCode::OK, state.registrar.rooms())
}

fn enrollment_status(result: &EnrollmentResult, success: StatusCode) -> StatusCode {
    match result.outcome {
        EnrollmentOutcome::Contention => StatusCode::CONFLICT,
        _ if result.success => success,
        _ => StatusCode::OK,
    }
}

async fn enroll(State(state): State<AppState>, Json(req): Json<EnrollRequest>) -> Reply<EnrollmentResult> {
    if let Err(e) = req.validate() {
        return invalid(e);
    }
    match blocking(&state, move |r| r.enroll(&req.student_id, &req.section_id)).await {
        Ok(result) => {
            tracing::info!(outcome = ?result.outcome, "Enrollment request handled");
            (enrollment_status(&result, StatusCode::CREATED), Json(ApiResponse::ok(result)))
        }
        Err(e) => failure(e),
    }
}

async fn drop_enrollment(
    State(state): State<AppState>,
    Path((section_id, student_id)): Path<(String, String)>,
) -> Reply<EnrollmentResult> {
    match blocking(&state, move |r| r.drop(&student_id, &section_id)).await {
        Ok(result) => (enrollment_status(&result, StatusCode::OK), Json(ApiResponse::ok(result))),
        Err(e) => failure(e),
    }
}

async fn student_enrollments(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Json<ApiResponse<EnrollmentsResponse>> {
    let sections = state.registrar.get_enrollments(&student_id);
    Json(ApiResponse::ok(EnrollmentsResponse { student_id, sections }))
}

async fn section_waitlist(State(state): State<AppState>, Path(section_id): Path<String>) -> Reply<WaitlistResponse> {
    let result = state
        .registrar
        .waitlist(&section_id)
        .map(|waitlist| WaitlistResponse { section_id, waitlist });
    reply(StatusCode::OK, result)
}

async fn create_schedule(State(state): State<AppState>, Json(req): Json<ScheduleRequest>) -> Reply<ScheduleResult> {
    if let Err(e) = require("section_id", &req.section_id) {
        return invalid(e);
    }
    match blocking(&state, move |r| r.schedule(&req)).await {
        Ok(result) if result.success => (StatusCode::CREATED, Json(ApiResponse::ok(result))),
        Ok(result) => (StatusCode::UNPROCESSABLE_ENTITY, Json(ApiResponse::ok(result))),
        Err(e) => failure(e),
    }
}

async fn get_schedule(State(state): State<AppState>, Path(id): Path<String>) -> Reply<ScheduleRecord> {
    reply(StatusCode::OK, state.registrar.get_schedule(&id))
}

async fn cancel_schedule(State(state): State<AppState>, Path(id): Path<String>) -> Reply<ReleaseResponse> {
    match blocking(&state, {
        let id = id.clone();
        move |r| Ok(r.cancel_schedule(&id))
    })
    .await
    {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::ok(ReleaseResponse { released: true, id }))),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("Schedule '{}' not found or already cancelled", id))),
        ),
        Err(e) => failure(e),
    }
}

async fn optimize(State(state): State<AppState>, Json(req): Json<OptimizeRequest>) -> Reply<OptimizationReport> {
    match req.validate() {
        Ok(objective) => (StatusCode::OK, Json(ApiResponse::ok(state.registrar.optimize(objective)))),
        Err(e) => invalid(e),
    }
}

async fn acquire_lock(State(state): State<AppState>, Json(req): Json<AcquireLockRequest>) -> Reply<LockResponse> {
    let (lock_type, timeout) = match req.validate() {
        Ok(parsed) => parsed,
        Err(e) => return invalid(e),
    };
    match state
        .registrar
        .acquire_lock(&req.resource_id, lock_type, &req.holder_id, timeout)
    {
        Ok(lock_id) => {
            tracing::info!(lock_id = %lock_id, resource = %req.resource_id, "Lock acquired");
            (
                StatusCode::CREATED,
                Json(ApiResponse::ok(LockResponse {
                    lock_id,
                    resource_id: req.resource_id,
                    lock_type,
                    holder_id: req.holder_id,
                })),
            )
        }
        Err(e) => failure(e),
    }
}

async fn release_lock(State(state): State<AppState>, Path(id): Path<String>) -> Reply<ReleaseResponse> {
    if state.registrar.release_lock(&id) {
        tracing::info!(lock_id = %id, "Lock released");
        (StatusCode::OK, Json(ApiResponse::ok(ReleaseResponse { released: true, id })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("Lock '{}' not found", id))),
        )
    }
}

async fn resource_locks(State(state): State<AppState>, Path(id): Path<String>) -> Json<ApiResponse<Vec<LockInfo>>> {
    Json(ApiResponse::ok(state.registrar.locks_on(&id)))
}

#[derive(Deserialize)]
struct EventQuery {
    stream: Option<String>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Json<ApiResponse<Vec<DomainEvent>>> {
    let events = match query.stream {
        Some(stream) => state.events.events_for(&stream),
        None => state.events.events(),
    };
    Json(ApiResponse::ok(events))
}

async fn stats(State(state): State<AppState>) -> Json<ApiResponse<RegistrarStatistics>> {
    Json(ApiResponse::ok(state.registrar.statistics()))
}

// ─── Storage Backend Selection ──────────────────────────────────────────────

fn create_registrar(storage: &str, config: RegistrarConfig, events: Arc<InMemoryEventLog>) -> Registrar {
    let sink: Arc<dyn EventSink> = events;
    if storage == "memory" {
        tracing::info!("Storage backend: in-memory (records will not persist)");
        Registrar::in_memory(config, sink)
    } else if let Some(path) = storage.strip_prefix("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            tracing::info!("Storage backend: SQLite ({})", path);
            match Registrar::with_sqlite(path, config.clone(), sink.clone()) {
                Ok(registrar) => registrar,
                Err(e) => {
                    tracing::error!("Failed to open SQLite: {}. Falling back to in-memory.", e);
                    Registrar::in_memory(config, sink)
                }
            }
        }
        #[cfg(not(feature = "sqlite"))]
        {
            tracing::error!(
                "SQLite storage requested but `sqlite` feature is not enabled. \
                 Rebuild with: cargo build --features sqlite"
            );
            tracing::warn!("Falling back to in-memory storage.");
            let _ = path;
            Registrar::in_memory(config, sink)
        }
    } else {
        tracing::error!("Unknown storage backend: '{}'. Use 'memory' or 'sqlite:<path>'", storage);
        tracing::warn!("Falling back to in-memory storage.");
        Registrar::in_memory(config, sink)
    }
}
