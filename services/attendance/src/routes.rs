//! Attendance service routes

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use crate::{
    accounts::NewAccount,
    error::{AttendanceError, AttendanceResult, required},
    ledger::CheckIn,
    middleware::{BearerHeader, caller, require_auth, require_developer, require_privileged},
    models::{
        AddAttendanceRequest, CreateAccountRequest, KickRequest, LeaveRequest, LedgerResponse,
        LoginRequest, SlotKey, SlotQuery, StartSessionRequest,
    },
    policy,
    sessions::{ReplacePolicy, StartSession},
    state::AppState,
    ticket::session_id_from,
    tokens::AuthUser,
};

const UNKNOWN_DEVICE: &str = "unknown";

/// Create the router for the attendance service
pub fn create_router(state: AppState) -> Router {
    let privileged_routes = Router::new()
        .route("/api/session/start", post(start_session))
        .route("/api/session/end", post(end_session))
        .route("/api/session/refresh", post(refresh_session))
        .route("/api/sessions/active", get(active_sessions))
        .route("/api/attendance/kick", post(kick_attendee))
        .route("/api/attendance/archive/:session_id", get(archived_roster))
        .route_layer(middleware::from_fn(require_privileged))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let developer_routes = Router::new()
        .route("/api/accounts", post(create_account))
        .route_layer(middleware::from_fn(require_developer))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let protected_routes = Router::new()
        .route("/api/logout", post(logout))
        .route("/api/history", get(my_history))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/courses", get(list_courses))
        .route("/api/login", post(login))
        .route("/api/session/status", get(session_status))
        .route("/api/attendance", get(list_attendance).post(add_attendance))
        .route("/api/attendance/leave", post(leave_session))
        .route("/api/attendance/export", get(export_attendance))
        .route("/api/history/:username", get(user_history))
        .merge(privileged_routes)
        .merge(developer_routes)
        .merge(protected_routes)
        .with_state(state)
}

fn slot_from(course_id: &Option<String>, section_id: &Option<String>) -> AttendanceResult<SlotKey> {
    Ok(SlotKey::new(
        required(course_id, "courseId")?,
        required(section_id, "sectionId")?,
    ))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "attendance-service"
    }))
}

pub async fn list_courses(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "courses": state.catalog.courses() }))
}

/// Exchange credentials for a bearer token
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AttendanceResult<impl IntoResponse> {
    let username = required(&payload.username, "username")?;
    let password = payload
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AttendanceError::Validation("missing field: password".to_string()))?;

    let response = state.accounts.login(username, password).await?;
    Ok(Json(response))
}

pub async fn logout(
    State(state): State<AppState>,
    header: Option<BearerHeader>,
) -> AttendanceResult<impl IntoResponse> {
    if let Some(header) = header {
        state.accounts.logout(header.token()).await?;
    }
    Ok(Json(json!({ "ok": true })))
}

/// Create an account (developers only)
pub async fn create_account(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateAccountRequest>,
) -> AttendanceResult<impl IntoResponse> {
    let new = NewAccount {
        username: required(&payload.username, "username")?.to_string(),
        password: payload
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AttendanceError::Validation("missing field: password".to_string()))?,
        role: payload.role,
        allowed_sections: payload.allowed_sections,
    };
    let username = new.username.clone();

    state.accounts.create(&user, new).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "username": username })),
    ))
}

/// Open a session on a slot
pub async fn start_session(
    State(state): State<AppState>,
    Json(payload): Json<StartSessionRequest>,
) -> AttendanceResult<impl IntoResponse> {
    let request = StartSession {
        slot: slot_from(&payload.course_id, &payload.section_id)?,
        lecturer: required(&payload.lecturer, "lecturer")?.to_string(),
        duration_minutes: payload
            .duration_minutes
            .unwrap_or(state.defaults.duration_minutes),
        policy: ReplacePolicy::from(
            payload
                .replace_active
                .unwrap_or(state.defaults.replace_active),
        ),
    };

    let session = state.sessions.start(request).await?;
    Ok(Json(session))
}

pub async fn end_session(
    State(state): State<AppState>,
    Json(payload): Json<SlotQuery>,
) -> AttendanceResult<impl IntoResponse> {
    let slot = slot_from(&payload.course_id, &payload.section_id)?;
    state.sessions.end(&slot).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn refresh_session(
    State(state): State<AppState>,
    Json(payload): Json<SlotQuery>,
) -> AttendanceResult<impl IntoResponse> {
    let slot = slot_from(&payload.course_id, &payload.section_id)?;
    let session = state.sessions.refresh(&slot).await?;
    Ok(Json(session))
}

/// Current session of a slot, or `null`
pub async fn session_status(
    State(state): State<AppState>,
    Query(query): Query<SlotQuery>,
) -> AttendanceResult<impl IntoResponse> {
    let slot = slot_from(&query.course_id, &query.section_id)?;
    let session = state.sessions.status(&slot).await?;
    Ok(Json(json!({ "session": session })))
}

pub async fn active_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "sessions": state.sessions.active().await }))
}

pub async fn list_attendance(
    State(state): State<AppState>,
    Query(query): Query<SlotQuery>,
) -> AttendanceResult<impl IntoResponse> {
    let slot = slot_from(&query.course_id, &query.section_id)?;
    Ok(Json(json!({ "attendance": state.ledger.list(&slot).await })))
}

/// Check a user in with a scanned ticket or a bare session id
pub async fn add_attendance(
    State(state): State<AppState>,
    header: Option<BearerHeader>,
    Json(payload): Json<AddAttendanceRequest>,
) -> AttendanceResult<impl IntoResponse> {
    let session_id = match payload.ticket.as_deref().map(str::trim) {
        Some(ticket) if !ticket.is_empty() => session_id_from(ticket)?,
        _ => required(&payload.session_id, "sessionId")?.to_string(),
    };
    let slot = slot_from(&payload.course_id, &payload.section_id)?;
    let username = required(&payload.username, "username")?.to_string();

    if payload.r#override {
        let staff = caller(&state, header)
            .await?
            .filter(|user| policy::is_privileged(user.role));
        if staff.is_none() {
            return Err(AttendanceError::Forbidden(
                "override requires a lecturer or developer token".to_string(),
            ));
        }
    }

    let device = payload
        .device
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(UNKNOWN_DEVICE)
        .to_string();

    let attendance = state
        .ledger
        .add(CheckIn {
            session_id,
            slot,
            username,
            source: payload.source,
            device,
            override_allow_list: payload.r#override,
        })
        .await?;

    Ok(Json(LedgerResponse {
        ok: true,
        attendance,
    }))
}

pub async fn leave_session(
    State(state): State<AppState>,
    Json(payload): Json<LeaveRequest>,
) -> AttendanceResult<impl IntoResponse> {
    let slot = slot_from(&payload.course_id, &payload.section_id)?;
    let username = required(&payload.username, "username")?;

    let attendance = state.ledger.leave(&slot, username).await?;
    Ok(Json(LedgerResponse {
        ok: true,
        attendance,
    }))
}

pub async fn kick_attendee(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<KickRequest>,
) -> AttendanceResult<impl IntoResponse> {
    let slot = slot_from(&payload.course_id, &payload.section_id)?;
    let student_id = required(&payload.student_id, "studentId")?;

    let attendance = state.ledger.kick(&slot, student_id, &user).await?;
    Ok(Json(LedgerResponse {
        ok: true,
        attendance,
    }))
}

/// The slot's ledger as a CSV download
pub async fn export_attendance(
    State(state): State<AppState>,
    Query(query): Query<SlotQuery>,
) -> AttendanceResult<impl IntoResponse> {
    let slot = slot_from(&query.course_id, &query.section_id)?;
    let (session_id, csv) = state.ledger.export(&slot).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"attendance-{session_id}.csv\""),
            ),
        ],
        csv,
    ))
}

pub async fn archived_roster(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AttendanceResult<impl IntoResponse> {
    let roster = state.ledger.archived(&session_id).await?;
    Ok(Json(roster))
}

/// History of the authenticated caller
pub async fn my_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> impl IntoResponse {
    let history = state.ledger.history(&user.username).await;
    Json(json!({ "username": user.username, "history": history }))
}

pub async fn user_history(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let history = state.ledger.history(&username).await;
    Json(json!({ "username": username, "history": history }))
}
