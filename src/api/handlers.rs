//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use tracing::info;

use super::responses::{
    ApiResponse, HealthResponse, KeySnapshot, StateSnapshot, StatusResponse, TimersStatus,
};
use crate::{
    bus::StateKey,
    error::ControlError,
    services::DuplicateOutcome,
    state::{
        AlertState, AppState, Background, ClockFlash, CountdownKind, CountdownState,
        DisplayDescriptor, DisplaySizes, NextProgramAnnouncement, OverlayAppearance, Surface,
        SurfaceId, SurfaceKind, SurfaceRoster, TextCase, TimerHistoryEntry,
    },
};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ControlError>;

fn countdown_kind(name: &str) -> Result<CountdownKind, ControlError> {
    CountdownKind::parse(name).ok_or_else(|| ControlError::not_found(format!("timer {name}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTimerRequest {
    pub duration_seconds: Option<i64>,
    pub duration_minutes: Option<i64>,
    pub label: Option<String>,
}

impl StartTimerRequest {
    fn duration_seconds(&self) -> Result<i64, ControlError> {
        match (self.duration_seconds, self.duration_minutes) {
            (Some(seconds), None) => Ok(seconds),
            (None, Some(minutes)) => Ok(minutes.saturating_mul(60)),
            _ => Err(ControlError::validation(
                "exactly one of durationSeconds or durationMinutes is required",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustRequest {
    pub delta_seconds: i64,
}

/// Handle POST /timers/:kind/start
pub async fn start_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Json(request): Json<StartTimerRequest>,
) -> ApiResult<CountdownState> {
    let kind = countdown_kind(&kind)?;
    let countdown = state.start_timer(kind, request.duration_seconds()?, request.label)?;
    Ok(Json(ApiResponse::ok(format!("{} timer started", kind.as_str()), countdown)))
}

/// Handle POST /timers/:kind/pause
pub async fn pause_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> ApiResult<CountdownState> {
    let kind = countdown_kind(&kind)?;
    Ok(Json(ApiResponse::ok(
        format!("{} timer paused", kind.as_str()),
        state.pause_timer(kind),
    )))
}

/// Handle POST /timers/:kind/resume
pub async fn resume_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> ApiResult<CountdownState> {
    let kind = countdown_kind(&kind)?;
    Ok(Json(ApiResponse::ok(
        format!("{} timer resumed", kind.as_str()),
        state.resume_timer(kind),
    )))
}

/// Handle POST /timers/:kind/reset
pub async fn reset_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> ApiResult<CountdownState> {
    let kind = countdown_kind(&kind)?;
    Ok(Json(ApiResponse::ok(
        format!("{} timer reset", kind.as_str()),
        state.reset_timer(kind),
    )))
}

/// Handle POST /timers/:kind/adjust
pub async fn adjust_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Json(request): Json<AdjustRequest>,
) -> ApiResult<CountdownState> {
    let kind = countdown_kind(&kind)?;
    Ok(Json(ApiResponse::ok(
        format!("{} timer adjusted", kind.as_str()),
        state.adjust_timer(kind, request.delta_seconds),
    )))
}

/// Handle POST /timers/:kind/attention
pub async fn attention_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> ApiResult<CountdownState> {
    let kind = countdown_kind(&kind)?;
    Ok(Json(ApiResponse::ok(
        "Attention raised",
        state.toggle_attention(kind),
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartProgramRequest {
    pub program_id: Option<String>,
    pub name: Option<String>,
    pub duration_minutes: Option<i64>,
}

/// Handle POST /programs/start - by stored program id, or by name and length
pub async fn start_program_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartProgramRequest>,
) -> ApiResult<CountdownState> {
    let countdown = match request {
        StartProgramRequest {
            program_id: Some(id), ..
        } => state.start_program_by_id(&id)?,
        StartProgramRequest {
            name: Some(name),
            duration_minutes: Some(minutes),
            ..
        } => state.start_program(&name, minutes)?,
        _ => {
            return Err(ControlError::validation(
                "programId or name with durationMinutes is required",
            ))
        }
    };
    Ok(Json(ApiResponse::ok("Program started", countdown)))
}

/// Handle POST /history/:id/run
pub async fn run_history_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<CountdownState> {
    let countdown = state.run_from_history(&id)?;
    Ok(Json(ApiResponse::ok("Program restarted from history", countdown)))
}

/// Handle DELETE /history
pub async fn clear_history_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<TimerHistoryEntry>> {
    state.clear_history();
    Ok(Json(ApiResponse::ok("History cleared", state.history())))
}

#[derive(Debug, Deserialize)]
pub struct ShowAlertRequest {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FlashAlertRequest {
    pub message: Option<String>,
}

/// Handle POST /alert/show
pub async fn show_alert_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ShowAlertRequest>,
) -> ApiResult<AlertState> {
    let alert = state.show_alert(&request.message)?;
    Ok(Json(ApiResponse::ok("Alert shown", alert)))
}

/// Handle POST /alert/flash
pub async fn flash_alert_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FlashAlertRequest>,
) -> ApiResult<AlertState> {
    Ok(Json(ApiResponse::ok(
        "Alert flashing",
        state.flash_alert(request.message),
    )))
}

/// Handle POST /alert/clear
pub async fn clear_alert_handler(State(state): State<Arc<AppState>>) -> ApiResult<AlertState> {
    Ok(Json(ApiResponse::ok("Alert cleared", state.clear_alert())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextProgramRequest {
    pub name: String,
    pub duration_minutes: i64,
}

/// Handle POST /next-program
pub async fn next_program_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NextProgramRequest>,
) -> ApiResult<NextProgramAnnouncement> {
    let notice = state.announce_next_program(&request.name, request.duration_minutes)?;
    Ok(Json(ApiResponse::ok("Next program announced", notice)))
}

/// Handle POST /clock
pub async fn show_clock_handler(State(state): State<Arc<AppState>>) -> ApiResult<ClockFlash> {
    Ok(Json(ApiResponse::ok("Clock shown", state.show_clock())))
}

/// Handle GET /displays
pub async fn list_displays_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<DisplayDescriptor>> {
    let displays = state.list_displays().await?;
    Ok(Json(ApiResponse::ok(
        format!("{} displays connected", displays.len()),
        displays,
    )))
}

/// Handle GET /surfaces
pub async fn list_surfaces_handler(State(state): State<Arc<AppState>>) -> ApiResult<SurfaceRoster> {
    let roster = SurfaceRoster {
        displays: state.surfaces.cached_displays(),
        surfaces: state.surfaces.surfaces(),
    };
    Ok(Json(ApiResponse::ok("Surfaces", roster)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequest {
    pub display_id: String,
    pub kind: SurfaceKind,
}

#[derive(Debug, Deserialize)]
pub struct AttachAutoRequest {
    pub kind: SurfaceKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateRequest {
    #[serde(default)]
    pub display_ids: Vec<String>,
    #[serde(default = "overlay_kind")]
    pub kind: SurfaceKind,
}

fn overlay_kind() -> SurfaceKind {
    SurfaceKind::OverlayDisplay
}

/// Handle POST /surfaces
pub async fn attach_surface_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AttachRequest>,
) -> ApiResult<Surface> {
    let surface = state.attach_surface(&request.display_id, request.kind).await?;
    info!("Attached surface {} to {}", surface.id, request.display_id);
    Ok(Json(ApiResponse::ok("Surface attached", surface)))
}

/// Handle POST /surfaces/auto
pub async fn attach_auto_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AttachAutoRequest>,
) -> ApiResult<Surface> {
    let surface = state.attach_auto(request.kind).await?;
    Ok(Json(ApiResponse::ok("Surface attached", surface)))
}

/// Handle POST /surfaces/duplicate
pub async fn duplicate_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DuplicateRequest>,
) -> ApiResult<Vec<DuplicateOutcome>> {
    let outcomes = state.duplicate_to(&request.display_ids, request.kind).await?;
    let attached = outcomes.iter().filter(|o| o.is_ok()).count();
    Ok(Json(ApiResponse::ok(
        format!("Attached {} of {} surfaces", attached, outcomes.len()),
        outcomes,
    )))
}

/// Handle DELETE /surfaces/:id
pub async fn detach_surface_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> ApiResult<bool> {
    let detached = state.detach_surface(SurfaceId(id))?;
    let message = if detached {
        "Surface detached"
    } else {
        "Surface was already detached"
    };
    Ok(Json(ApiResponse::ok(message, detached)))
}

/// Handle PUT /overlay
pub async fn configure_overlay_handler(
    State(state): State<Arc<AppState>>,
    Json(appearance): Json<OverlayAppearance>,
) -> ApiResult<DisplaySizes> {
    let sizes = state.configure_overlay(appearance)?;
    Ok(Json(ApiResponse::ok("Overlay configured", sizes)))
}

/// Handle PUT /settings/display-sizes
pub async fn display_sizes_handler(
    State(state): State<Arc<AppState>>,
    Json(sizes): Json<DisplaySizes>,
) -> ApiResult<DisplaySizes> {
    let sizes = state.update_display_sizes(sizes)?;
    Ok(Json(ApiResponse::ok("Display sizes updated", sizes)))
}

/// Handle PUT /settings/background
pub async fn background_handler(
    State(state): State<Arc<AppState>>,
    Json(background): Json<Background>,
) -> ApiResult<Background> {
    Ok(Json(ApiResponse::ok(
        "Background updated",
        state.set_background(background),
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextCaseRequest {
    pub text_case: TextCase,
}

/// Handle PUT /settings/text-case
pub async fn text_case_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TextCaseRequest>,
) -> ApiResult<TextCase> {
    Ok(Json(ApiResponse::ok(
        "Text case updated",
        state.set_text_case(request.text_case),
    )))
}

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    /// Comma-separated key names; every key when absent
    pub keys: Option<String>,
}

/// Handle GET /state - snapshot read of the bus
pub async fn read_state_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StateQuery>,
) -> ApiResult<StateSnapshot> {
    let keys = match query.keys.as_deref().map(str::trim) {
        None | Some("") => StateKey::ALL.to_vec(),
        Some(names) => names
            .split(',')
            .map(str::trim)
            .map(|name| {
                StateKey::parse(name).ok_or_else(|| ControlError::validation(format!("unknown key {name}")))
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    let snapshot: StateSnapshot = state
        .bus
        .read_all(&keys)
        .into_iter()
        .map(|update| {
            (
                update.key.as_str().to_string(),
                KeySnapshot {
                    version: update.version,
                    value: update.value.as_ref().clone(),
                },
            )
        })
        .collect();
    Ok(Json(ApiResponse::ok(format!("{} keys", snapshot.len()), snapshot)))
}

/// Handle GET /status - Return current server status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (last_action, last_action_time) = state.get_last_action();
    let attached_surfaces = state
        .surfaces
        .surfaces()
        .iter()
        .filter(|s| s.is_attached() && s.kind != SurfaceKind::MainWindow)
        .count();

    Json(StatusResponse {
        timers: TimersStatus {
            primary: state.primary.state(),
            extra_time: state.extra_time.state(),
            overlay: state.overlay_timer.state(),
        },
        attached_surfaces,
        subscribers: state.bus.subscriber_count(),
        display_backend: state.surfaces.backend_name().to_string(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    })
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
