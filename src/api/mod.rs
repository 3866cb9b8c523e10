//! HTTP API module
//!
//! Operator actions are the only write path; surfaces read through their
//! event feed.

pub mod feed;
pub mod handlers;
pub mod responses;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use feed::surface_events_handler;
use handlers::*;

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/timers/:kind/start", post(start_timer_handler))
        .route("/timers/:kind/pause", post(pause_timer_handler))
        .route("/timers/:kind/resume", post(resume_timer_handler))
        .route("/timers/:kind/reset", post(reset_timer_handler))
        .route("/timers/:kind/adjust", post(adjust_timer_handler))
        .route("/timers/:kind/attention", post(attention_handler))
        .route("/programs/start", post(start_program_handler))
        .route("/history", delete(clear_history_handler))
        .route("/history/:id/run", post(run_history_handler))
        .route("/alert/show", post(show_alert_handler))
        .route("/alert/flash", post(flash_alert_handler))
        .route("/alert/clear", post(clear_alert_handler))
        .route("/next-program", post(next_program_handler))
        .route("/clock", post(show_clock_handler))
        .route("/displays", get(list_displays_handler))
        .route("/surfaces", get(list_surfaces_handler).post(attach_surface_handler))
        .route("/surfaces/auto", post(attach_auto_handler))
        .route("/surfaces/duplicate", post(duplicate_handler))
        .route("/surfaces/:id", delete(detach_surface_handler))
        .route("/surfaces/:id/events", get(surface_events_handler))
        .route("/overlay", put(configure_overlay_handler))
        .route("/settings/display-sizes", put(display_sizes_handler))
        .route("/settings/background", put(background_handler))
        .route("/settings/text-case", put(text_case_handler))
        .route("/state", get(read_state_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
