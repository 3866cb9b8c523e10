//! API response structures

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    error::{ControlError, SurfaceError},
    state::CountdownState,
};

/// API response structure for operator actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Create a new API response
    pub fn new(status: String, message: String, data: T) -> Self {
        Self {
            status,
            message,
            timestamp: Utc::now(),
            data,
        }
    }

    /// Create a successful response
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::new("ok".to_string(), message.into(), data)
    }
}

/// Body returned for every failed action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    /// Machine-readable error code, e.g. `no_secondary_display`
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ControlError {
    /// HTTP status and stable code for this error
    pub fn status_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::Surface(e) => match e {
                SurfaceError::DisplayNotFound(_) => (StatusCode::NOT_FOUND, "display_not_found"),
                SurfaceError::DisplayInUse { .. } => (StatusCode::CONFLICT, "display_in_use"),
                SurfaceError::NoSecondaryDisplay => (StatusCode::CONFLICT, "no_secondary_display"),
                SurfaceError::NotAttachable(_) | SurfaceError::NotDetachable(_) => {
                    (StatusCode::BAD_REQUEST, "validation")
                }
                SurfaceError::Display(_) | SurfaceError::Host(_) => {
                    (StatusCode::BAD_GATEWAY, "backend_unavailable")
                }
            },
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_code();
        if status.is_server_error() {
            warn!("Action failed: {}", self);
        }
        let body = ErrorResponse {
            status: "error".to_string(),
            code: code.to_string(),
            message: self.to_string(),
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

/// Versioned value of one bus key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySnapshot {
    pub version: u64,
    pub value: Value,
}

/// Response of `GET /state`, keyed by bus key name
pub type StateSnapshot = BTreeMap<String, KeySnapshot>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimersStatus {
    pub primary: CountdownState,
    pub extra_time: CountdownState,
    pub overlay: CountdownState,
}

/// Server status with the live countdowns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub timers: TimersStatus,
    pub attached_surfaces: usize,
    pub subscribers: usize,
    pub display_backend: String,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
