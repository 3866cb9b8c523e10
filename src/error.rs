//! Error taxonomy shared by the control operations

use thiserror::Error;

use crate::state::{DisplayId, SurfaceId, SurfaceKind};

/// Failures reading or writing the durable key-value store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store contents are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures enumerating physical displays
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("failed to run display probe `{command}`: {source}")]
    Probe {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("display probe exited unsuccessfully: {0}")]
    ProbeFailed(String),
}

/// Resource failures of the surface lifecycle manager.
///
/// None of these are fatal: the control surface stays usable with zero
/// secondary displays.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("display {0} is not connected")]
    DisplayNotFound(DisplayId),
    #[error("display {display} already hosts a {kind} surface")]
    DisplayInUse { display: DisplayId, kind: SurfaceKind },
    #[error("no secondary display detected")]
    NoSecondaryDisplay,
    #[error("{0} surfaces cannot be attached")]
    NotAttachable(SurfaceKind),
    #[error("surface {0} cannot be detached")]
    NotDetachable(SurfaceId),
    #[error(transparent)]
    Display(#[from] DisplayError),
    #[error("surface host failed: {0}")]
    Host(String),
}

/// Errors returned by operator actions
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

impl ControlError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
