//! Alert banner, next-program announcement and clock flash records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert banner shown across all timer surfaces
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertState {
    pub message: String,
    pub is_flashing: bool,
    pub is_visible: bool,
}

impl AlertState {
    pub fn show(&mut self, message: String) {
        self.message = message;
        self.is_visible = true;
    }

    /// Start flashing, optionally replacing the message
    pub fn flash(&mut self, message: Option<String>) {
        if let Some(message) = message {
            self.message = message;
        }
        self.is_flashing = true;
    }

    pub fn stop_flashing(&mut self) -> bool {
        std::mem::replace(&mut self.is_flashing, false)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Short-lived "up next" notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextProgramAnnouncement {
    pub name: String,
    pub duration_minutes: u64,
    pub expires_at: DateTime<Utc>,
}

impl NextProgramAnnouncement {
    pub fn new(name: String, duration_minutes: u64, ttl: std::time::Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            name,
            duration_minutes,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Wall clock briefly shown in place of the timer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockFlash {
    pub visible: bool,
}
