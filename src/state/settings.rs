//! Persisted presentation settings, program list and timer history

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::OverlayAppearance;

/// How long a history entry is kept
pub const HISTORY_RETENTION_HOURS: i64 = 48;

/// Percent scales for each element of the timer surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplaySizes {
    pub timer: u32,
    pub alert: u32,
    pub next_program: u32,
    pub alert_speed: u32,
    pub clock: u32,
    pub program_name: u32,
    pub show_program_name: bool,
    pub background_opacity: u32,
    pub overlay: OverlayAppearance,
}

impl Default for DisplaySizes {
    fn default() -> Self {
        Self {
            timer: 100,
            alert: 100,
            next_program: 100,
            alert_speed: 100,
            clock: 100,
            program_name: 100,
            show_program_name: true,
            background_opacity: 80,
            overlay: OverlayAppearance::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackgroundKind {
    #[default]
    Default,
    Image,
    Video,
    Webcam,
    ChromaKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Background {
    #[serde(rename = "type")]
    pub kind: BackgroundKind,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextCase {
    #[default]
    Normal,
    Upper,
    Lower,
    Title,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: String,
    pub name: String,
    pub duration_minutes: u64,
    pub category_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerHistoryEntry {
    pub id: String,
    pub program_name: String,
    pub duration_minutes: u64,
    pub timestamp: DateTime<Utc>,
}

impl TimerHistoryEntry {
    pub fn new(program_name: String, duration_minutes: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: timestamp.timestamp_millis().to_string(),
            program_name,
            duration_minutes,
            timestamp,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.timestamp >= Duration::hours(HISTORY_RETENTION_HOURS)
    }
}

/// Drop expired entries, returning how many were removed
pub fn prune_history(history: &mut Vec<TimerHistoryEntry>, now: DateTime<Utc>) -> usize {
    let before = history.len();
    history.retain(|entry| !entry.is_expired(now));
    before - history.len()
}
