//! Keys understood by the state bus

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateKey {
    #[serde(rename = "timerState")]
    TimerState,
    #[serde(rename = "extraTime")]
    ExtraTime,
    #[serde(rename = "overlayTimerState")]
    OverlayTimerState,
    #[serde(rename = "alertState")]
    AlertState,
    #[serde(rename = "nextProgram")]
    NextProgram,
    #[serde(rename = "displaySizes")]
    DisplaySizes,
    #[serde(rename = "background")]
    Background,
    #[serde(rename = "programs")]
    Programs,
    #[serde(rename = "categories")]
    Categories,
    #[serde(rename = "timerHistory")]
    TimerHistory,
    #[serde(rename = "textCase")]
    TextCase,
    #[serde(rename = "showClock")]
    ShowClock,
    #[serde(rename = "overlayPhase")]
    OverlayPhase,
    #[serde(rename = "surfaces")]
    Surfaces,
}

impl StateKey {
    pub const ALL: [StateKey; 14] = [
        Self::TimerState,
        Self::ExtraTime,
        Self::OverlayTimerState,
        Self::AlertState,
        Self::NextProgram,
        Self::DisplaySizes,
        Self::Background,
        Self::Programs,
        Self::Categories,
        Self::TimerHistory,
        Self::TextCase,
        Self::ShowClock,
        Self::OverlayPhase,
        Self::Surfaces,
    ];

    /// Keys a timer display needs to render
    pub const TIMER_SURFACE: [StateKey; 8] = [
        Self::TimerState,
        Self::ExtraTime,
        Self::AlertState,
        Self::NextProgram,
        Self::DisplaySizes,
        Self::Background,
        Self::TextCase,
        Self::ShowClock,
    ];

    /// Keys a broadcast overlay needs to render
    pub const OVERLAY_SURFACE: [StateKey; 3] =
        [Self::OverlayTimerState, Self::DisplaySizes, Self::OverlayPhase];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimerState => "timerState",
            Self::ExtraTime => "extraTime",
            Self::OverlayTimerState => "overlayTimerState",
            Self::AlertState => "alertState",
            Self::NextProgram => "nextProgram",
            Self::DisplaySizes => "displaySizes",
            Self::Background => "background",
            Self::Programs => "programs",
            Self::Categories => "categories",
            Self::TimerHistory => "timerHistory",
            Self::TextCase => "textCase",
            Self::ShowClock => "showClock",
            Self::OverlayPhase => "overlayPhase",
            Self::Surfaces => "surfaces",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }

    /// Volatile keys describe process-local state and are never written to
    /// the durable store.
    pub fn is_persisted(&self) -> bool {
        !matches!(self, Self::ShowClock | Self::OverlayPhase | Self::Surfaces)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
