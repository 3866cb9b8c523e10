//! Broadcast overlay appearance and lower-third cycle phases

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Length of the lower-third slide-out animation
pub const TRANSITION: Duration = Duration::from_millis(600);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverlayMode {
    #[default]
    Timer,
    Clock,
    LowerThird,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LowerThirdTheme {
    Light,
    #[default]
    Dark,
}

/// Lower-third graphic contents and cycle timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LowerThird {
    pub title: String,
    pub subtitle: String,
    pub speaker: String,
    pub date: String,
    pub theme: LowerThirdTheme,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    pub font: String,
    pub title_size: u32,
    pub subtitle_size: u32,
    pub date_size: u32,
    pub display_seconds: u64,
    pub sleep_seconds: u64,
}

impl Default for LowerThird {
    fn default() -> Self {
        Self {
            title: String::new(),
            subtitle: String::new(),
            speaker: String::new(),
            date: String::new(),
            theme: LowerThirdTheme::Dark,
            image: None,
            logo: None,
            font: "JetBrains Mono".to_string(),
            title_size: 14,
            subtitle_size: 48,
            date_size: 20,
            display_seconds: 10,
            sleep_seconds: 5,
        }
    }
}

/// Settings for the chroma-keyed broadcast overlay surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayAppearance {
    pub mode: OverlayMode,
    /// Horizontal anchor, percent of surface width
    pub x: f64,
    /// Vertical anchor, percent of surface height
    pub y: f64,
    /// Percent scale
    pub scale: u32,
    pub background_color: String,
    pub timer_font_size: u32,
    pub clock_font_size: u32,
    pub is_live: bool,
    pub lower_third: LowerThird,
}

impl Default for OverlayAppearance {
    fn default() -> Self {
        Self {
            mode: OverlayMode::Timer,
            x: 50.0,
            y: 92.0,
            scale: 100,
            background_color: "#00ff00".to_string(),
            timer_font_size: 10,
            clock_font_size: 10,
            is_live: false,
            lower_third: LowerThird::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverlayPhase {
    #[default]
    Visible,
    AnimatingOut,
    Sleeping,
}

/// Published overlay cycle position. `cycle` counts completed
/// visible/sleep rounds since the last configure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayPhaseState {
    pub phase: OverlayPhase,
    pub cycle: u64,
}

/// Longest accepted visible or sleep period of a lower-third cycle
pub const MAX_CYCLE_SECONDS: u64 = 24 * 60 * 60;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Full visible + transition + sleep period. `None` when the cycle never
/// leaves Visible: zero sleep, or a period too long to represent.
fn cycle_period(display: Duration, sleep: Duration) -> Option<Duration> {
    if sleep.is_zero() {
        return None;
    }
    display.checked_add(TRANSITION)?.checked_add(sleep)
}

/// Offset of `elapsed` into its current cycle
fn cycle_offset(elapsed: Duration, period: Duration) -> Duration {
    let rem = elapsed.as_nanos() % period.as_nanos();
    // rem <= elapsed, so the seconds fit in u64
    Duration::new((rem / NANOS_PER_SEC) as u64, (rem % NANOS_PER_SEC) as u32)
}

/// Phase of a lower-third cycle `elapsed` after it was (re)started.
pub fn phase_at(elapsed: Duration, display: Duration, sleep: Duration) -> OverlayPhaseState {
    let Some(period) = cycle_period(display, sleep) else {
        return OverlayPhaseState::default();
    };
    let cycle = u64::try_from(elapsed.as_nanos() / period.as_nanos()).unwrap_or(u64::MAX);
    let offset = cycle_offset(elapsed, period);

    let phase = if offset < display {
        OverlayPhase::Visible
    } else if offset < display + TRANSITION {
        OverlayPhase::AnimatingOut
    } else {
        OverlayPhase::Sleeping
    };
    OverlayPhaseState { phase, cycle }
}

/// Offset from the cycle start of the first phase change after `elapsed`.
/// `None` when the cycle never changes phase.
pub fn next_boundary(elapsed: Duration, display: Duration, sleep: Duration) -> Option<Duration> {
    let period = cycle_period(display, sleep)?;
    let offset = cycle_offset(elapsed, period);
    let base = elapsed - offset;

    let next = if offset < display {
        display
    } else if offset < display + TRANSITION {
        display + TRANSITION
    } else {
        period
    };
    base.checked_add(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_follow_phase_changes() {
        let display = Duration::from_secs(10);
        let sleep = Duration::from_secs(5);
        let at = |ms| next_boundary(Duration::from_millis(ms), display, sleep).unwrap().as_millis();

        assert_eq!(at(0), 10_000);
        assert_eq!(at(10_000), 10_600);
        assert_eq!(at(10_600), 15_600);
        assert_eq!(at(15_600), 25_600);
        assert_eq!(next_boundary(Duration::ZERO, display, Duration::ZERO), None);
    }

    fn phase(ms: u64) -> OverlayPhase {
        phase_at(
            Duration::from_millis(ms),
            Duration::from_secs(10),
            Duration::from_secs(5),
        )
        .phase
    }

    #[test]
    fn ten_five_cycle_boundaries() {
        assert_eq!(phase(0), OverlayPhase::Visible);
        assert_eq!(phase(9_999), OverlayPhase::Visible);
        assert_eq!(phase(10_000), OverlayPhase::AnimatingOut);
        assert_eq!(phase(10_599), OverlayPhase::AnimatingOut);
        assert_eq!(phase(10_600), OverlayPhase::Sleeping);
        assert_eq!(phase(15_599), OverlayPhase::Sleeping);
        assert_eq!(phase(15_600), OverlayPhase::Visible);
        assert_eq!(phase(25_600), OverlayPhase::AnimatingOut);
    }

    #[test]
    fn zero_sleep_is_always_visible() {
        for ms in [0, 10_000, 10_300, 99_999] {
            let state = phase_at(Duration::from_millis(ms), Duration::from_secs(10), Duration::ZERO);
            assert_eq!(state.phase, OverlayPhase::Visible);
        }
    }

    #[test]
    fn unrepresentable_period_stays_visible() {
        let huge = Duration::from_secs(u64::MAX);
        let sleep = Duration::from_secs(5);
        for elapsed in [Duration::ZERO, Duration::from_secs(86_400)] {
            assert_eq!(phase_at(elapsed, huge, sleep), OverlayPhaseState::default());
            assert_eq!(next_boundary(elapsed, huge, sleep), None);
        }

        let long_sleep = Duration::from_secs(u64::MAX / 2);
        assert_eq!(phase_at(Duration::from_secs(30), sleep, long_sleep).phase, OverlayPhase::Sleeping);
    }

    #[test]
    fn partial_appearance_uses_defaults() {
        let appearance: OverlayAppearance =
            serde_json::from_str(r#"{"mode":"lowerThird","lowerThird":{"title":"Welcome"}}"#).unwrap();
        assert_eq!(appearance.mode, OverlayMode::LowerThird);
        assert_eq!(appearance.lower_third.title, "Welcome");
        assert_eq!(appearance.lower_third.display_seconds, 10);
        assert_eq!(appearance.background_color, "#00ff00");
    }
}
