//! Countdown state structure and its pure transitions
//!
//! Everything here is synchronous and timer-free; the ticking and pulse
//! clearing live in [`crate::tasks::countdown`].

use serde::{Deserialize, Serialize};

/// Which of the three countdowns a state belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CountdownKind {
    /// The main stage timer
    Primary,
    /// Overrun timer shown once the primary timer is done
    ExtraTime,
    /// Timer rendered by the broadcast overlay
    Overlay,
}

impl CountdownKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "primary" => Some(Self::Primary),
            "extra" | "extra-time" => Some(Self::ExtraTime),
            "overlay" => Some(Self::Overlay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::ExtraTime => "extra",
            Self::Overlay => "overlay",
        }
    }
}

/// Observable phase of a countdown, derived from its flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CountdownPhase {
    Idle,
    Running,
    Paused,
    Completing,
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running, or paused: nothing changed
    Ignored,
    /// One second was removed and time remains
    Counted,
    /// The countdown reached zero and the completion pulse was raised
    Completed,
}

/// Countdown state as published to every surface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownState {
    pub total_seconds: u64,
    pub is_running: bool,
    pub is_paused: bool,
    pub is_attention: bool,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl CountdownState {
    /// Zeroed, idle countdown
    pub fn new() -> Self {
        Self::default()
    }

    pub fn minutes(&self) -> u64 {
        self.total_seconds / 60
    }

    pub fn seconds(&self) -> u64 {
        self.total_seconds % 60
    }

    pub fn phase(&self) -> CountdownPhase {
        match (self.is_running, self.is_paused, self.is_complete) {
            (true, true, _) => CountdownPhase::Paused,
            (true, false, _) => CountdownPhase::Running,
            (false, _, true) => CountdownPhase::Completing,
            (false, _, false) => CountdownPhase::Idle,
        }
    }

    /// Whether the periodic ticker should be armed for this state
    pub fn is_ticking(&self) -> bool {
        self.is_running && !self.is_paused
    }

    /// Start counting down from `duration_seconds`. Allowed from any phase;
    /// an active completion pulse is cleared.
    pub fn start(&mut self, duration_seconds: u64, label: Option<String>) {
        self.total_seconds = duration_seconds;
        self.is_running = true;
        self.is_paused = false;
        self.is_complete = false;
        self.label = label;
    }

    /// Returns false when the countdown is not running
    pub fn pause(&mut self) -> bool {
        if !self.is_running || self.is_paused {
            return false;
        }
        self.is_paused = true;
        true
    }

    /// Returns false unless the countdown is paused
    pub fn resume(&mut self) -> bool {
        if !self.is_running || !self.is_paused {
            return false;
        }
        self.is_paused = false;
        true
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Stop counting but keep the remaining time on display. Returns false
    /// if the countdown was not running.
    pub fn halt(&mut self) -> bool {
        if !self.is_running {
            return false;
        }
        self.is_running = false;
        self.is_paused = false;
        true
    }

    /// Shift the remaining time by `delta_seconds`, clamping at zero.
    ///
    /// Only a running (or paused) countdown can be adjusted; a stopped one is
    /// left alone and `false` is returned.
    pub fn adjust(&mut self, delta_seconds: i64) -> bool {
        if !self.is_running {
            return false;
        }
        self.total_seconds = clamped_add(self.total_seconds, delta_seconds);
        true
    }

    /// Remove one second. Reaching zero stops the countdown and raises the
    /// completion pulse.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_ticking() {
            return TickOutcome::Ignored;
        }
        self.total_seconds = self.total_seconds.saturating_sub(1);
        if self.total_seconds > 0 {
            return TickOutcome::Counted;
        }
        self.is_running = false;
        self.is_paused = false;
        self.is_complete = true;
        TickOutcome::Completed
    }

    /// Returns false if there was no pulse to clear
    pub fn clear_complete(&mut self) -> bool {
        std::mem::replace(&mut self.is_complete, false)
    }

    pub fn raise_attention(&mut self) {
        self.is_attention = true;
    }

    /// Returns false if attention was not raised
    pub fn clear_attention(&mut self) -> bool {
        std::mem::replace(&mut self.is_attention, false)
    }
}

/// `max(0, base + delta)` without overflow in either direction
pub fn clamped_add(base: u64, delta: i64) -> u64 {
    if delta >= 0 {
        base.saturating_add(delta.unsigned_abs())
    } else {
        base.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn running(seconds: u64) -> CountdownState {
        let mut state = CountdownState::new();
        state.start(seconds, None);
        state
    }

    #[test]
    fn start_sets_running_and_clears_pulse() {
        let mut state = CountdownState::new();
        state.is_complete = true;
        state.start(300, Some("Keynote".to_string()));

        assert_eq!(state.total_seconds, 300);
        assert_eq!((state.minutes(), state.seconds()), (5, 0));
        assert!(state.is_running);
        assert!(!state.is_complete);
        assert_eq!(state.phase(), CountdownPhase::Running);
        assert_eq!(state.label.as_deref(), Some("Keynote"));
    }

    #[test]
    fn pause_and_resume_only_toggle_while_running() {
        let mut idle = CountdownState::new();
        assert!(!idle.pause());
        assert!(!idle.resume());
        assert_eq!(idle, CountdownState::new());

        let mut state = running(90);
        assert!(!state.resume());
        assert!(state.pause());
        assert!(!state.pause());
        assert_eq!(state.phase(), CountdownPhase::Paused);
        assert!(state.resume());
        assert_eq!(state.total_seconds, 90);
        assert!(state.is_running);
    }

    #[test]
    fn paused_countdown_ignores_ticks() {
        let mut state = running(10);
        state.pause();
        assert_eq!(state.tick(), TickOutcome::Ignored);
        assert_eq!(state.total_seconds, 10);
    }

    #[test]
    fn tick_from_one_completes() {
        let mut state = running(1);
        assert_eq!(state.tick(), TickOutcome::Completed);
        assert_eq!(state.total_seconds, 0);
        assert!(!state.is_running);
        assert!(state.is_complete);
        assert_eq!(state.phase(), CountdownPhase::Completing);

        assert!(state.clear_complete());
        assert_eq!(state.tick(), TickOutcome::Ignored);
        assert_eq!(state.phase(), CountdownPhase::Idle);
    }

    #[test]
    fn adjust_below_zero_keeps_running_until_next_tick() {
        let mut state = running(300);
        assert!(state.adjust(-330));
        assert_eq!(state.total_seconds, 0);
        assert!(state.is_running);

        assert_eq!(state.tick(), TickOutcome::Completed);
        assert!(state.is_complete);
    }

    #[test]
    fn adjust_on_stopped_countdown_is_noop() {
        let mut state = CountdownState::new();
        assert!(!state.adjust(60));
        assert_eq!(state.total_seconds, 0);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut state = running(42);
        state.raise_attention();
        state.reset();
        let once = state.clone();
        state.reset();
        assert_eq!(state, once);
        assert_eq!(state, CountdownState::new());
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let value = serde_json::to_value(running(5)).unwrap();
        assert_eq!(value["totalSeconds"], 5);
        assert_eq!(value["isRunning"], true);
        assert!(value.get("label").is_none());
    }

    proptest! {
        #[test]
        fn adjust_clamps_at_zero(start in 0u64..100_000, delta in -200_000i64..200_000) {
            let mut state = running(start);
            state.adjust(delta);
            let expected = (start as i128 + delta as i128).max(0) as u64;
            prop_assert_eq!(state.total_seconds, expected);
        }

        #[test]
        fn pause_resume_preserves_remaining(start in 1u64..100_000) {
            let mut state = running(start);
            state.pause();
            state.resume();
            prop_assert_eq!(state.total_seconds, start);
            prop_assert!(state.is_running && !state.is_paused);
        }
    }
}
