//! Main application state: the registry that owns the countdown engines, the
//! alert board, the overlay cycle, the surface manager and the bus they all
//! publish on. Operator actions enter here.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use super::{
    prune_history, AlertState, Background, Category, ClockFlash, CountdownKind, CountdownState,
    DisplayDescriptor, DisplayId, DisplaySizes, NextProgramAnnouncement, OverlayAppearance,
    OverlayMode, OverlayPhaseState, Program, Surface, SurfaceId, SurfaceKind, TextCase,
    TimerHistoryEntry, MAX_CYCLE_SECONDS,
};
use crate::{
    bus::{StateBus, StateKey},
    error::ControlError,
    services::surfaces::{DuplicateOutcome, SurfaceManager},
    tasks::{AlertBoard, AlertTiming, CountdownEngine, CountdownTiming, OverlayCycle},
};

/// Persisted settings mirrored in memory so read-modify-write updates are
/// applied under one lock
#[derive(Debug, Default)]
struct Settings {
    display_sizes: DisplaySizes,
    background: Background,
    text_case: TextCase,
    programs: Vec<Program>,
    history: Vec<TimerHistoryEntry>,
}

/// Timer periods for every engine owned by the registry
#[derive(Debug, Clone, Copy, Default)]
pub struct Timings {
    pub countdown: CountdownTiming,
    pub alerts: AlertTiming,
}

/// Main application state shared by the HTTP handlers and background tasks
#[derive(Debug)]
pub struct AppState {
    pub bus: StateBus,
    pub primary: CountdownEngine,
    pub extra_time: CountdownEngine,
    pub overlay_timer: CountdownEngine,
    pub alerts: AlertBoard,
    pub overlay_cycle: OverlayCycle,
    pub surfaces: SurfaceManager,
    settings: Mutex<Settings>,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    last_action: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl AppState {
    pub fn new(bus: StateBus, surfaces: SurfaceManager, port: u16, host: String) -> Self {
        Self::with_timings(bus, surfaces, port, host, Timings::default())
    }

    /// Build the registry on top of an already loaded bus. Countdown and
    /// alert keys are always republished zeroed; persisted settings are kept
    /// and only written back when missing.
    pub fn with_timings(
        bus: StateBus,
        surfaces: SurfaceManager,
        port: u16,
        host: String,
        timings: Timings,
    ) -> Self {
        let primary = CountdownEngine::new(CountdownKind::Primary, bus.clone(), timings.countdown);
        let extra_time = CountdownEngine::new(CountdownKind::ExtraTime, bus.clone(), timings.countdown);
        let overlay_timer = CountdownEngine::new(CountdownKind::Overlay, bus.clone(), timings.countdown);
        let alerts = AlertBoard::new(bus.clone(), timings.alerts);
        let overlay_cycle = OverlayCycle::new(bus.clone());

        let mut settings = Settings {
            display_sizes: restore(&bus, StateKey::DisplaySizes),
            background: restore(&bus, StateKey::Background),
            text_case: restore(&bus, StateKey::TextCase),
            programs: restore(&bus, StateKey::Programs),
            history: restore(&bus, StateKey::TimerHistory),
        };
        let _: Vec<Category> = restore(&bus, StateKey::Categories);

        let pruned = prune_history(&mut settings.history, Utc::now());
        if pruned > 0 {
            info!("Dropped {} expired history entries", pruned);
            bus.publish(StateKey::TimerHistory, &settings.history);
        }

        let state = Self {
            bus,
            primary,
            extra_time,
            overlay_timer,
            alerts,
            overlay_cycle,
            surfaces,
            settings: Mutex::new(settings),
            start_time: Instant::now(),
            port,
            host,
            last_action: Mutex::new(None),
        };
        let overlay = state.lock_settings().display_sizes.overlay.clone();
        state.apply_overlay_cycle(&overlay);
        state
    }

    pub fn countdown(&self, kind: CountdownKind) -> &CountdownEngine {
        match kind {
            CountdownKind::Primary => &self.primary,
            CountdownKind::ExtraTime => &self.extra_time,
            CountdownKind::Overlay => &self.overlay_timer,
        }
    }

    /// Start a countdown, enforcing the primary/extra-time exclusion: the
    /// primary timer halts extra time, and extra time only starts once the
    /// primary timer is stopped or at zero, resetting it.
    pub fn start_timer(
        &self,
        kind: CountdownKind,
        duration_seconds: i64,
        label: Option<String>,
    ) -> Result<CountdownState, ControlError> {
        let duration = non_negative(duration_seconds, "duration")?;
        self.start_countdown(kind, duration, label)
    }

    fn start_countdown(
        &self,
        kind: CountdownKind,
        duration_seconds: u64,
        label: Option<String>,
    ) -> Result<CountdownState, ControlError> {
        match kind {
            CountdownKind::Primary => {
                self.extra_time.halt();
            }
            CountdownKind::ExtraTime => {
                let primary = self.primary.state();
                if primary.is_running && primary.total_seconds > 0 {
                    return Err(ControlError::Conflict(
                        "extra time cannot start while the primary timer is running".to_string(),
                    ));
                }
                self.primary.reset();
            }
            CountdownKind::Overlay => {}
        }
        self.record_action(&format!("{}-start", kind.as_str()));
        Ok(self.countdown(kind).start(duration_seconds, label))
    }

    pub fn pause_timer(&self, kind: CountdownKind) -> CountdownState {
        self.record_action(&format!("{}-pause", kind.as_str()));
        self.countdown(kind).pause()
    }

    pub fn resume_timer(&self, kind: CountdownKind) -> CountdownState {
        self.record_action(&format!("{}-resume", kind.as_str()));
        self.countdown(kind).resume()
    }

    pub fn reset_timer(&self, kind: CountdownKind) -> CountdownState {
        self.record_action(&format!("{}-reset", kind.as_str()));
        self.countdown(kind).reset()
    }

    pub fn adjust_timer(&self, kind: CountdownKind, delta_seconds: i64) -> CountdownState {
        self.record_action(&format!("{}-adjust", kind.as_str()));
        self.countdown(kind).adjust(delta_seconds)
    }

    pub fn toggle_attention(&self, kind: CountdownKind) -> CountdownState {
        self.record_action(&format!("{}-attention", kind.as_str()));
        self.countdown(kind).toggle_attention()
    }

    /// Start the primary timer for a program and record it in the history
    pub fn start_program(&self, name: &str, duration_minutes: i64) -> Result<CountdownState, ControlError> {
        let minutes = non_negative(duration_minutes, "durationMinutes")?;
        self.launch_program(name, minutes)
    }

    pub fn start_program_by_id(&self, program_id: &str) -> Result<CountdownState, ControlError> {
        let program = self
            .lock_settings()
            .programs
            .iter()
            .find(|p| p.id == program_id)
            .cloned()
            .ok_or_else(|| ControlError::not_found(format!("program {program_id}")))?;
        self.launch_program(&program.name, program.duration_minutes)
    }

    /// Restart a recorded program; the run is recorded as a new entry
    pub fn run_from_history(&self, entry_id: &str) -> Result<CountdownState, ControlError> {
        let entry = self
            .lock_settings()
            .history
            .iter()
            .find(|e| e.id == entry_id)
            .cloned()
            .ok_or_else(|| ControlError::not_found(format!("history entry {entry_id}")))?;
        self.launch_program(&entry.program_name, entry.duration_minutes)
    }

    fn launch_program(&self, name: &str, duration_minutes: u64) -> Result<CountdownState, ControlError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ControlError::validation("program name must not be empty"));
        }
        let state = self.start_countdown(
            CountdownKind::Primary,
            duration_minutes.saturating_mul(60),
            Some(name.to_string()),
        )?;
        self.record_history(name, duration_minutes);
        Ok(state)
    }

    pub fn history(&self) -> Vec<TimerHistoryEntry> {
        self.lock_settings().history.clone()
    }

    pub fn clear_history(&self) {
        info!("Clearing timer history");
        self.record_action("clear-history");
        let mut settings = self.lock_settings();
        settings.history.clear();
        self.bus.publish(StateKey::TimerHistory, &settings.history);
    }

    /// Drop entries past the retention window, returning how many went
    pub fn prune_history(&self, now: DateTime<Utc>) -> usize {
        let mut settings = self.lock_settings();
        let pruned = prune_history(&mut settings.history, now);
        if pruned > 0 {
            info!("Dropped {} expired history entries", pruned);
            self.bus.publish(StateKey::TimerHistory, &settings.history);
        }
        pruned
    }

    fn record_history(&self, name: &str, duration_minutes: u64) {
        let now = Utc::now();
        let mut settings = self.lock_settings();
        prune_history(&mut settings.history, now);

        let mut entry = TimerHistoryEntry::new(name.to_string(), duration_minutes, now);
        let base = entry.id.clone();
        let mut suffix = 1;
        while settings.history.iter().any(|e| e.id == entry.id) {
            entry.id = format!("{base}-{suffix}");
            suffix += 1;
        }
        debug!("Recording history entry {} for {}", entry.id, name);
        settings.history.insert(0, entry);
        self.bus.publish(StateKey::TimerHistory, &settings.history);
    }

    pub fn show_alert(&self, message: &str) -> Result<AlertState, ControlError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ControlError::validation("alert message must not be empty"));
        }
        self.record_action("alert-show");
        Ok(self.alerts.show_alert(message.to_string()))
    }

    pub fn flash_alert(&self, message: Option<String>) -> AlertState {
        self.record_action("alert-flash");
        let message = message.filter(|m| !m.trim().is_empty());
        self.alerts.flash_alert(message)
    }

    pub fn clear_alert(&self) -> AlertState {
        self.record_action("alert-clear");
        self.alerts.clear_alert()
    }

    pub fn announce_next_program(
        &self,
        name: &str,
        duration_minutes: i64,
    ) -> Result<NextProgramAnnouncement, ControlError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ControlError::validation("program name must not be empty"));
        }
        let minutes = non_negative(duration_minutes, "durationMinutes")?;
        self.record_action("next-program");
        Ok(self.alerts.announce(name.to_string(), minutes))
    }

    pub fn show_clock(&self) -> ClockFlash {
        self.record_action("show-clock");
        self.alerts.show_clock()
    }

    pub fn display_sizes(&self) -> DisplaySizes {
        self.lock_settings().display_sizes.clone()
    }

    /// Replace the overlay appearance and restart or stop the lower-third
    /// cycle to match its mode
    pub fn configure_overlay(&self, appearance: OverlayAppearance) -> Result<DisplaySizes, ControlError> {
        validate_overlay(&appearance)?;
        info!("Configuring overlay: mode {:?}, live {}", appearance.mode, appearance.is_live);
        self.record_action("overlay");
        let sizes = {
            let mut settings = self.lock_settings();
            settings.display_sizes.overlay = appearance.clone();
            self.bus.publish(StateKey::DisplaySizes, &settings.display_sizes);
            settings.display_sizes.clone()
        };
        self.apply_overlay_cycle(&appearance);
        Ok(sizes)
    }

    /// Replace every display size. The lower-third cycle is only restarted
    /// when its mode or timing changed.
    pub fn update_display_sizes(&self, sizes: DisplaySizes) -> Result<DisplaySizes, ControlError> {
        validate_overlay(&sizes.overlay)?;
        self.record_action("display-sizes");
        let previous = {
            let mut settings = self.lock_settings();
            let previous = std::mem::replace(&mut settings.display_sizes, sizes.clone());
            self.bus.publish(StateKey::DisplaySizes, &settings.display_sizes);
            previous.overlay
        };
        let next = &sizes.overlay;
        if previous.mode != next.mode
            || previous.lower_third.display_seconds != next.lower_third.display_seconds
            || previous.lower_third.sleep_seconds != next.lower_third.sleep_seconds
        {
            self.apply_overlay_cycle(next);
        }
        Ok(sizes)
    }

    pub fn set_background(&self, background: Background) -> Background {
        info!("Setting background to {:?}", background.kind);
        self.record_action("background");
        let mut settings = self.lock_settings();
        settings.background = background;
        self.bus.publish(StateKey::Background, &settings.background);
        settings.background.clone()
    }

    pub fn set_text_case(&self, text_case: TextCase) -> TextCase {
        info!("Setting text case to {:?}", text_case);
        self.record_action("text-case");
        let mut settings = self.lock_settings();
        settings.text_case = text_case;
        self.bus.publish(StateKey::TextCase, &settings.text_case);
        text_case
    }

    fn apply_overlay_cycle(&self, appearance: &OverlayAppearance) -> OverlayPhaseState {
        if appearance.mode == OverlayMode::LowerThird {
            let lower_third = &appearance.lower_third;
            self.overlay_cycle
                .configure(lower_third.display_seconds, lower_third.sleep_seconds)
        } else {
            self.overlay_cycle.stop()
        }
    }

    pub async fn list_displays(&self) -> Result<Vec<DisplayDescriptor>, ControlError> {
        Ok(self.surfaces.list_displays().await?)
    }

    pub async fn attach_surface(&self, display_id: &str, kind: SurfaceKind) -> Result<Surface, ControlError> {
        let display_id = display_id.trim();
        if display_id.is_empty() {
            return Err(ControlError::validation("displayId must not be empty"));
        }
        self.record_action("attach");
        Ok(self.surfaces.attach(&DisplayId::new(display_id), kind).await?)
    }

    pub async fn attach_auto(&self, kind: SurfaceKind) -> Result<Surface, ControlError> {
        self.record_action("attach-auto");
        Ok(self.surfaces.attach_auto(kind).await?)
    }

    /// Returns false if the surface was already gone
    pub fn detach_surface(&self, id: SurfaceId) -> Result<bool, ControlError> {
        self.record_action("detach");
        Ok(self.surfaces.detach(id)?)
    }

    pub async fn duplicate_to(
        &self,
        display_ids: &[String],
        kind: SurfaceKind,
    ) -> Result<Vec<DuplicateOutcome>, ControlError> {
        let ids: Vec<DisplayId> = display_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(DisplayId::new)
            .collect();
        self.record_action("duplicate");
        Ok(self.surfaces.duplicate_to(&ids, kind).await?)
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        match self
            .last_action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            Some((action, at)) => (Some(action), Some(at)),
            None => (None, None),
        }
    }

    fn record_action(&self, action: &str) {
        *self.last_action.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((action.to_string(), Utc::now()));
    }

    fn lock_settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Value stored under `key`, or the default written back to the bus
fn restore<T>(bus: &StateBus, key: StateKey) -> T
where
    T: DeserializeOwned + Serialize + Default,
{
    bus.read(key).unwrap_or_else(|| {
        let value = T::default();
        bus.publish(key, &value);
        value
    })
}

fn non_negative(value: i64, field: &str) -> Result<u64, ControlError> {
    u64::try_from(value).map_err(|_| ControlError::validation(format!("{field} must not be negative")))
}

fn validate_overlay(appearance: &OverlayAppearance) -> Result<(), ControlError> {
    let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
    if !in_range(appearance.x) || !in_range(appearance.y) {
        return Err(ControlError::validation("overlay position must be within 0-100"));
    }
    if appearance.scale == 0 {
        return Err(ControlError::validation("overlay scale must be positive"));
    }
    let lower_third = &appearance.lower_third;
    if lower_third.display_seconds > MAX_CYCLE_SECONDS || lower_third.sleep_seconds > MAX_CYCLE_SECONDS {
        return Err(ControlError::validation(format!(
            "lower-third display and sleep must be at most {MAX_CYCLE_SECONDS} seconds"
        )));
    }
    Ok(())
}
