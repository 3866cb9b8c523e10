//! Countdown engine: owns one countdown's state and the timers that drive it

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::slot::TimerSlot;
use crate::{
    bus::{StateBus, StateKey},
    state::{CountdownKind, CountdownState, TickOutcome},
};

/// Timer periods used by a countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTiming {
    pub tick: Duration,
    pub complete_pulse: Duration,
    pub attention_pulse: Duration,
}

impl Default for CountdownTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            complete_pulse: Duration::from_millis(2500),
            attention_pulse: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pulse {
    Complete,
    Attention,
}

#[derive(Debug, Default)]
struct Shared {
    state: CountdownState,
    ticker: TimerSlot,
    complete: TimerSlot,
    attention: TimerSlot,
}

impl Shared {
    fn slot(&mut self, pulse: Pulse) -> &mut TimerSlot {
        match pulse {
            Pulse::Complete => &mut self.complete,
            Pulse::Attention => &mut self.attention,
        }
    }
}

#[derive(Debug)]
struct EngineInner {
    kind: CountdownKind,
    key: StateKey,
    timing: CountdownTiming,
    bus: StateBus,
    shared: Mutex<Shared>,
}

/// One countdown instance. Every mutation is applied under the engine lock
/// and published before the lock is released, so the bus never sees a
/// partially applied change and sees changes in the order they happened.
///
/// Timer tasks only hold a weak reference: dropping the last engine handle
/// stops its ticking.
#[derive(Debug, Clone)]
pub struct CountdownEngine {
    inner: Arc<EngineInner>,
}

impl CountdownEngine {
    /// Create a zeroed countdown and publish it under the key for `kind`
    pub fn new(kind: CountdownKind, bus: StateBus, timing: CountdownTiming) -> Self {
        let engine = Self {
            inner: Arc::new(EngineInner {
                kind,
                key: state_key(kind),
                timing,
                bus,
                shared: Mutex::new(Shared::default()),
            }),
        };
        let shared = engine.lock();
        engine.commit(&shared);
        drop(shared);
        engine
    }

    pub fn kind(&self) -> CountdownKind {
        self.inner.kind
    }

    pub fn state(&self) -> CountdownState {
        self.lock().state.clone()
    }

    pub fn start(&self, duration_seconds: u64, label: Option<String>) -> CountdownState {
        info!(
            "Starting {} countdown: {}s{}",
            self.inner.kind.as_str(),
            duration_seconds,
            label.as_deref().map(|l| format!(" ({l})")).unwrap_or_default()
        );
        let mut shared = self.lock();
        shared.complete.cancel();
        shared.state.start(duration_seconds, label);
        self.arm_ticker(&mut shared);
        self.commit(&shared)
    }

    pub fn pause(&self) -> CountdownState {
        let mut shared = self.lock();
        if shared.state.pause() {
            info!("Paused {} countdown", self.inner.kind.as_str());
            shared.ticker.cancel();
            return self.commit(&shared);
        }
        debug!("Pause ignored, {} countdown is not running", self.inner.kind.as_str());
        shared.state.clone()
    }

    pub fn resume(&self) -> CountdownState {
        let mut shared = self.lock();
        if shared.state.resume() {
            info!("Resumed {} countdown", self.inner.kind.as_str());
            self.arm_ticker(&mut shared);
            return self.commit(&shared);
        }
        debug!("Resume ignored, {} countdown is not paused", self.inner.kind.as_str());
        shared.state.clone()
    }

    /// Return to idle and cancel every timer tied to this countdown
    pub fn reset(&self) -> CountdownState {
        info!("Resetting {} countdown", self.inner.kind.as_str());
        let mut shared = self.lock();
        shared.ticker.cancel();
        shared.complete.cancel();
        shared.attention.cancel();
        shared.state.reset();
        self.commit(&shared)
    }

    /// Stop counting without clearing the remaining time
    pub fn halt(&self) -> CountdownState {
        let mut shared = self.lock();
        if shared.state.halt() {
            info!("Halted {} countdown", self.inner.kind.as_str());
            shared.ticker.cancel();
            return self.commit(&shared);
        }
        shared.state.clone()
    }

    pub fn adjust(&self, delta_seconds: i64) -> CountdownState {
        let mut shared = self.lock();
        if shared.state.adjust(delta_seconds) {
            info!(
                "Adjusted {} countdown by {}s, {}s left",
                self.inner.kind.as_str(),
                delta_seconds,
                shared.state.total_seconds
            );
            return self.commit(&shared);
        }
        debug!("Adjust ignored, {} countdown is stopped", self.inner.kind.as_str());
        shared.state.clone()
    }

    /// Apply one tick immediately, as the periodic timer would
    pub fn tick(&self) -> TickOutcome {
        let mut shared = self.lock();
        self.apply_tick(&mut shared)
    }

    /// Raise the attention pulse; re-triggering restarts its window
    pub fn toggle_attention(&self) -> CountdownState {
        info!("Attention on {} countdown", self.inner.kind.as_str());
        let mut shared = self.lock();
        shared.state.raise_attention();
        self.arm_pulse(&mut shared, Pulse::Attention);
        self.commit(&shared)
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, shared: &Shared) -> CountdownState {
        self.inner.bus.publish(self.inner.key, &shared.state);
        shared.state.clone()
    }

    fn apply_tick(&self, shared: &mut Shared) -> TickOutcome {
        let outcome = shared.state.tick();
        match outcome {
            TickOutcome::Ignored => {}
            TickOutcome::Counted => {
                debug!("{} countdown: {}s left", self.inner.kind.as_str(), shared.state.total_seconds);
                self.commit(shared);
            }
            TickOutcome::Completed => {
                info!("{} countdown complete", self.inner.kind.as_str());
                shared.ticker.cancel();
                self.arm_pulse(shared, Pulse::Complete);
                self.commit(shared);
            }
        }
        outcome
    }

    fn arm_ticker(&self, shared: &mut Shared) {
        let generation = shared.ticker.rearm();
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.timing.tick;
        let first = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !on_ticker(&weak, generation) {
                    break;
                }
            }
        });
        shared.ticker.set_handle(handle);
    }

    fn arm_pulse(&self, shared: &mut Shared, pulse: Pulse) {
        let generation = shared.slot(pulse).rearm();
        let weak = Arc::downgrade(&self.inner);
        let window = match pulse {
            Pulse::Complete => self.inner.timing.complete_pulse,
            Pulse::Attention => self.inner.timing.attention_pulse,
        };
        let deadline = Instant::now() + window;
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            on_pulse_elapsed(&weak, pulse, generation);
        });
        shared.slot(pulse).set_handle(handle);
    }
}

fn upgrade(weak: &Weak<EngineInner>) -> Option<CountdownEngine> {
    weak.upgrade().map(|inner| CountdownEngine { inner })
}

/// Returns false once the ticker should stop
fn on_ticker(weak: &Weak<EngineInner>, generation: u64) -> bool {
    let Some(engine) = upgrade(weak) else {
        return false;
    };
    let mut shared = engine.lock();
    if !shared.ticker.is_current(generation) {
        return false;
    }
    match engine.apply_tick(&mut shared) {
        TickOutcome::Counted => true,
        TickOutcome::Ignored => {
            shared.ticker.release(generation);
            false
        }
        TickOutcome::Completed => false,
    }
}

fn on_pulse_elapsed(weak: &Weak<EngineInner>, pulse: Pulse, generation: u64) {
    let Some(engine) = upgrade(weak) else {
        return;
    };
    let mut shared = engine.lock();
    if !shared.slot(pulse).is_current(generation) {
        return;
    }
    shared.slot(pulse).release(generation);
    let cleared = match pulse {
        Pulse::Complete => shared.state.clear_complete(),
        Pulse::Attention => shared.state.clear_attention(),
    };
    if cleared {
        debug!("{:?} pulse cleared on {} countdown", pulse, engine.inner.kind.as_str());
        engine.commit(&shared);
    }
}

/// Bus key a countdown publishes under
pub fn state_key(kind: CountdownKind) -> StateKey {
    match kind {
        CountdownKind::Primary => StateKey::TimerState,
        CountdownKind::ExtraTime => StateKey::ExtraTime,
        CountdownKind::Overlay => StateKey::OverlayTimerState,
    }
}
