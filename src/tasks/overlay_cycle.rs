//! Lower-third show/sleep cycle scheduler

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use super::slot::TimerSlot;
use crate::{
    bus::{StateBus, StateKey},
    state::overlay::{next_boundary, phase_at, OverlayPhaseState},
};

#[derive(Debug, Default)]
struct CycleShared {
    phase: OverlayPhaseState,
    timer: TimerSlot,
}

#[derive(Debug)]
struct CycleInner {
    bus: StateBus,
    shared: Mutex<CycleShared>,
}

/// Publishes the lower-third phase so overlay surfaces can derive opacity and
/// transform without owning any timing themselves.
#[derive(Debug, Clone)]
pub struct OverlayCycle {
    inner: Arc<CycleInner>,
}

impl OverlayCycle {
    pub fn new(bus: StateBus) -> Self {
        let cycle = Self {
            inner: Arc::new(CycleInner {
                bus,
                shared: Mutex::new(CycleShared::default()),
            }),
        };
        let shared = cycle.lock();
        cycle.publish(&shared);
        drop(shared);
        cycle
    }

    pub fn phase(&self) -> OverlayPhaseState {
        self.lock().phase
    }

    /// Restart the cycle from Visible. A zero sleep keeps the lower third
    /// permanently visible.
    pub fn configure(&self, display_seconds: u64, sleep_seconds: u64) -> OverlayPhaseState {
        info!(
            "Configuring lower-third cycle: {}s visible, {}s asleep",
            display_seconds, sleep_seconds
        );
        let display = Duration::from_secs(display_seconds);
        let sleep = Duration::from_secs(sleep_seconds);

        let mut shared = self.lock();
        let generation = shared.timer.rearm();
        shared.phase = OverlayPhaseState::default();
        self.publish(&shared);

        if sleep.is_zero() {
            debug!("Sleep is zero, lower third stays visible");
            return shared.phase;
        }

        let started = Instant::now();
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                if !sync_phase(&weak, generation, started, display, sleep) {
                    break;
                }
                let elapsed = Instant::now().saturating_duration_since(started);
                let Some(deadline) =
                    next_boundary(elapsed, display, sleep).and_then(|boundary| started.checked_add(boundary))
                else {
                    debug!("Lower third has no further phase change");
                    break;
                };
                sleep_until(deadline).await;
            }
        });
        shared.timer.set_handle(handle);
        shared.phase
    }

    /// Halt the cycle and force the lower third visible
    pub fn stop(&self) -> OverlayPhaseState {
        let mut shared = self.lock();
        if shared.timer.is_armed() {
            info!("Stopping lower-third cycle");
        }
        shared.timer.cancel();
        shared.phase = OverlayPhaseState::default();
        self.publish(&shared);
        shared.phase
    }

    fn lock(&self) -> MutexGuard<'_, CycleShared> {
        self.inner.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, shared: &CycleShared) {
        self.inner.bus.publish(StateKey::OverlayPhase, &shared.phase);
    }
}

/// Publish the phase for the current instant if it moved. False once the
/// cycle was dropped or rearmed.
fn sync_phase(
    weak: &Weak<CycleInner>,
    generation: u64,
    started: Instant,
    display: Duration,
    sleep: Duration,
) -> bool {
    let Some(inner) = weak.upgrade() else {
        return false;
    };
    let cycle = OverlayCycle { inner };
    let mut shared = cycle.lock();
    if !shared.timer.is_current(generation) {
        return false;
    }
    let next = phase_at(Instant::now().saturating_duration_since(started), display, sleep);
    if next != shared.phase {
        debug!("Lower third now {:?} (cycle {})", next.phase, next.cycle);
        shared.phase = next;
        cycle.publish(&shared);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::OverlayPhase;
    use tokio::time::advance;

    async fn elapse_ms(ms: u64) {
        advance(Duration::from_millis(ms)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ten_five_cycle_publishes_each_phase() {
        let bus = StateBus::in_memory(32);
        let cycle = OverlayCycle::new(bus.clone());
        cycle.configure(10, 5);
        let published = || bus.read::<OverlayPhaseState>(StateKey::OverlayPhase).unwrap().phase;

        elapse_ms(9_999).await;
        assert_eq!(published(), OverlayPhase::Visible);
        elapse_ms(1).await;
        assert_eq!(published(), OverlayPhase::AnimatingOut);
        elapse_ms(600).await;
        assert_eq!(published(), OverlayPhase::Sleeping);
        elapse_ms(4_999).await;
        assert_eq!(published(), OverlayPhase::Sleeping);
        elapse_ms(1).await;
        assert_eq!(published(), OverlayPhase::Visible);
        assert_eq!(cycle.phase().cycle, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_forces_visible_and_cancels() {
        let bus = StateBus::in_memory(32);
        let cycle = OverlayCycle::new(bus.clone());
        cycle.configure(1, 1);
        elapse_ms(1_000).await;
        assert_eq!(cycle.phase().phase, OverlayPhase::AnimatingOut);

        cycle.stop();
        let version = bus.version(StateKey::OverlayPhase);
        elapse_ms(10_000).await;
        assert_eq!(bus.version(StateKey::OverlayPhase), version);
        assert_eq!(cycle.phase(), OverlayPhaseState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn reconfigure_restarts_from_visible() {
        let bus = StateBus::in_memory(32);
        let cycle = OverlayCycle::new(bus);
        cycle.configure(2, 2);
        elapse_ms(2_700).await;
        assert_eq!(cycle.phase().phase, OverlayPhase::Sleeping);

        cycle.configure(2, 2);
        assert_eq!(cycle.phase().phase, OverlayPhase::Visible);
        elapse_ms(1_900).await;
        assert_eq!(cycle.phase().phase, OverlayPhase::Visible);
    }

    #[tokio::test(start_paused = true)]
    async fn late_first_poll_publishes_current_phase() {
        let bus = StateBus::in_memory(32);
        let cycle = OverlayCycle::new(bus.clone());
        cycle.configure(1, 1);
        // the cycle task first runs after the visible and transition phases passed
        elapse_ms(1_700).await;
        let published = bus.read::<OverlayPhaseState>(StateKey::OverlayPhase).unwrap();
        assert_eq!(published.phase, OverlayPhase::Sleeping);
        assert_eq!(cycle.phase().phase, OverlayPhase::Sleeping);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_boundaries_keep_the_cycle_visible() {
        let bus = StateBus::in_memory(32);
        let cycle = OverlayCycle::new(bus.clone());
        for (display, sleep) in [(u64::MAX, 5), (u64::MAX / 2, 5), (5, u64::MAX / 2)] {
            cycle.configure(display, sleep);
            elapse_ms(10_000).await;
        }
        // the last pair does change phase, after its first five seconds
        assert_eq!(cycle.phase().phase, OverlayPhase::Sleeping);

        cycle.configure(u64::MAX, u64::MAX);
        elapse_ms(60_000).await;
        assert_eq!(cycle.phase(), OverlayPhaseState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_sleep_never_leaves_visible() {
        let bus = StateBus::in_memory(32);
        let cycle = OverlayCycle::new(bus);
        cycle.configure(3, 0);
        elapse_ms(60_000).await;
        assert_eq!(cycle.phase().phase, OverlayPhase::Visible);
    }
}
