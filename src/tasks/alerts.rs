//! Alert banner, next-program announcement and clock flash with their
//! auto-clearing timers

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use super::slot::TimerSlot;
use crate::{
    bus::{StateBus, StateKey},
    state::{AlertState, ClockFlash, NextProgramAnnouncement},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertTiming {
    pub flash: Duration,
    pub next_program_ttl: Duration,
    pub clock: Duration,
}

impl Default for AlertTiming {
    fn default() -> Self {
        Self {
            flash: Duration::from_millis(2500),
            next_program_ttl: Duration::from_secs(5),
            clock: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Expiry {
    Flash,
    NextProgram,
    Clock,
}

#[derive(Debug, Default)]
struct Board {
    alert: AlertState,
    next_program: Option<NextProgramAnnouncement>,
    clock: ClockFlash,
    flash_timer: TimerSlot,
    next_program_timer: TimerSlot,
    clock_timer: TimerSlot,
}

impl Board {
    fn slot(&mut self, expiry: Expiry) -> &mut TimerSlot {
        match expiry {
            Expiry::Flash => &mut self.flash_timer,
            Expiry::NextProgram => &mut self.next_program_timer,
            Expiry::Clock => &mut self.clock_timer,
        }
    }
}

#[derive(Debug)]
struct BoardInner {
    bus: StateBus,
    timing: AlertTiming,
    board: Mutex<Board>,
}

/// Owner of the banner-style state shown on timer surfaces
#[derive(Debug, Clone)]
pub struct AlertBoard {
    inner: Arc<BoardInner>,
}

impl AlertBoard {
    pub fn new(bus: StateBus, timing: AlertTiming) -> Self {
        let board = Self {
            inner: Arc::new(BoardInner {
                bus,
                timing,
                board: Mutex::new(Board::default()),
            }),
        };
        let state = board.lock();
        board.inner.bus.publish(StateKey::AlertState, &state.alert);
        board.inner.bus.publish(StateKey::NextProgram, &state.next_program);
        board.inner.bus.publish(StateKey::ShowClock, &state.clock);
        drop(state);
        board
    }

    pub fn alert(&self) -> AlertState {
        self.lock().alert.clone()
    }

    pub fn next_program(&self) -> Option<NextProgramAnnouncement> {
        self.lock().next_program.clone()
    }

    pub fn show_alert(&self, message: String) -> AlertState {
        info!("Showing alert: {}", message);
        let mut board = self.lock();
        board.alert.show(message);
        self.publish_alert(&board)
    }

    /// Flash the banner for the flash window
    pub fn flash_alert(&self, message: Option<String>) -> AlertState {
        let mut board = self.lock();
        board.alert.flash(message);
        info!("Flashing alert: {}", board.alert.message);
        self.arm(&mut board, Expiry::Flash);
        self.publish_alert(&board)
    }

    pub fn clear_alert(&self) -> AlertState {
        info!("Clearing alert");
        let mut board = self.lock();
        board.flash_timer.cancel();
        board.alert.clear();
        self.publish_alert(&board)
    }

    /// Announce the next program; the notice disappears after its TTL
    pub fn announce(&self, name: String, duration_minutes: u64) -> NextProgramAnnouncement {
        info!("Announcing next program: {} ({} min)", name, duration_minutes);
        let notice = NextProgramAnnouncement::new(name, duration_minutes, self.inner.timing.next_program_ttl);
        let mut board = self.lock();
        board.next_program = Some(notice.clone());
        self.arm(&mut board, Expiry::NextProgram);
        self.inner.bus.publish(StateKey::NextProgram, &board.next_program);
        notice
    }

    pub fn show_clock(&self) -> ClockFlash {
        info!("Showing clock");
        let mut board = self.lock();
        board.clock.visible = true;
        self.arm(&mut board, Expiry::Clock);
        self.inner.bus.publish(StateKey::ShowClock, &board.clock);
        board.clock
    }

    fn lock(&self) -> MutexGuard<'_, Board> {
        self.inner.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_alert(&self, board: &Board) -> AlertState {
        self.inner.bus.publish(StateKey::AlertState, &board.alert);
        board.alert.clone()
    }

    fn arm(&self, board: &mut Board, expiry: Expiry) {
        let generation = board.slot(expiry).rearm();
        let window = match expiry {
            Expiry::Flash => self.inner.timing.flash,
            Expiry::NextProgram => self.inner.timing.next_program_ttl,
            Expiry::Clock => self.inner.timing.clock,
        };
        let deadline = Instant::now() + window;
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            on_expired(&weak, expiry, generation);
        });
        board.slot(expiry).set_handle(handle);
    }
}

fn on_expired(weak: &Weak<BoardInner>, expiry: Expiry, generation: u64) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let board = AlertBoard { inner };
    let mut state = board.lock();
    if !state.slot(expiry).is_current(generation) {
        return;
    }
    state.slot(expiry).release(generation);
    debug!("{:?} expired", expiry);
    match expiry {
        Expiry::Flash => {
            if state.alert.stop_flashing() {
                board.publish_alert(&state);
            }
        }
        Expiry::NextProgram => {
            state.next_program = None;
            board.inner.bus.publish(StateKey::NextProgram, &state.next_program);
        }
        Expiry::Clock => {
            state.clock.visible = false;
            board.inner.bus.publish(StateKey::ShowClock, &state.clock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    async fn elapse(duration: Duration) {
        advance(duration).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn flash_stops_after_window_but_banner_stays() {
        let bus = StateBus::in_memory(16);
        let board = AlertBoard::new(bus.clone(), AlertTiming::default());
        board.show_alert("Doors closing".into());
        board.flash_alert(None);

        elapse(Duration::from_millis(2400)).await;
        assert!(board.alert().is_flashing);
        elapse(Duration::from_millis(100)).await;

        let alert: AlertState = bus.read(StateKey::AlertState).unwrap();
        assert!(!alert.is_flashing);
        assert!(alert.is_visible);
        assert_eq!(alert.message, "Doors closing");
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_pending_flash_timer() {
        let bus = StateBus::in_memory(16);
        let board = AlertBoard::new(bus.clone(), AlertTiming::default());
        board.flash_alert(Some("Now".into()));
        board.clear_alert();
        let version = bus.version(StateKey::AlertState);

        elapse(Duration::from_secs(5)).await;
        assert_eq!(bus.version(StateKey::AlertState), version);
    }

    #[tokio::test(start_paused = true)]
    async fn announcement_expires_after_ttl() {
        let bus = StateBus::in_memory(16);
        let board = AlertBoard::new(bus.clone(), AlertTiming::default());
        board.announce("Offering".into(), 10);
        assert!(bus.read::<Option<NextProgramAnnouncement>>(StateKey::NextProgram).flatten().is_some());

        elapse(Duration::from_secs(5)).await;
        assert!(board.next_program().is_none());
        assert!(bus.read::<Option<NextProgramAnnouncement>>(StateKey::NextProgram).flatten().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn clock_flash_hides_itself() {
        let bus = StateBus::in_memory(16);
        let board = AlertBoard::new(bus.clone(), AlertTiming::default());
        assert!(board.show_clock().visible);
        elapse(Duration::from_secs(3)).await;
        assert_eq!(bus.read::<ClockFlash>(StateKey::ShowClock), Some(ClockFlash { visible: false }));
    }
}
