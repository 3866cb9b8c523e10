//! Cancellable timer slot shared by the countdown, alert and overlay tasks

use tokio::task::JoinHandle;

/// Holds at most one armed timer task for an entity.
///
/// Arming or cancelling bumps the generation. A task checks its generation
/// under the owner's lock before mutating anything, so a wake-up that raced
/// with a cancel is a no-op even if the abort arrives too late.
#[derive(Debug, Default)]
pub struct TimerSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any armed task and return the generation a new task must carry
    pub fn rearm(&mut self) -> u64 {
        self.cancel();
        self.generation
    }

    /// Record the task spawned for the current generation
    pub fn set_handle(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.handle.replace(handle) {
            previous.abort();
        }
    }

    pub fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Forget the handle of a task that finished on its own
    pub fn release(&mut self, generation: u64) {
        if self.is_current(generation) {
            self.handle = None;
        }
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_invalidates_generation_and_aborts() {
        let mut slot = TimerSlot::new();
        let generation = slot.rearm();
        slot.set_handle(tokio::spawn(std::future::pending::<()>()));
        assert!(slot.is_current(generation));
        assert!(slot.is_armed());

        slot.cancel();
        assert!(!slot.is_current(generation));
        assert!(!slot.is_armed());
    }

    #[tokio::test]
    async fn release_ignores_stale_generation() {
        let mut slot = TimerSlot::new();
        let stale = slot.rearm();
        let current = slot.rearm();
        slot.set_handle(tokio::spawn(std::future::pending::<()>()));

        slot.release(stale);
        assert!(slot.is_armed());
        slot.release(current);
        assert!(!slot.is_armed());
    }
}
