//! Background tasks module
//!
//! Timer-driven engines and the long-running tasks spawned next to the HTTP
//! server.

pub mod alerts;
pub mod countdown;
pub mod display_watch;
pub mod history;
pub mod overlay_cycle;
pub mod slot;
pub mod store_writer;

// Re-export main types and functions
pub use alerts::{AlertBoard, AlertTiming};
pub use countdown::{state_key, CountdownEngine, CountdownTiming};
pub use display_watch::display_watch_task;
pub use history::{history_sweeper_task, SWEEP_PERIOD};
pub use overlay_cycle::OverlayCycle;
pub use slot::TimerSlot;
pub use store_writer::store_writer_task;
