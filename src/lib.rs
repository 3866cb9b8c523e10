//! Stage Sync - control server for a multi-display stage timer
//!
//! Keeps countdowns, alerts and overlay state in one process and fans every
//! change out to the timer and overlay surfaces attached to physical
//! displays.

pub mod api;
pub mod bus;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use api::create_router;
pub use bus::{StateBus, StateKey};
pub use config::Config;
pub use error::ControlError;
pub use state::AppState;
pub use utils::signals::shutdown_signal;
