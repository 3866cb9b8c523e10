//! State management module
//!
//! Records shared between the control side and the rendering surfaces, plus
//! the application registry that owns them.

pub mod alert;
pub mod app_state;
pub mod countdown;
pub mod display;
pub mod overlay;
pub mod settings;

// Re-export main types
pub use alert::{AlertState, ClockFlash, NextProgramAnnouncement};
pub use app_state::{AppState, Timings};
pub use countdown::{clamped_add, CountdownKind, CountdownPhase, CountdownState, TickOutcome};
pub use display::{
    Bounds, DisplayDescriptor, DisplayId, DisplayInfo, InUseBy, Surface, SurfaceId, SurfaceKind,
    SurfaceRoster, SurfaceStatus,
};
pub use overlay::{
    LowerThird, LowerThirdTheme, OverlayAppearance, OverlayMode, OverlayPhase, OverlayPhaseState,
    MAX_CYCLE_SECONDS,
};
pub use settings::{
    prune_history, Background, BackgroundKind, Category, DisplaySizes, Program, TextCase,
    TimerHistoryEntry, HISTORY_RETENTION_HOURS,
};
