//! Display and surface records owned by the surface manager

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable display identifier (the output/connector name, e.g. `HDMI-1`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayId(pub String);

impl DisplayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub u32);

impl SurfaceId {
    /// The control surface itself
    pub const MAIN_WINDOW: SurfaceId = SurfaceId(0);
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display geometry in the virtual desktop coordinate space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// A physical display as reported by the display backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    pub id: DisplayId,
    pub bounds: Bounds,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InUseBy {
    None,
    MainTimer,
    Overlay,
}

/// A display plus what is currently shown on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayDescriptor {
    pub id: DisplayId,
    pub bounds: Bounds,
    pub is_primary: bool,
    pub in_use_by: InUseBy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SurfaceKind {
    MainWindow,
    TimerDisplay,
    OverlayDisplay,
}

impl SurfaceKind {
    /// Path the surface renders, relative to the control server
    pub fn route(&self) -> &'static str {
        match self {
            Self::MainWindow => "/",
            Self::TimerDisplay => "/timer",
            Self::OverlayDisplay => "/overlay",
        }
    }

    pub fn in_use_marker(&self) -> InUseBy {
        match self {
            Self::MainWindow => InUseBy::None,
            Self::TimerDisplay => InUseBy::MainTimer,
            Self::OverlayDisplay => InUseBy::Overlay,
        }
    }
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MainWindow => "main window",
            Self::TimerDisplay => "timer display",
            Self::OverlayDisplay => "overlay display",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SurfaceStatus {
    Attached,
    /// The backing display went away; the id is kept for reuse
    Detached,
}

/// An independently rendered output consuming synchronized state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Surface {
    pub id: SurfaceId,
    pub kind: SurfaceKind,
    pub attached_display_id: Option<DisplayId>,
    pub status: SurfaceStatus,
}

impl Surface {
    pub fn is_attached(&self) -> bool {
        self.status == SurfaceStatus::Attached
    }

    pub fn is_on(&self, display: &DisplayId) -> bool {
        self.is_attached() && self.attached_display_id.as_ref() == Some(display)
    }
}

/// Published snapshot of displays and surfaces for the control UI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceRoster {
    pub displays: Vec<DisplayDescriptor>,
    pub surfaces: Vec<Surface>,
}
