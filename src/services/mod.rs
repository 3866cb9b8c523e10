//! Display enumeration, surface hosting and the surface lifecycle manager

pub mod display;
pub mod host;
pub mod surfaces;

// Re-export main types
pub use display::{DisplayBackend, VirtualDisplays, XrandrDisplays};
pub use host::{CommandHost, HeadlessHost, SurfaceHost, SurfaceLaunch};
pub use surfaces::{DuplicateOutcome, SurfaceManager, DEFAULT_STAGGER};
