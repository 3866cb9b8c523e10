//! Realization of surfaces as OS-level windows

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::{
    error::SurfaceError,
    state::{Bounds, Surface, SurfaceId},
};

/// Everything a host needs to put a surface on screen: a full-screen,
/// chromeless window covering `bounds` that renders `route` from the feed.
#[derive(Debug, Clone)]
pub struct SurfaceLaunch {
    pub surface: Surface,
    pub bounds: Bounds,
    pub feed_url: String,
}

pub trait SurfaceHost: Send + Sync + 'static {
    fn open(&self, launch: &SurfaceLaunch) -> Result<(), SurfaceError>;
    /// Tear down the window; closing an unknown surface is a no-op
    fn close(&self, id: SurfaceId);
}

impl std::fmt::Debug for dyn SurfaceHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SurfaceHost")
    }
}

/// Host that opens nothing: the renderer is started externally and connects
/// to the surface's event feed on its own.
#[derive(Debug, Clone, Default)]
pub struct HeadlessHost;

impl SurfaceHost for HeadlessHost {
    fn open(&self, launch: &SurfaceLaunch) -> Result<(), SurfaceError> {
        info!(
            "Surface {} ({}) ready at {}",
            launch.surface.id, launch.surface.kind, launch.feed_url
        );
        Ok(())
    }

    fn close(&self, id: SurfaceId) {
        info!("Surface {} closed", id);
    }
}

/// Spawns one renderer process per surface. Geometry and the feed URL are
/// passed through the environment; the child is killed on close.
#[derive(Debug)]
pub struct CommandHost {
    program: String,
    args: Vec<String>,
    children: Mutex<HashMap<SurfaceId, Child>>,
}

impl CommandHost {
    /// `command` is split on whitespace into the program and its arguments
    pub fn new(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            children: Mutex::new(HashMap::new()),
        })
    }
}

impl SurfaceHost for CommandHost {
    fn open(&self, launch: &SurfaceLaunch) -> Result<(), SurfaceError> {
        let surface = &launch.surface;
        let bounds = launch.bounds;
        let child = Command::new(&self.program)
            .args(&self.args)
            .env("STAGE_SYNC_SURFACE_ID", surface.id.to_string())
            .env("STAGE_SYNC_SURFACE_ROUTE", surface.kind.route())
            .env("STAGE_SYNC_FEED_URL", &launch.feed_url)
            .env("STAGE_SYNC_X", bounds.x.to_string())
            .env("STAGE_SYNC_Y", bounds.y.to_string())
            .env("STAGE_SYNC_WIDTH", bounds.width.to_string())
            .env("STAGE_SYNC_HEIGHT", bounds.height.to_string())
            .env("STAGE_SYNC_FULLSCREEN", "1")
            .env("STAGE_SYNC_FRAMELESS", "1")
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SurfaceError::Host(format!("failed to start {}: {}", self.program, e)))?;

        info!(
            "Started renderer for surface {} ({}) pid={:?}",
            surface.id,
            surface.kind,
            child.id()
        );
        let mut children = self.children.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut previous) = children.insert(surface.id, child) {
            if let Err(e) = previous.start_kill() {
                warn!("Failed to stop previous renderer for surface {}: {}", surface.id, e);
            }
        }
        Ok(())
    }

    fn close(&self, id: SurfaceId) {
        let child = self
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(mut child) = child {
            if let Err(e) = child.start_kill() {
                warn!("Failed to stop renderer for surface {}: {}", id, e);
            } else {
                info!("Stopped renderer for surface {}", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DisplayId, SurfaceKind, SurfaceStatus};

    fn launch(id: u32) -> SurfaceLaunch {
        SurfaceLaunch {
            surface: Surface {
                id: SurfaceId(id),
                kind: SurfaceKind::OverlayDisplay,
                attached_display_id: Some(DisplayId::new("HDMI-1")),
                status: SurfaceStatus::Attached,
            },
            bounds: Bounds {
                x: 1920,
                y: 0,
                width: 1920,
                height: 1080,
            },
            feed_url: format!("http://127.0.0.1:4810/surfaces/{id}/events"),
        }
    }

    fn running(host: &CommandHost) -> usize {
        host.children.lock().unwrap().len()
    }

    #[tokio::test]
    async fn reopening_a_surface_replaces_its_renderer() {
        let host = CommandHost::new("sleep 30").unwrap();
        host.open(&launch(1)).unwrap();
        host.open(&launch(1)).unwrap();
        host.open(&launch(2)).unwrap();
        assert_eq!(running(&host), 2);

        host.close(SurfaceId(1));
        host.close(SurfaceId(1));
        assert_eq!(running(&host), 1);
        host.close(SurfaceId(2));
        assert_eq!(running(&host), 0);
    }

    #[tokio::test]
    async fn missing_renderer_is_a_host_error() {
        let host = CommandHost::new("stage-sync-renderer-that-does-not-exist").unwrap();
        assert!(matches!(host.open(&launch(1)), Err(SurfaceError::Host(_))));
        assert_eq!(running(&host), 0);
    }

    #[test]
    fn command_host_requires_a_program() {
        assert!(CommandHost::new("   ").is_none());
        let host = CommandHost::new("chromium --kiosk --app").unwrap();
        assert_eq!(host.program, "chromium");
        assert_eq!(host.args, vec!["--kiosk", "--app"]);
    }
}
