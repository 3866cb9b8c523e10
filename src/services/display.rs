//! Physical display enumeration

use std::sync::{Mutex, PoisonError};

use futures::future::{self, BoxFuture, FutureExt};
use tokio::process::Command;
use tracing::debug;

use crate::{
    error::DisplayError,
    state::{Bounds, DisplayId, DisplayInfo},
};

/// Source of the currently connected displays
pub trait DisplayBackend: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn enumerate(&self) -> BoxFuture<'_, Result<Vec<DisplayInfo>, DisplayError>>;
}

impl std::fmt::Debug for dyn DisplayBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DisplayBackend({})", self.name())
    }
}

/// Displays reported by `xrandr --listmonitors`
#[derive(Debug, Clone, Default)]
pub struct XrandrDisplays;

impl XrandrDisplays {
    pub fn new() -> Self {
        Self
    }

    async fn probe() -> Result<Vec<DisplayInfo>, DisplayError> {
        let output = Command::new("xrandr")
            .arg("--listmonitors")
            .output()
            .await
            .map_err(|source| DisplayError::Probe {
                command: "xrandr --listmonitors".to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DisplayError::ProbeFailed(stderr.trim().to_string()));
        }

        let displays = parse_listmonitors(&String::from_utf8_lossy(&output.stdout));
        debug!("xrandr reported {} displays", displays.len());
        Ok(displays)
    }
}

impl DisplayBackend for XrandrDisplays {
    fn name(&self) -> &'static str {
        "xrandr"
    }

    fn enumerate(&self) -> BoxFuture<'_, Result<Vec<DisplayInfo>, DisplayError>> {
        Self::probe().boxed()
    }
}

/// Parse the output of `xrandr --listmonitors`:
///
/// ```text
/// Monitors: 2
///  0: +*eDP-1 1920/344x1080/193+0+0  eDP-1
///  1: +HDMI-1 1920/527x1080/296+1920+0  HDMI-1
/// ```
pub fn parse_listmonitors(output: &str) -> Vec<DisplayInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let index = fields.next()?;
            if !index.ends_with(':') {
                return None;
            }
            let flagged_name = fields.next()?;
            let geometry = fields.next()?;
            let name = flagged_name.trim_start_matches('+');
            let is_primary = name.starts_with('*');
            let name = name.trim_start_matches('*');
            let id = fields.next().unwrap_or(name);
            Some(DisplayInfo {
                id: DisplayId::new(id),
                bounds: parse_geometry(geometry)?,
                is_primary,
            })
        })
        .collect()
}

/// Parse `WxH+X+Y`, tolerating xrandr's `W/mmxH/mm` physical-size suffixes
/// and negative offsets.
pub fn parse_geometry(geometry: &str) -> Option<Bounds> {
    let split = geometry.find(['+', '-'])?;
    let (size, offsets) = geometry.split_at(split);
    let (width, height) = size.split_once('x')?;
    let width = width.split('/').next()?.parse().ok()?;
    let height = height.split('/').next()?.parse().ok()?;

    let offsets = offsets.strip_prefix('+').unwrap_or(offsets);
    let second = offsets
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '+' || *c == '-')
        .map(|(i, _)| i)?;
    let (x, y) = offsets.split_at(second);
    let y = y.strip_prefix('+').unwrap_or(y);

    Some(Bounds {
        x: x.parse().ok()?,
        y: y.parse().ok()?,
        width,
        height,
    })
}

/// Fixed display layout, given on the command line or driven by tests.
/// Displays can be connected and disconnected at runtime.
#[derive(Debug, Default)]
pub struct VirtualDisplays {
    displays: Mutex<Vec<DisplayInfo>>,
}

impl VirtualDisplays {
    pub fn new(displays: Vec<DisplayInfo>) -> Self {
        Self {
            displays: Mutex::new(displays),
        }
    }

    /// Single 1920x1080 primary display
    pub fn single() -> Self {
        Self::new(vec![DisplayInfo {
            id: DisplayId::new("virtual-0"),
            bounds: Bounds {
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
            },
            is_primary: true,
        }])
    }

    /// Parse `[*]NAME=WxH+X+Y` specs; `*` marks the primary display. With no
    /// marker the first display is primary.
    pub fn from_specs(specs: &[String]) -> Result<Self, String> {
        let mut displays = specs
            .iter()
            .map(|spec| {
                let (name, geometry) = spec
                    .split_once('=')
                    .ok_or_else(|| format!("display spec `{spec}` must look like NAME=WxH+X+Y"))?;
                let is_primary = name.starts_with('*');
                let bounds = parse_geometry(geometry)
                    .ok_or_else(|| format!("invalid geometry `{geometry}` in display spec `{spec}`"))?;
                Ok(DisplayInfo {
                    id: DisplayId::new(name.trim_start_matches('*')),
                    bounds,
                    is_primary,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        if !displays.iter().any(|d| d.is_primary) {
            if let Some(first) = displays.first_mut() {
                first.is_primary = true;
            }
        }
        Ok(Self::new(displays))
    }

    pub fn connect(&self, display: DisplayInfo) {
        let mut displays = self.displays.lock().unwrap_or_else(PoisonError::into_inner);
        displays.retain(|d| d.id != display.id);
        displays.push(display);
    }

    /// Returns false if no such display was connected
    pub fn disconnect(&self, id: &DisplayId) -> bool {
        let mut displays = self.displays.lock().unwrap_or_else(PoisonError::into_inner);
        let before = displays.len();
        displays.retain(|d| &d.id != id);
        displays.len() != before
    }
}

impl DisplayBackend for VirtualDisplays {
    fn name(&self) -> &'static str {
        "virtual"
    }

    fn enumerate(&self) -> BoxFuture<'_, Result<Vec<DisplayInfo>, DisplayError>> {
        let displays = self
            .displays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        future::ready(Ok(displays)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_xrandr_listmonitors() {
        let output = "Monitors: 2\n 0: +*eDP-1 1920/344x1080/193+0+0  eDP-1\n 1: +HDMI-1 1280/527x720/296+1920+0  HDMI-1\n";
        let displays = parse_listmonitors(output);
        assert_eq!(displays.len(), 2);
        assert_eq!(displays[0].id, DisplayId::new("eDP-1"));
        assert!(displays[0].is_primary);
        assert_eq!(
            displays[1].bounds,
            Bounds {
                x: 1920,
                y: 0,
                width: 1280,
                height: 720
            }
        );
        assert!(!displays[1].is_primary);
    }

    #[test]
    fn parses_negative_offsets() {
        assert_eq!(
            parse_geometry("1920x1080-1920+0"),
            Some(Bounds {
                x: -1920,
                y: 0,
                width: 1920,
                height: 1080
            })
        );
        assert_eq!(parse_geometry("1920x1080+0-1080").map(|b| b.y), Some(-1080));
        assert_eq!(parse_geometry("garbage"), None);
    }

    #[test]
    fn virtual_specs_default_primary_to_first() {
        let displays = VirtualDisplays::from_specs(&[
            "LEFT=1920x1080+0+0".to_string(),
            "RIGHT=1920x1080+1920+0".to_string(),
        ])
        .unwrap();
        let listed = futures::executor::block_on(displays.enumerate()).unwrap();
        assert!(listed[0].is_primary);
        assert!(!listed[1].is_primary);

        assert!(VirtualDisplays::from_specs(&["nogeometry".to_string()]).is_err());
    }

    #[test]
    fn virtual_displays_hotplug() {
        let displays = VirtualDisplays::single();
        let id = DisplayId::new("virtual-0");
        assert!(displays.disconnect(&id));
        assert!(!displays.disconnect(&id));
        assert!(futures::executor::block_on(displays.enumerate()).unwrap().is_empty());
    }
}
