//! Surface lifecycle manager: display/surface registry with attach, detach
//! and duplicate broadcast

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::Serialize;
use tokio::{sync::watch, time::sleep};
use tracing::{info, warn};

use super::{
    display::DisplayBackend,
    host::{SurfaceHost, SurfaceLaunch},
};
use crate::{
    bus::{StateBus, StateKey},
    error::SurfaceError,
    state::{
        DisplayDescriptor, DisplayId, DisplayInfo, InUseBy, Surface, SurfaceId, SurfaceKind,
        SurfaceRoster, SurfaceStatus,
    },
};

/// Pause between surface creations in a duplicate broadcast
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(250);

/// Per-display result of [`SurfaceManager::duplicate_to`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateOutcome {
    pub display_id: DisplayId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<Surface>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DuplicateOutcome {
    pub fn is_ok(&self) -> bool {
        self.surface.is_some()
    }
}

#[derive(Debug)]
struct SurfaceRecord {
    surface: Surface,
    closed_tx: watch::Sender<bool>,
}

impl SurfaceRecord {
    fn new(surface: Surface) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self { surface, closed_tx }
    }

    /// End every feed tied to the current attachment
    fn close_feeds(&mut self) {
        self.closed_tx.send_replace(true);
        let (closed_tx, _) = watch::channel(false);
        self.closed_tx = closed_tx;
    }
}

#[derive(Debug, Default)]
struct Registry {
    displays: Vec<DisplayInfo>,
    surfaces: BTreeMap<SurfaceId, SurfaceRecord>,
    next_id: u32,
}

impl Registry {
    fn in_use_by(&self, display: &DisplayId) -> InUseBy {
        let hosted = |kind| {
            self.surfaces
                .values()
                .any(|r| r.surface.kind == kind && r.surface.is_on(display))
        };
        if hosted(SurfaceKind::TimerDisplay) {
            SurfaceKind::TimerDisplay.in_use_marker()
        } else if hosted(SurfaceKind::OverlayDisplay) {
            SurfaceKind::OverlayDisplay.in_use_marker()
        } else {
            InUseBy::None
        }
    }

    fn descriptors(&self) -> Vec<DisplayDescriptor> {
        self.displays
            .iter()
            .map(|display| DisplayDescriptor {
                id: display.id.clone(),
                bounds: display.bounds,
                is_primary: display.is_primary,
                in_use_by: self.in_use_by(&display.id),
            })
            .collect()
    }

    fn roster(&self) -> SurfaceRoster {
        SurfaceRoster {
            displays: self.descriptors(),
            surfaces: self.surfaces.values().map(|r| r.surface.clone()).collect(),
        }
    }

    /// Existing surface of `kind` that blocks attaching it to `display`
    fn conflict(&self, display: &DisplayId, kind: SurfaceKind) -> Option<&Surface> {
        self.surfaces.values().map(|r| &r.surface).find(|s| {
            s.kind == kind
                && s.is_attached()
                && match kind {
                    SurfaceKind::TimerDisplay => true,
                    _ => s.is_on(display),
                }
        })
    }

    /// Id of a detached surface of the same kind, or a fresh one
    fn allocate(&mut self, kind: SurfaceKind) -> SurfaceId {
        let reusable = self
            .surfaces
            .values()
            .find(|r| r.surface.kind == kind && r.surface.status == SurfaceStatus::Detached)
            .map(|r| r.surface.id);
        reusable.unwrap_or_else(|| {
            self.next_id += 1;
            SurfaceId(self.next_id)
        })
    }
}

#[derive(Debug)]
struct ManagerInner {
    backend: Arc<dyn DisplayBackend>,
    host: Arc<dyn SurfaceHost>,
    bus: StateBus,
    feed_base: String,
    stagger: Duration,
    registry: Mutex<Registry>,
}

/// Owner of every display and surface record
#[derive(Debug, Clone)]
pub struct SurfaceManager {
    inner: Arc<ManagerInner>,
}

impl SurfaceManager {
    /// `feed_base` is the URL prefix surfaces use to reach their event feed
    pub fn new(
        backend: Arc<dyn DisplayBackend>,
        host: Arc<dyn SurfaceHost>,
        bus: StateBus,
        feed_base: impl Into<String>,
        stagger: Duration,
    ) -> Self {
        let mut registry = Registry::default();
        registry.surfaces.insert(
            SurfaceId::MAIN_WINDOW,
            SurfaceRecord::new(Surface {
                id: SurfaceId::MAIN_WINDOW,
                kind: SurfaceKind::MainWindow,
                attached_display_id: None,
                status: SurfaceStatus::Attached,
            }),
        );
        let manager = Self {
            inner: Arc::new(ManagerInner {
                backend,
                host,
                bus,
                feed_base: feed_base.into(),
                stagger,
                registry: Mutex::new(registry),
            }),
        };
        let registry = manager.lock();
        manager.publish(&registry);
        drop(registry);
        manager
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    /// Re-enumerate displays and reconcile surfaces whose display vanished
    pub async fn list_displays(&self) -> Result<Vec<DisplayDescriptor>, SurfaceError> {
        let displays = self.inner.backend.enumerate().await?;
        let mut registry = self.lock();
        self.reconcile(&mut registry, displays);
        Ok(registry.descriptors())
    }

    /// Last enumerated displays, without probing the backend
    pub fn cached_displays(&self) -> Vec<DisplayDescriptor> {
        self.lock().descriptors()
    }

    pub fn surfaces(&self) -> Vec<Surface> {
        self.lock().surfaces.values().map(|r| r.surface.clone()).collect()
    }

    pub fn surface(&self, id: SurfaceId) -> Option<Surface> {
        self.lock().surfaces.get(&id).map(|r| r.surface.clone())
    }

    /// Signal that flips to `true` when the surface's current attachment
    /// ends. `None` unless the surface is attached.
    pub fn closed_signal(&self, id: SurfaceId) -> Option<watch::Receiver<bool>> {
        let registry = self.lock();
        let record = registry.surfaces.get(&id)?;
        record
            .surface
            .is_attached()
            .then(|| record.closed_tx.subscribe())
    }

    /// Put a full-screen surface of `kind` on `display_id`
    pub async fn attach(&self, display_id: &DisplayId, kind: SurfaceKind) -> Result<Surface, SurfaceError> {
        if kind == SurfaceKind::MainWindow {
            return Err(SurfaceError::NotAttachable(kind));
        }
        let displays = self.inner.backend.enumerate().await?;
        let mut registry = self.lock();
        self.reconcile(&mut registry, displays);
        self.attach_locked(&mut registry, display_id, kind)
    }

    /// Attach `kind` to the first secondary display that can take it
    pub async fn attach_auto(&self, kind: SurfaceKind) -> Result<Surface, SurfaceError> {
        if kind == SurfaceKind::MainWindow {
            return Err(SurfaceError::NotAttachable(kind));
        }
        let displays = self.inner.backend.enumerate().await?;
        let mut registry = self.lock();
        self.reconcile(&mut registry, displays);

        let secondaries: Vec<DisplayId> = registry
            .displays
            .iter()
            .filter(|d| !d.is_primary)
            .map(|d| d.id.clone())
            .collect();
        let Some(first) = secondaries.first().cloned() else {
            info!("No secondary display for {}", kind);
            return Err(SurfaceError::NoSecondaryDisplay);
        };
        let target = secondaries
            .into_iter()
            .find(|id| registry.conflict(id, kind).is_none())
            .unwrap_or(first);
        self.attach_locked(&mut registry, &target, kind)
    }

    /// Close a surface. Closing an unknown or already closed surface is a
    /// no-op; returns whether a live surface was torn down.
    pub fn detach(&self, id: SurfaceId) -> Result<bool, SurfaceError> {
        if id == SurfaceId::MAIN_WINDOW {
            return Err(SurfaceError::NotDetachable(id));
        }
        let mut registry = self.lock();
        let Some(mut record) = registry.surfaces.remove(&id) else {
            return Ok(false);
        };
        let was_attached = record.surface.is_attached();
        record.close_feeds();
        if was_attached {
            self.inner.host.close(id);
            info!("Detached surface {} ({})", id, record.surface.kind);
        }
        self.publish(&registry);
        Ok(was_attached)
    }

    /// Attach `kind` to every display in `display_ids` (all secondary displays
    /// when empty), pausing between creations. Failures do not roll back
    /// surfaces that were already created.
    pub async fn duplicate_to(
        &self,
        display_ids: &[DisplayId],
        kind: SurfaceKind,
    ) -> Result<Vec<DuplicateOutcome>, SurfaceError> {
        if kind == SurfaceKind::MainWindow {
            return Err(SurfaceError::NotAttachable(kind));
        }
        let displays = self.list_displays().await?;
        if !displays.iter().any(|d| !d.is_primary) {
            return Err(SurfaceError::NoSecondaryDisplay);
        }
        let targets: Vec<DisplayId> = if display_ids.is_empty() {
            displays.into_iter().filter(|d| !d.is_primary).map(|d| d.id).collect()
        } else {
            display_ids.to_vec()
        };

        info!("Duplicating {} to {} displays", kind, targets.len());
        let mut outcomes = Vec::with_capacity(targets.len());
        for (i, display_id) in targets.into_iter().enumerate() {
            if i > 0 {
                sleep(self.inner.stagger).await;
            }
            let outcome = match self.attach(&display_id, kind).await {
                Ok(surface) => DuplicateOutcome {
                    display_id,
                    surface: Some(surface),
                    error: None,
                },
                Err(e) => {
                    warn!("Duplicate to {} failed: {}", display_id, e);
                    DuplicateOutcome {
                        display_id,
                        surface: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, registry: &Registry) {
        self.inner.bus.publish(StateKey::Surfaces, &registry.roster());
    }

    fn attach_locked(
        &self,
        registry: &mut Registry,
        display_id: &DisplayId,
        kind: SurfaceKind,
    ) -> Result<Surface, SurfaceError> {
        let target = registry
            .displays
            .iter()
            .find(|d| &d.id == display_id)
            .cloned()
            .ok_or_else(|| SurfaceError::DisplayNotFound(display_id.clone()))?;

        if let Some(existing) = registry.conflict(display_id, kind) {
            let display = existing
                .attached_display_id
                .clone()
                .unwrap_or_else(|| display_id.clone());
            return Err(SurfaceError::DisplayInUse { display, kind });
        }

        let id = registry.allocate(kind);
        let surface = Surface {
            id,
            kind,
            attached_display_id: Some(target.id.clone()),
            status: SurfaceStatus::Attached,
        };
        let launch = SurfaceLaunch {
            surface: surface.clone(),
            bounds: target.bounds,
            feed_url: format!("{}/surfaces/{}/events", self.inner.feed_base, id),
        };
        self.inner.host.open(&launch)?;

        match registry.surfaces.get_mut(&id) {
            Some(record) => record.surface = surface.clone(),
            None => {
                registry.surfaces.insert(id, SurfaceRecord::new(surface.clone()));
            }
        }
        info!("Attached surface {} ({}) to display {}", id, kind, target.id);
        self.publish(registry);
        Ok(surface)
    }

    fn reconcile(&self, registry: &mut Registry, displays: Vec<DisplayInfo>) {
        let mut changed = registry.displays != displays;
        for record in registry.surfaces.values_mut() {
            let Some(display_id) = record.surface.attached_display_id.clone() else {
                continue;
            };
            if !record.surface.is_attached() || displays.iter().any(|d| d.id == display_id) {
                continue;
            }
            warn!(
                "Display {} disconnected, surface {} ({}) detached",
                display_id, record.surface.id, record.surface.kind
            );
            record.surface.status = SurfaceStatus::Detached;
            record.close_feeds();
            self.inner.host.close(record.surface.id);
            changed = true;
        }
        registry.displays = displays;
        if changed {
            self.publish(registry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::{display::VirtualDisplays, host::HeadlessHost},
        state::Bounds,
    };

    fn display(id: &str, x: i32, primary: bool) -> DisplayInfo {
        DisplayInfo {
            id: DisplayId::new(id),
            bounds: Bounds {
                x,
                y: 0,
                width: 1920,
                height: 1080,
            },
            is_primary: primary,
        }
    }

    fn manager(displays: Vec<DisplayInfo>) -> (SurfaceManager, Arc<VirtualDisplays>, StateBus) {
        let backend = Arc::new(VirtualDisplays::new(displays));
        let bus = StateBus::in_memory(64);
        let manager = SurfaceManager::new(
            backend.clone(),
            Arc::new(HeadlessHost),
            bus.clone(),
            "http://127.0.0.1:4810",
            DEFAULT_STAGGER,
        );
        (manager, backend, bus)
    }

    #[tokio::test]
    async fn attach_marks_display_in_use() {
        let (manager, _, bus) = manager(vec![display("A", 0, true), display("B", 1920, false)]);
        let surface = manager.attach(&DisplayId::new("B"), SurfaceKind::TimerDisplay).await.unwrap();
        assert_eq!(surface.attached_display_id, Some(DisplayId::new("B")));

        let displays = manager.cached_displays();
        assert_eq!(displays[1].in_use_by, InUseBy::MainTimer);
        assert_eq!(displays[0].in_use_by, InUseBy::None);

        let roster: SurfaceRoster = bus.read(StateKey::Surfaces).unwrap();
        assert_eq!(roster.surfaces.len(), 2);
    }

    #[tokio::test]
    async fn only_one_timer_display_at_a_time() {
        let (manager, _, _) = manager(vec![
            display("A", 0, true),
            display("B", 1920, false),
            display("C", 3840, false),
        ]);
        manager.attach(&DisplayId::new("B"), SurfaceKind::TimerDisplay).await.unwrap();
        let err = manager
            .attach(&DisplayId::new("C"), SurfaceKind::TimerDisplay)
            .await
            .unwrap_err();
        assert!(matches!(err, SurfaceError::DisplayInUse { display, .. } if display == DisplayId::new("B")));

        manager.attach(&DisplayId::new("B"), SurfaceKind::OverlayDisplay).await.unwrap();
        manager.attach(&DisplayId::new("C"), SurfaceKind::OverlayDisplay).await.unwrap();
        assert!(matches!(
            manager.attach(&DisplayId::new("C"), SurfaceKind::OverlayDisplay).await,
            Err(SurfaceError::DisplayInUse { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_display_and_main_window_are_rejected() {
        let (manager, _, _) = manager(vec![display("A", 0, true)]);
        assert!(matches!(
            manager.attach(&DisplayId::new("Z"), SurfaceKind::OverlayDisplay).await,
            Err(SurfaceError::DisplayNotFound(_))
        ));
        assert!(matches!(
            manager.attach(&DisplayId::new("A"), SurfaceKind::MainWindow).await,
            Err(SurfaceError::NotAttachable(_))
        ));
        assert!(matches!(
            manager.detach(SurfaceId::MAIN_WINDOW),
            Err(SurfaceError::NotDetachable(_))
        ));
    }

    #[tokio::test]
    async fn detach_is_idempotent_and_closes_feed() {
        let (manager, _, _) = manager(vec![display("A", 0, true), display("B", 1920, false)]);
        let surface = manager.attach(&DisplayId::new("B"), SurfaceKind::OverlayDisplay).await.unwrap();
        let closed = manager.closed_signal(surface.id).unwrap();

        assert!(manager.detach(surface.id).unwrap());
        assert!(*closed.borrow());
        assert!(!manager.detach(surface.id).unwrap());
        assert!(!manager.detach(SurfaceId(99)).unwrap());
        assert!(manager.surface(surface.id).is_none());
    }

    #[tokio::test]
    async fn auto_attach_without_secondary_reports_it() {
        let (manager, _, _) = manager(vec![display("A", 0, true)]);
        assert!(matches!(
            manager.attach_auto(SurfaceKind::TimerDisplay).await,
            Err(SurfaceError::NoSecondaryDisplay)
        ));
        assert!(matches!(
            manager.duplicate_to(&[], SurfaceKind::OverlayDisplay).await,
            Err(SurfaceError::NoSecondaryDisplay)
        ));
        // The windowed fallback on the primary display stays available
        manager.attach(&DisplayId::new("A"), SurfaceKind::TimerDisplay).await.unwrap();
    }

    #[tokio::test]
    async fn auto_attach_skips_displays_hosting_the_kind() {
        let (manager, _, _) = manager(vec![
            display("A", 0, true),
            display("B", 1920, false),
            display("C", 3840, false),
        ]);
        let first = manager.attach_auto(SurfaceKind::OverlayDisplay).await.unwrap();
        let second = manager.attach_auto(SurfaceKind::OverlayDisplay).await.unwrap();
        assert_eq!(first.attached_display_id, Some(DisplayId::new("B")));
        assert_eq!(second.attached_display_id, Some(DisplayId::new("C")));
    }

    #[tokio::test]
    async fn unplugged_display_detaches_and_id_is_reused() {
        let (manager, backend, _) = manager(vec![display("A", 0, true), display("B", 1920, false)]);
        let surface = manager.attach(&DisplayId::new("B"), SurfaceKind::TimerDisplay).await.unwrap();
        let closed = manager.closed_signal(surface.id).unwrap();

        backend.disconnect(&DisplayId::new("B"));
        manager.list_displays().await.unwrap();
        let detached = manager.surface(surface.id).unwrap();
        assert_eq!(detached.status, SurfaceStatus::Detached);
        assert!(*closed.borrow());
        assert!(manager.closed_signal(surface.id).is_none());

        backend.connect(display("HDMI-2", 1920, false));
        let again = manager.attach_auto(SurfaceKind::TimerDisplay).await.unwrap();
        assert_eq!(again.id, surface.id);
        assert_eq!(again.attached_display_id, Some(DisplayId::new("HDMI-2")));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_with_empty_list_targets_all_secondaries() {
        let (manager, _, _) = manager(vec![
            display("A", 0, true),
            display("B", 1920, false),
            display("C", 3840, false),
        ]);
        let outcomes = manager.duplicate_to(&[], SurfaceKind::OverlayDisplay).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(DuplicateOutcome::is_ok));
    }
}
