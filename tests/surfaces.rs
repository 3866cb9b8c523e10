use std::{sync::Arc, time::Duration};

use stage_sync::{
    bus::{StateBus, StateKey},
    services::{HeadlessHost, SurfaceManager, VirtualDisplays},
    state::{Bounds, DisplayId, DisplayInfo, InUseBy, SurfaceKind, SurfaceRoster, SurfaceStatus},
};

fn display(name: &str, index: i32, is_primary: bool) -> DisplayInfo {
    DisplayInfo {
        id: DisplayId::new(name),
        bounds: Bounds {
            x: index * 1920,
            y: 0,
            width: 1920,
            height: 1080,
        },
        is_primary,
    }
}

fn wall() -> Arc<VirtualDisplays> {
    Arc::new(VirtualDisplays::new(vec![
        display("MAIN", 0, true),
        display("D1", 1, false),
        display("D2", 2, false),
        display("D3", 3, false),
    ]))
}

fn manager(displays: Arc<VirtualDisplays>, bus: StateBus) -> SurfaceManager {
    SurfaceManager::new(
        displays,
        Arc::new(HeadlessHost),
        bus,
        "http://127.0.0.1:4810",
        Duration::from_millis(250),
    )
}

#[tokio::test(start_paused = true)]
async fn duplicate_survives_a_display_unplugged_mid_call() {
    let displays = wall();
    let manager = manager(displays.clone(), StateBus::in_memory(64));

    let targets = vec![DisplayId::new("D1"), DisplayId::new("D2"), DisplayId::new("D3")];
    let task = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.duplicate_to(&targets, SurfaceKind::OverlayDisplay).await })
    };

    // D1 is attached immediately; D2 is attempted after the first stagger
    tokio::time::sleep(Duration::from_millis(125)).await;
    assert!(displays.disconnect(&DisplayId::new("D2")));

    let outcomes = task.await.unwrap().unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_ok());
    assert!(!outcomes[1].is_ok());
    assert!(outcomes[1].error.as_deref().unwrap_or_default().contains("D2"));
    assert!(outcomes[2].is_ok());

    let first = outcomes[0].surface.clone().unwrap();
    let current = manager.surface(first.id).unwrap();
    assert_eq!(current.status, SurfaceStatus::Attached);
    assert_eq!(current.attached_display_id, Some(DisplayId::new("D1")));
}

#[tokio::test(start_paused = true)]
async fn duplicate_staggers_surface_creation() {
    let manager = manager(wall(), StateBus::in_memory(64));
    let started = tokio::time::Instant::now();
    let outcomes = manager.duplicate_to(&[], SurfaceKind::OverlayDisplay).await.unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.is_ok()));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_millis(750));
}

#[tokio::test]
async fn roster_is_published_on_the_bus() {
    let bus = StateBus::in_memory(64);
    let manager = manager(wall(), bus.clone());
    manager.list_displays().await.unwrap();
    manager
        .attach(&DisplayId::new("D3"), SurfaceKind::TimerDisplay)
        .await
        .unwrap();

    let roster: SurfaceRoster = bus.read(StateKey::Surfaces).unwrap();
    assert_eq!(roster.surfaces.len(), 2);
    let d3 = roster.displays.iter().find(|d| d.id == DisplayId::new("D3")).unwrap();
    assert_eq!(d3.in_use_by, InUseBy::MainTimer);
    let d1 = roster.displays.iter().find(|d| d.id == DisplayId::new("D1")).unwrap();
    assert_eq!(d1.in_use_by, InUseBy::None);
}

#[tokio::test]
async fn detached_surface_ends_its_feed_signal() {
    let manager = manager(wall(), StateBus::in_memory(64));
    let surface = manager
        .attach(&DisplayId::new("D1"), SurfaceKind::OverlayDisplay)
        .await
        .unwrap();
    let mut closed = manager.closed_signal(surface.id).unwrap();

    assert!(manager.detach(surface.id).unwrap());
    closed.changed().await.unwrap_or_default();
    assert!(*closed.borrow());
    assert!(manager.closed_signal(surface.id).is_none());
    assert!(!manager.detach(surface.id).unwrap());
}
