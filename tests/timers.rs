use std::{sync::Arc, time::Duration};

use stage_sync::{
    bus::{StateBus, StateKey},
    services::{HeadlessHost, SurfaceManager, VirtualDisplays},
    state::{
        AppState, CountdownKind, CountdownState, OverlayAppearance, OverlayMode, OverlayPhase,
        OverlayPhaseState,
    },
};

fn app() -> AppState {
    let bus = StateBus::in_memory(256);
    let surfaces = SurfaceManager::new(
        Arc::new(VirtualDisplays::single()),
        Arc::new(HeadlessHost),
        bus.clone(),
        "http://127.0.0.1:4810",
        Duration::ZERO,
    );
    AppState::new(bus, surfaces, 4810, "127.0.0.1".to_string())
}

/// Advance the paused clock in 100ms steps, letting timer tasks run
async fn elapse(duration: Duration) {
    let step = Duration::from_millis(100);
    let mut remaining = duration;
    while !remaining.is_zero() {
        let next = remaining.min(step);
        tokio::time::advance(next).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        remaining -= next;
    }
}

#[tokio::test(start_paused = true)]
async fn adjusting_past_zero_completes_on_the_next_tick() {
    let state = app();
    state.start_timer(CountdownKind::Primary, 300, None).unwrap();
    let adjusted = state.adjust_timer(CountdownKind::Primary, -330);
    assert_eq!(adjusted.total_seconds, 0);
    assert!(adjusted.is_running);

    elapse(Duration::from_secs(1)).await;
    let completed = state.primary.state();
    assert!(!completed.is_running);
    assert!(completed.is_complete);

    elapse(Duration::from_millis(2_500)).await;
    assert_eq!(state.primary.state(), CountdownState::new());
}

#[tokio::test(start_paused = true)]
async fn subscriber_sees_every_second_in_order() {
    let state = app();
    let mut subscription = state.bus.subscribe(&[StateKey::TimerState]);
    subscription.bootstrap();

    state.start_timer(CountdownKind::Primary, 3, None).unwrap();
    elapse(Duration::from_secs(3)).await;

    let mut remaining = Vec::new();
    while let Ok(Some(update)) =
        tokio::time::timeout(Duration::from_millis(1), subscription.recv()).await
    {
        remaining.push(update.decode::<CountdownState>().unwrap().total_seconds);
    }
    assert_eq!(remaining, vec![3, 2, 1, 0]);
}

#[tokio::test(start_paused = true)]
async fn reset_cancels_everything_armed_before_it() {
    let state = app();
    state.start_timer(CountdownKind::Overlay, 10, None).unwrap();
    state.toggle_attention(CountdownKind::Overlay);
    elapse(Duration::from_millis(1_500)).await;

    state.reset_timer(CountdownKind::Overlay);
    let version = state.bus.version(StateKey::OverlayTimerState);
    elapse(Duration::from_secs(15)).await;

    assert_eq!(state.bus.version(StateKey::OverlayTimerState), version);
    assert_eq!(state.overlay_timer.state(), CountdownState::new());
}

#[tokio::test(start_paused = true)]
async fn lower_third_cycles_ten_and_five() {
    let state = app();
    state
        .configure_overlay(OverlayAppearance {
            mode: OverlayMode::LowerThird,
            ..OverlayAppearance::default()
        })
        .unwrap();
    let phase = || {
        state
            .bus
            .read::<OverlayPhaseState>(StateKey::OverlayPhase)
            .unwrap()
            .phase
    };

    elapse(Duration::from_millis(9_900)).await;
    assert_eq!(phase(), OverlayPhase::Visible);
    elapse(Duration::from_millis(100)).await;
    assert_eq!(phase(), OverlayPhase::AnimatingOut);
    elapse(Duration::from_millis(600)).await;
    assert_eq!(phase(), OverlayPhase::Sleeping);
    elapse(Duration::from_secs(5)).await;
    assert_eq!(phase(), OverlayPhase::Visible);

    state.overlay_cycle.stop();
    let version = state.bus.version(StateKey::OverlayPhase);
    elapse(Duration::from_secs(30)).await;
    assert_eq!(state.bus.version(StateKey::OverlayPhase), version);
}
