//! Server-sent event feed: the read path of an attached surface.
//!
//! A new connection first receives one event per subscribed key carrying
//! the current snapshot, then every newer version as it is published. The
//! stream ends when the surface is detached or its display disappears.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{
    bus::{StateKey, StateUpdate, Subscription},
    error::ControlError,
    state::{AppState, SurfaceId, SurfaceKind},
};

/// Keys a surface of `kind` renders from
pub fn feed_keys(kind: SurfaceKind) -> &'static [StateKey] {
    match kind {
        SurfaceKind::MainWindow => &StateKey::ALL,
        SurfaceKind::TimerDisplay => &StateKey::TIMER_SURFACE,
        SurfaceKind::OverlayDisplay => &StateKey::OVERLAY_SURFACE,
    }
}

fn to_event(update: &StateUpdate) -> Event {
    Event::default()
        .event(update.key.as_str())
        .id(update.version.to_string())
        .data(update.value.to_string())
}

/// Handle GET /surfaces/:id/events
pub async fn surface_events_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ControlError> {
    let id = SurfaceId(id);
    let surface = state
        .surfaces
        .surface(id)
        .ok_or_else(|| ControlError::not_found(format!("surface {id}")))?;
    let closed = state
        .surfaces
        .closed_signal(id)
        .ok_or_else(|| ControlError::not_found(format!("attached surface {id}")))?;

    let mut subscription = state.bus.subscribe(feed_keys(surface.kind));
    let snapshot = subscription.bootstrap();
    info!(
        "Surface {} ({}) connected to its feed, {} keys",
        id,
        surface.kind,
        snapshot.len()
    );

    let events = stream::iter(snapshot)
        .chain(updates(id, subscription, closed))
        .map(|update| Ok(to_event(&update)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn updates(
    id: SurfaceId,
    subscription: Subscription,
    closed: watch::Receiver<bool>,
) -> impl Stream<Item = StateUpdate> {
    stream::unfold((subscription, closed), move |(mut subscription, mut closed)| async move {
        if *closed.borrow() {
            debug!("Feed of surface {} closed", id);
            return None;
        }
        tokio::select! {
            update = subscription.recv() => update.map(|update| (update, (subscription, closed))),
            _ = closed.changed() => {
                debug!("Feed of surface {} closed", id);
                None
            }
        }
    })
}
