//! Display hot-plug watcher

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::services::surfaces::SurfaceManager;

/// Background task that re-enumerates displays so surfaces on unplugged
/// displays are detached without an operator action
pub async fn display_watch_task(manager: SurfaceManager, period: Duration) {
    info!(
        "Starting display watch task ({} backend, every {:?})",
        manager.backend_name(),
        period
    );

    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_count = None;
    let mut failing = false;

    loop {
        interval.tick().await;
        match manager.list_displays().await {
            Ok(displays) => {
                if failing {
                    info!("Display enumeration recovered");
                    failing = false;
                }
                if last_count != Some(displays.len()) {
                    info!("{} displays connected", displays.len());
                    last_count = Some(displays.len());
                } else {
                    debug!("Display layout unchanged");
                }
            }
            Err(e) => {
                // Only the first failure of a streak is worth a warning
                if !failing {
                    warn!("Failed to enumerate displays: {}", e);
                    failing = true;
                }
            }
        }
    }
}
