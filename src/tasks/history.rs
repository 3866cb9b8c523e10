//! Timer history retention sweeper

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::state::AppState;

/// How often expired history entries are swept
pub const SWEEP_PERIOD: Duration = Duration::from_secs(60 * 60);

/// Background task that drops history entries past the retention window
pub async fn history_sweeper_task(state: Arc<AppState>, period: Duration) {
    info!("Starting history sweeper task");

    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let pruned = state.prune_history(Utc::now());
        if pruned == 0 {
            debug!("History sweep found nothing to drop");
        }
    }
}
