use std::sync::Arc;

use chrono::Utc;
use safar_order::EnquiryManager;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Periodically expires QUOTED enquiries whose quote lapsed.
pub async fn start_expiry_worker(manager: Arc<EnquiryManager>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Expiry worker started, sweeping every {}s", every.as_secs());

    loop {
        ticker.tick().await;
        match manager.expire_stale(Utc::now()).await {
            Ok(0) => {}
            Ok(n) => info!("Expired {} lapsed quote(s)", n),
            Err(e) => error!("Expiry sweep failed: {}", e),
        }
    }
}
