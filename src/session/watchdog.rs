use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activity::ActivityLog;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Shared connectivity flag, set by the top-level platform layer and
/// checked by armed watchdog timers.
#[derive(Clone, Default)]
pub struct Connectivity(Arc<AtomicBool>);

impl Connectivity {
    pub fn new(connected: bool) -> Self {
        Self(Arc::new(AtomicBool::new(connected)))
    }

    pub fn set_connected(&self, connected: bool) {
        self.0.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One-shot liveness check armed on disconnect. Each `arm` call spawns an
/// independent timer; the activity log's tail dedup keeps repeated
/// expirations from stacking `BOT_DOWN` entries.
pub struct ReconnectWatchdog {
    connectivity: Connectivity,
    activity: Arc<ActivityLog>,
}

impl ReconnectWatchdog {
    pub fn new(connectivity: Connectivity, activity: Arc<ActivityLog>) -> Self {
        Self {
            connectivity,
            activity,
        }
    }

    pub fn arm(&self, timeout: Duration) -> JoinHandle<()> {
        let connectivity = self.connectivity.clone();
        let activity = self.activity.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if connectivity.is_connected() {
                info!(
                    "connection recovered within {}s, no report necessary",
                    timeout.as_secs()
                );
                return;
            }
            let reason = format!("did not reconnect within {} seconds", timeout.as_secs());
            warn!("{}", reason);
            match activity.log_bot_down(&reason).await {
                Ok(true) => {}
                Ok(false) => debug!("outage already reported, suppressing duplicate"),
                Err(e) => warn!("failed to report outage: {}", e),
            }
        })
    }
}
