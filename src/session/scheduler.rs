use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::common::errors::CoreError;
use crate::common::types::CommunityId;
use crate::session::controller::VoiceSessionController;

pub const MIN_INTERVAL_SECS: u64 = 5;
pub const MAX_INTERVAL_SECS: u64 = 300;
pub const MIN_CHANCE_PERCENT: u8 = 1;
pub const MAX_CHANCE_PERCENT: u8 = 100;

/// Runtime-mutable autoplay settings, re-read on every tick so changes
/// apply without restarting the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub interval_secs: u64,
    pub chance_percent: u8,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            chance_percent: 50,
        }
    }
}

impl From<&crate::config::SchedulerDefaults> for SchedulerSettings {
    fn from(defaults: &crate::config::SchedulerDefaults) -> Self {
        Self {
            interval_secs: defaults.interval_secs,
            chance_percent: defaults.chance_percent,
        }
    }
}

impl SchedulerSettings {
    pub fn set_interval(&mut self, secs: u64) -> Result<(), CoreError> {
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs) {
            return Err(CoreError::InvalidConfig(format!(
                "interval must be between {} and {} seconds",
                MIN_INTERVAL_SECS, MAX_INTERVAL_SECS
            )));
        }
        self.interval_secs = secs;
        Ok(())
    }

    pub fn set_chance(&mut self, percent: u8) -> Result<(), CoreError> {
        if !(MIN_CHANCE_PERCENT..=MAX_CHANCE_PERCENT).contains(&percent) {
            return Err(CoreError::InvalidConfig(format!(
                "chance must be between {} and {} percent",
                MIN_CHANCE_PERCENT, MAX_CHANCE_PERCENT
            )));
        }
        self.chance_percent = percent;
        Ok(())
    }
}

/// Handle to one community's running autoplay job.
pub struct SchedulerHandle {
    pub(crate) id: u64,
    pub(crate) token: CancellationToken,
    pub(crate) task: JoinHandle<()>,
}

static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(0);

/// Distinguishes successive jobs for the same community, so a task
/// exiting on its own can never unregister its replacement.
pub(crate) fn next_scheduler_id() -> u64 {
    NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed)
}

impl SchedulerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Spawns the per-community autoplay loop. The first tick fires as soon
/// as the job starts; every later tick waits the current interval. Each
/// tick rolls 1..=100 against the current chance and requests an
/// anonymous random playback. Ambient plays carry no triggering user, so
/// they never touch the play counters.
pub(crate) fn spawn(
    controller: Arc<VoiceSessionController>,
    community: CommunityId,
    settings: Arc<RwLock<SchedulerSettings>>,
    token: CancellationToken,
    id: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            // Cancellation observed between the wait and the roll still
            // suppresses the tick.
            if token.is_cancelled() {
                break;
            }

            let chance = settings.read().chance_percent;
            let roll: u8 = rand::thread_rng().gen_range(1..=100);
            if roll <= chance {
                match controller.request_playback(community, None, None).await {
                    Ok(sound) => {
                        debug!(%community, sound = %sound.id, "autoplay tick played a sound")
                    }
                    Err(CoreError::NotConnected) => {
                        info!(%community, "autoplay stopping: no voice connection");
                        controller.forget_scheduler(community, id);
                        break;
                    }
                    Err(e) => debug!(%community, "autoplay tick skipped: {}", e),
                }
            }

            let interval_secs = settings.read().interval_secs;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {}
            }
        }
    })
}
