use async_trait::async_trait;
use tracing::{error, warn};

use crate::activity::ActivityLog;
use crate::common::errors::CoreError;

/// Contract for the top-level platform connection. Everything past this
/// call (event dispatch, command registration) belongs to the adapter.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn connect(&self) -> Result<(), CoreError>;
}

/// Drives the one fatal failure path: a platform connection that cannot
/// be established at all still gets a final `BOT_DOWN` entry before the
/// error propagates.
pub async fn run(platform: &dyn Platform, activity: &ActivityLog) -> Result<(), CoreError> {
    if let Err(e) = platform.connect().await {
        error!("failed to establish platform connection: {}", e);
        if let Err(log_err) = activity.log_bot_down("startup failure").await {
            warn!("could not report startup failure: {}", log_err);
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rand::Rng;
    use rand::distributions::Alphanumeric;

    use crate::activity::ActivityKind;

    struct RefusingPlatform;

    #[async_trait]
    impl Platform for RefusingPlatform {
        async fn connect(&self) -> Result<(), CoreError> {
            Err(CoreError::ExternalApi("gateway unreachable".to_string()))
        }
    }

    struct HealthyPlatform;

    #[async_trait]
    impl Platform for HealthyPlatform {
        async fn connect(&self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn temp_log() -> Arc<ActivityLog> {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        Arc::new(ActivityLog::new(
            std::env::temp_dir().join(format!("soundkeeper-boot-{}.json", suffix)),
        ))
    }

    #[tokio::test]
    async fn startup_failure_reports_bot_down() {
        let activity = temp_log();
        let result = run(&RefusingPlatform, &activity).await;
        assert!(result.is_err());

        let entries = activity.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, ActivityKind::BotDown);
    }

    #[tokio::test]
    async fn healthy_startup_logs_nothing() {
        let activity = temp_log();
        run(&HealthyPlatform, &activity).await.unwrap();
        assert!(activity.entries().await.unwrap().is_empty());
    }
}
