use serde::{Deserialize, Serialize};

use crate::common::types::{AnyError, CommunityId};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerDefaults,
    #[serde(default)]
    pub streak: Option<StreakConfig>,
    pub logging: Option<LoggingConfig>,
}

/// Paths of the file-backed stores.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_sounds_file")]
    pub sounds_file: String,
    /// Directory holding the audio files named by the catalog ids.
    #[serde(default = "default_sounds_dir")]
    pub sounds_dir: String,
    #[serde(default = "default_profiles_file")]
    pub profiles_file: String,
    #[serde(default = "default_accounts_file")]
    pub accounts_file: String,
    #[serde(default = "default_activity_file")]
    pub activity_file: String,
}

fn default_sounds_file() -> String {
    "sounds.json".to_string()
}

fn default_sounds_dir() -> String {
    "sounds".to_string()
}

fn default_profiles_file() -> String {
    "users.json".to_string()
}

fn default_accounts_file() -> String {
    "accounts.json".to_string()
}

fn default_activity_file() -> String {
    "logs.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sounds_file: default_sounds_file(),
            sounds_dir: default_sounds_dir(),
            profiles_file: default_profiles_file(),
            accounts_file: default_accounts_file(),
            activity_file: default_activity_file(),
        }
    }
}

/// Initial values for the runtime-mutable autoplay settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SchedulerDefaults {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_chance_percent")]
    pub chance_percent: u8,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_chance_percent() -> u8 {
    50
}

impl Default for SchedulerDefaults {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            chance_percent: default_chance_percent(),
        }
    }
}

/// Match-streak polling against the external game API.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreakConfig {
    pub api_key: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Community whose members get the streak suffix applied.
    pub community: CommunityId,
}

fn default_region() -> String {
    "europe".to_string()
}

fn default_poll_interval_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub filters: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, AnyError> {
        Self::load_from("config.toml")
    }

    pub fn load_from(path: &str) -> Result<Self, AnyError> {
        let config_str = std::fs::read_to_string(path).unwrap_or_else(|_| "".to_string());
        if config_str.is_empty() {
            return Err(format!("{} not found or empty", path).into());
        }
        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_tables() {
        let config: Config = toml::from_str("").expect("empty config should parse");
        assert_eq!(config.storage.sounds_file, "sounds.json");
        assert_eq!(config.scheduler.interval_secs, 60);
        assert_eq!(config.scheduler.chance_percent, 50);
        assert!(config.streak.is_none());
    }

    #[test]
    fn parses_streak_table() {
        let config: Config = toml::from_str(
            r#"
            [streak]
            api_key = "RGAPI-test"
            community = 476435508638253056
            "#,
        )
        .expect("streak config should parse");
        let streak = config.streak.expect("streak table present");
        assert_eq!(streak.region, "europe");
        assert_eq!(streak.poll_interval_secs, 300);
        assert_eq!(streak.community, CommunityId(476435508638253056));
    }
}
