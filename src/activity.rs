use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::common::errors::CoreError;
use crate::common::types::{ChannelId, UserId, now_secs};

/// Kinds of entries in the append-only activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    JoinedChannel,
    LeftChannel,
    MovedChannel,
    StartedStreaming,
    StoppedStreaming,
    VoiceStateChanged,
    PlayedSound,
    BotDown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorEntry {
    pub id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceFlagsEntry {
    pub deafened: bool,
    pub muted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    pub id: ChannelId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundEntry {
    pub id: String,
    pub display_name: String,
}

/// One timestamped log record. Optional fields are present depending on
/// the kind (`PLAYED_SOUND` carries `sound`, `BOT_DOWN` carries `reason`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub event: ActivityKind,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ActorEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_state: Option<VoiceFlagsEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<SoundEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ActivityEntry {
    pub fn new(event: ActivityKind) -> Self {
        Self {
            event,
            timestamp: now_secs(),
            user: None,
            voice_state: None,
            channel: None,
            sound: None,
            reason: None,
        }
    }

    pub fn with_user(mut self, user: ActorEntry) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_voice_state(mut self, flags: VoiceFlagsEntry) -> Self {
        self.voice_state = Some(flags);
        self
    }

    pub fn with_channel(mut self, channel: ChannelEntry) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_sound(mut self, sound: SoundEntry) -> Self {
        self.sound = Some(sound);
        self
    }
}

/// Append-only, file-backed activity log. The whole document is read and
/// rewritten under one lock; callers treat failures as best-effort.
pub struct ActivityLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub async fn append(&self, entry: ActivityEntry) -> Result<(), CoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_unlocked()?;
        entries.push(entry);
        self.write_unlocked(&entries)
    }

    /// Appends a `BOT_DOWN` entry unless the log already ends with one.
    /// Returns whether an entry was written.
    pub async fn log_bot_down(&self, reason: &str) -> Result<bool, CoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_unlocked()?;
        if matches!(entries.last(), Some(last) if last.event == ActivityKind::BotDown) {
            return Ok(false);
        }
        let mut entry = ActivityEntry::new(ActivityKind::BotDown);
        entry.reason = Some(reason.to_string());
        entries.push(entry);
        self.write_unlocked(&entries)?;
        Ok(true)
    }

    pub async fn entries(&self) -> Result<Vec<ActivityEntry>, CoreError> {
        let _guard = self.lock.lock().await;
        self.read_unlocked()
    }

    fn read_unlocked(&self) -> Result<Vec<ActivityEntry>, CoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| CoreError::CatalogUnavailable(format!("{}: {}", self.path.display(), e))),
            // A missing log starts empty.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CoreError::CatalogUnavailable(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write_unlocked(&self, entries: &[ActivityEntry]) -> Result<(), CoreError> {
        let raw = serde_json::to_string_pretty(entries)
            .map_err(|e| CoreError::CatalogUnavailable(e.to_string()))?;
        std::fs::write(&self.path, raw)
            .map_err(|e| CoreError::CatalogUnavailable(format!("{}: {}", self.path.display(), e)))
    }
}
