pub mod controller;
pub mod scheduler;
pub mod watchdog;

pub use controller::*;
pub use scheduler::*;
pub use watchdog::*;

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::common::errors::CoreError;
use crate::common::types::{ChannelId, CommunityId, UserId};

/// Lifecycle of a community's voice session. Absence from the session
/// table is the disconnected state; sessions are created on connect and
/// destroyed on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Idle,
    Playing,
}

/// A voice channel as observed by the platform at event time, including
/// its live non-bot occupancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub non_bot_members: u32,
}

/// The one voice session per community, exclusively owned by the
/// controller.
#[derive(Debug)]
pub struct VoiceSession {
    pub community_id: CommunityId,
    pub channel: ChannelInfo,
    pub state: SessionState,
    pub last_activity: u64,
}

/// A member as seen at event time, including their current voice flags.
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub name: String,
    pub nick: Option<String>,
    pub is_bot: bool,
    pub self_mute: bool,
    pub self_deaf: bool,
}

/// A member's voice state before or after a presence event.
#[derive(Debug, Clone, Default)]
pub struct VoiceStateSnapshot {
    pub channel: Option<ChannelInfo>,
    pub self_mute: bool,
    pub self_deaf: bool,
    pub streaming: bool,
}

/// Inbound presence-change notification from the platform.
#[derive(Debug, Clone)]
pub struct PresenceUpdate {
    pub community_id: CommunityId,
    pub member: MemberInfo,
    pub before: VoiceStateSnapshot,
    pub after: VoiceStateSnapshot,
}

/// Contract the core requires from the audio transport. `play` starts
/// streaming asynchronously and yields a receiver resolved on completion.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn join(&self, community: CommunityId, channel: ChannelId) -> Result<(), CoreError>;

    async fn leave(&self, community: CommunityId) -> Result<(), CoreError>;

    async fn play(
        &self,
        community: CommunityId,
        sound_path: &Path,
    ) -> Result<oneshot::Receiver<()>, CoreError>;
}
