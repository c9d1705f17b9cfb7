use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::activity::{
    ActivityEntry, ActivityKind, ActivityLog, ActorEntry, ChannelEntry, SoundEntry,
    VoiceFlagsEntry,
};
use crate::catalog::{Sound, SoundCatalogStore, UserProfiles};
use crate::common::errors::CoreError;
use crate::common::types::{CommunityId, Shared, now_secs};
use crate::session::scheduler::{self, SchedulerHandle, SchedulerSettings};
use crate::session::{
    AudioSink, ChannelInfo, MemberInfo, PresenceUpdate, SessionState, VoiceSession,
    VoiceStateSnapshot,
};

/// Owns the one voice session per community and serializes every
/// operation that touches it. Playback follows an at-most-one-in-flight
/// policy: concurrent requests are dropped with `AlreadyPlaying`, never
/// queued.
pub struct VoiceSessionController {
    sessions: DashMap<CommunityId, Shared<VoiceSession>>,
    schedulers: DashMap<CommunityId, SchedulerHandle>,
    catalog: Arc<SoundCatalogStore>,
    profiles: UserProfiles,
    activity: Arc<ActivityLog>,
    sink: Arc<dyn AudioSink>,
    settings: Arc<RwLock<SchedulerSettings>>,
    sounds_dir: PathBuf,
}

impl VoiceSessionController {
    pub fn new(
        catalog: Arc<SoundCatalogStore>,
        profiles: UserProfiles,
        activity: Arc<ActivityLog>,
        sink: Arc<dyn AudioSink>,
        settings: SchedulerSettings,
        sounds_dir: impl Into<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            schedulers: DashMap::new(),
            catalog,
            profiles,
            activity,
            sink,
            settings: Arc::new(RwLock::new(settings)),
            sounds_dir: sounds_dir.into(),
        })
    }

    /// Connects the community's voice session to `channel`. A no-op when a
    /// session already exists; a transport failure tears the placeholder
    /// back down and leaves the community disconnected.
    pub async fn connect(
        &self,
        community: CommunityId,
        channel: ChannelInfo,
    ) -> Result<(), CoreError> {
        let session = match self.sessions.entry(community) {
            Entry::Occupied(_) => {
                debug!(%community, "already connected, ignoring connect");
                return Ok(());
            }
            Entry::Vacant(vacant) => vacant
                .insert(Arc::new(Mutex::new(VoiceSession {
                    community_id: community,
                    channel: channel.clone(),
                    state: SessionState::Connecting,
                    last_activity: now_secs(),
                })))
                .clone(),
        };

        match self.sink.join(community, channel.id).await {
            Ok(()) => {
                session.lock().await.state = SessionState::Idle;
                info!(%community, channel = %channel.id, "voice session connected");
                Ok(())
            }
            Err(e) => {
                self.sessions.remove(&community);
                error!(%community, "failed to connect voice session: {}", e);
                Err(e)
            }
        }
    }

    /// Destroys the community's voice session and cancels its autoplay
    /// scheduler.
    pub async fn disconnect(&self, community: CommunityId) -> Result<(), CoreError> {
        self.sessions
            .remove(&community)
            .ok_or(CoreError::NotConnected)?;
        self.stop_scheduler(community);
        if let Err(e) = self.sink.leave(community).await {
            warn!(%community, "voice transport leave failed: {}", e);
        }
        info!(%community, "voice session disconnected");
        Ok(())
    }

    pub async fn session_state(&self, community: CommunityId) -> Option<SessionState> {
        let session = self.sessions.get(&community).map(|s| s.value().clone())?;
        let state = session.lock().await.state;
        Some(state)
    }

    /// Plays `sound_id`, or a uniform random catalog pick when omitted.
    /// The session lock is held across the busy check, the stream start
    /// and the transition to `Playing`, so exactly one of any set of
    /// concurrent requests wins. When playback completes the session
    /// returns to idle and, if a triggering user was given, the play is
    /// counted and logged (both best-effort).
    pub async fn request_playback(
        &self,
        community: CommunityId,
        sound_id: Option<&str>,
        triggering_user: Option<&MemberInfo>,
    ) -> Result<Sound, CoreError> {
        let session = self
            .sessions
            .get(&community)
            .map(|s| s.value().clone())
            .ok_or(CoreError::NotConnected)?;

        let mut guard = session.lock().await;
        match guard.state {
            SessionState::Playing => return Err(CoreError::AlreadyPlaying),
            SessionState::Connecting => return Err(CoreError::NotConnected),
            SessionState::Idle => {}
        }

        let sound = match sound_id {
            Some(id) => self.catalog.get(id).await?,
            None => self.catalog.pick_random().await?,
        };

        let path = self.sounds_dir.join(&sound.id);
        let finished = self.sink.play(community, &path).await?;

        guard.state = SessionState::Playing;
        guard.last_activity = now_secs();
        let channel = guard.channel.clone();
        drop(guard);

        info!(%community, sound = %sound.id, "playing sound");
        self.watch_completion(session, channel, sound.clone(), triggering_user.cloned(), finished);
        Ok(sound)
    }

    fn watch_completion(
        &self,
        session: Shared<VoiceSession>,
        channel: ChannelInfo,
        sound: Sound,
        triggering_user: Option<MemberInfo>,
        finished: tokio::sync::oneshot::Receiver<()>,
    ) {
        let catalog = self.catalog.clone();
        let activity = self.activity.clone();
        tokio::spawn(async move {
            let _ = finished.await;
            {
                let mut guard = session.lock().await;
                if guard.state == SessionState::Playing {
                    guard.state = SessionState::Idle;
                    guard.last_activity = now_secs();
                }
            }
            let Some(user) = triggering_user else {
                return;
            };
            if let Err(e) = catalog.record_play(&sound.id, user.user_id, &user.name).await {
                warn!(sound = %sound.id, "failed to record play: {}", e);
            }
            let entry = ActivityEntry::new(ActivityKind::PlayedSound)
                .with_user(ActorEntry {
                    id: user.user_id,
                    name: user.name.clone(),
                    nick: user.nick.clone(),
                })
                .with_voice_state(VoiceFlagsEntry {
                    deafened: user.self_deaf,
                    muted: user.self_mute,
                })
                .with_channel(ChannelEntry {
                    id: channel.id,
                    name: channel.name.clone(),
                })
                .with_sound(SoundEntry {
                    id: sound.id.clone(),
                    display_name: sound.display_name.clone(),
                });
            if let Err(e) = activity.append(entry).await {
                warn!("activity log append failed: {}", e);
            }
        });
    }

    /// Handles an inbound presence change: logs the derived activity
    /// kind, auto-connects (with entrance sound) when a member enters a
    /// channel, and auto-disconnects once the session channel has no
    /// non-bot members left.
    pub async fn on_presence_change(&self, update: PresenceUpdate) {
        if !update.member.is_bot {
            self.log_presence(&update).await;
        }

        let joined_channel = update.after.channel.as_ref().filter(|after_ch| {
            update.before.channel.as_ref().map(|c| c.id) != Some(after_ch.id)
        });

        if let Some(after_ch) = joined_channel {
            if !update.member.is_bot {
                let existing = self.sessions.get(&update.community_id).map(|s| s.value().clone());
                match existing {
                    None => {
                        if self
                            .connect(update.community_id, after_ch.clone())
                            .await
                            .is_ok()
                        {
                            self.play_entrance_sound(&update).await;
                        }
                    }
                    Some(session) => {
                        let same_channel = session.lock().await.channel.id == after_ch.id;
                        if same_channel {
                            self.play_entrance_sound(&update).await;
                        }
                    }
                }
            }
        }

        // Auto-disconnect: a session must not outlive its last non-bot
        // occupant.
        let session = self.sessions.get(&update.community_id).map(|s| s.value().clone());
        if let Some(session) = session {
            let session_channel = session.lock().await.channel.id;
            let occupancy = [&update.after, &update.before].into_iter().find_map(|snap| {
                snap.channel
                    .as_ref()
                    .filter(|c| c.id == session_channel)
                    .map(|c| c.non_bot_members)
            });
            if occupancy == Some(0) {
                info!(community = %update.community_id, "voice channel emptied, disconnecting");
                if let Err(e) = self.disconnect(update.community_id).await {
                    debug!(community = %update.community_id, "auto-disconnect skipped: {}", e);
                }
            }
        }
    }

    async fn log_presence(&self, update: &PresenceUpdate) {
        let Some(kind) = classify_presence(&update.before, &update.after) else {
            return;
        };
        let left = kind == ActivityKind::LeftChannel;
        let channel = update
            .after
            .channel
            .as_ref()
            .or(update.before.channel.as_ref());
        let mut entry = ActivityEntry::new(kind)
            .with_user(ActorEntry {
                id: update.member.user_id,
                name: update.member.name.clone(),
                nick: update.member.nick.clone(),
            })
            .with_voice_state(VoiceFlagsEntry {
                deafened: !left && update.after.self_deaf,
                muted: !left && update.after.self_mute,
            });
        if let Some(channel) = channel {
            entry = entry.with_channel(ChannelEntry {
                id: channel.id,
                name: channel.name.clone(),
            });
        }
        if let Err(e) = self.activity.append(entry).await {
            warn!("activity log append failed: {}", e);
        }
    }

    async fn play_entrance_sound(&self, update: &PresenceUpdate) {
        let Some(sound_id) = self.profiles.entrance_sound(update.member.user_id) else {
            return;
        };
        // The after snapshot carries the member's voice flags as of the
        // join itself.
        let mut member = update.member.clone();
        member.self_mute = update.after.self_mute;
        member.self_deaf = update.after.self_deaf;
        if let Err(e) = self
            .request_playback(update.community_id, Some(&sound_id), Some(&member))
            .await
        {
            debug!(user = %member.user_id, "entrance sound skipped: {}", e);
        }
    }

    /// Starts the community's autoplay scheduler. Returns false (and does
    /// nothing) when it is already running.
    pub fn start_scheduler(self: &Arc<Self>, community: CommunityId) -> bool {
        if let Some(handle) = self.schedulers.get(&community) {
            if !handle.is_finished() {
                return false;
            }
        }
        let token = CancellationToken::new();
        let id = scheduler::next_scheduler_id();
        let task = scheduler::spawn(
            self.clone(),
            community,
            self.settings.clone(),
            token.clone(),
            id,
        );
        self.schedulers
            .insert(community, SchedulerHandle { id, token, task });
        info!(%community, "autoplay scheduler started");
        true
    }

    /// Cancels the community's autoplay scheduler before its next tick.
    /// Returns false when none was running.
    pub fn stop_scheduler(&self, community: CommunityId) -> bool {
        match self.schedulers.remove(&community) {
            Some((_, handle)) => {
                handle.cancel();
                info!(%community, "autoplay scheduler stopped");
                true
            }
            None => false,
        }
    }

    pub fn scheduler_running(&self, community: CommunityId) -> bool {
        self.schedulers
            .get(&community)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Drops a scheduler handle whose task is exiting on its own. Guarded
    /// by the job id: a stale task that was already stopped and replaced
    /// must leave the replacement's handle (and its token) untouched.
    pub(crate) fn forget_scheduler(&self, community: CommunityId, scheduler_id: u64) {
        self.schedulers
            .remove_if(&community, |_, handle| handle.id == scheduler_id);
    }

    pub fn set_autoplay_interval(&self, secs: u64) -> Result<(), CoreError> {
        self.settings.write().set_interval(secs)
    }

    pub fn set_autoplay_chance(&self, percent: u8) -> Result<(), CoreError> {
        self.settings.write().set_chance(percent)
    }

    pub fn autoplay_settings(&self) -> SchedulerSettings {
        *self.settings.read()
    }
}

/// Derives the activity-log kind for a presence change, if any.
fn classify_presence(
    before: &VoiceStateSnapshot,
    after: &VoiceStateSnapshot,
) -> Option<ActivityKind> {
    match (&before.channel, &after.channel) {
        (None, Some(_)) => return Some(ActivityKind::JoinedChannel),
        (Some(_), None) => return Some(ActivityKind::LeftChannel),
        (Some(b), Some(a)) if b.id != a.id => return Some(ActivityKind::MovedChannel),
        _ => {}
    }
    if !before.streaming && after.streaming {
        Some(ActivityKind::StartedStreaming)
    } else if before.streaming && !after.streaming {
        Some(ActivityKind::StoppedStreaming)
    } else if before.self_deaf != after.self_deaf || before.self_mute != after.self_mute {
        Some(ActivityKind::VoiceStateChanged)
    } else {
        None
    }
}
