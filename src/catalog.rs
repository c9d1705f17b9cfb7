use std::path::PathBuf;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::common::errors::CoreError;
use crate::common::types::UserId;

/// Per-user play counter inside a sound's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRecord {
    pub user_id: UserId,
    pub display_name: String,
    pub play_count: u64,
}

/// One playable asset. Identity is the `id` (the audio filename).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sound {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub play_history: Vec<PlayRecord>,
    #[serde(default)]
    pub favorited_by: Vec<UserId>,
}

impl Sound {
    pub fn play_count_for(&self, user: UserId) -> u64 {
        self.play_history
            .iter()
            .find(|r| r.user_id == user)
            .map(|r| r.play_count)
            .unwrap_or(0)
    }

    pub fn is_favorite_of(&self, user: UserId) -> bool {
        self.favorited_by.contains(&user)
    }
}

/// Durable sound catalog. Every mutation is a whole-file read-modify-write
/// executed under one lock so concurrent increments are never lost.
pub struct SoundCatalogStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SoundCatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// All sounds, stably sorted by display name (case-insensitive).
    pub async fn list(&self) -> Result<Vec<Sound>, CoreError> {
        let _guard = self.lock.lock().await;
        let mut sounds = self.read_unlocked()?;
        sort_by_display_name(&mut sounds);
        Ok(sounds)
    }

    pub async fn list_favorites(&self, user: UserId) -> Result<Vec<Sound>, CoreError> {
        let mut sounds = self.list().await?;
        sounds.retain(|s| s.is_favorite_of(user));
        Ok(sounds)
    }

    pub async fn get(&self, sound_id: &str) -> Result<Sound, CoreError> {
        let _guard = self.lock.lock().await;
        let sounds = self.read_unlocked()?;
        sounds
            .into_iter()
            .find(|s| s.id == sound_id)
            .ok_or_else(|| CoreError::CatalogUnavailable(format!("no such sound: {}", sound_id)))
    }

    pub async fn pick_random(&self) -> Result<Sound, CoreError> {
        let _guard = self.lock.lock().await;
        let sounds = self.read_unlocked()?;
        sounds
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| CoreError::CatalogUnavailable("catalog is empty".to_string()))
    }

    /// Flips the favorite flag. Returns whether the sound is now a favorite.
    pub async fn toggle_favorite(&self, sound_id: &str, user: UserId) -> Result<bool, CoreError> {
        let _guard = self.lock.lock().await;
        let mut sounds = self.read_unlocked()?;
        let sound = sounds
            .iter_mut()
            .find(|s| s.id == sound_id)
            .ok_or_else(|| CoreError::CatalogUnavailable(format!("no such sound: {}", sound_id)))?;

        let favorited = if let Some(pos) = sound.favorited_by.iter().position(|&u| u == user) {
            sound.favorited_by.remove(pos);
            false
        } else {
            sound.favorited_by.push(user);
            true
        };
        self.write_unlocked(&sounds)?;
        Ok(favorited)
    }

    /// Increments the per-user play counter, creating the record on first play.
    pub async fn record_play(
        &self,
        sound_id: &str,
        user: UserId,
        user_display_name: &str,
    ) -> Result<(), CoreError> {
        let _guard = self.lock.lock().await;
        let mut sounds = self.read_unlocked()?;
        let sound = sounds
            .iter_mut()
            .find(|s| s.id == sound_id)
            .ok_or_else(|| CoreError::CatalogUnavailable(format!("no such sound: {}", sound_id)))?;

        match sound.play_history.iter_mut().find(|r| r.user_id == user) {
            Some(record) => record.play_count += 1,
            None => sound.play_history.push(PlayRecord {
                user_id: user,
                display_name: user_display_name.to_string(),
                play_count: 1,
            }),
        }
        self.write_unlocked(&sounds)
    }

    fn read_unlocked(&self) -> Result<Vec<Sound>, CoreError> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| CoreError::CatalogUnavailable(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| CoreError::CatalogUnavailable(format!("{}: {}", self.path.display(), e)))
    }

    fn write_unlocked(&self, sounds: &[Sound]) -> Result<(), CoreError> {
        let raw = serde_json::to_string_pretty(sounds)
            .map_err(|e| CoreError::CatalogUnavailable(e.to_string()))?;
        std::fs::write(&self.path, raw)
            .map_err(|e| CoreError::CatalogUnavailable(format!("{}: {}", self.path.display(), e)))
    }
}

fn sort_by_display_name(sounds: &mut [Sound]) {
    sounds.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
    });
}

/// Read-only lookup of per-user entrance sounds. The profile file is owned
/// by an external management surface; a missing file means no profiles.
pub struct UserProfiles {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserProfile {
    id: UserId,
    #[serde(default)]
    entrance_sound: Option<String>,
}

impl UserProfiles {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn entrance_sound(&self, user: UserId) -> Option<String> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let profiles: Vec<UserProfile> = serde_json::from_str(&raw).ok()?;
        profiles
            .into_iter()
            .find(|p| p.id == user)
            .and_then(|p| p.entrance_sound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rand::Rng;
    use rand::distributions::Alphanumeric;

    fn temp_path(tag: &str) -> PathBuf {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        std::env::temp_dir().join(format!("soundkeeper-{}-{}.json", tag, suffix))
    }

    fn seeded_store(sounds: &[(&str, &str)]) -> SoundCatalogStore {
        let path = temp_path("catalog");
        let seeded: Vec<Sound> = sounds
            .iter()
            .map(|(id, display)| Sound {
                id: id.to_string(),
                display_name: display.to_string(),
                play_history: Vec::new(),
                favorited_by: Vec::new(),
            })
            .collect();
        std::fs::write(&path, serde_json::to_string(&seeded).unwrap()).unwrap();
        SoundCatalogStore::new(path)
    }

    #[tokio::test]
    async fn list_sorts_case_insensitively() {
        let store = seeded_store(&[
            ("b.mp3", "bravo"),
            ("a.mp3", "Alpha"),
            ("c.mp3", "charlie"),
        ]);
        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.display_name)
            .collect();
        assert_eq!(names, vec!["Alpha", "bravo", "charlie"]);
    }

    #[tokio::test]
    async fn toggle_favorite_flips_and_filters() {
        let store = seeded_store(&[("a.mp3", "Alpha"), ("b.mp3", "Bravo")]);
        let user = UserId(7);

        assert!(store.toggle_favorite("a.mp3", user).await.unwrap());
        let favorites = store.list_favorites(user).await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].id, "a.mp3");

        assert!(!store.toggle_favorite("a.mp3", user).await.unwrap());
        assert!(store.list_favorites(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_play_creates_then_increments() {
        let store = seeded_store(&[("a.mp3", "Alpha")]);
        store.record_play("a.mp3", UserId(7), "stig").await.unwrap();
        store.record_play("a.mp3", UserId(7), "stig").await.unwrap();
        store.record_play("a.mp3", UserId(9), "ola").await.unwrap();

        let sound = store.get("a.mp3").await.unwrap();
        assert_eq!(sound.play_count_for(UserId(7)), 2);
        assert_eq!(sound.play_count_for(UserId(9)), 1);
        assert_eq!(sound.play_history.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_plays_are_never_lost() {
        let store = Arc::new(seeded_store(&[("a.mp3", "Alpha"), ("b.mp3", "Bravo")]));

        let mut tasks = Vec::new();
        for i in 0..20u64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                // Interleave increments and favorite toggles across two users.
                if i % 4 == 3 {
                    store.toggle_favorite("b.mp3", UserId(2)).await.unwrap();
                } else {
                    let user = if i % 2 == 0 { UserId(1) } else { UserId(2) };
                    store.record_play("a.mp3", user, "user").await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let sound = store.get("a.mp3").await.unwrap();
        assert_eq!(sound.play_count_for(UserId(1)) + sound.play_count_for(UserId(2)), 15);
    }

    #[tokio::test]
    async fn unreadable_catalog_reports_unavailable() {
        let store = SoundCatalogStore::new(temp_path("missing"));
        match store.list().await {
            Err(CoreError::CatalogUnavailable(_)) => {}
            other => panic!("expected CatalogUnavailable, got {:?}", other.map(|v| v.len())),
        }
    }

    #[tokio::test]
    async fn pick_random_returns_a_catalog_entry() {
        let store = seeded_store(&[("a.mp3", "Alpha"), ("b.mp3", "Bravo")]);
        let sound = store.pick_random().await.unwrap();
        assert!(sound.id == "a.mp3" || sound.id == "b.mp3");
    }

    #[test]
    fn entrance_sound_lookup() {
        let path = temp_path("profiles");
        std::fs::write(
            &path,
            r#"[{"id": 7, "entranceSound": "fanfare.mp3"}, {"id": 9}]"#,
        )
        .unwrap();
        let profiles = UserProfiles::new(&path);
        assert_eq!(profiles.entrance_sound(UserId(7)).as_deref(), Some("fanfare.mp3"));
        assert_eq!(profiles.entrance_sound(UserId(9)), None);
        assert_eq!(profiles.entrance_sound(UserId(11)), None);
    }
}
