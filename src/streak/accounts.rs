use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::common::errors::CoreError;
use crate::common::types::{AccountRef, UserId};

/// An external game account linked to a community member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedAccount {
    pub account_ref: AccountRef,
    pub owner_user_id: UserId,
}

/// File-backed list of tracked accounts. Mutations are exposed to an
/// external management surface; the poller only reads.
pub struct TrackedAccountStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TrackedAccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub async fn list(&self) -> Result<Vec<TrackedAccount>, CoreError> {
        let _guard = self.lock.lock().await;
        self.read_unlocked()
    }

    /// Adds an account, rejecting duplicates by account reference
    /// (case-insensitive) and by owning user.
    pub async fn add(&self, account_ref: AccountRef, owner: UserId) -> Result<(), CoreError> {
        let _guard = self.lock.lock().await;
        let mut accounts = self.read_unlocked()?;
        if accounts.iter().any(|a| a.owner_user_id == owner) {
            return Err(CoreError::InvalidConfig(format!(
                "user {} already has a linked account",
                owner
            )));
        }
        if accounts
            .iter()
            .any(|a| a.account_ref.eq_ignore_ascii_case(&account_ref))
        {
            return Err(CoreError::InvalidConfig(format!(
                "{} is already being tracked",
                account_ref
            )));
        }
        accounts.push(TrackedAccount {
            account_ref,
            owner_user_id: owner,
        });
        self.write_unlocked(&accounts)
    }

    /// Removes by exact account reference. Returns whether anything was
    /// removed.
    pub async fn remove(&self, account_ref: &AccountRef) -> Result<bool, CoreError> {
        let _guard = self.lock.lock().await;
        let mut accounts = self.read_unlocked()?;
        let before = accounts.len();
        accounts.retain(|a| a.account_ref != *account_ref);
        if accounts.len() == before {
            return Ok(false);
        }
        self.write_unlocked(&accounts)?;
        Ok(true)
    }

    fn read_unlocked(&self) -> Result<Vec<TrackedAccount>, CoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| CoreError::CatalogUnavailable(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CoreError::CatalogUnavailable(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write_unlocked(&self, accounts: &[TrackedAccount]) -> Result<(), CoreError> {
        let raw = serde_json::to_string_pretty(accounts)
            .map_err(|e| CoreError::CatalogUnavailable(e.to_string()))?;
        std::fs::write(&self.path, raw)
            .map_err(|e| CoreError::CatalogUnavailable(format!("{}: {}", self.path.display(), e)))
    }
}
