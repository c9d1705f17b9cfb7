use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::common::errors::CoreError;
use crate::common::types::CommunityId;
use crate::streak::accounts::{TrackedAccount, TrackedAccountStore};
use crate::streak::{MatchApi, MemberDirectory, apply_streak_suffix, streak_label};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Periodic job that refreshes every tracked account's streak suffix.
/// One account's failure never aborts the rest of the tick.
pub struct StreakPoller {
    accounts: Arc<TrackedAccountStore>,
    api: Arc<dyn MatchApi>,
    directory: Arc<dyn MemberDirectory>,
    community: CommunityId,
    interval: Duration,
}

impl StreakPoller {
    pub fn new(
        accounts: Arc<TrackedAccountStore>,
        api: Arc<dyn MatchApi>,
        directory: Arc<dyn MemberDirectory>,
        community: CommunityId,
        interval: Duration,
    ) -> Self {
        Self {
            accounts,
            api,
            directory,
            community,
            interval,
        }
    }

    /// Spawns the polling loop. The first pass runs right away; later
    /// passes wait the configured interval. Cancelling the token stops
    /// the loop before its next tick.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if token.is_cancelled() {
                    break;
                }
                self.tick().await;
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        })
    }

    /// One full pass over the tracked accounts.
    pub async fn tick(&self) {
        debug!("checking match streaks");
        let accounts = match self.accounts.list().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!("could not read tracked accounts: {}", e);
                return;
            }
        };
        for account in accounts {
            if let Err(e) = self.refresh(&account).await {
                warn!(account = %account.account_ref, "streak refresh failed: {}", e);
            }
        }
    }

    /// Recomputes one account's label and issues the rename only when the
    /// rendered display name actually changes.
    async fn refresh(&self, account: &TrackedAccount) -> Result<(), CoreError> {
        let outcomes = self.api.recent_ranked_outcomes(&account.account_ref).await?;
        let label = streak_label(&outcomes);

        let current = self
            .directory
            .display_name(self.community, account.owner_user_id)
            .await?;
        let next = apply_streak_suffix(&current, label);
        if next == current {
            return Ok(());
        }

        self.directory
            .rename(self.community, account.owner_user_id, &next)
            .await?;
        info!(user = %account.owner_user_id, "updated display name to {:?}", next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use rand::Rng;
    use rand::distributions::Alphanumeric;

    use crate::common::types::{AccountRef, UserId};

    struct FixedApi {
        outcomes: HashMap<AccountRef, Result<Vec<bool>, String>>,
    }

    #[async_trait]
    impl MatchApi for FixedApi {
        async fn recent_ranked_outcomes(
            &self,
            account: &AccountRef,
        ) -> Result<Vec<bool>, CoreError> {
            match self.outcomes.get(account) {
                Some(Ok(outcomes)) => Ok(outcomes.clone()),
                Some(Err(msg)) => Err(CoreError::ExternalApi(msg.clone())),
                None => Err(CoreError::ExternalApi("account not found".to_string())),
            }
        }
    }

    struct FakeDirectory {
        names: StdMutex<HashMap<UserId, String>>,
        renames: StdMutex<Vec<(UserId, String)>>,
    }

    impl FakeDirectory {
        fn new(names: &[(u64, &str)]) -> Arc<Self> {
            Arc::new(Self {
                names: StdMutex::new(
                    names
                        .iter()
                        .map(|(id, name)| (UserId(*id), name.to_string()))
                        .collect(),
                ),
                renames: StdMutex::new(Vec::new()),
            })
        }

        fn rename_count(&self) -> usize {
            self.renames.lock().unwrap().len()
        }

        fn name_of(&self, user: UserId) -> String {
            self.names.lock().unwrap().get(&user).cloned().unwrap()
        }
    }

    #[async_trait]
    impl MemberDirectory for FakeDirectory {
        async fn display_name(
            &self,
            _: CommunityId,
            user: UserId,
        ) -> Result<String, CoreError> {
            self.names
                .lock()
                .unwrap()
                .get(&user)
                .cloned()
                .ok_or_else(|| CoreError::ExternalApi(format!("no such member: {}", user)))
        }

        async fn rename(
            &self,
            _: CommunityId,
            user: UserId,
            display_name: &str,
        ) -> Result<(), CoreError> {
            self.names
                .lock()
                .unwrap()
                .insert(user, display_name.to_string());
            self.renames
                .lock()
                .unwrap()
                .push((user, display_name.to_string()));
            Ok(())
        }
    }

    fn temp_accounts(entries: &[(&str, u64)]) -> Arc<TrackedAccountStore> {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        let path =
            std::env::temp_dir().join(format!("soundkeeper-poller-{}.json", suffix));
        let accounts: Vec<TrackedAccount> = entries
            .iter()
            .map(|(account, owner)| TrackedAccount {
                account_ref: AccountRef::from(*account),
                owner_user_id: UserId(*owner),
            })
            .collect();
        std::fs::write(&path, serde_json::to_string(&accounts).unwrap()).unwrap();
        Arc::new(TrackedAccountStore::new(path))
    }

    fn poller(
        accounts: Arc<TrackedAccountStore>,
        api: FixedApi,
        directory: Arc<FakeDirectory>,
    ) -> StreakPoller {
        StreakPoller::new(
            accounts,
            Arc::new(api),
            directory,
            CommunityId(1000),
            DEFAULT_POLL_INTERVAL,
        )
    }

    #[tokio::test]
    async fn win_streak_appends_suffix_once() {
        let accounts = temp_accounts(&[("Summoner#1234", 7)]);
        let directory = FakeDirectory::new(&[(7, "stig")]);
        let api = FixedApi {
            outcomes: HashMap::from([(AccountRef::from("Summoner#1234"), Ok(vec![true, true]))]),
        };
        let poller = poller(accounts, api, directory.clone());

        poller.tick().await;
        assert_eq!(directory.name_of(UserId(7)), "stig (win streak)");
        assert_eq!(directory.rename_count(), 1);

        // Same outcomes on the next tick: the rename is not re-issued.
        poller.tick().await;
        assert_eq!(directory.rename_count(), 1);
    }

    #[tokio::test]
    async fn first_pass_runs_at_startup() {
        let accounts = temp_accounts(&[("Summoner#1234", 7)]);
        let directory = FakeDirectory::new(&[(7, "stig")]);
        let api = FixedApi {
            outcomes: HashMap::from([(AccountRef::from("Summoner#1234"), Ok(vec![true, true]))]),
        };
        let poller = Arc::new(poller(accounts, api, directory.clone()));

        // The default interval is minutes long; a rename landing within
        // the polling window below can only come from the startup pass.
        let token = CancellationToken::new();
        let task = poller.spawn(token.clone());
        for _ in 0..200 {
            if directory.rename_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(directory.name_of(UserId(7)), "stig (win streak)");

        token.cancel();
        let _ = task.await;
    }

    #[tokio::test]
    async fn broken_streak_strips_the_suffix() {
        let accounts = temp_accounts(&[("Summoner#1234", 7)]);
        let directory = FakeDirectory::new(&[(7, "stig (loss streak)")]);
        let api = FixedApi {
            outcomes: HashMap::from([(AccountRef::from("Summoner#1234"), Ok(vec![true, false]))]),
        };
        let poller = poller(accounts, api, directory.clone());

        poller.tick().await;
        assert_eq!(directory.name_of(UserId(7)), "stig");
    }

    #[tokio::test]
    async fn single_result_means_no_streak() {
        let accounts = temp_accounts(&[("Summoner#1234", 7)]);
        let directory = FakeDirectory::new(&[(7, "stig")]);
        let api = FixedApi {
            outcomes: HashMap::from([(AccountRef::from("Summoner#1234"), Ok(vec![true]))]),
        };
        let poller = poller(accounts, api, directory.clone());

        poller.tick().await;
        assert_eq!(directory.rename_count(), 0);
    }

    #[tokio::test]
    async fn one_failing_account_does_not_block_the_rest() {
        let accounts = temp_accounts(&[("Broken#0000", 5), ("Summoner#1234", 7)]);
        let directory = FakeDirectory::new(&[(5, "ola"), (7, "stig")]);
        let api = FixedApi {
            outcomes: HashMap::from([
                (AccountRef::from("Broken#0000"), Err("rate limited".to_string())),
                (AccountRef::from("Summoner#1234"), Ok(vec![false, false])),
            ]),
        };
        let poller = poller(accounts, api, directory.clone());

        poller.tick().await;
        assert_eq!(directory.name_of(UserId(5)), "ola");
        assert_eq!(directory.name_of(UserId(7)), "stig (loss streak)");
    }
}
