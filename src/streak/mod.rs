pub mod accounts;
pub mod api;
pub mod poller;

pub use accounts::*;
pub use api::*;
pub use poller::*;

use async_trait::async_trait;

use crate::common::errors::CoreError;
use crate::common::types::{AccountRef, CommunityId, UserId};

pub const WIN_SUFFIX: &str = "(win streak)";
pub const LOSS_SUFFIX: &str = "(loss streak)";

/// Result of classifying the two most recent ranked outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakLabel {
    None,
    Win,
    Loss,
}

/// Pure classification: two wins make a win streak, two losses a loss
/// streak, anything else (including fewer than two results) no streak.
pub fn streak_label(outcomes: &[bool]) -> StreakLabel {
    if outcomes.len() < 2 {
        return StreakLabel::None;
    }
    if outcomes.iter().all(|&w| w) {
        StreakLabel::Win
    } else if outcomes.iter().all(|&w| !w) {
        StreakLabel::Loss
    } else {
        StreakLabel::None
    }
}

/// Renders the display name for a label: strips any existing streak
/// suffix, then appends the new one. Applying the same label twice is a
/// fixed point, which is what makes the rename diff idempotent.
pub fn apply_streak_suffix(display_name: &str, label: StreakLabel) -> String {
    let base = display_name
        .replace(WIN_SUFFIX, "")
        .replace(LOSS_SUFFIX, "");
    let base = base.trim();
    match label {
        StreakLabel::None => base.to_string(),
        StreakLabel::Win => format!("{} {}", base, WIN_SUFFIX),
        StreakLabel::Loss => format!("{} {}", base, LOSS_SUFFIX),
    }
}

/// Contract the core requires from the platform's member directory.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn display_name(
        &self,
        community: CommunityId,
        user: UserId,
    ) -> Result<String, CoreError>;

    async fn rename(
        &self,
        community: CommunityId,
        user: UserId,
        display_name: &str,
    ) -> Result<(), CoreError>;
}

/// Contract the core requires from the external match-data service:
/// the win flags of the account's most recent ranked matches, newest
/// ordering not guaranteed.
#[async_trait]
pub trait MatchApi: Send + Sync {
    async fn recent_ranked_outcomes(&self, account: &AccountRef) -> Result<Vec<bool>, CoreError>;
}
