//! # Repository Traits
//!
//! Abstract repository interface for the leaderboard.
//! Implementations can be swapped for different backends (Redis, in-memory, etc.)

use async_trait::async_trait;

use crate::error::Result;
use leaderboard_domain::LeaderboardRow;

/// Repository for leaderboard operations
#[async_trait]
pub trait LeaderboardRepository: Send + Sync {
    /// Record `delta` points for a member and set its display name, as one
    /// atomic unit.
    async fn submit_score(&self, member_id: &str, display_name: &str, delta: i64) -> Result<()>;

    /// Top `limit` members of `window`, highest score first, with rank and
    /// display name.
    async fn query_top(&self, window: &str, limit: usize) -> Result<Vec<LeaderboardRow>>;
}
