//! # Repository Module
//!
//! Repository pattern implementation for leaderboard persistence.

pub mod leaderboard;
pub mod traits;

#[cfg(feature = "redis")]
pub use leaderboard::RedisLeaderboardRepository;
pub use leaderboard::{NAME_FIELD, NAME_KEY_PREFIX, StoreLeaderboardRepository, name_key};
pub use traits::LeaderboardRepository;
