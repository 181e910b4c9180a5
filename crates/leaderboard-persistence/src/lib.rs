//! # Leaderboard Persistence Library
//!
//! Data-access layer of the leaderboard engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Request Handlers                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 LeaderboardRepository                       │
//! │             (submit_score, query_top)                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Store Client                             │
//! │    (typed Batch builder, bounded Pool, scoped guards)       │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                   │
//!                    ▼                   ▼
//! ┌─────────────────────────┐   ┌──────────────────────────────┐
//! │     Redis               │   │     MemoryStore              │
//! │  (totals:*, user:*)     │   │  (tests, local runs)         │
//! └─────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - `redis`: Enable the Redis backend (default)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use leaderboard_persistence::{
//!     LeaderboardRepository, Pool, PoolConfig, RedisConnector, StoreLeaderboardRepository,
//! };
//!
//! let pool = Pool::new(RedisConnector::new("redis://127.0.0.1:6379")?, PoolConfig::default());
//! let repo = StoreLeaderboardRepository::new(pool);
//!
//! repo.submit_score("u1", "Alice", 50).await?;
//! let top = repo.query_top("all", 10).await?;
//! ```

pub mod error;
pub mod repository;
pub mod store;

// Re-export commonly used types
pub use error::{ErrorKind, PersistenceError, Result};
#[cfg(feature = "redis")]
pub use repository::RedisLeaderboardRepository;
pub use repository::{LeaderboardRepository, StoreLeaderboardRepository};
#[cfg(feature = "redis")]
pub use store::RedisConnector;
pub use store::{MemoryStore, Pool, PoolConfig, PoolStatus};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
