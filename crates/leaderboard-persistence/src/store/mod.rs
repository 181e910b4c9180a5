//! # Store Module
//!
//! Store client: typed commands, the atomic batch builder, the bounded
//! connection pool and its backends.

pub mod command;
pub mod memory;
pub mod pool;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use command::{Batch, BatchReplies, Command, FromReply, Reply, ScoredMember, Slot};
pub use memory::{MemoryConnection, MemoryStore};
pub use pool::{Connector, Pool, PoolConfig, PoolStatus, PooledConnection, StoreConnection};
#[cfg(feature = "redis")]
pub use redis_store::{RedisConnection, RedisConnector};
