//! Leaderboard repository over the pooled store client.
//!
//! Persisted layout:
//! - ranked aggregate: sorted set `totals:<window>`, member id scored by its
//!   cumulative total
//! - name directory: hash `user:<member id>`, field `name`

use async_trait::async_trait;

use super::traits::LeaderboardRepository;
use crate::error::{PersistenceError, Result};
use crate::store::{Batch, Command, Connector, FromReply, Pool, ScoredMember, Slot};
use leaderboard_domain::{LeaderboardRow, Window};

/// Prefix of the per-member name directory hash.
pub const NAME_KEY_PREFIX: &str = "user:";

/// Hash field holding the display name.
pub const NAME_FIELD: &str = "name";

/// Key of the name directory entry for `member_id`.
pub fn name_key(member_id: &str) -> String {
    format!("{NAME_KEY_PREFIX}{member_id}")
}

/// Leaderboard repository backed by any pooled store connector.
pub struct StoreLeaderboardRepository<C: Connector> {
    pool: Pool<C>,
}

#[cfg(feature = "redis")]
pub type RedisLeaderboardRepository = StoreLeaderboardRepository<crate::store::RedisConnector>;

impl<C: Connector> StoreLeaderboardRepository<C> {
    pub fn new(pool: Pool<C>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<C> {
        &self.pool
    }
}

#[async_trait]
impl<C: Connector> LeaderboardRepository for StoreLeaderboardRepository<C> {
    async fn submit_score(&self, member_id: &str, display_name: &str, delta: i64) -> Result<()> {
        if member_id.is_empty() {
            return Err(PersistenceError::InvalidInput("member id must not be empty".into()));
        }

        let mut batch = Batch::with_capacity(2);
        batch.hset(name_key(member_id), NAME_FIELD, display_name);
        let total = batch.zincrby(Window::All.storage_key(), member_id, delta);

        let mut conn = self
            .pool
            .acquire()
            .await
            .inspect_err(|e| log_failure("submit_score", e))?;
        let mut replies = conn
            .execute_atomic(&batch)
            .await
            .inspect_err(|e| log_failure("submit_score", e))?;
        let total = replies.take(total)?;

        tracing::debug!(member_id, delta, total, "Score submitted");
        Ok(())
    }

    async fn query_top(&self, window: &str, limit: usize) -> Result<Vec<LeaderboardRow>> {
        let window: Window = window.parse()?;
        if limit == 0 {
            return Err(PersistenceError::InvalidInput("limit must be positive".into()));
        }
        let stop = i64::try_from(limit - 1)
            .map_err(|_| PersistenceError::InvalidInput(format!("limit {limit} out of range")))?;
        let key = window.storage_key();

        let mut conn = self
            .pool
            .acquire()
            .await
            .inspect_err(|e| log_failure("query_top", e))?;

        // Round trip 1: the ranked slice with scores.
        let top = conn
            .execute(&Command::zrevrange_withscores(&key, 0, stop))
            .await
            .and_then(Vec::<ScoredMember>::from_reply)
            .inspect_err(|e| log_failure("query_top", e))?;
        if top.is_empty() {
            tracing::debug!(%window, limit, "Leaderboard is empty");
            return Ok(Vec::new());
        }

        // Round trip 2: rank and name of every member, as one atomic batch.
        // Scores above may be stale by now if a submission raced in between.
        let mut batch = Batch::with_capacity(top.len() * 2);
        let slots: Vec<(Slot<Option<u64>>, Slot<Option<String>>)> = top
            .iter()
            .map(|entry| {
                (
                    batch.zrevrank(&key, &entry.member),
                    batch.hget(name_key(&entry.member), NAME_FIELD),
                )
            })
            .collect();
        let mut replies = conn
            .execute_atomic(&batch)
            .await
            .inspect_err(|e| log_failure("query_top", e))?;

        let rows = top
            .into_iter()
            .zip(slots)
            .enumerate()
            .map(|(position, (entry, (rank, name)))| {
                let rank = replies
                    .take(rank)?
                    .unwrap_or_else(|| u64::try_from(position).unwrap_or(u64::MAX));
                let name = replies.take(name)?.unwrap_or_default();
                Ok(LeaderboardRow::new(entry.member, name, entry.score, rank))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(%window, limit, rows = rows.len(), "Leaderboard queried");
        Ok(rows)
    }
}

fn log_failure(operation: &'static str, err: &PersistenceError) {
    tracing::warn!(
        operation,
        kind = ?err.kind(),
        error = %err,
        "Leaderboard store operation failed"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use fake::Fake;
    use fake::faker::name::en::Name;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::error::ErrorKind;
    use crate::store::{MemoryStore, PoolConfig};

    fn repository(store: &MemoryStore) -> StoreLeaderboardRepository<MemoryStore> {
        StoreLeaderboardRepository::new(Pool::new(store.clone(), PoolConfig::default()))
    }

    fn with_config(
        store: &MemoryStore,
        config: PoolConfig,
    ) -> StoreLeaderboardRepository<MemoryStore> {
        StoreLeaderboardRepository::new(Pool::new(store.clone(), config))
    }

    #[tokio::test]
    async fn test_scores_accumulate_and_rank() {
        let store = MemoryStore::new();
        let repo = repository(&store);

        assert_ok!(repo.submit_score("u1", "Alice", 50).await);
        assert_ok!(repo.submit_score("u2", "Bob", 70).await);
        assert_ok!(repo.submit_score("u1", "Alice", 30).await);

        let rows = repo.query_top("all", 10).await.unwrap();
        assert_eq!(
            rows,
            vec![
                LeaderboardRow::new("u1", "Alice", 80, 0),
                LeaderboardRow::new("u2", "Bob", 70, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_submission_is_not_deduplicated() {
        let store = MemoryStore::new();
        let repo = repository(&store);

        assert_ok!(repo.submit_score("u1", "Alice", 10).await);
        assert_ok!(repo.submit_score("u1", "Alice", 10).await);

        assert_eq!(store.zscore("totals:all", "u1"), Some(20));
    }

    #[tokio::test]
    async fn test_total_is_sum_of_deltas() {
        let store = MemoryStore::new();
        let repo = repository(&store);
        let deltas = [5, 0, 12, 3, 40, 1, 7];

        let mut last_name = String::new();
        for delta in deltas {
            last_name = Name().fake();
            assert_ok!(repo.submit_score("u1", &last_name, delta).await);
        }

        let rows = repo.query_top("all", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, deltas.iter().sum::<i64>());
        // Last write wins for the display name
        assert_eq!(rows[0].display_name, last_name);
    }

    #[tokio::test]
    async fn test_empty_leaderboard() {
        let store = MemoryStore::new();
        let repo = repository(&store);

        let rows = assert_ok!(repo.query_top("all", 10).await);
        assert!(rows.is_empty());
        // Only the range read went out
        assert_eq!(store.commands_executed(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_window_issues_no_commands() {
        let store = MemoryStore::new();
        let repo = repository(&store);

        let err = assert_err!(repo.query_top("weekly", 10).await);
        assert_eq!(err.kind(), ErrorKind::UnsupportedWindow);
        assert_eq!(store.commands_executed(), 0);
        assert_eq!(store.connections_opened(), 0);
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let store = MemoryStore::new();
        let repo = repository(&store);

        let err = assert_err!(repo.query_top("all", 0).await);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.commands_executed(), 0);
    }

    #[tokio::test]
    async fn test_empty_member_id_rejected() {
        let store = MemoryStore::new();
        let repo = repository(&store);

        let err = assert_err!(repo.submit_score("", "Nobody", 5).await);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.commands_executed(), 0);
    }

    #[tokio::test]
    async fn test_limit_and_ordering() {
        let store = MemoryStore::new();
        let repo = repository(&store);

        for i in 0..15_i64 {
            let score = (i * 37) % 11;
            assert_ok!(repo.submit_score(&format!("u{i}"), &format!("P{i}"), score).await);
        }

        let rows = repo.query_top("all", 10).await.unwrap();
        assert_eq!(rows.len(), 10);
        assert!(rows.windows(2).all(|pair| pair[0].score >= pair[1].score));
        for (position, row) in rows.iter().enumerate() {
            assert_eq!(row.rank, position as u64);
        }

        // Ranks are ordinals over the whole aggregate, not just the slice
        let all = repo.query_top("all", 100).await.unwrap();
        assert_eq!(all.len(), 15);
        assert_eq!(&all[..10], &rows[..]);
    }

    #[tokio::test]
    async fn test_query_costs_two_round_trips() {
        let store = MemoryStore::new();
        let repo = repository(&store);
        for i in 0..4 {
            assert_ok!(repo.submit_score(&format!("u{i}"), "x", i).await);
        }
        let before = store.commands_executed();

        let rows = repo.query_top("all", 10).await.unwrap();

        // One range read plus a rank and a name per row
        assert_eq!(store.commands_executed() - before, 1 + 2 * rows.len());
    }

    #[tokio::test]
    async fn test_missing_name_is_empty() {
        let store = MemoryStore::new();
        let repo = repository(&store);

        let mut conn = repo.pool().acquire().await.unwrap();
        conn.execute(&Command::zincrby("totals:all", "ghost", 99))
            .await
            .unwrap();
        drop(conn);
        assert_ok!(repo.submit_score("u1", "Alice", 10).await);

        let rows = repo.query_top("all", 10).await.unwrap();
        assert_eq!(
            rows,
            vec![
                LeaderboardRow::new("ghost", "", 99, 0),
                LeaderboardRow::new("u1", "Alice", 10, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_write_between_round_trips_keeps_slice_order() {
        let store = MemoryStore::new();
        let repo = repository(&store);
        assert_ok!(repo.submit_score("u1", "Alice", 80).await);
        assert_ok!(repo.submit_score("u2", "Bob", 70).await);

        // Bob overtakes Alice after the range read, before ranks are fetched
        store.before_next_batch(|store| {
            store.zincrby("totals:all", "u2", 20);
        });

        let rows = repo.query_top("all", 10).await.unwrap();
        assert_eq!(
            rows,
            vec![
                LeaderboardRow::new("u1", "Alice", 80, 1),
                LeaderboardRow::new("u2", "Bob", 70, 0),
            ]
        );
        assert_eq!(store.zscore("totals:all", "u2"), Some(90));
    }

    #[tokio::test]
    async fn test_member_gone_before_rank_read_keeps_position() {
        let store = MemoryStore::new();
        let repo = repository(&store);
        assert_ok!(repo.submit_score("u1", "Alice", 80).await);
        assert_ok!(repo.submit_score("u2", "Bob", 70).await);
        assert_ok!(repo.submit_score("u3", "Carol", 60).await);

        store.before_next_batch(|store| {
            store.zrem("totals:all", "u2");
        });

        let rows = repo.query_top("all", 10).await.unwrap();
        assert_eq!(
            rows,
            vec![
                LeaderboardRow::new("u1", "Alice", 80, 0),
                // No rank reply, so the slice position stands in
                LeaderboardRow::new("u2", "Bob", 70, 1),
                LeaderboardRow::new("u3", "Carol", 60, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_submit_has_no_effect() {
        let store = MemoryStore::new();
        let repo = repository(&store);
        assert_ok!(repo.submit_score("u1", "Alice", 10).await);

        store.reject_next_batch();
        let err = assert_err!(repo.submit_score("u1", "Alicia", 25).await);
        assert_eq!(err.kind(), ErrorKind::StoreRejected);
        assert!(!err.is_retryable());

        assert_eq!(store.zscore("totals:all", "u1"), Some(10));
        assert_eq!(store.hget("user:u1", "name").as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_transport_failure_on_submit_has_no_effect() {
        let store = MemoryStore::new();
        let repo = repository(&store);

        store.drop_next_batch();
        let err = assert_err!(repo.submit_score("u1", "Alice", 25).await);
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert!(err.is_retryable());

        assert_eq!(store.zscore("totals:all", "u1"), None);
        assert_eq!(store.hget("user:u1", "name"), None);
    }

    #[tokio::test]
    async fn test_rejected_join_fails_query() {
        let store = MemoryStore::new();
        let repo = repository(&store);
        assert_ok!(repo.submit_score("u1", "Alice", 10).await);

        store.reject_next_batch();
        let err = assert_err!(repo.query_top("all", 10).await);
        assert_eq!(err.kind(), ErrorKind::StoreRejected);
    }

    #[tokio::test]
    async fn test_unreachable_store() {
        let store = MemoryStore::new();
        store.refuse_connections(true);
        let repo = repository(&store);

        let err = assert_err!(repo.submit_score("u1", "Alice", 10).await);
        assert!(matches!(err, PersistenceError::Connect(_)));
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = MemoryStore::new();
        let repo = with_config(
            &store,
            PoolConfig {
                command_timeout: Duration::from_millis(20),
                ..PoolConfig::default()
            },
        );
        store.set_latency(Duration::from_millis(200));

        let err = assert_err!(repo.query_top("all", 10).await);
        assert!(matches!(err, PersistenceError::Timeout { timeout_ms: 20 }));
        // The timed-out connection is not handed out again
        assert_eq!(repo.pool().status().idle, 0);
    }

    #[tokio::test]
    async fn test_exhausted_pool_is_unavailable() {
        let store = MemoryStore::new();
        let repo = with_config(
            &store,
            PoolConfig {
                capacity: 1,
                acquire_timeout: Duration::from_millis(20),
                ..PoolConfig::default()
            },
        );

        let _held = repo.pool().acquire().await.unwrap();
        let err = assert_err!(repo.query_top("all", 10).await);
        assert!(matches!(err, PersistenceError::PoolExhausted { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions() {
        let store = MemoryStore::new();
        let repo = Arc::new(with_config(
            &store,
            PoolConfig {
                capacity: 4,
                ..PoolConfig::default()
            },
        ));

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move {
                    let member = if i % 2 == 0 { "even" } else { "odd" };
                    repo.submit_score(member, member, 1).await
                })
            })
            .collect();
        for task in tasks {
            assert_ok!(task.await.unwrap());
        }

        let rows = repo.query_top("all", 10).await.unwrap();
        assert_eq!(
            rows,
            vec![
                LeaderboardRow::new("odd", "odd", 32, 0),
                LeaderboardRow::new("even", "even", 32, 1),
            ]
        );
        assert!(store.connections_opened() <= 4);
    }
}
