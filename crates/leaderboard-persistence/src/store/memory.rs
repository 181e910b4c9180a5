//! In-process store backend.
//!
//! Mirrors the Redis semantics the leaderboard relies on: sorted sets ordered
//! by score descending with ties in descending member order (as `ZREVRANGE`
//! and `ZREVRANK` report them), hashes, and all-or-nothing atomic batches.
//! Failures can be injected for tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::command::{Batch, Command, Reply, ScoredMember};
use super::pool::{Connector, StoreConnection};
use crate::error::{PersistenceError, Result};

#[derive(Debug, Clone, Default)]
struct State {
    sorted_sets: HashMap<String, HashMap<String, i64>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl State {
    fn apply(&mut self, command: &Command) -> Result<Reply> {
        match command {
            Command::HSet { key, field, value } => {
                self.ensure_not_sorted_set(key)?;
                let previous = self
                    .hashes
                    .entry(key.clone())
                    .or_default()
                    .insert(field.clone(), value.clone());
                Ok(Reply::Integer(i64::from(previous.is_none())))
            }
            Command::HGet { key, field } => {
                self.ensure_not_sorted_set(key)?;
                Ok(self
                    .hashes
                    .get(key)
                    .and_then(|hash| hash.get(field))
                    .map_or(Reply::Nil, |value| Reply::Text(value.clone())))
            }
            Command::ZIncrBy { key, member, delta } => {
                self.ensure_not_hash(key)?;
                let score = self
                    .sorted_sets
                    .entry(key.clone())
                    .or_default()
                    .entry(member.clone())
                    .or_insert(0);
                *score = score.checked_add(*delta).ok_or_else(|| {
                    PersistenceError::Rejected("ERR increment would overflow".into())
                })?;
                Ok(Reply::Integer(*score))
            }
            Command::ZRevRangeWithScores { key, start, stop } => {
                self.ensure_not_hash(key)?;
                let ranked = self.ranked(key);
                let Some((from, to)) = clamp_range(ranked.len(), *start, *stop) else {
                    return Ok(Reply::Scored(Vec::new()));
                };
                Ok(Reply::Scored(ranked[from..=to].to_vec()))
            }
            Command::ZRevRank { key, member } => {
                self.ensure_not_hash(key)?;
                let Some(set) = self.sorted_sets.get(key) else {
                    return Ok(Reply::Nil);
                };
                let Some(score) = set.get(member) else {
                    return Ok(Reply::Nil);
                };
                // Rank is the number of members ordered ahead of this one.
                let ahead = set
                    .iter()
                    .filter(|&(other, other_score)| {
                        other_score > score || (other_score == score && other > member)
                    })
                    .count();
                i64::try_from(ahead)
                    .map(Reply::Integer)
                    .map_err(|_| PersistenceError::Rejected("ERR rank overflow".into()))
            }
        }
    }

    /// Members of `key`, highest score first, ties by descending member.
    fn ranked(&self, key: &str) -> Vec<ScoredMember> {
        let mut ranked: Vec<ScoredMember> = self
            .sorted_sets
            .get(key)
            .map(|set| {
                set.iter()
                    .map(|(member, score)| ScoredMember::new(member.clone(), *score))
                    .collect()
            })
            .unwrap_or_default();
        ranked.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| b.member.cmp(&a.member)));
        ranked
    }

    fn ensure_not_sorted_set(&self, key: &str) -> Result<()> {
        if self.sorted_sets.contains_key(key) {
            return Err(wrong_type());
        }
        Ok(())
    }

    fn ensure_not_hash(&self, key: &str) -> Result<()> {
        if self.hashes.contains_key(key) {
            return Err(wrong_type());
        }
        Ok(())
    }
}

fn wrong_type() -> PersistenceError {
    PersistenceError::Rejected(
        "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
    )
}

/// Redis-style inclusive range with negative indices counted from the end.
fn clamp_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    if len == 0 {
        return None;
    }
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}

type Interleaved = Box<dyn FnOnce(&MemoryStore) + Send>;

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    before_next_batch: Mutex<Option<Interleaved>>,
    reject_next_batch: AtomicBool,
    drop_next_batch: AtomicBool,
    refuse_connections: AtomicBool,
    latency_ms: AtomicU64,
    commands_executed: AtomicUsize,
    connections_opened: AtomicUsize,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inner")
            .field("commands_executed", &self.commands_executed)
            .field("connections_opened", &self.connections_opened)
            .finish_non_exhaustive()
    }
}

/// Shared in-memory store. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the next atomic batch as the store would on `EXECABORT`.
    pub fn reject_next_batch(&self) {
        self.inner.reject_next_batch.store(true, Ordering::SeqCst);
    }

    /// Fail the next atomic batch at the transport, before it is applied.
    pub fn drop_next_batch(&self) {
        self.inner.drop_next_batch.store(true, Ordering::SeqCst);
    }

    /// Run `interleave` right before the next atomic batch is applied, as
    /// another client's write landing between two round trips would.
    pub fn before_next_batch(&self, interleave: impl FnOnce(&Self) + Send + 'static) {
        *self
            .inner
            .before_next_batch
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(interleave));
    }

    /// Make new connection attempts fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Delay every round trip by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.inner.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of commands received, including those of rejected batches.
    pub fn commands_executed(&self) -> usize {
        self.inner.commands_executed.load(Ordering::SeqCst)
    }

    pub fn connections_opened(&self) -> usize {
        self.inner.connections_opened.load(Ordering::SeqCst)
    }

    /// Current score of `member` in sorted set `key`.
    pub fn zscore(&self, key: &str, member: &str) -> Option<i64> {
        self.lock()
            .sorted_sets
            .get(key)
            .and_then(|set| set.get(member))
            .copied()
    }

    /// Add `delta` to `member` in sorted set `key` outside any connection.
    pub fn zincrby(&self, key: &str, member: &str, delta: i64) -> i64 {
        let mut state = self.lock();
        let score = state
            .sorted_sets
            .entry(key.to_string())
            .or_default()
            .entry(member.to_string())
            .or_insert(0);
        *score = score.saturating_add(delta);
        *score
    }

    /// Remove `member` from sorted set `key`. Returns whether it was present.
    pub fn zrem(&self, key: &str, member: &str) -> bool {
        let mut state = self.lock();
        let Some(set) = state.sorted_sets.get_mut(key) else {
            return false;
        };
        let removed = set.remove(member).is_some();
        if set.is_empty() {
            state.sorted_sets.remove(key);
        }
        removed
    }

    /// Current value of `field` in hash `key`.
    pub fn hget(&self, key: &str, field: &str) -> Option<String> {
        self.lock()
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field))
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn round_trip(&self) {
        let ms = self.inner.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn apply_one(&self, command: &Command) -> Result<Reply> {
        self.inner.commands_executed.fetch_add(1, Ordering::SeqCst);
        self.lock().apply(command)
    }

    fn apply_atomic(&self, batch: &Batch) -> Result<Vec<Reply>> {
        let interleave = self
            .inner
            .before_next_batch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(interleave) = interleave {
            interleave(self);
        }

        self.inner
            .commands_executed
            .fetch_add(batch.len(), Ordering::SeqCst);

        if self.inner.drop_next_batch.swap(false, Ordering::SeqCst) {
            return Err(PersistenceError::Transport("connection reset by peer".into()));
        }
        if self.inner.reject_next_batch.swap(false, Ordering::SeqCst) {
            return Err(PersistenceError::Rejected(
                "EXECABORT Transaction discarded because of previous errors.".into(),
            ));
        }

        // Work on a copy so a failing command leaves nothing behind.
        let mut state = self.lock();
        let mut staged = state.clone();
        let replies = batch
            .commands()
            .iter()
            .map(|command| staged.apply(command))
            .collect::<Result<Vec<_>>>()?;
        *state = staged;
        Ok(replies)
    }
}

#[async_trait]
impl Connector for MemoryStore {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<Self::Connection> {
        if self.inner.refuse_connections.load(Ordering::SeqCst) {
            return Err(PersistenceError::Connect("connection refused".into()));
        }
        self.inner.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            store: self.clone(),
        })
    }
}

/// Connection handle onto a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    store: MemoryStore,
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn execute(&mut self, command: &Command) -> Result<Reply> {
        self.store.round_trip().await;
        self.store.apply_one(command)
    }

    async fn execute_atomic(&mut self, batch: &Batch) -> Result<Vec<Reply>> {
        self.store.round_trip().await;
        self.store.apply_atomic(batch)
    }
}
