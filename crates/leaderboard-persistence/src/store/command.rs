//! Typed store commands, replies and the atomic batch builder.
//!
//! A [`Batch`] hands out a [`Slot`] for every queued command. After the batch
//! has been executed, [`BatchReplies::take`] turns a slot back into the typed
//! reply of exactly that command, so callers never index replies by hand.

use std::marker::PhantomData;

use crate::error::{PersistenceError, Result};

// =============================================================================
// COMMANDS
// =============================================================================

/// Store operations used by the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `HSET key field value`
    HSet {
        key: String,
        field: String,
        value: String,
    },
    /// `HGET key field`
    HGet { key: String, field: String },
    /// `ZINCRBY key delta member`
    ZIncrBy {
        key: String,
        member: String,
        delta: i64,
    },
    /// `ZREVRANGE key start stop WITHSCORES`
    ZRevRangeWithScores { key: String, start: i64, stop: i64 },
    /// `ZREVRANK key member`
    ZRevRank { key: String, member: String },
}

impl Command {
    pub fn hset(key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::HSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn hget(key: impl Into<String>, field: impl Into<String>) -> Self {
        Self::HGet {
            key: key.into(),
            field: field.into(),
        }
    }

    pub fn zincrby(key: impl Into<String>, member: impl Into<String>, delta: i64) -> Self {
        Self::ZIncrBy {
            key: key.into(),
            member: member.into(),
            delta,
        }
    }

    pub fn zrevrange_withscores(key: impl Into<String>, start: i64, stop: i64) -> Self {
        Self::ZRevRangeWithScores {
            key: key.into(),
            start,
            stop,
        }
    }

    pub fn zrevrank(key: impl Into<String>, member: impl Into<String>) -> Self {
        Self::ZRevRank {
            key: key.into(),
            member: member.into(),
        }
    }

    /// Command name as sent on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::HSet { .. } => "HSET",
            Self::HGet { .. } => "HGET",
            Self::ZIncrBy { .. } => "ZINCRBY",
            Self::ZRevRangeWithScores { .. } => "ZREVRANGE",
            Self::ZRevRank { .. } => "ZREVRANK",
        }
    }

    /// Key the command operates on.
    pub fn key(&self) -> &str {
        match self {
            Self::HSet { key, .. }
            | Self::HGet { key, .. }
            | Self::ZIncrBy { key, .. }
            | Self::ZRevRangeWithScores { key, .. }
            | Self::ZRevRank { key, .. } => key,
        }
    }
}

// =============================================================================
// REPLIES
// =============================================================================

/// A sorted-set member together with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredMember {
    pub member: String,
    pub score: i64,
}

impl ScoredMember {
    pub fn new(member: impl Into<String>, score: i64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

/// Decoded store reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Integer(i64),
    Text(String),
    Scored(Vec<ScoredMember>),
}

impl Reply {
    fn describe(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Integer(_) => "integer",
            Self::Text(_) => "text",
            Self::Scored(_) => "scored members",
        }
    }

    fn mismatch<T>(self, expected: &str) -> Result<T> {
        Err(PersistenceError::UnexpectedReply(format!(
            "expected {expected}, got {}",
            self.describe()
        )))
    }
}

/// Conversion from a [`Reply`] into a concrete Rust type.
pub trait FromReply: Sized {
    /// # Errors
    ///
    /// Returns [`PersistenceError::UnexpectedReply`] when the reply has the
    /// wrong shape.
    fn from_reply(reply: Reply) -> Result<Self>;
}

impl FromReply for Reply {
    fn from_reply(reply: Reply) -> Result<Self> {
        Ok(reply)
    }
}

impl FromReply for () {
    fn from_reply(_reply: Reply) -> Result<Self> {
        Ok(())
    }
}

impl FromReply for i64 {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Integer(value) => Ok(value),
            other => other.mismatch("integer"),
        }
    }
}

impl FromReply for Option<u64> {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Nil => Ok(None),
            Reply::Integer(value) => u64::try_from(value).map(Some).map_err(|_| {
                PersistenceError::UnexpectedReply(format!("negative rank {value}"))
            }),
            other => other.mismatch("rank or nil"),
        }
    }
}

impl FromReply for Option<String> {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Nil => Ok(None),
            Reply::Text(value) => Ok(Some(value)),
            other => other.mismatch("text or nil"),
        }
    }
}

impl FromReply for Vec<ScoredMember> {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Scored(members) => Ok(members),
            // An absent key reads as an empty range.
            Reply::Nil => Ok(Vec::new()),
            other => other.mismatch("scored members"),
        }
    }
}

// =============================================================================
// BATCH BUILDER
// =============================================================================

/// Position of a queued command inside a [`Batch`], typed by its reply.
#[derive(Debug)]
pub struct Slot<T> {
    index: usize,
    _reply: PhantomData<fn() -> T>,
}

impl<T> Slot<T> {
    fn new(index: usize) -> Self {
        Self {
            index,
            _reply: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slot<T> {}

/// Ordered list of commands submitted to the store as one atomic unit.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Queue an arbitrary command, choosing the reply type at the call site.
    pub fn push<T: FromReply>(&mut self, command: Command) -> Slot<T> {
        let slot = Slot::new(self.commands.len());
        self.commands.push(command);
        slot
    }

    pub fn hset(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Slot<i64> {
        self.push(Command::hset(key, field, value))
    }

    pub fn hget(&mut self, key: impl Into<String>, field: impl Into<String>) -> Slot<Option<String>> {
        self.push(Command::hget(key, field))
    }

    pub fn zincrby(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        delta: i64,
    ) -> Slot<i64> {
        self.push(Command::zincrby(key, member, delta))
    }

    pub fn zrevrange_withscores(
        &mut self,
        key: impl Into<String>,
        start: i64,
        stop: i64,
    ) -> Slot<Vec<ScoredMember>> {
        self.push(Command::zrevrange_withscores(key, start, stop))
    }

    pub fn zrevrank(&mut self, key: impl Into<String>, member: impl Into<String>) -> Slot<Option<u64>> {
        self.push(Command::zrevrank(key, member))
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Replies to an executed [`Batch`], in submission order.
#[derive(Debug)]
pub struct BatchReplies {
    replies: Vec<Option<Reply>>,
}

impl BatchReplies {
    /// Pair the replies with the batch that produced them.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Rejected`] when the store answered with a
    /// different number of replies than commands were queued, which is how an
    /// aborted transaction surfaces.
    pub fn new(batch: &Batch, replies: Vec<Reply>) -> Result<Self> {
        if replies.len() != batch.len() {
            return Err(PersistenceError::Rejected(format!(
                "atomic batch aborted: {} commands queued, {} replies received",
                batch.len(),
                replies.len()
            )));
        }
        Ok(Self {
            replies: replies.into_iter().map(Some).collect(),
        })
    }

    /// Typed reply for `slot`. Each slot can be taken once.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::UnexpectedReply`] when the slot was already
    /// taken, belongs to another batch, or the reply has the wrong shape.
    pub fn take<T: FromReply>(&mut self, slot: Slot<T>) -> Result<T> {
        let reply = self
            .replies
            .get_mut(slot.index)
            .and_then(Option::take)
            .ok_or_else(|| {
                PersistenceError::UnexpectedReply(format!("no reply for batch slot {}", slot.index))
            })?;
        T::from_reply(reply)
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_follow_submission_order() {
        let mut batch = Batch::new();
        let name = batch.hset("user:u1", "name", "Alice");
        let score = batch.zincrby("totals:all", "u1", 5);
        assert_eq!(name.index(), 0);
        assert_eq!(score.index(), 1);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.commands()[1].name(), "ZINCRBY");
        assert_eq!(batch.commands()[0].key(), "user:u1");
    }

    #[test]
    fn test_take_decodes_typed_replies() {
        let mut batch = Batch::new();
        let rank = batch.zrevrank("totals:all", "u1");
        let name = batch.hget("user:u1", "name");
        let missing = batch.hget("user:u2", "name");

        let mut replies = BatchReplies::new(
            &batch,
            vec![Reply::Integer(3), Reply::Text("Alice".into()), Reply::Nil],
        )
        .unwrap();

        assert_eq!(replies.take(rank).unwrap(), Some(3));
        assert_eq!(replies.take(name).unwrap(), Some("Alice".to_string()));
        assert_eq!(replies.take(missing).unwrap(), None);
    }

    #[test]
    fn test_slot_taken_twice_fails() {
        let mut batch = Batch::new();
        let score = batch.zincrby("totals:all", "u1", 1);
        let mut replies = BatchReplies::new(&batch, vec![Reply::Integer(1)]).unwrap();
        assert_eq!(replies.take(score).unwrap(), 1);
        assert!(matches!(
            replies.take(score),
            Err(PersistenceError::UnexpectedReply(_))
        ));
    }

    #[test]
    fn test_reply_count_mismatch_is_rejection() {
        let mut batch = Batch::new();
        batch.hset("user:u1", "name", "Alice");
        batch.zincrby("totals:all", "u1", 1);
        let err = BatchReplies::new(&batch, Vec::new()).unwrap_err();
        assert!(matches!(err, PersistenceError::Rejected(_)));
    }

    #[test]
    fn test_shape_mismatch() {
        assert!(matches!(
            i64::from_reply(Reply::Text("x".into())),
            Err(PersistenceError::UnexpectedReply(_))
        ));
        assert!(<Option<u64>>::from_reply(Reply::Integer(-1)).is_err());
        assert_eq!(<Vec<ScoredMember>>::from_reply(Reply::Nil).unwrap(), Vec::new());
    }
}
