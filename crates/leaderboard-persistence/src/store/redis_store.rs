//! # Redis Backend
//!
//! [`Connector`] and [`StoreConnection`] over multiplexed async Redis
//! connections. Atomic batches are sent as a `MULTI`/`EXEC` pipeline.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, FromRedisValue, Value};

use super::command::{Batch, Command, Reply, ScoredMember};
use super::pool::{Connector, StoreConnection};
use crate::error::{PersistenceError, Result};

/// Dials Redis connections from a `redis://` or `rediss://` URL.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    client: Client,
}

impl RedisConnector {
    /// # Errors
    ///
    /// Returns [`PersistenceError::Connect`] if the URL cannot be parsed.
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| PersistenceError::Connect(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Connection = RedisConnection;

    async fn connect(&self) -> Result<Self::Connection> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PersistenceError::Connect(e.to_string()))?;
        Ok(RedisConnection { conn })
    }
}

/// One multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisConnection {
    conn: MultiplexedConnection,
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn execute(&mut self, command: &Command) -> Result<Reply> {
        let value: Value = to_redis_cmd(command).query_async(&mut self.conn).await?;
        decode(command, &value)
    }

    async fn execute_atomic(&mut self, batch: &Batch) -> Result<Vec<Reply>> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in batch.commands() {
            pipe.add_command(to_redis_cmd(command));
        }

        // A discarded transaction comes back as nil, i.e. zero replies.
        let values: Vec<Value> = pipe.query_async(&mut self.conn).await?;
        if values.len() != batch.len() {
            return Err(PersistenceError::Rejected(format!(
                "transaction aborted: {} of {} replies received",
                values.len(),
                batch.len()
            )));
        }

        batch
            .commands()
            .iter()
            .zip(&values)
            .map(|(command, value)| decode(command, value))
            .collect()
    }
}

fn to_redis_cmd(command: &Command) -> redis::Cmd {
    let mut cmd = redis::cmd(command.name());
    match command {
        Command::HSet { key, field, value } => {
            cmd.arg(key).arg(field).arg(value);
        }
        Command::HGet { key, field } => {
            cmd.arg(key).arg(field);
        }
        Command::ZIncrBy { key, member, delta } => {
            cmd.arg(key).arg(*delta).arg(member);
        }
        Command::ZRevRangeWithScores { key, start, stop } => {
            cmd.arg(key).arg(*start).arg(*stop).arg("WITHSCORES");
        }
        Command::ZRevRank { key, member } => {
            cmd.arg(key).arg(member);
        }
    }
    cmd
}

fn decode(command: &Command, value: &Value) -> Result<Reply> {
    let reply = match command {
        Command::HSet { .. } => Reply::Integer(parse(value)?),
        Command::HGet { .. } => parse::<Option<String>>(value)?.map_or(Reply::Nil, Reply::Text),
        Command::ZIncrBy { .. } => Reply::Integer(score_to_int(parse(value)?)),
        Command::ZRevRangeWithScores { .. } => {
            let pairs: Vec<(String, f64)> = parse(value)?;
            Reply::Scored(
                pairs
                    .into_iter()
                    .map(|(member, score)| ScoredMember::new(member, score_to_int(score)))
                    .collect(),
            )
        }
        Command::ZRevRank { .. } => parse::<Option<i64>>(value)?.map_or(Reply::Nil, Reply::Integer),
    };
    Ok(reply)
}

fn parse<T: FromRedisValue>(value: &Value) -> Result<T> {
    T::from_redis_value(value).map_err(|e| PersistenceError::UnexpectedReply(e.to_string()))
}

/// Sorted-set scores are doubles on the wire; only integral deltas are ever
/// added.
#[allow(clippy::cast_possible_truncation)]
fn score_to_int(score: f64) -> i64 {
    score.round() as i64
}
