//! Bounded connection pool with scoped acquisition.
//!
//! [`Pool::acquire`] waits for one of `capacity` slots, reuses an idle
//! connection or dials a new one, and returns a [`PooledConnection`] guard.
//! The guard hands its connection back when dropped, on success and on error
//! alike. Connections that failed at the transport level are discarded instead.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::command::{Batch, BatchReplies, Command, Reply};
use crate::error::{PersistenceError, Result};

/// A live connection to the backing store.
#[async_trait]
pub trait StoreConnection: Send + 'static {
    /// Issue one command and wait for its reply.
    async fn execute(&mut self, command: &Command) -> Result<Reply>;

    /// Submit `batch` as one indivisible unit. Replies come back in
    /// submission order. On error no command of the batch has taken effect.
    async fn execute_atomic(&mut self, batch: &Batch) -> Result<Vec<Reply>>;
}

/// Dials new store connections for a [`Pool`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: StoreConnection;

    /// Establish and authenticate a new connection.
    ///
    /// Failures here are reported as [`PersistenceError::Connect`].
    async fn connect(&self) -> Result<Self::Connection>;
}

/// Pool sizing and timeouts
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections checked out at once.
    pub capacity: usize,
    /// How long `acquire` waits for a free slot.
    pub acquire_timeout: Duration,
    /// How long dialing a new connection may take.
    pub connect_timeout: Duration,
    /// Deadline for a single command or atomic batch round trip.
    pub command_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            acquire_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(2),
        }
    }
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub capacity: usize,
    pub idle: usize,
    pub in_use: usize,
}

struct Shared<C: Connector> {
    connector: C,
    idle: Mutex<Vec<C::Connection>>,
    permits: Arc<Semaphore>,
    config: PoolConfig,
}

impl<C: Connector> Shared<C> {
    fn take_idle(&self) -> Option<C::Connection> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }

    fn put_idle(&self, conn: C::Connection) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conn);
    }

    fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Fixed-capacity pool of store connections.
///
/// Cloning is cheap and every clone shares the same connections.
pub struct Pool<C: Connector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> Pool<C> {
    /// Create a pool. No connection is dialed until the first `acquire`.
    pub fn new(connector: C, config: PoolConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                connector,
                idle: Mutex::new(Vec::with_capacity(capacity)),
                permits: Arc::new(Semaphore::new(capacity)),
                config: PoolConfig { capacity, ..config },
            }),
        }
    }

    /// Check out a connection.
    ///
    /// # Errors
    ///
    /// - [`PersistenceError::PoolExhausted`] if no slot frees up within
    ///   `acquire_timeout`.
    /// - [`PersistenceError::Connect`] if a new connection cannot be dialed
    ///   within `connect_timeout`, or the pool has been closed.
    pub async fn acquire(&self) -> Result<PooledConnection<C>> {
        let config = &self.shared.config;

        let permit = match tokio::time::timeout(
            config.acquire_timeout,
            Arc::clone(&self.shared.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PersistenceError::Connect("connection pool closed".into())),
            Err(_) => {
                return Err(PersistenceError::PoolExhausted {
                    timeout_ms: millis(config.acquire_timeout),
                });
            }
        };

        let conn = if let Some(conn) = self.shared.take_idle() {
            conn
        } else {
            let conn = tokio::time::timeout(config.connect_timeout, self.shared.connector.connect())
                .await
                .map_err(|_| {
                    PersistenceError::Connect(format!(
                        "timed out after {}ms",
                        millis(config.connect_timeout)
                    ))
                })??;
            tracing::debug!(capacity = config.capacity, "Opened store connection");
            conn
        };

        Ok(PooledConnection {
            conn: Some(conn),
            shared: Arc::clone(&self.shared),
            broken: false,
            _permit: permit,
        })
    }

    pub fn status(&self) -> PoolStatus {
        let capacity = self.shared.config.capacity;
        PoolStatus {
            capacity,
            idle: self.shared.idle_count(),
            in_use: capacity.saturating_sub(self.shared.permits.available_permits()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn connector(&self) -> &C {
        &self.shared.connector
    }

    /// Refuse further acquisitions and drop idle connections. Connections
    /// still checked out are dropped when their guards are.
    pub fn close(&self) {
        self.shared.permits.close();
        self.shared
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// A checked-out connection. Returned to its pool on drop.
pub struct PooledConnection<C: Connector> {
    conn: Option<C::Connection>,
    shared: Arc<Shared<C>>,
    broken: bool,
    // Released after `drop` has returned the connection to the idle list.
    _permit: OwnedSemaphorePermit,
}

impl<C: Connector> PooledConnection<C> {
    /// Issue one command, bounded by the pool's `command_timeout`.
    ///
    /// # Errors
    ///
    /// Propagates store errors; a deadline overrun is
    /// [`PersistenceError::Timeout`].
    pub async fn execute(&mut self, command: &Command) -> Result<Reply> {
        let deadline = self.shared.config.command_timeout;
        let conn = self.connection()?;
        let outcome = match tokio::time::timeout(deadline, conn.execute(command)).await {
            Ok(result) => result,
            Err(_) => Err(PersistenceError::Timeout {
                timeout_ms: millis(deadline),
            }),
        };
        self.observe(outcome)
    }

    /// Submit `batch` atomically, bounded by the pool's `command_timeout`.
    /// An empty batch completes without a round trip.
    ///
    /// # Errors
    ///
    /// Propagates store errors. A reply count that does not match the batch
    /// is reported as [`PersistenceError::Rejected`].
    pub async fn execute_atomic(&mut self, batch: &Batch) -> Result<BatchReplies> {
        if batch.is_empty() {
            return BatchReplies::new(batch, Vec::new());
        }
        let deadline = self.shared.config.command_timeout;
        let conn = self.connection()?;
        let outcome = match tokio::time::timeout(deadline, conn.execute_atomic(batch)).await {
            Ok(result) => result,
            Err(_) => Err(PersistenceError::Timeout {
                timeout_ms: millis(deadline),
            }),
        };
        let replies = self.observe(outcome)?;
        BatchReplies::new(batch, replies)
    }

    fn connection(&mut self) -> Result<&mut C::Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| PersistenceError::Transport("connection already released".into()))
    }

    fn observe<T>(&mut self, outcome: Result<T>) -> Result<T> {
        if let Err(err) = &outcome {
            if err.poisons_connection() {
                self.broken = true;
            }
        }
        outcome
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.broken || self.shared.permits.is_closed() {
            tracing::debug!("Discarding store connection");
            return;
        }
        self.shared.put_idle(conn);
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
