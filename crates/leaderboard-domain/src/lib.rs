//! # Leaderboard Engine - Domain Model
//!
//! Core domain types shared by the persistence and API layers: the
//! leaderboard windows, inbound score submissions and the ranked rows
//! returned by top-N queries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of rows returned by a top-N query when the caller does not ask
/// for anything else.
pub const DEFAULT_LIMIT: usize = 10;

// =============================================================================
// ERRORS
// =============================================================================

/// Domain-level validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("unknown leaderboard window: '{0}'")]
    UnknownWindow(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

// =============================================================================
// WINDOW
// =============================================================================

/// A named variant of the ranked aggregate.
///
/// Only the full-history window exists today. Each window owns its own
/// sorted set, so adding a daily or weekly window is a new variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    /// Every submission ever accepted.
    All,
}

impl Window {
    /// Wire name used in URLs and storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
        }
    }

    /// Sorted-set key holding this window's cumulative scores.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("totals:{}", self.as_str())
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Window {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            other => Err(DomainError::UnknownWindow(other.to_string())),
        }
    }
}

// =============================================================================
// SUBMISSIONS
// =============================================================================

/// A score submission as it arrives at the service boundary.
///
/// `score` is a delta added to the member's running total, not an absolute
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    #[serde(rename = "uid")]
    pub member_id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub score: i64,
}

impl ScoreSubmission {
    pub fn new(member_id: impl Into<String>, display_name: impl Into<String>, score: i64) -> Self {
        Self {
            member_id: member_id.into(),
            display_name: display_name.into(),
            score,
        }
    }

    /// Check the fields the store cannot do without.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::MissingField`] when the member id is blank.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.member_id.trim().is_empty() {
            return Err(DomainError::MissingField("uid"));
        }
        Ok(())
    }
}

// =============================================================================
// RESULT ROWS
// =============================================================================

/// One ranked row of a top-N query. Assembled at read time, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    #[serde(rename = "uid")]
    pub member_id: String,
    /// Empty when the member has no recorded name.
    #[serde(rename = "name")]
    pub display_name: String,
    pub score: i64,
    /// 0-based position by descending score.
    pub rank: u64,
}

impl LeaderboardRow {
    pub fn new(
        member_id: impl Into<String>,
        display_name: impl Into<String>,
        score: i64,
        rank: u64,
    ) -> Self {
        Self {
            member_id: member_id.into(),
            display_name: display_name.into(),
            score,
            rank,
        }
    }
}
