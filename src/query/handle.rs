//! Lifecycle of a single backend query

use crate::error_handling::{ValidatorError, ValidatorResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Query lifecycle state
///
/// Ordered so that transitions can only move forward:
/// `Submitted < Running < {Finished, Failed, TimedOut}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Submitted,
    Running,
    Finished,
    Failed,
    TimedOut,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::TimedOut)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::Running => 1,
            Self::Finished | Self::Failed | Self::TimedOut => 2,
        }
    }

    /// Parse a backend status string
    pub fn from_wire(status: &str) -> Option<Self> {
        match status.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" | "PENDING" | "QUEUED" => Some(Self::Submitted),
            "RUNNING" | "IN_PROGRESS" => Some(Self::Running),
            "FINISHED" | "DONE" | "COMPLETED" => Some(Self::Finished),
            "FAILED" | "ERROR" | "CANCELLED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "SUBMITTED",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMED_OUT",
        };
        f.write_str(s)
    }
}

/// Handle to one submitted query. Never reused across submissions.
#[derive(Debug)]
pub struct QueryHandle {
    id: String,
    query: String,
    state: QueryState,
    attempts: u32,
    submitted_at: Instant,
    error: Option<String>,
}

impl QueryHandle {
    pub(crate) fn new(id: String, query: String) -> Self {
        Self {
            id,
            query,
            state: QueryState::Submitted,
            attempts: 0,
            submitted_at: Instant::now(),
            error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    /// Number of status polls performed so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    pub(crate) fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Move to `next`. Re-reporting the current state is a no-op; any move
    /// backwards or out of a terminal state is rejected.
    pub(crate) fn advance(&mut self, next: QueryState) -> ValidatorResult<()> {
        if next == self.state {
            return Ok(());
        }
        if self.state.is_terminal() || next.rank() < self.state.rank() {
            return Err(ValidatorError::invalid_state(format!(
                "query {} cannot move from {} to {}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn fail(&mut self, message: String) -> ValidatorResult<()> {
        self.advance(QueryState::Failed)?;
        self.error = Some(message);
        Ok(())
    }
}
