use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::phase::Phase;
use crate::error::{FormError, FormResult};
use crate::transport::Method;

/// Terminal outcome of a submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
    Cancelled,
    /// The before hook rejected the attempt; nothing was dispatched.
    Aborted,
}

/// One pass of the submission phase machine.
#[derive(Debug)]
pub(crate) struct Attempt {
    pub id: Uuid,
    pub method: Method,
    pub url: String,
    pub phase: Phase,
    pub phase_history: Vec<Phase>,
    pub started_at: DateTime<Utc>,
}

impl Attempt {
    pub fn new(method: Method, url: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            url: url.to_string(),
            phase: Phase::Idle,
            phase_history: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Move to `next`, recording the phase that was left. Rejects moves the
    /// transition table does not allow.
    pub fn advance(&mut self, next: Phase) -> FormResult<()> {
        if !self.phase.can_advance(next) {
            return Err(FormError::InvalidPhaseTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase_history.push(self.phase);
        self.phase = next;
        Ok(())
    }
}

/// Structured audit record produced when an attempt finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_id: Uuid,
    pub method: Method,
    pub url: String,
    pub outcome: AttemptOutcome,
    pub phase_transitions: Vec<Phase>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl AttemptRecord {
    pub(crate) fn from_attempt(attempt: &Attempt, outcome: AttemptOutcome) -> Self {
        let now = Utc::now();
        let mut transitions = attempt.phase_history.clone();
        transitions.push(attempt.phase);

        Self {
            attempt_id: attempt.id,
            method: attempt.method,
            url: attempt.url.clone(),
            outcome,
            phase_transitions: transitions,
            started_at: attempt.started_at,
            completed_at: now,
            duration_ms: (now - attempt.started_at).num_milliseconds(),
        }
    }
}
