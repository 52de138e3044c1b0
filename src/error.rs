use crate::domain::milestone::{MilestoneId, MilestoneStatus};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the milestone engine and payment coordinator.
///
/// Variants that concern a specific milestone carry its id, and the
/// status-related variants carry the observed status, so a caller can decide
/// whether a retry makes sense without re-reading the store.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad input, rejected before any store mutation.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("milestone {milestone_id} not found")]
    NotFound { milestone_id: MilestoneId },

    /// The requested operation is not legal from the milestone's current
    /// status. Never silently coerced into a no-op.
    #[error("milestone {milestone_id}: cannot {action} while {from}")]
    InvalidTransition {
        milestone_id: MilestoneId,
        from: MilestoneStatus,
        action: &'static str,
    },

    /// Optimistic-concurrency failure: a conditional update observed a status
    /// other than the one it expected. Caller may reload and retry at most
    /// once before surfacing to the user.
    #[error("milestone {milestone_id}: expected status {expected}, found {actual}")]
    Conflict {
        milestone_id: MilestoneId,
        expected: MilestoneStatus,
        actual: MilestoneStatus,
    },

    /// Gateway-reported failure or timeout. The milestone is left `failed`
    /// and may be retried with another `pay_milestone` call.
    #[error("payment for milestone {milestone_id} failed: {reason}")]
    Payment {
        milestone_id: MilestoneId,
        reason: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}
