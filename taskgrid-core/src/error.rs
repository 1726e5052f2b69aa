//! Error taxonomy shared by the engine modules.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskId;

/// Which rule a malformed draft broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    MissingField,
    InvalidRange,
    ConflictingConstraints,
}

/// A single problem found while validating a draft or a wire record.
///
/// Validation collects every problem it finds, so callers receive a
/// `Vec<ValidationError>` and can show all of them inline at once.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?} on `{field}`: {message}")]
pub struct ValidationError {
    pub kind: ValidationKind,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            kind: ValidationKind::MissingField,
            message: format!("{field} is required"),
            field,
        }
    }

    pub fn invalid_range(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ValidationKind::InvalidRange,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn conflicting(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ValidationKind::ConflictingConstraints,
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Join a batch of validation errors into one line for logs and penalty reasons.
pub fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Raised by the day splitter when a task needs more segments than allowed.
///
/// Only malformed duration data can trigger this; it is surfaced, never
/// truncated away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("task {task_id} needs more than {cap} day segments ({remaining_minutes} minutes left)")]
    SplitOverflow {
        task_id: TaskId,
        cap: usize,
        remaining_minutes: u32,
    },
}

/// Failures of a rebuild as a whole. Per-task failures go to the penalty list instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("scheduler unavailable: {0}")]
    Unavailable(String),

    #[error("rebuild did not finish within {budget_ms} ms")]
    Timeout { budget_ms: u64 },

    #[error("invalid constraint set at task {task_id}: {reason}")]
    InvalidConstraintSet { task_id: TaskId, reason: String },
}
