//! Penalty tasks: occurrences a rebuild could not place.
//!
//! Produced fresh by every rebuild and never treated as authoritative state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constraint::{ConstraintKind, ConstraintRecord};
use crate::task::{Priority, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum PenaltyReason {
    /// A fixed task lost its slot to a more urgent (or tie-winning) task.
    Conflict { with: TaskId },
    /// Nothing free of the required length inside the allowed range.
    NoSlotInRange,
    /// The referenced task is missing or was itself not placed.
    DependencyUnresolved { dependency: TaskId, cause: String },
    /// Dependency references loop back to this task.
    DependencyCycle { dependency: TaskId },
    /// The record could not be reasoned about at all.
    InvalidConstraint { message: String },
}

impl fmt::Display for PenaltyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PenaltyReason::Conflict { with } => write!(f, "conflicts with higher-priority task {with}"),
            PenaltyReason::NoSlotInRange => f.write_str("no slot found in range"),
            PenaltyReason::DependencyUnresolved { dependency, cause } => {
                write!(f, "dependency unresolved: task {dependency} ({cause})")
            }
            PenaltyReason::DependencyCycle { dependency } => {
                write!(f, "dependency cycle through task {dependency}")
            }
            PenaltyReason::InvalidConstraint { message } => write!(f, "invalid constraint: {message}"),
        }
    }
}

/// A task occurrence that did not make it onto the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyTask {
    /// Occurrence id (series id for non-recurring tasks).
    pub id: TaskId,
    pub source_id: TaskId,
    /// Occurrence index of the failed repetition; 0 for non-recurring tasks.
    pub count_from: u32,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub duration_minutes: u32,
    /// The constraint that failed, when the record was valid enough to have one.
    pub constraint: Option<ConstraintKind>,
    /// Where the task wanted to be (fixed tasks).
    pub nominal_start: Option<DateTime<Utc>>,
    /// The range that was searched (window and dependency tasks).
    pub range_start: Option<DateTime<Utc>>,
    pub range_end: Option<DateTime<Utc>>,
    pub reason: PenaltyReason,
}

impl PenaltyTask {
    pub(crate) fn for_occurrence(
        record: &ConstraintRecord,
        id: TaskId,
        occurrence: Option<u32>,
        reason: PenaltyReason,
    ) -> Self {
        Self {
            id,
            source_id: record.id.clone(),
            count_from: occurrence.unwrap_or(0),
            title: record.title.clone(),
            description: record.description.clone(),
            priority: record.priority,
            duration_minutes: record.duration_minutes,
            constraint: Some(record.constraint.clone()),
            nominal_start: None,
            range_start: None,
            range_end: None,
            reason,
        }
    }

    pub(crate) fn with_nominal_start(mut self, start: DateTime<Utc>) -> Self {
        self.nominal_start = Some(start);
        self
    }

    pub(crate) fn with_range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.range_start = start;
        self.range_end = end;
        self
    }

    /// Penalty for a raw record that failed classification.
    pub fn rejected(
        id: TaskId,
        title: impl Into<String>,
        priority: Priority,
        duration_minutes: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_id: id.clone(),
            id,
            count_from: 0,
            title: title.into(),
            description: None,
            priority,
            duration_minutes,
            constraint: None,
            nominal_start: None,
            range_start: None,
            range_end: None,
            reason: PenaltyReason::InvalidConstraint {
                message: message.into(),
            },
        }
    }
}
