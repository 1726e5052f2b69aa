//! Task model: identifiers, priority, and the placed/display view of a task.
//!
//! A [`Task`] is what the calendar draws: a concrete start and a duration.
//! The constraint that produced it lives in [`crate::constraint`].

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::time::{add_minutes, to_minutes_since_midnight, truncate_to_minute};

/// Opaque task identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Placeholder id carried by a record that the backend has not stored yet.
    pub fn pending() -> Self {
        Self(String::new())
    }

    pub fn is_pending(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Synthetic id for occurrence `index` of a recurring series.
    pub fn occurrence(&self, index: u32) -> Self {
        Self(format!("{}#{}", self.0, index))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Explicit user context; threaded through every service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task priority in `1..=10`. 1 is the most urgent, 10 the least.
///
/// `Ord` follows the numeric value, so sorting ascending puts the most
/// urgent task first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Priority = Priority(1);
    pub const LOWEST: Priority = Priority(10);
    pub const DEFAULT: Priority = Priority(5);

    pub fn new(value: i64) -> Option<Self> {
        if (1..=10).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    /// Clamp an arbitrary wire value into range.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(1, 10) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(i64::from(value)).ok_or_else(|| format!("priority {value} outside 1..=10"))
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value.0
    }
}

/// Which primary constraint produced a placed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintTag {
    #[default]
    Fixed,
    Window,
    Dependency,
}

/// Bookkeeping present only on segments produced by the day splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitInfo {
    pub parent_task_id: TaskId,
    pub split_index: u32,
}

/// A task with a concrete placement, as the calendar renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Occurrence id (equal to `source_id` for non-recurring tasks).
    pub id: TaskId,
    /// Id of the constraint record this task came from.
    pub source_id: TaskId,
    /// Occurrence index inside a recurring series.
    pub occurrence: Option<u32>,

    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,

    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,

    pub completed: bool,
    pub kind: ConstraintTag,
    pub recurring: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<SplitInfo>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>, start: DateTime<Utc>) -> Self {
        let id = id.into();
        let start = truncate_to_minute(start).naive_utc();
        Self {
            source_id: id.clone(),
            id,
            occurrence: None,
            title: title.into(),
            description: None,
            priority: Priority::DEFAULT,
            start_date: start.date(),
            start_time: start.time(),
            duration_minutes: 60,
            completed: false,
            kind: ConstraintTag::Fixed,
            recurring: false,
            split: None,
        }
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    pub fn with_kind(mut self, kind: ConstraintTag) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_occurrence(mut self, source_id: TaskId, index: u32) -> Self {
        self.source_id = source_id;
        self.occurrence = Some(index);
        self.recurring = true;
        self
    }

    pub fn start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start_date.and_time(self.start_time))
    }

    /// Always `start + duration`, recomputed in UTC.
    pub fn end(&self) -> DateTime<Utc> {
        let (date, time) = self.end_date_time();
        Utc.from_utc_datetime(&date.and_time(time))
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date_time().0
    }

    pub fn end_time(&self) -> NaiveTime {
        self.end_date_time().1
    }

    fn end_date_time(&self) -> (NaiveDate, NaiveTime) {
        add_minutes(self.start_date, self.start_time, i64::from(self.duration_minutes))
    }

    pub fn start_minute(&self) -> u32 {
        to_minutes_since_midnight(self.start_time)
    }

    pub fn is_split_task(&self) -> bool {
        self.split.is_some()
    }
}
