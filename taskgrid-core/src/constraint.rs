//! Constraint kinds: how a task may be placed on the calendar.
//!
//! Exactly one primary kind (fixed, window, dependency) is active per
//! record. Recurrence wraps a primary kind instead of being a fourth
//! independent flag, so "window and dependency at once" cannot be expressed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{ConstraintTag, Priority, Task, TaskId};

/// Which boundary of the referenced task the offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativePosition {
    /// Measured backwards from the referenced task's start.
    Before,
    /// Measured forwards from the referenced task's end.
    After,
}

/// How the start compares against the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetOperator {
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = ">")]
    Greater,
}

/// "Start [operator] `offset` [before|after] task `target`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRule {
    pub target: TaskId,
    pub position: RelativePosition,
    pub operator: OffsetOperator,
    pub offset_minutes: u32,
}

impl DependencyRule {
    /// Inclusive range of allowed start instants given the target's placement.
    ///
    /// `Greater` reads as "at least the offset away", `Less` as "at most".
    /// Open sides are returned as `None` and bounded by the rebuild window.
    pub fn start_range(
        &self,
        target_start: DateTime<Utc>,
        target_end: DateTime<Utc>,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let offset = Duration::minutes(i64::from(self.offset_minutes));
        match self.position {
            RelativePosition::After => {
                let anchor = target_end + offset;
                match self.operator {
                    OffsetOperator::Equal => (Some(anchor), Some(anchor)),
                    OffsetOperator::Greater => (Some(anchor), None),
                    OffsetOperator::Less => (Some(target_end), Some(anchor)),
                }
            }
            RelativePosition::Before => {
                let anchor = target_start - offset;
                match self.operator {
                    OffsetOperator::Equal => (Some(anchor), Some(anchor)),
                    OffsetOperator::Greater => (None, Some(anchor)),
                    OffsetOperator::Less => (Some(anchor), Some(target_start)),
                }
            }
        }
    }
}

/// Whether the gap is measured from the previous occurrence's start or end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatAnchor {
    #[default]
    FromStart,
    FromEnd,
}

/// Repetition bounded by a count, a period end, or both (first to terminate wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub gap_minutes: u32,
    #[serde(default)]
    pub anchor: RepeatAnchor,
    pub count: Option<u32>,
    pub until: Option<DateTime<Utc>>,
}

impl Recurrence {
    /// Distance between consecutive occurrence starts.
    pub fn step_minutes(&self, duration_minutes: u32) -> i64 {
        match self.anchor {
            RepeatAnchor::FromStart => i64::from(self.gap_minutes),
            RepeatAnchor::FromEnd => i64::from(duration_minutes) + i64::from(self.gap_minutes),
        }
    }

    pub fn shift(&self, duration_minutes: u32, index: u32) -> Duration {
        Duration::minutes(self.step_minutes(duration_minutes) * i64::from(index))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintKind {
    Fixed {
        start: DateTime<Utc>,
    },
    Window {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Dependency(DependencyRule),
    Recurring {
        base: Box<ConstraintKind>,
        recurrence: Recurrence,
    },
}

impl ConstraintKind {
    /// The non-recurring constraint underneath any recurrence wrapper.
    pub fn primary(&self) -> &ConstraintKind {
        match self {
            ConstraintKind::Recurring { base, .. } => base.primary(),
            other => other,
        }
    }

    pub fn tag(&self) -> ConstraintTag {
        match self.primary() {
            ConstraintKind::Window { .. } => ConstraintTag::Window,
            ConstraintKind::Dependency(_) => ConstraintTag::Dependency,
            _ => ConstraintTag::Fixed,
        }
    }

    pub fn recurrence(&self) -> Option<&Recurrence> {
        match self {
            ConstraintKind::Recurring { recurrence, .. } => Some(recurrence),
            _ => None,
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence().is_some()
    }

    pub fn dependency(&self) -> Option<&DependencyRule> {
        match self.primary() {
            ConstraintKind::Dependency(rule) => Some(rule),
            _ => None,
        }
    }

    /// Earliest instant the first occurrence can touch, when known without placement.
    pub fn nominal_start(&self) -> Option<DateTime<Utc>> {
        match self.primary() {
            ConstraintKind::Fixed { start } | ConstraintKind::Window { start, .. } => Some(*start),
            _ => None,
        }
    }
}

/// A validated constraint record; only [`crate::draft::validate`] builds these
/// from user input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintRecord {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub duration_minutes: u32,
    pub completed: bool,
    pub constraint: ConstraintKind,
    /// Last known placement start, used for completed non-fixed tasks.
    pub placed_at: Option<DateTime<Utc>>,
}

impl ConstraintRecord {
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    /// Where a completed task keeps being drawn, if anywhere.
    pub fn completed_slot(&self) -> Option<DateTime<Utc>> {
        match self.constraint.primary() {
            ConstraintKind::Fixed { start } if !self.constraint.is_recurring() => Some(*start),
            _ => self.placed_at,
        }
    }

    /// Occurrence count implied by the recurrence bounds, capped at `limit`.
    pub fn occurrence_count(&self, limit: u32) -> u32 {
        let Some(recurrence) = self.constraint.recurrence() else {
            return 1;
        };
        let step = recurrence.step_minutes(self.duration_minutes);
        let mut count = recurrence.count.unwrap_or(limit).min(limit);
        if let (Some(until), Some(first)) = (recurrence.until, self.constraint.nominal_start()) {
            if step > 0 {
                let span = (until - first).num_minutes();
                let by_period = if span < 0 { 0 } else { span / step + 1 };
                count = count.min(by_period.min(i64::from(limit)) as u32);
            }
        }
        count
    }

    /// `[first start, last end)` of the whole series, derived from the bounds.
    ///
    /// Dependency-based series have no span until placed.
    pub fn series_span(&self, limit: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.constraint.nominal_start()?;
        let duration = Duration::minutes(i64::from(self.duration_minutes));
        let count = self.occurrence_count(limit);
        if count == 0 {
            return None;
        }
        let last_shift = match self.constraint.recurrence() {
            Some(r) => r.shift(self.duration_minutes, count - 1),
            None => Duration::zero(),
        };
        let last_end = match self.constraint.primary() {
            ConstraintKind::Window { end, .. } => *end + last_shift,
            _ => first + last_shift + duration,
        };
        Some((first, last_end))
    }

    /// Build the placed view of one occurrence.
    pub(crate) fn placed(&self, id: TaskId, occurrence: Option<u32>, start: DateTime<Utc>) -> Task {
        let mut task = Task::new(id, self.title.clone(), start)
            .with_duration(self.duration_minutes)
            .with_priority(self.priority)
            .with_completed(self.completed)
            .with_kind(self.constraint.tag());
        task.description = self.description.clone();
        task.source_id = self.id.clone();
        if let Some(index) = occurrence {
            task = task.with_occurrence(self.id.clone(), index);
        }
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, d, h, m, 0).unwrap()
    }

    fn rule(position: RelativePosition, operator: OffsetOperator, offset: u32) -> DependencyRule {
        DependencyRule {
            target: TaskId::new("a"),
            position,
            operator,
            offset_minutes: offset,
        }
    }

    fn recurring_fixed(count: Option<u32>, until: Option<DateTime<Utc>>, anchor: RepeatAnchor) -> ConstraintRecord {
        ConstraintRecord {
            id: TaskId::new("r"),
            title: "standup".into(),
            description: None,
            priority: Priority::DEFAULT,
            duration_minutes: 30,
            completed: false,
            constraint: ConstraintKind::Recurring {
                base: Box::new(ConstraintKind::Fixed { start: at(12, 9, 0) }),
                recurrence: Recurrence {
                    gap_minutes: 1440,
                    anchor,
                    count,
                    until,
                },
            },
            placed_at: None,
        }
    }

    #[test]
    fn after_ranges() {
        let (s, e) = (at(14, 9, 0), at(14, 10, 0));
        assert_eq!(
            rule(RelativePosition::After, OffsetOperator::Equal, 30).start_range(s, e),
            (Some(at(14, 10, 30)), Some(at(14, 10, 30)))
        );
        assert_eq!(
            rule(RelativePosition::After, OffsetOperator::Greater, 30).start_range(s, e),
            (Some(at(14, 10, 30)), None)
        );
        assert_eq!(
            rule(RelativePosition::After, OffsetOperator::Less, 30).start_range(s, e),
            (Some(at(14, 10, 0)), Some(at(14, 10, 30)))
        );
    }

    #[test]
    fn before_ranges() {
        let (s, e) = (at(14, 9, 0), at(14, 10, 0));
        assert_eq!(
            rule(RelativePosition::Before, OffsetOperator::Greater, 60).start_range(s, e),
            (None, Some(at(14, 8, 0)))
        );
        assert_eq!(
            rule(RelativePosition::Before, OffsetOperator::Less, 60).start_range(s, e),
            (Some(at(14, 8, 0)), Some(at(14, 9, 0)))
        );
    }

    #[test]
    fn primary_unwraps_recurrence() {
        let r = recurring_fixed(Some(3), None, RepeatAnchor::FromStart);
        assert!(r.constraint.is_recurring());
        assert_eq!(r.constraint.tag(), ConstraintTag::Fixed);
        assert_eq!(r.constraint.nominal_start(), Some(at(12, 9, 0)));
    }

    #[test]
    fn series_span_by_count() {
        let r = recurring_fixed(Some(3), None, RepeatAnchor::FromStart);
        assert_eq!(r.occurrence_count(500), 3);
        assert_eq!(r.series_span(500), Some((at(12, 9, 0), at(14, 9, 30))));
    }

    #[test]
    fn series_span_by_period_end_whichever_first() {
        let r = recurring_fixed(Some(10), Some(at(15, 9, 0)), RepeatAnchor::FromStart);
        // 12th, 13th, 14th, 15th: the period end terminates first.
        assert_eq!(r.occurrence_count(500), 4);
    }

    #[test]
    fn from_end_anchor_adds_duration_to_step() {
        let r = recurring_fixed(Some(2), None, RepeatAnchor::FromEnd);
        let rec = r.constraint.recurrence().unwrap();
        assert_eq!(rec.step_minutes(30), 1470);
    }

    #[test]
    fn completed_slot_prefers_fixed_start() {
        let mut r = recurring_fixed(None, None, RepeatAnchor::FromStart);
        r.constraint = ConstraintKind::Fixed { start: at(14, 9, 0) };
        r.placed_at = Some(at(20, 9, 0));
        assert_eq!(r.completed_slot(), Some(at(14, 9, 0)));
    }
}
