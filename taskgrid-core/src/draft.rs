//! Editor drafts and the single validating factory for constraint records.
//!
//! A [`TaskDraft`] mirrors what the editor collects: independent flags for
//! "window" and "dependency" plus a repeat toggle. [`validate`] is the only
//! place those flags become a [`ConstraintKind`]; every other layer sees
//! validated records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constraint::{
    ConstraintKind, ConstraintRecord, DependencyRule, OffsetOperator, Recurrence, RelativePosition, RepeatAnchor,
};
use crate::error::ValidationError;
use crate::task::{Priority, TaskId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub id: Option<TaskId>,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub duration_minutes: Option<i64>,
    pub completed: bool,

    /// Explicit start; only meaningful for fixed tasks.
    pub start: Option<DateTime<Utc>>,

    pub window: bool,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,

    pub dependency: bool,
    pub dependency_target: Option<TaskId>,
    pub dependency_position: Option<RelativePosition>,
    pub dependency_operator: Option<OffsetOperator>,
    pub dependency_offset_minutes: Option<i64>,

    pub repeating: bool,
    pub repeat_gap_minutes: Option<i64>,
    pub repeat_from_start: bool,
    pub repeat_count: Option<i64>,
    pub repeat_until: Option<DateTime<Utc>>,

    /// Last placement reported by the scheduler, carried for completed tasks.
    pub placed_at: Option<DateTime<Utc>>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            repeat_from_start: true,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_duration(mut self, minutes: i64) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn fixed(mut self, start: DateTime<Utc>, minutes: i64) -> Self {
        self.start = Some(start);
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn in_window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.window = true;
        self.window_start = Some(start);
        self.window_end = Some(end);
        self
    }

    pub fn depends_on(
        mut self,
        target: impl Into<TaskId>,
        position: RelativePosition,
        operator: OffsetOperator,
        offset_minutes: i64,
    ) -> Self {
        self.dependency = true;
        self.dependency_target = Some(target.into());
        self.dependency_position = Some(position);
        self.dependency_operator = Some(operator);
        self.dependency_offset_minutes = Some(offset_minutes);
        self
    }

    pub fn repeating(mut self, gap_minutes: i64, count: Option<i64>, until: Option<DateTime<Utc>>) -> Self {
        self.repeating = true;
        self.repeat_gap_minutes = Some(gap_minutes);
        self.repeat_count = count;
        self.repeat_until = until;
        self
    }

    pub fn repeat_from_end(mut self) -> Self {
        self.repeat_from_start = false;
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }
}

/// Turn a draft into a constraint record, or report everything wrong with it.
pub fn validate(draft: &TaskDraft) -> Result<ConstraintRecord, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let title = draft.title.trim();
    if title.is_empty() {
        errors.push(ValidationError::missing("title"));
    }

    let priority = match draft.priority {
        None => Priority::DEFAULT,
        Some(p) => Priority::new(p).unwrap_or_else(|| {
            errors.push(ValidationError::invalid_range("priority", format!("{p} is outside 1..=10")));
            Priority::DEFAULT
        }),
    };

    let duration = match draft.duration_minutes {
        None => {
            errors.push(ValidationError::missing("duration"));
            0
        }
        Some(d) if d <= 0 => {
            errors.push(ValidationError::invalid_range("duration", "must be greater than zero"));
            0
        }
        Some(d) => u32::try_from(d).unwrap_or_else(|_| {
            errors.push(ValidationError::invalid_range("duration", "too long"));
            0
        }),
    };

    let primary = primary_kind(draft, duration, &mut errors);

    let constraint = match (primary, draft.repeating) {
        (Some(base), true) => recurrence(draft, &base, &mut errors).map(|recurrence| {
            ConstraintKind::Recurring {
                base: Box::new(base),
                recurrence,
            }
        }),
        (base, _) => base,
    };

    match constraint {
        Some(constraint) if errors.is_empty() => Ok(ConstraintRecord {
            id: draft.id.clone().unwrap_or_else(TaskId::pending),
            title: title.to_string(),
            description: draft.description.clone().filter(|d| !d.trim().is_empty()),
            priority,
            duration_minutes: duration,
            completed: draft.completed,
            constraint,
            placed_at: draft.placed_at,
        }),
        _ => Err(errors),
    }
}

fn primary_kind(draft: &TaskDraft, duration: u32, errors: &mut Vec<ValidationError>) -> Option<ConstraintKind> {
    if draft.window && draft.dependency {
        errors.push(ValidationError::conflicting(
            "constraint",
            "a task is either window-bound or dependency-relative, not both",
        ));
        return None;
    }

    if draft.window {
        if draft.start.is_some() {
            errors.push(ValidationError::conflicting("start", "window tasks are placed by the scheduler"));
        }
        let (Some(start), Some(end)) = (draft.window_start, draft.window_end) else {
            if draft.window_start.is_none() {
                errors.push(ValidationError::missing("window_start"));
            }
            if draft.window_end.is_none() {
                errors.push(ValidationError::missing("window_end"));
            }
            return None;
        };
        if start > end {
            errors.push(ValidationError::invalid_range("window", "window start is after window end"));
            return None;
        }
        if (end - start).num_minutes() < i64::from(duration) {
            errors.push(ValidationError::invalid_range("window", "window is shorter than the task"));
            return None;
        }
        return Some(ConstraintKind::Window { start, end });
    }

    if draft.dependency {
        if draft.start.is_some() {
            errors.push(ValidationError::conflicting(
                "start",
                "dependency-relative tasks take their start from the referenced task",
            ));
        }
        let target = match &draft.dependency_target {
            Some(t) if !t.as_str().trim().is_empty() => t.clone(),
            _ => {
                errors.push(ValidationError::missing("dependency_target"));
                return None;
            }
        };
        if draft.id.as_ref().is_some_and(|id| *id == target) {
            errors.push(ValidationError::conflicting("dependency_target", "a task cannot depend on itself"));
            return None;
        }
        let Some(position) = draft.dependency_position else {
            errors.push(ValidationError::missing("dependency_position"));
            return None;
        };
        let Some(operator) = draft.dependency_operator else {
            errors.push(ValidationError::missing("dependency_operator"));
            return None;
        };
        let offset = match draft.dependency_offset_minutes {
            None => {
                errors.push(ValidationError::missing("dependency_offset"));
                return None;
            }
            Some(o) if o < 0 => {
                errors.push(ValidationError::invalid_range("dependency_offset", "offset is a magnitude"));
                return None;
            }
            Some(o) => u32::try_from(o).unwrap_or(u32::MAX),
        };
        return Some(ConstraintKind::Dependency(DependencyRule {
            target,
            position,
            operator,
            offset_minutes: offset,
        }));
    }

    match draft.start {
        Some(start) => Some(ConstraintKind::Fixed { start }),
        None => {
            errors.push(ValidationError::missing("start"));
            None
        }
    }
}

fn recurrence(
    draft: &TaskDraft,
    base: &ConstraintKind,
    errors: &mut Vec<ValidationError>,
) -> Option<Recurrence> {
    let anchor = if draft.repeat_from_start {
        RepeatAnchor::FromStart
    } else {
        RepeatAnchor::FromEnd
    };

    let gap = match draft.repeat_gap_minutes {
        None => {
            errors.push(ValidationError::missing("repeat_gap"));
            return None;
        }
        Some(g) if g < 0 || (g == 0 && anchor == RepeatAnchor::FromStart) => {
            errors.push(ValidationError::invalid_range("repeat_gap", "occurrences must move forward in time"));
            return None;
        }
        Some(g) => u32::try_from(g).unwrap_or(u32::MAX),
    };

    let count = match draft.repeat_count {
        Some(c) if c <= 0 => {
            errors.push(ValidationError::invalid_range("repeat_count", "must be at least one"));
            return None;
        }
        Some(c) => Some(u32::try_from(c).unwrap_or(u32::MAX)),
        None => None,
    };

    if count.is_none() && draft.repeat_until.is_none() {
        errors.push(ValidationError::missing("repeat_count"));
        return None;
    }

    if let (Some(until), Some(first)) = (draft.repeat_until, base.nominal_start()) {
        if until < first {
            errors.push(ValidationError::invalid_range("repeat_until", "period ends before the first occurrence"));
            return None;
        }
    }

    if matches!(base, ConstraintKind::Dependency(_)) && count.is_none() {
        errors.push(ValidationError::missing("repeat_count"));
        return None;
    }

    Some(Recurrence {
        gap_minutes: gap,
        anchor,
        count,
        until: draft.repeat_until,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationKind;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, d, h, m, 0).unwrap()
    }

    fn kinds(errors: &[ValidationError]) -> Vec<(ValidationKind, &str)> {
        errors.iter().map(|e| (e.kind, e.field.as_str())).collect()
    }

    #[test]
    fn fixed_draft_becomes_fixed_record() {
        let rec = validate(&TaskDraft::new("  Review  ").fixed(at(14, 9, 0), 45).with_priority(2)).unwrap();
        assert_eq!(rec.title, "Review");
        assert_eq!(rec.priority.value(), 2);
        assert_eq!(rec.duration_minutes, 45);
        assert_eq!(rec.constraint, ConstraintKind::Fixed { start: at(14, 9, 0) });
        assert!(rec.id.is_pending());
    }

    #[test]
    fn collects_all_errors() {
        let errs = validate(&TaskDraft::new(" ").with_priority(11)).unwrap_err();
        let k = kinds(&errs);
        assert!(k.contains(&(ValidationKind::MissingField, "title")));
        assert!(k.contains(&(ValidationKind::InvalidRange, "priority")));
        assert!(k.contains(&(ValidationKind::MissingField, "duration")));
        assert!(k.contains(&(ValidationKind::MissingField, "start")));
    }

    #[test]
    fn zero_duration_is_invalid() {
        let errs = validate(&TaskDraft::new("x").fixed(at(14, 9, 0), 0)).unwrap_err();
        assert_eq!(kinds(&errs), vec![(ValidationKind::InvalidRange, "duration")]);
    }

    #[test]
    fn window_and_dependency_conflict() {
        let draft = TaskDraft::new("x")
            .with_duration(30)
            .in_window(at(14, 9, 0), at(14, 12, 0))
            .depends_on("a", RelativePosition::After, OffsetOperator::Greater, 0);
        let errs = validate(&draft).unwrap_err();
        assert_eq!(kinds(&errs), vec![(ValidationKind::ConflictingConstraints, "constraint")]);
    }

    #[test]
    fn window_must_fit_duration() {
        let reversed = TaskDraft::new("x").with_duration(30).in_window(at(14, 12, 0), at(14, 9, 0));
        assert_eq!(kinds(&validate(&reversed).unwrap_err()), vec![(ValidationKind::InvalidRange, "window")]);

        let short = TaskDraft::new("x").with_duration(90).in_window(at(14, 9, 0), at(14, 10, 0));
        assert_eq!(kinds(&validate(&short).unwrap_err()), vec![(ValidationKind::InvalidRange, "window")]);

        let exact = TaskDraft::new("x").with_duration(60).in_window(at(14, 9, 0), at(14, 10, 0));
        assert!(validate(&exact).is_ok());
    }

    #[test]
    fn dependency_rejects_independent_start() {
        let mut draft = TaskDraft::new("x")
            .with_duration(30)
            .depends_on("a", RelativePosition::After, OffsetOperator::Equal, 15);
        draft.start = Some(at(14, 9, 0));
        let errs = validate(&draft).unwrap_err();
        assert!(kinds(&errs).contains(&(ValidationKind::ConflictingConstraints, "start")));
    }

    #[test]
    fn dependency_on_self_is_conflicting() {
        let draft = TaskDraft::new("x")
            .with_id("a")
            .with_duration(30)
            .depends_on("a", RelativePosition::After, OffsetOperator::Equal, 15);
        let errs = validate(&draft).unwrap_err();
        assert_eq!(kinds(&errs), vec![(ValidationKind::ConflictingConstraints, "dependency_target")]);
    }

    #[test]
    fn repeating_wraps_primary_kind() {
        let rec = validate(
            &TaskDraft::new("gym")
                .in_window(at(12, 6, 0), at(12, 9, 0))
                .with_duration(60)
                .repeating(2 * 1440, Some(3), None),
        )
        .unwrap();
        match rec.constraint {
            ConstraintKind::Recurring { base, recurrence } => {
                assert!(matches!(*base, ConstraintKind::Window { .. }));
                assert_eq!(recurrence.count, Some(3));
                assert_eq!(recurrence.anchor, RepeatAnchor::FromStart);
            }
            other => panic!("expected recurring, got {other:?}"),
        }
    }

    #[test]
    fn repeating_needs_a_bound() {
        let draft = TaskDraft::new("x").fixed(at(14, 9, 0), 30).repeating(1440, None, None);
        assert_eq!(kinds(&validate(&draft).unwrap_err()), vec![(ValidationKind::MissingField, "repeat_count")]);
    }

    #[test]
    fn repeat_until_before_first_is_invalid() {
        let draft = TaskDraft::new("x").fixed(at(14, 9, 0), 30).repeating(1440, None, Some(at(13, 9, 0)));
        assert_eq!(kinds(&validate(&draft).unwrap_err()), vec![(ValidationKind::InvalidRange, "repeat_until")]);
    }

    #[test]
    fn back_to_back_repeat_from_end_is_allowed() {
        let draft = TaskDraft::new("x")
            .fixed(at(14, 9, 0), 30)
            .repeating(0, Some(4), None)
            .repeat_from_end();
        assert!(validate(&draft).is_ok());
    }
}
