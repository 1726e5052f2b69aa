//! Property tests for the splitter and the rebuild engine.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use proptest::prelude::*;

use taskgrid_core::constraint::{OffsetOperator, RelativePosition};
use taskgrid_core::time::intervals_overlap;
use taskgrid_core::{
    split_by_day, validate, ConstraintRecord, RebuildWindow, Scheduler, Task, TaskDraft, TaskId,
};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 12, 0, 0, 0).unwrap()
}

#[derive(Debug, Clone)]
enum Shape {
    Fixed { offset: i64, minutes: i64 },
    Window { offset: i64, span: i64, minutes: i64 },
    After { target: usize, op: u8, gap: i64, minutes: i64 },
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    prop_oneof![
        (0i64..7 * 96, 1i64..16).prop_map(|(slot, q)| Shape::Fixed {
            offset: slot * 15,
            minutes: q * 15,
        }),
        (0i64..7 * 96, 0i64..40, 1i64..12).prop_map(|(slot, extra, q)| Shape::Window {
            offset: slot * 15,
            span: q * 15 + extra * 15,
            minutes: q * 15,
        }),
        (0usize..8, 0u8..3, 0i64..12, 1i64..8).prop_map(|(target, op, gap, q)| Shape::After {
            target,
            op,
            gap: gap * 15,
            minutes: q * 15,
        }),
    ]
}

fn build(shapes: &[(Shape, i64)]) -> Vec<ConstraintRecord> {
    let mut records = Vec::new();
    for (i, (shape, priority)) in shapes.iter().enumerate() {
        let id = format!("t{i}");
        let draft = match shape {
            Shape::Fixed { offset, minutes } => {
                TaskDraft::new(id.clone()).fixed(base() + Duration::minutes(*offset), *minutes)
            }
            Shape::Window { offset, span, minutes } => {
                let start = base() + Duration::minutes(*offset);
                TaskDraft::new(id.clone())
                    .with_duration(*minutes)
                    .in_window(start, start + Duration::minutes(*span))
            }
            Shape::After { target, op, gap, minutes } => {
                let op = match *op {
                    0 => OffsetOperator::Less,
                    1 => OffsetOperator::Equal,
                    _ => OffsetOperator::Greater,
                };
                let target = format!("t{}", target % shapes.len());
                if target == id {
                    continue;
                }
                TaskDraft::new(id.clone())
                    .with_id(id.clone())
                    .with_duration(*minutes)
                    .depends_on(target.as_str(), RelativePosition::After, op, *gap)
            }
        };
        let record = validate(&draft.with_priority(*priority)).unwrap();
        records.push(record.with_id(TaskId::new(id)));
    }
    records
}

proptest! {
    /// Segments cover the task exactly: same total, contiguous, midnight-aligned.
    #[test]
    fn split_conserves_duration(start_minute in 0i64..1440, minutes in 1u32..5 * 1440) {
        let start = base() + Duration::minutes(start_minute);
        let task = Task::new("p", "prop", start).with_duration(minutes);
        let parts = split_by_day(&task).unwrap();

        let total: u32 = parts.iter().map(|p| p.duration_minutes).sum();
        prop_assert_eq!(total, minutes);
        prop_assert!(parts.len() as u32 <= minutes.div_ceil(1440) + 1);
        prop_assert_eq!(parts[0].start(), start);
        for pair in parts.windows(2) {
            prop_assert_eq!(pair[0].end(), pair[1].start());
            prop_assert!(pair[0].start() < pair[1].start());
            prop_assert_eq!(pair[1].start_time, NaiveTime::MIN);
        }
        for part in &parts {
            prop_assert!(part.end_date() == part.start_date || part.end_time() == NaiveTime::MIN);
        }
    }

    /// Placed, non-completed tasks never overlap, and every record is accounted for once.
    #[test]
    fn rebuild_never_double_books(shapes in prop::collection::vec((arb_shape(), 1i64..=10), 1..14)) {
        let records = build(&shapes);
        let window = RebuildWindow::around(base() + Duration::days(2), 0, 0);
        let outcome = Scheduler::default().rebuild(&records, &window).unwrap();

        for (i, a) in outcome.placed.iter().enumerate() {
            for b in &outcome.placed[i + 1..] {
                prop_assert!(
                    !intervals_overlap(a.start(), a.end(), b.start(), b.end()),
                    "{} and {} overlap", a.id, b.id
                );
            }
        }

        // Fixed and window shapes always reach into the week; dependents may land outside it.
        for (i, (shape, _)) in shapes.iter().enumerate() {
            let id = TaskId::new(format!("t{i}"));
            if !records.iter().any(|r| r.id == id) {
                continue;
            }
            let placed = outcome.placed.iter().filter(|t| t.source_id == id).count();
            let penalized = outcome.penalties.iter().filter(|p| p.source_id == id).count();
            if matches!(shape, Shape::After { .. }) {
                prop_assert!(placed + penalized <= 1);
            } else {
                prop_assert_eq!(placed + penalized, 1, "{} is unaccounted for", id);
            }
        }

        let again = Scheduler::default().rebuild(&records, &window).unwrap();
        prop_assert_eq!(again, outcome);
    }

    /// A daily series is placed once per day of the week, however long ago it began.
    #[test]
    fn daily_series_fills_a_late_week(days_back in 0i64..2000, hour in 0i64..23, q in 1i64..=4) {
        let first = base() - Duration::days(days_back) + Duration::hours(hour);
        let draft = TaskDraft::new("daily")
            .fixed(first, q * 15)
            .repeating(1440, None, Some(base() + Duration::days(30)));
        let record = validate(&draft).unwrap().with_id(TaskId::new("s"));
        let window = RebuildWindow::around(base() + Duration::days(2), 0, 0);
        let outcome = Scheduler::default().rebuild(&[record], &window).unwrap();

        prop_assert!(outcome.penalties.is_empty());
        prop_assert_eq!(outcome.placed.len(), 7);
        for (day, task) in outcome.placed.iter().enumerate() {
            prop_assert_eq!(task.start(), base() + Duration::days(day as i64) + Duration::hours(hour));
        }
    }
}
