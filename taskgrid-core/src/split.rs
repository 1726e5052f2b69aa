//! Day splitter: cut a task that crosses UTC midnight into per-day segments.
//!
//! Segments are views recomputed on every render. They keep the parent's id
//! and carry [`SplitInfo`] pointing back at it.

use chrono::Duration;

use crate::error::SplitError;
use crate::task::{SplitInfo, Task};
use crate::time::MINUTES_PER_DAY;

/// Segment cap used when the caller has no configured limit.
pub const DEFAULT_MAX_SEGMENTS: usize = 10;

pub fn split_by_day(task: &Task) -> Result<Vec<Task>, SplitError> {
    split_by_day_capped(task, DEFAULT_MAX_SEGMENTS)
}

/// Split `task` at every UTC midnight it crosses, emitting at most `cap` segments.
///
/// A task whose last occupied minute falls on its start date is returned
/// unchanged as the only element.
pub fn split_by_day_capped(task: &Task, cap: usize) -> Result<Vec<Task>, SplitError> {
    if task.duration_minutes == 0 || !crosses_midnight(task) {
        return Ok(vec![task.clone()]);
    }

    let mut segments = Vec::new();
    let mut current = task.start();
    let mut remaining = task.duration_minutes;

    while remaining > 0 {
        if segments.len() >= cap {
            return Err(SplitError::SplitOverflow {
                task_id: task.id.clone(),
                cap,
                remaining_minutes: remaining,
            });
        }

        let naive = current.naive_utc();
        let minute_of_day = crate::time::to_minutes_since_midnight(naive.time());
        // Inclusive of the current minute: 23:59 leaves one minute today.
        let today_left = MINUTES_PER_DAY - minute_of_day;
        let len = today_left.min(remaining);

        let mut segment = task.clone();
        segment.start_date = naive.date();
        segment.start_time = naive.time();
        segment.duration_minutes = len;
        segment.split = Some(SplitInfo {
            parent_task_id: task.id.clone(),
            split_index: segments.len() as u32,
        });
        segments.push(segment);

        current = crate::time::midnight_utc(naive.date() + Duration::days(1));
        remaining -= len;
    }

    Ok(segments)
}

fn crosses_midnight(task: &Task) -> bool {
    let last_minute = task.start() + Duration::minutes(i64::from(task.duration_minutes) - 1);
    last_minute.date_naive() != task.start_date
}

/// Split every task; segments produced earlier pass through untouched.
pub fn split_all(tasks: &[Task], cap: usize) -> Result<Vec<Task>, SplitError> {
    let mut out = Vec::with_capacity(tasks.len());
    for task in tasks {
        if task.is_split_task() {
            out.push(task.clone());
        } else {
            out.extend(split_by_day_capped(task, cap)?);
        }
    }
    Ok(out)
}

/// The unsplit parent of `segment` within `all`, or the segment itself when
/// the parent is not present.
pub fn original_of<'a>(segment: &'a Task, all: &'a [Task]) -> &'a Task {
    let Some(info) = &segment.split else {
        return segment;
    };
    all.iter()
        .find(|t| t.id == info.parent_task_id && !t.is_split_task())
        .unwrap_or(segment)
}

/// Every piece belonging to the same parent as `task`, in input order.
pub fn all_parts<'a>(task: &Task, all: &'a [Task]) -> Vec<&'a Task> {
    let parent = match &task.split {
        Some(info) => &info.parent_task_id,
        None => &task.id,
    };
    all.iter()
        .filter(|t| match &t.split {
            Some(info) => info.parent_task_id == *parent,
            None => task.split.is_none() && t.id == *parent,
        })
        .collect()
}
