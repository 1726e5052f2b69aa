//! Overlap grouping and column layout for one calendar day.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::SplitError;
use crate::split::split_all;
use crate::task::Task;
use crate::time::intervals_overlap;

/// Widest a group is ever divided; extra tasks share existing columns.
pub const MAX_COLUMNS: usize = 5;

const MARGIN_PCT: f64 = 1.0;
const USABLE_PCT: f64 = 100.0 - 2.0 * MARGIN_PCT;

fn overlaps(a: &Task, b: &Task) -> bool {
    let a_start = a.start_minute();
    let b_start = b.start_minute();
    intervals_overlap(
        a_start,
        a_start + a.duration_minutes,
        b_start,
        b_start + b.duration_minutes,
    )
}

/// Greedy single pass: each task joins the first group holding any member it
/// overlaps, otherwise starts a new group.
///
/// Membership is by chain, so two tasks that never touch can share a group
/// through a third that overlaps both.
pub fn group_overlapping(tasks: &[Task]) -> Vec<Vec<Task>> {
    let mut groups: Vec<Vec<Task>> = Vec::new();
    for task in tasks {
        match groups
            .iter_mut()
            .find(|group| group.iter().any(|member| overlaps(member, task)))
        {
            Some(group) => group.push(task.clone()),
            None => groups.push(vec![task.clone()]),
        }
    }
    groups
}

/// Horizontal placement in percent of the day column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub width_pct: f64,
    pub left_pct: f64,
}

pub fn position(group_len: usize, index: usize) -> Position {
    let columns = group_len.clamp(1, MAX_COLUMNS);
    let width = USABLE_PCT / columns as f64;
    Position {
        width_pct: width,
        left_pct: MARGIN_PCT + (index % columns) as f64 * width,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextSize {
    pub font_px: u32,
    pub max_lines: u32,
}

pub fn text_size(task_count: usize) -> TextSize {
    let (font_px, max_lines) = match task_count {
        0 | 1 => (12, 4),
        2 => (11, 3),
        3 => (10, 2),
        4 => (9, 2),
        _ => (8, 1),
    };
    TextSize { font_px, max_lines }
}

/// Lines of description that fit a box of `duration_minutes` height.
pub fn line_clamp(size: TextSize, duration_minutes: u32) -> u32 {
    size.max_lines.min((duration_minutes / 15).max(1))
}

/// One box of the render contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaidOutTask {
    pub task: Task,
    pub group: usize,
    pub index_in_group: usize,
    pub group_size: usize,
    pub position: Position,
    pub text: TextSize,
    pub lines: u32,
}

/// Split, keep the segments that start on `date`, group and position them.
pub fn layout_day(tasks: &[Task], date: NaiveDate, max_segments: usize) -> Result<Vec<LaidOutTask>, SplitError> {
    let mut day: Vec<Task> = split_all(tasks, max_segments)?
        .into_iter()
        .filter(|t| t.start_date == date)
        .collect();
    day.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));

    let mut out = Vec::with_capacity(day.len());
    for (group_no, group) in group_overlapping(&day).into_iter().enumerate() {
        let size = group.len();
        let text = text_size(size);
        for (index, task) in group.into_iter().enumerate() {
            let lines = line_clamp(text, task.duration_minutes);
            out.push(LaidOutTask {
                position: position(size, index),
                group: group_no,
                index_in_group: index,
                group_size: size,
                text,
                lines,
                task,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn task(id: &str, h: u32, m: u32, minutes: u32) -> Task {
        Task::new(id, id, Utc.with_ymd_and_hms(2026, 10, 14, h, m, 0).unwrap()).with_duration(minutes)
    }

    fn ids(group: &[Task]) -> Vec<&str> {
        group.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn chain_lands_in_one_group() {
        let a = task("a", 9, 0, 30);
        let b = task("b", 9, 15, 45);
        let c = task("c", 9, 45, 30);
        assert!(!overlaps(&a, &c));
        let groups = group_overlapping(&[a, b, c]);
        assert_eq!(groups.len(), 1);
        assert_eq!(ids(&groups[0]), vec!["a", "b", "c"]);
    }

    #[test]
    fn grouping_is_order_sensitive() {
        // Without b first bridging them, a and c open separate groups.
        let groups = group_overlapping(&[task("a", 9, 0, 30), task("c", 9, 45, 30), task("b", 9, 15, 45)]);
        assert_eq!(groups.len(), 2);
        assert_eq!(ids(&groups[0]), vec!["a", "b"]);
        assert_eq!(ids(&groups[1]), vec!["c"]);
    }

    #[test]
    fn touching_tasks_do_not_group() {
        let groups = group_overlapping(&[task("a", 9, 0, 30), task("b", 9, 30, 30)]);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn single_task_gets_full_width() {
        let p = position(1, 0);
        assert_eq!(p.width_pct, 98.0);
        assert_eq!(p.left_pct, 1.0);
    }

    #[test]
    fn five_and_six_share_the_same_columns() {
        let five: Vec<Position> = (0..5).map(|i| position(5, i)).collect();
        let six: Vec<Position> = (0..6).map(|i| position(6, i)).collect();
        assert!(five.iter().all(|p| (p.width_pct - 19.6).abs() < 1e-9));
        assert_eq!(&six[..5], &five[..]);
        assert_eq!(six[5], six[0]);
    }

    #[test]
    fn text_table_boundaries() {
        assert_eq!(text_size(1), TextSize { font_px: 12, max_lines: 4 });
        assert_eq!(text_size(4), TextSize { font_px: 9, max_lines: 2 });
        assert_eq!(text_size(5), text_size(12));
        assert!(text_size(2).font_px > text_size(5).font_px);
    }

    #[test]
    fn lines_bounded_by_box_height() {
        assert_eq!(line_clamp(text_size(1), 10), 1);
        assert_eq!(line_clamp(text_size(1), 45), 3);
        assert_eq!(line_clamp(text_size(1), 240), 4);
    }

    #[test]
    fn layout_day_uses_segments_of_that_day() {
        let late = task("late", 23, 30, 90);
        let morning = Task::new("m", "m", Utc.with_ymd_and_hms(2026, 10, 15, 0, 30, 0).unwrap()).with_duration(30);
        let next = chrono::NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();

        let boxes = layout_day(&[late, morning], next, 10).unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].task.id.as_str(), "late");
        assert_eq!(boxes[0].task.duration_minutes, 60);
        assert_eq!(boxes[0].group_size, 2);
        assert_eq!(boxes[1].position.left_pct, 1.0 + 49.0);
    }
}
