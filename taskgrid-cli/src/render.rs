//! Plain-text rendering of placements, day layouts and penalties.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use taskgrid_core::time::format_in_zone;
use taskgrid_core::{ApiPenaltyTask, ApiTask, ConstraintTag, LaidOutTask, Task};

fn local_time(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).format("%H:%M").to_string()
}

fn tag(kind: ConstraintTag) -> &'static str {
    match kind {
        ConstraintTag::Fixed => "fixed",
        ConstraintTag::Window => "window",
        ConstraintTag::Dependency => "after",
    }
}

pub fn tasks(tasks: &[Task], tz: Tz) -> String {
    if tasks.is_empty() {
        return "(no placed tasks)\n".to_string();
    }
    let mut out = String::new();
    for t in tasks {
        let done = if t.completed { "x" } else { " " };
        let repeat = if t.recurring { " (repeats)" } else { "" };
        out.push_str(&format!(
            "[{done}] {:<8} {} - {}  p{:<2} {:<6} {}{repeat}\n",
            t.id,
            format_in_zone(t.start(), tz),
            local_time(t.end(), tz),
            t.priority.value(),
            tag(t.kind),
            t.title,
        ));
    }
    out
}

/// One line per box: column geometry first, then the clamped text.
pub fn day(boxes: &[LaidOutTask], date: NaiveDate, tz: Tz) -> String {
    let mut out = format!("# {date}\n");
    if boxes.is_empty() {
        out.push_str("(nothing scheduled)\n");
        return out;
    }
    for b in boxes {
        let t = &b.task;
        let part = match &t.split {
            Some(info) => format!(" [part {}]", info.split_index + 1),
            None => String::new(),
        };
        out.push_str(&format!(
            "{}-{}  group {} col {}/{}  left {:>5.1}% width {:>5.1}%  {}px x{}  {}{part}\n",
            local_time(t.start(), tz),
            local_time(t.end(), tz),
            b.group,
            b.index_in_group + 1,
            b.group_size,
            b.position.left_pct,
            b.position.width_pct,
            b.text.font_px,
            b.lines,
            t.title,
        ));
    }
    out
}

pub fn penalties(penalties: &[ApiPenaltyTask]) -> String {
    if penalties.is_empty() {
        return "(no penalty tasks)\n".to_string();
    }
    let mut out = String::new();
    for p in penalties {
        let id = p.my_task_id.as_ref().map(|id| id.to_string()).unwrap_or_default();
        let occurrence = if p.count_from > 0 {
            format!(" #{}", p.count_from)
        } else {
            String::new()
        };
        out.push_str(&format!(
            "{id:<8} {}{occurrence}: {}\n",
            p.name,
            p.reason.as_deref().unwrap_or("not placed"),
        ));
    }
    out
}

pub fn targets(records: &[ApiTask]) -> String {
    if records.is_empty() {
        return "(no tasks can be depended on yet)\n".to_string();
    }
    let mut out = String::new();
    for r in records {
        let id = r.task_id().map(|id| id.to_string()).unwrap_or_default();
        out.push_str(&format!(
            "{id:<8} {}  {}\n",
            r.start_date_time.as_deref().unwrap_or_default(),
            r.name
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use taskgrid_core::{layout_day, TaskId};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, h, m, 0).unwrap()
    }

    #[test]
    fn task_lines_use_the_display_zone() {
        let t = Task::new("3", "review", at(9, 0)).with_duration(30);
        let text = tasks(&[t], chrono_tz::Europe::Moscow);
        assert!(text.contains("2026-10-14 12:00 - 12:30"), "{text}");
        assert!(text.contains("review"));
    }

    #[test]
    fn day_shows_columns_and_parts() {
        let a = Task::new("a", "late", at(23, 0)).with_duration(120);
        let b = Task::new("b", "overlaps", at(23, 30)).with_duration(15);
        let date = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        let boxes = layout_day(&[a, b], date, 10).unwrap();
        let text = day(&boxes, date, Tz::UTC);
        assert!(text.starts_with("# 2026-10-14\n"));
        assert!(text.contains("col 1/2"));
        assert!(text.contains("col 2/2"));
        assert!(text.contains("[part 1]"));
    }

    #[test]
    fn empty_views_say_so() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        assert!(day(&[], date, Tz::UTC).contains("nothing scheduled"));
        assert_eq!(penalties(&[]), "(no penalty tasks)\n");
    }

    #[test]
    fn penalty_lines_carry_the_reason() {
        let p = ApiPenaltyTask {
            my_task_id: Some(TaskId::new("5")),
            name: "standup".into(),
            count_from: 2,
            reason: Some("no slot found in range".into()),
            ..ApiPenaltyTask::default()
        };
        assert_eq!(penalties(&[p]), "5        standup #2: no slot found in range\n");
    }
}
