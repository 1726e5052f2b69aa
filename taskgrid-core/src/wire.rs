//! Wire codec for the remote scheduling service.
//!
//! The service speaks camelCase JSON records with independent rule flags
//! (`ruleOneTask`, `ruleTwoTask`, `isRepit`). Everything is decoded into a
//! [`TaskDraft`] and goes through [`validate`] before the engine sees it.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constraint::{ConstraintKind, ConstraintRecord, OffsetOperator, RelativePosition, RepeatAnchor};
use crate::draft::{validate, TaskDraft};
use crate::error::{summarize, ValidationError};
use crate::penalty::PenaltyTask;
use crate::task::{ConstraintTag, Priority, Task, TaskId};
use crate::time::{truncate_to_minute, MINUTES_PER_DAY, MINUTES_PER_HOUR};

/// Placed-view duration when the service sends neither a duration nor an end.
pub const DEFAULT_DURATION_MINUTES: u32 = 60;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
    #[error("invalid duration '{0}'")]
    Duration(String),

    #[error("invalid dependency offset '{0}'")]
    Offset(String),

    #[error("invalid instant '{input}': {reason}")]
    Instant { input: String, reason: String },

    #[error("unknown {field} code {code}")]
    Code { field: &'static str, code: i64 },

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("{}", summarize(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

// ---------------------------------------------------------------------------
// Scalar codecs
// ---------------------------------------------------------------------------

/// Parse `HH:MM:SS` (hours may exceed 24), `D.HH:MM:SS`, or ISO-8601 `P1DT2H30M`
/// into whole minutes. Seconds are dropped.
pub fn parse_duration(input: &str) -> Result<u32, WireError> {
    let input = input.trim();
    let clock_re = Regex::new(r"^(?:(\d+)\.)?(\d+):(\d{1,2}):(\d{1,2})(?:\.\d+)?$")?;
    let iso_re = Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$")?;
    let err = || WireError::Duration(input.to_string());

    if let Some(caps) = clock_re.captures(input) {
        let days = number(caps.get(1).map(|m| m.as_str()))?;
        let hours = number(caps.get(2).map(|m| m.as_str()))?;
        let minutes = number(caps.get(3).map(|m| m.as_str()))?;
        let seconds = number(caps.get(4).map(|m| m.as_str()))?;
        if minutes >= 60 || seconds >= 60 {
            return Err(err());
        }
        return total_minutes(days, hours, minutes).ok_or_else(err);
    }

    if let Some(caps) = iso_re.captures(input) {
        if input == "P" || input.ends_with('T') {
            return Err(err());
        }
        let days = number(caps.get(1).map(|m| m.as_str()))?;
        let hours = number(caps.get(2).map(|m| m.as_str()))?;
        let minutes = number(caps.get(3).map(|m| m.as_str()))?;
        return total_minutes(days, hours, minutes).ok_or_else(err);
    }

    Err(err())
}

fn number(capture: Option<&str>) -> Result<u64, WireError> {
    match capture {
        None => Ok(0),
        Some(digits) => digits
            .parse()
            .map_err(|_| WireError::Duration(digits.to_string())),
    }
}

fn total_minutes(days: u64, hours: u64, minutes: u64) -> Option<u32> {
    let total = days
        .checked_mul(u64::from(MINUTES_PER_DAY))?
        .checked_add(hours.checked_mul(u64::from(MINUTES_PER_HOUR))?)?
        .checked_add(minutes)?;
    u32::try_from(total).ok()
}

/// `HH:MM:00`, hours counting total elapsed time.
pub fn format_duration(minutes: u32) -> String {
    format!("{:02}:{:02}:00", minutes / MINUTES_PER_HOUR, minutes % MINUTES_PER_HOUR)
}

/// Parse a dependency offset `DD:HH:MM:SS` into minutes.
pub fn parse_offset(input: &str) -> Result<u32, WireError> {
    let input = input.trim();
    let re = Regex::new(r"^(\d+):(\d{1,2}):(\d{1,2}):(\d{1,2})$")?;
    let err = || WireError::Offset(input.to_string());
    let caps = re.captures(input).ok_or_else(err)?;
    let field = |i: usize| -> Result<u64, WireError> {
        caps.get(i)
            .map_or(Ok(0), |m| m.as_str().parse().map_err(|_| err()))
    };
    let (days, hours, minutes, seconds) = (field(1)?, field(2)?, field(3)?, field(4)?);
    if hours >= 24 || minutes >= 60 || seconds >= 60 {
        return Err(err());
    }
    total_minutes(days, hours, minutes).ok_or_else(err)
}

pub fn format_offset(minutes: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}:00",
        minutes / MINUTES_PER_DAY,
        (minutes % MINUTES_PER_DAY) / MINUTES_PER_HOUR,
        minutes % MINUTES_PER_HOUR
    )
}

/// Parse an ISO-8601 instant. Explicit offsets are converted to UTC; values
/// without any marker are read as UTC wall clock.
pub fn parse_instant(input: &str) -> Result<DateTime<Utc>, WireError> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(truncate_to_minute(dt.with_timezone(&Utc)));
    }
    let naive = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M"))
        .map_err(|e| WireError::Instant {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
    Ok(truncate_to_minute(naive.and_utc()))
}

pub fn format_instant(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn opt_instant(value: Option<&str>) -> Result<Option<DateTime<Utc>>, WireError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_instant(s).map(Some),
    }
}

fn position_from_code(code: i64) -> Result<RelativePosition, WireError> {
    match code {
        0 => Ok(RelativePosition::Before),
        1 => Ok(RelativePosition::After),
        code => Err(WireError::Code {
            field: "timePositionRegardingTaskId",
            code,
        }),
    }
}

fn position_code(position: RelativePosition) -> i64 {
    match position {
        RelativePosition::Before => 0,
        RelativePosition::After => 1,
    }
}

fn operator_from_code(code: i64) -> Result<OffsetOperator, WireError> {
    match code {
        0 => Ok(OffsetOperator::Less),
        1 => Ok(OffsetOperator::Equal),
        2 => Ok(OffsetOperator::Greater),
        code => Err(WireError::Code {
            field: "relationRangeId",
            code,
        }),
    }
}

fn operator_code(operator: OffsetOperator) -> i64 {
    match operator {
        OffsetOperator::Less => 0,
        OffsetOperator::Equal => 1,
        OffsetOperator::Greater => 2,
    }
}

/// Ids travel as numbers when they are numeric and as strings otherwise.
mod opt_id {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::task::TaskId;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(id: &Option<TaskId>, serializer: S) -> Result<S::Ok, S::Error> {
        match id {
            None => serializer.serialize_none(),
            Some(id) => match id.as_str().parse::<u64>() {
                Ok(n) => n.serialize(serializer),
                Err(_) => id.as_str().serialize(serializer),
            },
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<TaskId>, D::Error> {
        Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
            Raw::Number(n) => TaskId::new(n.to_string()),
            Raw::Text(s) => TaskId::new(s),
        }))
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTask {
    #[serde(default, with = "opt_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,
    #[serde(default, with = "opt_id", skip_serializing_if = "Option::is_none")]
    pub my_task_id: Option<TaskId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub start_date_time: Option<String>,
    #[serde(default)]
    pub end_date_time: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,

    #[serde(default)]
    pub is_repit: bool,
    #[serde(default)]
    pub repit_time: Option<String>,
    #[serde(default)]
    pub is_repit_from_start: Option<bool>,
    #[serde(default)]
    pub count_repit: Option<i64>,
    #[serde(default)]
    pub start_date_time_repit: Option<String>,
    #[serde(default)]
    pub end_date_time_repit: Option<String>,

    #[serde(default)]
    pub rule_one_task: bool,
    #[serde(default)]
    pub start_date_time_rule_one_task: Option<String>,
    #[serde(default)]
    pub end_date_time_rule_one_task: Option<String>,

    #[serde(default)]
    pub rule_two_task: bool,
    #[serde(default)]
    pub time_position_regarding_task_id: Option<i64>,
    #[serde(default, with = "opt_id")]
    pub second_task_id: Option<TaskId>,
    #[serde(default)]
    pub relation_range_id: Option<i64>,
    #[serde(default)]
    pub date_time_range: Option<String>,

    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub complete_date_time: Option<String>,
}

impl ApiTask {
    /// The series id: `id` for stored records, `myTaskId` on placed views.
    pub fn task_id(&self) -> Option<&TaskId> {
        self.id.as_ref().or(self.my_task_id.as_ref())
    }
}

/// `GET /time-table/{user}` answers either a bare list or `{ "tasks": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimeTableResponse {
    List(Vec<ApiTask>),
    Wrapped { tasks: Vec<ApiTask> },
}

impl TimeTableResponse {
    pub fn into_tasks(self) -> Vec<ApiTask> {
        match self {
            TimeTableResponse::List(tasks) | TimeTableResponse::Wrapped { tasks } => tasks,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPenaltyTask {
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default, with = "opt_id")]
    pub my_task_id: Option<TaskId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub start_date_time: Option<String>,
    #[serde(default)]
    pub end_date_time: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub count_from: u32,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub complete_date_time: Option<String>,
    #[serde(default)]
    pub start_date_time_range: Option<String>,
    #[serde(default)]
    pub end_date_time_range: Option<String>,
    #[serde(default)]
    pub rule_one_task: bool,
    #[serde(default)]
    pub start_date_time_rule_one_task: Option<String>,
    #[serde(default)]
    pub end_date_time_rule_one_task: Option<String>,
    #[serde(default)]
    pub rule_two_task: bool,
    #[serde(default)]
    pub time_position_regarding_task_id: Option<i64>,
    #[serde(default, with = "opt_id")]
    pub second_task_id: Option<TaskId>,
    #[serde(default)]
    pub relation_range_id: Option<i64>,
    #[serde(default)]
    pub date_time_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Decode a stored record into an editor draft. Only codec failures are
/// reported here; semantic checks happen in [`validate`].
pub fn draft_from_api(api: &ApiTask) -> Result<TaskDraft, WireError> {
    let start = opt_instant(api.start_date_time.as_deref())?;
    let end = opt_instant(api.end_date_time.as_deref())?;
    let rule_task = api.rule_one_task || api.rule_two_task;

    let duration = match api.duration.as_deref().map(str::trim) {
        Some(d) if !d.is_empty() => Some(i64::from(parse_duration(d)?)),
        _ => match (start, end) {
            (Some(s), Some(e)) => Some((e - s).num_minutes()),
            _ => None,
        },
    };

    let mut draft = TaskDraft::new(api.name.clone());
    draft.id = api.task_id().cloned();
    draft.description = api.description.clone();
    draft.priority = api.priority;
    draft.duration_minutes = duration;
    draft.completed = api.is_complete;

    // For rule tasks the service reports the last placement in startDateTime.
    if rule_task {
        draft.placed_at = start;
    } else {
        draft.start = start;
    }
    if api.is_complete && draft.placed_at.is_none() {
        draft.placed_at = start;
    }

    if api.rule_one_task {
        draft.window = true;
        draft.window_start = opt_instant(api.start_date_time_rule_one_task.as_deref())?;
        draft.window_end = opt_instant(api.end_date_time_rule_one_task.as_deref())?;
    }

    if api.rule_two_task {
        draft.dependency = true;
        draft.dependency_target = api.second_task_id.clone();
        draft.dependency_position = api
            .time_position_regarding_task_id
            .map(position_from_code)
            .transpose()?;
        draft.dependency_operator = api.relation_range_id.map(operator_from_code).transpose()?;
        draft.dependency_offset_minutes = match api.date_time_range.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => Some(i64::from(parse_offset(r)?)),
            _ => None,
        };
    }

    if api.is_repit {
        draft.repeating = true;
        draft.repeat_gap_minutes = match api.repit_time.as_deref().map(str::trim) {
            Some(g) if !g.is_empty() => Some(i64::from(parse_duration(g)?)),
            _ => None,
        };
        draft.repeat_from_start = api.is_repit_from_start.unwrap_or(true);
        match api.count_repit {
            Some(count) if count > 0 => draft.repeat_count = Some(count),
            _ => draft.repeat_until = opt_instant(api.end_date_time_repit.as_deref())?,
        }
    }

    Ok(draft)
}

/// Decode and validate a stored record in one step.
pub fn classify(api: &ApiTask) -> Result<ConstraintRecord, WireError> {
    let draft = draft_from_api(api)?;
    validate(&draft).map_err(WireError::Validation)
}

/// Encode a validated record, recomputing every derived field.
pub fn api_from_record(record: &ConstraintRecord) -> ApiTask {
    let start = match record.constraint.primary() {
        ConstraintKind::Fixed { start } => Some(*start),
        _ => record.placed_at,
    };
    let duration = Duration::minutes(i64::from(record.duration_minutes));

    let mut api = ApiTask {
        id: (!record.id.is_pending()).then(|| record.id.clone()),
        name: record.title.clone(),
        description: record.description.clone(),
        priority: Some(i64::from(record.priority.value())),
        start_date_time: start.map(format_instant),
        end_date_time: start.map(|s| format_instant(s + duration)),
        duration: Some(format_duration(record.duration_minutes)),
        is_complete: record.completed,
        ..ApiTask::default()
    };

    match record.constraint.primary() {
        ConstraintKind::Window { start, end } => {
            api.rule_one_task = true;
            api.start_date_time_rule_one_task = Some(format_instant(*start));
            api.end_date_time_rule_one_task = Some(format_instant(*end));
        }
        ConstraintKind::Dependency(rule) => {
            api.rule_two_task = true;
            api.second_task_id = Some(rule.target.clone());
            api.time_position_regarding_task_id = Some(position_code(rule.position));
            api.relation_range_id = Some(operator_code(rule.operator));
            api.date_time_range = Some(format_offset(rule.offset_minutes));
        }
        _ => {}
    }

    if let Some(recurrence) = record.constraint.recurrence() {
        api.is_repit = true;
        api.repit_time = Some(format_duration(recurrence.gap_minutes));
        api.is_repit_from_start = Some(recurrence.anchor == RepeatAnchor::FromStart);
        // The stored bounds are the user's; the expansion cap only applies when placing.
        match record.series_span(u32::MAX) {
            Some((first, last_end)) => {
                api.start_date_time_repit = Some(format_instant(first));
                api.end_date_time_repit = Some(format_instant(last_end));
                // Only an explicit count is re-read as a count.
                if let Some(count) = recurrence.count {
                    api.count_repit = Some(i64::from(count));
                } else {
                    api.end_date_time_repit = recurrence.until.map(format_instant);
                }
            }
            None => {
                api.count_repit = recurrence.count.map(i64::from);
                api.end_date_time_repit = recurrence.until.map(format_instant);
            }
        }
    }

    api
}

/// Decode a placed view as the service sends it in the time table.
pub fn task_from_api(api: &ApiTask) -> Result<Task, WireError> {
    let id = api.task_id().cloned().ok_or(WireError::MissingField("id"))?;
    let start = opt_instant(api.start_date_time.as_deref())?.ok_or(WireError::MissingField("startDateTime"))?;
    let end = opt_instant(api.end_date_time.as_deref())?;

    let duration = match api.duration.as_deref().map(str::trim) {
        Some(d) if !d.is_empty() => parse_duration(d)?,
        _ => end
            .and_then(|e| u32::try_from((e - start).num_minutes()).ok())
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_DURATION_MINUTES),
    };

    let kind = if api.rule_one_task {
        ConstraintTag::Window
    } else if api.rule_two_task {
        ConstraintTag::Dependency
    } else {
        ConstraintTag::Fixed
    };

    let mut task = Task::new(id.clone(), api.name.clone(), start)
        .with_duration(duration)
        .with_priority(api.priority.map_or(Priority::DEFAULT, Priority::clamped))
        .with_completed(api.is_complete)
        .with_kind(kind);
    task.description = api.description.clone().filter(|d| !d.is_empty());
    task.recurring = api.is_repit;

    let source = api.my_task_id.clone().unwrap_or_else(|| id.clone());
    let index = id
        .as_str()
        .rsplit_once('#')
        .and_then(|(_, n)| n.parse::<u32>().ok());
    match index {
        Some(index) => task = task.with_occurrence(source, index),
        None => task.source_id = source,
    }
    Ok(task)
}

pub fn api_from_task(task: &Task) -> ApiTask {
    ApiTask {
        id: Some(task.id.clone()),
        my_task_id: Some(task.source_id.clone()),
        name: task.title.clone(),
        description: task.description.clone(),
        priority: Some(i64::from(task.priority.value())),
        start_date_time: Some(format_instant(task.start())),
        end_date_time: Some(format_instant(task.end())),
        duration: Some(format_duration(task.duration_minutes)),
        is_repit: task.recurring,
        rule_one_task: task.kind == ConstraintTag::Window,
        rule_two_task: task.kind == ConstraintTag::Dependency,
        is_complete: task.completed,
        ..ApiTask::default()
    }
}

pub fn api_from_penalty(penalty: &PenaltyTask) -> ApiPenaltyTask {
    let mut api = ApiPenaltyTask {
        my_task_id: Some(penalty.source_id.clone()),
        name: penalty.title.clone(),
        description: penalty.description.clone(),
        priority: Some(i64::from(penalty.priority.value())),
        duration: Some(format_duration(penalty.duration_minutes)),
        count_from: penalty.count_from,
        start_date_time_range: penalty.range_start.map(format_instant),
        end_date_time_range: penalty.range_end.map(format_instant),
        reason: Some(penalty.reason.to_string()),
        ..ApiPenaltyTask::default()
    };

    if let Some(start) = penalty.nominal_start {
        let end = start + Duration::minutes(i64::from(penalty.duration_minutes));
        api.start_date_time = Some(format_instant(start));
        api.end_date_time = Some(format_instant(end));
    }

    match penalty.constraint.as_ref().map(ConstraintKind::primary) {
        Some(ConstraintKind::Window { start, end }) => {
            api.rule_one_task = true;
            api.start_date_time_rule_one_task = Some(format_instant(*start));
            api.end_date_time_rule_one_task = Some(format_instant(*end));
        }
        Some(ConstraintKind::Dependency(rule)) => {
            api.rule_two_task = true;
            api.second_task_id = Some(rule.target.clone());
            api.time_position_regarding_task_id = Some(position_code(rule.position));
            api.relation_range_id = Some(operator_code(rule.operator));
            api.date_time_range = Some(format_offset(rule.offset_minutes));
        }
        _ => {}
    }

    api
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Recurrence;
    use crate::error::ValidationKind;
    use crate::penalty::PenaltyReason;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, d, h, m, 0).unwrap()
    }

    #[test]
    fn durations_in_clock_and_iso_forms() {
        assert_eq!(parse_duration("01:30:00").unwrap(), 90);
        assert_eq!(parse_duration("26:00:00").unwrap(), 26 * 60);
        assert_eq!(parse_duration("1.02:00:00").unwrap(), 26 * 60);
        assert_eq!(parse_duration("00:45:59").unwrap(), 45);
        assert_eq!(parse_duration("P1DT2H30M").unwrap(), 1440 + 150);
        assert_eq!(parse_duration("PT90M").unwrap(), 90);
        assert!(parse_duration("PT").is_err());
        assert!(parse_duration("01:75:00").is_err());
        assert!(parse_duration("ninety").is_err());
    }

    #[test]
    fn durations_encode_total_hours() {
        assert_eq!(format_duration(90), "01:30:00");
        assert_eq!(format_duration(26 * 60 + 5), "26:05:00");
        assert_eq!(parse_duration(&format_duration(3001)).unwrap(), 3001);
    }

    #[test]
    fn dependency_offsets() {
        assert_eq!(parse_offset("01:02:30:00").unwrap(), 1440 + 150);
        assert_eq!(format_offset(1440 + 150), "01:02:30:00");
        assert!(parse_offset("00:25:00:00").is_err());
        assert!(parse_offset("02:30:00").is_err());
    }

    #[test]
    fn instants_normalise_to_utc() {
        assert_eq!(parse_instant("2026-10-14T23:30:00Z").unwrap(), at(14, 23, 30));
        assert_eq!(parse_instant("2026-10-15T02:30:00+03:00").unwrap(), at(14, 23, 30));
        assert_eq!(parse_instant("2026-10-14T23:30:00").unwrap(), at(14, 23, 30));
        assert_eq!(parse_instant("2026-10-14T23:30").unwrap(), at(14, 23, 30));
        assert_eq!(format_instant(at(14, 23, 30)), "2026-10-14T23:30:00Z");
        assert!(parse_instant("yesterday").is_err());
    }

    #[test]
    fn ids_accept_numbers_and_strings() {
        let api: ApiTask = serde_json::from_str(r#"{"id": 42, "name": "a", "secondTaskId": "7"}"#).unwrap();
        assert_eq!(api.id, Some(TaskId::new("42")));
        assert_eq!(api.second_task_id, Some(TaskId::new("7")));
        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["secondTaskId"], 7);
    }

    #[test]
    fn time_table_accepts_both_shapes() {
        let list: TimeTableResponse = serde_json::from_str(r#"[{"id": 1, "name": "a"}]"#).unwrap();
        let wrapped: TimeTableResponse = serde_json::from_str(r#"{"tasks": [{"id": 1, "name": "a"}]}"#).unwrap();
        assert_eq!(list.into_tasks().len(), 1);
        assert_eq!(wrapped.into_tasks().len(), 1);
    }

    #[test]
    fn classify_fixed_record() {
        let api = ApiTask {
            id: Some(TaskId::new("5")),
            name: "Dentist".into(),
            priority: Some(2),
            start_date_time: Some("2026-10-14T09:00:00Z".into()),
            duration: Some("00:45:00".into()),
            ..ApiTask::default()
        };
        let rec = classify(&api).unwrap();
        assert_eq!(rec.id.as_str(), "5");
        assert_eq!(rec.constraint, ConstraintKind::Fixed { start: at(14, 9, 0) });
        assert_eq!(rec.duration_minutes, 45);
    }

    #[test]
    fn classify_rejects_both_rules() {
        let api = ApiTask {
            id: Some(TaskId::new("5")),
            name: "x".into(),
            duration: Some("00:30:00".into()),
            rule_one_task: true,
            start_date_time_rule_one_task: Some("2026-10-14T09:00:00Z".into()),
            end_date_time_rule_one_task: Some("2026-10-14T12:00:00Z".into()),
            rule_two_task: true,
            second_task_id: Some(TaskId::new("1")),
            time_position_regarding_task_id: Some(1),
            relation_range_id: Some(2),
            date_time_range: Some("00:00:10:00".into()),
            ..ApiTask::default()
        };
        match classify(&api) {
            Err(WireError::Validation(errs)) => {
                assert_eq!(errs[0].kind, ValidationKind::ConflictingConstraints);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn rule_task_start_is_a_placement_not_a_constraint() {
        let api = ApiTask {
            id: Some(TaskId::new("8")),
            name: "read".into(),
            duration: Some("01:00:00".into()),
            start_date_time: Some("2026-10-14T10:00:00Z".into()),
            rule_one_task: true,
            start_date_time_rule_one_task: Some("2026-10-14T09:00:00Z".into()),
            end_date_time_rule_one_task: Some("2026-10-14T12:00:00Z".into()),
            ..ApiTask::default()
        };
        let rec = classify(&api).unwrap();
        assert_eq!(rec.placed_at, Some(at(14, 10, 0)));
        assert!(matches!(rec.constraint, ConstraintKind::Window { .. }));
    }

    #[test]
    fn bad_codes_are_wire_errors() {
        let api = ApiTask {
            name: "x".into(),
            rule_two_task: true,
            time_position_regarding_task_id: Some(4),
            ..ApiTask::default()
        };
        assert_eq!(
            draft_from_api(&api).unwrap_err(),
            WireError::Code {
                field: "timePositionRegardingTaskId",
                code: 4
            }
        );
    }

    #[test]
    fn recurring_record_recomputes_series_span() {
        let rec = ConstraintRecord {
            id: TaskId::new("3"),
            title: "standup".into(),
            description: None,
            priority: Priority::DEFAULT,
            duration_minutes: 30,
            completed: false,
            constraint: ConstraintKind::Recurring {
                base: Box::new(ConstraintKind::Fixed { start: at(12, 9, 0) }),
                recurrence: Recurrence {
                    gap_minutes: 1440,
                    anchor: RepeatAnchor::FromStart,
                    count: Some(5),
                    until: None,
                },
            },
            placed_at: None,
        };
        let api = api_from_record(&rec);
        assert!(api.is_repit);
        assert_eq!(api.repit_time.as_deref(), Some("24:00:00"));
        assert_eq!(api.count_repit, Some(5));
        assert_eq!(api.start_date_time_repit.as_deref(), Some("2026-10-12T09:00:00Z"));
        assert_eq!(api.end_date_time_repit.as_deref(), Some("2026-10-16T09:30:00Z"));
        assert_eq!(api.end_date_time.as_deref(), Some("2026-10-12T09:30:00Z"));
        assert_eq!(classify(&api).unwrap(), rec);
    }

    #[test]
    fn long_series_count_is_stored_verbatim() {
        let rec = ConstraintRecord {
            id: TaskId::new("4"),
            title: "water plants".into(),
            description: None,
            priority: Priority::DEFAULT,
            duration_minutes: 15,
            completed: false,
            constraint: ConstraintKind::Recurring {
                base: Box::new(ConstraintKind::Fixed { start: at(12, 8, 0) }),
                recurrence: Recurrence {
                    gap_minutes: 1440,
                    anchor: RepeatAnchor::FromStart,
                    count: Some(1000),
                    until: None,
                },
            },
            placed_at: None,
        };
        let api = api_from_record(&rec);
        assert_eq!(api.count_repit, Some(1000));
        // 999 days after the first occurrence, plus its 15 minutes.
        let last = at(12, 8, 15) + Duration::days(999);
        assert_eq!(api.end_date_time_repit, Some(format_instant(last)));
        assert_eq!(classify(&api).unwrap(), rec);
    }

    #[test]
    fn dependency_record_encodes_codes() {
        let draft = TaskDraft::new("follow up")
            .with_duration(30)
            .depends_on("1", RelativePosition::Before, OffsetOperator::Less, 90);
        let rec = validate(&draft).unwrap().with_id(TaskId::new("2"));
        let api = api_from_record(&rec);
        assert_eq!(api.time_position_regarding_task_id, Some(0));
        assert_eq!(api.relation_range_id, Some(0));
        assert_eq!(api.date_time_range.as_deref(), Some("00:01:30:00"));
        assert!(api.start_date_time.is_none());
        assert_eq!(classify(&api).unwrap(), rec);
    }

    #[test]
    fn placed_view_round_trip_keeps_occurrence() {
        let task = Task::new("3#2", "standup", at(14, 9, 0))
            .with_duration(30)
            .with_occurrence(TaskId::new("3"), 2);
        let back = task_from_api(&api_from_task(&task)).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn placed_view_defaults_duration() {
        let api = ApiTask {
            id: Some(TaskId::new("1")),
            name: "a".into(),
            start_date_time: Some("2026-10-14T09:00:00Z".into()),
            ..ApiTask::default()
        };
        assert_eq!(task_from_api(&api).unwrap().duration_minutes, DEFAULT_DURATION_MINUTES);
    }

    #[test]
    fn penalty_projection_carries_reason_and_range() {
        let rec = validate(&TaskDraft::new("w").with_duration(30).in_window(at(14, 9, 0), at(14, 12, 0)))
            .unwrap()
            .with_id(TaskId::new("4"));
        let penalty = PenaltyTask::for_occurrence(&rec, rec.id.clone(), None, PenaltyReason::NoSlotInRange)
            .with_range(Some(at(14, 9, 0)), Some(at(14, 12, 0)));
        let api = api_from_penalty(&penalty);
        assert_eq!(api.reason.as_deref(), Some("no slot found in range"));
        assert!(api.rule_one_task);
        assert_eq!(api.start_date_time_range.as_deref(), Some("2026-10-14T09:00:00Z"));
        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json["myTaskId"], 4);
        assert_eq!(json["countFrom"], 0);
    }
}
