//! Rebuild engine: turns a user's constraint records into a conflict-free
//! placement plus the list of occurrences that could not be placed.
//!
//! Placement is done in three passes over one shared timeline:
//!
//! 1. fixed occurrences, ordered by (priority, start, id);
//! 2. window occurrences, ordered by (priority, window end, window start, id),
//!    each at the earliest free slot;
//! 3. dependency occurrences, with every referenced task resolved first.
//!
//! The earliest-slot search only tries the range start and the end of every
//! busy interval, which is enough to find the first fit on a minute grid.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constraint::{ConstraintKind, ConstraintRecord, DependencyRule};
use crate::error::SchedulerError;
use crate::penalty::{PenaltyReason, PenaltyTask};
use crate::task::{Task, TaskId};
use crate::time::{intervals_overlap, midnight_utc, week_start};

/// Half-open `[start, end)` range a rebuild is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl RebuildWindow {
    /// `None` unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Whole weeks around `now`, anchored to the Monday of its week.
    pub fn around(now: DateTime<Utc>, weeks_before: u32, weeks_after: u32) -> Self {
        let monday = week_start(now.date_naive());
        let start = midnight_utc(monday - Duration::days(7 * i64::from(weeks_before)));
        let end = midnight_utc(monday + Duration::days(7 * (i64::from(weeks_after) + 1)));
        Self { start, end }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        intervals_overlap(self.start, self.end, start, end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerOptions {
    /// Upper bound on occurrences of one series placed in a single rebuild.
    pub max_occurrences: u32,
    /// Cooperative time budget for one rebuild.
    pub deadline_ms: Option<u64>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_occurrences: 500,
            deadline_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildOutcome {
    /// Sorted by (start, id).
    pub placed: Vec<Task>,
    /// Sorted by (source id, occurrence).
    pub penalties: Vec<PenaltyTask>,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    options: SchedulerOptions,
}

impl Scheduler {
    pub fn new(options: SchedulerOptions) -> Self {
        Self { options }
    }

    pub fn with_time_budget(mut self, budget: StdDuration) -> Self {
        self.options.deadline_ms = Some(budget.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn rebuild(
        &self,
        records: &[ConstraintRecord],
        window: &RebuildWindow,
    ) -> Result<RebuildOutcome, SchedulerError> {
        let mut run = Run::new(self, window, records)?;
        run.tick()?;
        run.completed();
        run.fixed_phase()?;
        run.window_phase()?;
        run.dependency_phase()?;
        let outcome = run.finish();
        info!(
            window_start = %window.start,
            window_end = %window.end,
            placed = outcome.placed.len(),
            penalties = outcome.penalties.len(),
            "rebuild finished"
        );
        Ok(outcome)
    }
}

#[derive(Debug, Clone)]
struct Busy {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    id: TaskId,
}

/// Busy intervals of placed, non-completed occurrences, sorted by start.
#[derive(Debug, Default)]
struct Timeline {
    busy: Vec<Busy>,
}

impl Timeline {
    fn first_conflict(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<&Busy> {
        self.busy
            .iter()
            .take_while(|b| b.start < end)
            .find(|b| intervals_overlap(b.start, b.end, start, end))
    }

    fn insert(&mut self, start: DateTime<Utc>, end: DateTime<Utc>, id: TaskId) {
        let at = self.busy.partition_point(|b| b.start <= start);
        self.busy.insert(at, Busy { start, end, id });
    }

    /// Earliest start in `[lo, hi]` where `duration` fits without a conflict.
    fn earliest_fit(&self, lo: DateTime<Utc>, hi: DateTime<Utc>, duration: Duration) -> Option<DateTime<Utc>> {
        let mut candidates: Vec<DateTime<Utc>> = self
            .busy
            .iter()
            .map(|b| b.end)
            .filter(|end| *end > lo && *end <= hi)
            .collect();
        candidates.push(lo);
        candidates.sort();
        candidates.dedup();
        candidates
            .into_iter()
            .find(|start| self.first_conflict(*start, *start + duration).is_none())
    }
}

/// What a dependent task can anchor on.
#[derive(Debug, Clone)]
enum Anchor {
    Placed { start: DateTime<Utc>, end: DateTime<Utc> },
    Failed(String),
}

struct Occurrence<'a> {
    record: &'a ConstraintRecord,
    id: TaskId,
    index: Option<u32>,
    shift: Duration,
}

impl Occurrence<'_> {
    fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.record.duration_minutes))
    }

    fn penalty(&self, reason: PenaltyReason) -> PenaltyTask {
        PenaltyTask::for_occurrence(self.record, self.id.clone(), self.index, reason)
    }
}

struct Run<'a> {
    options: SchedulerOptions,
    window: RebuildWindow,
    clock: Instant,
    records: Vec<&'a ConstraintRecord>,
    by_id: BTreeMap<TaskId, &'a ConstraintRecord>,
    cycles: BTreeSet<TaskId>,
    anchors: BTreeMap<TaskId, Anchor>,
    timeline: Timeline,
    placed: Vec<Task>,
    penalties: Vec<PenaltyTask>,
}

impl<'a> Run<'a> {
    fn new(
        scheduler: &Scheduler,
        window: &RebuildWindow,
        records: &'a [ConstraintRecord],
    ) -> Result<Self, SchedulerError> {
        let mut by_id = BTreeMap::new();
        for record in records {
            if record.id.is_pending() {
                return Err(SchedulerError::InvalidConstraintSet {
                    task_id: record.id.clone(),
                    reason: format!("record '{}' has no id", record.title),
                });
            }
            if by_id.insert(record.id.clone(), record).is_some() {
                return Err(SchedulerError::InvalidConstraintSet {
                    task_id: record.id.clone(),
                    reason: "duplicate task id".into(),
                });
            }
        }

        let cycles = dependency_cycles(&by_id);
        Ok(Self {
            options: scheduler.options,
            window: *window,
            clock: Instant::now(),
            records: by_id.values().copied().collect(),
            by_id,
            cycles,
            anchors: BTreeMap::new(),
            timeline: Timeline::default(),
            placed: Vec::new(),
            penalties: Vec::new(),
        })
    }

    fn tick(&self) -> Result<(), SchedulerError> {
        if let Some(budget_ms) = self.options.deadline_ms {
            if self.clock.elapsed() >= StdDuration::from_millis(budget_ms) {
                return Err(SchedulerError::Timeout { budget_ms });
            }
        }
        Ok(())
    }

    fn active(&self) -> impl Iterator<Item = &'a ConstraintRecord> + '_ {
        self.records.iter().copied().filter(|r| !r.completed)
    }

    /// Completed tasks keep being drawn at their last slot and anchor dependents,
    /// but never occupy the timeline.
    fn completed(&mut self) {
        let done: Vec<&ConstraintRecord> = self.records.iter().copied().filter(|r| r.completed).collect();
        for record in done {
            let Some(start) = record.completed_slot() else {
                self.anchors.insert(
                    record.id.clone(),
                    Anchor::Failed("completed without a known placement".into()),
                );
                continue;
            };
            let task = record.placed(record.id.clone(), None, start);
            let end = task.end();
            self.anchors.insert(record.id.clone(), Anchor::Placed { start, end });
            if self.window.intersects(start, end) {
                self.placed.push(task);
            }
        }
    }

    /// Occurrences of `record` that can touch the rebuild window.
    ///
    /// Expansion starts at the first occurrence that can reach the window, so
    /// long-running series are not exhausted before it. At most
    /// `max_occurrences` are produced per rebuild; the first one beyond the
    /// cap is reported as a penalty.
    fn occurrences(&mut self, record: &'a ConstraintRecord) -> Vec<Occurrence<'a>> {
        let Some(recurrence) = record.constraint.recurrence() else {
            return vec![Occurrence {
                record,
                id: record.id.clone(),
                index: None,
                shift: Duration::zero(),
            }];
        };
        let occurrence = |index: u32| Occurrence {
            record,
            id: record.id.occurrence(index),
            index: Some(index),
            shift: recurrence.shift(record.duration_minutes, index),
        };

        let limit = self.options.max_occurrences;
        let step = recurrence.step_minutes(record.duration_minutes);
        let mut count = recurrence.count.unwrap_or(u32::MAX);
        if step <= 0 {
            count = count.min(1);
        }
        let mut out = Vec::new();

        // Dependency series only get their times once the target is placed.
        let Some(first) = record.constraint.nominal_start() else {
            for index in 0..count {
                if out.len() as u32 >= limit {
                    self.over_limit(occurrence(index));
                    break;
                }
                out.push(occurrence(index));
            }
            return out;
        };

        let reach = match record.constraint.primary() {
            ConstraintKind::Window { start, end } => (*end - *start).num_minutes(),
            _ => i64::from(record.duration_minutes),
        };
        let behind = (self.window.start - first).num_minutes() - reach;
        let skip = if behind <= 0 || step <= 0 { 0 } else { behind / step };
        let Ok(skip) = u32::try_from(skip) else {
            return out;
        };

        for index in skip..count {
            let occ = occurrence(index);
            let start = first + occ.shift;
            if recurrence.until.is_some_and(|until| start > until) || start >= self.window.end {
                break;
            }
            if start + Duration::minutes(reach) <= self.window.start {
                continue;
            }
            if out.len() as u32 >= limit {
                self.over_limit(occ);
                break;
            }
            out.push(occ);
        }
        out
    }

    fn over_limit(&mut self, occ: Occurrence<'a>) {
        let reason = PenaltyReason::InvalidConstraint {
            message: format!(
                "more than {} occurrences in one rebuild; later occurrences are not placed",
                self.options.max_occurrences
            ),
        };
        self.penalize(occ.penalty(reason));
    }

    fn place(&mut self, occ: &Occurrence<'a>, start: DateTime<Utc>) -> Anchor {
        let task = occ.record.placed(occ.id.clone(), occ.index, start);
        let end = task.end();
        self.timeline.insert(start, end, occ.id.clone());
        debug!(task = %occ.id, %start, %end, "placed");
        self.placed.push(task);
        Anchor::Placed { start, end }
    }

    fn penalize(&mut self, penalty: PenaltyTask) -> Anchor {
        warn!(task = %penalty.id, reason = %penalty.reason, "task not placed");
        let cause = penalty.reason.to_string();
        self.penalties.push(penalty);
        Anchor::Failed(cause)
    }

    fn fixed_phase(&mut self) -> Result<(), SchedulerError> {
        let mut queue = Vec::new();
        let active: Vec<&'a ConstraintRecord> = self.active().collect();
        for record in active {
            let ConstraintKind::Fixed { start } = record.constraint.primary() else {
                continue;
            };
            let recurring = record.constraint.is_recurring();
            for occ in self.occurrences(record) {
                let at = *start + occ.shift;
                if self.window.intersects(at, at + occ.duration()) {
                    queue.push((occ, at));
                } else if !recurring {
                    // Out of scope for this rebuild, but its time is still known.
                    let end = at + occ.duration();
                    self.anchors.insert(record.id.clone(), Anchor::Placed { start: at, end });
                }
            }
        }
        queue.sort_by(|(a, a_start), (b, b_start)| {
            (a.record.priority, a_start, &a.id).cmp(&(b.record.priority, b_start, &b.id))
        });

        for (occ, start) in queue {
            self.tick()?;
            let end = start + occ.duration();
            let anchor = match self.timeline.first_conflict(start, end) {
                Some(blocker) => {
                    let reason = PenaltyReason::Conflict {
                        with: blocker.id.clone(),
                    };
                    self.penalize(occ.penalty(reason).with_nominal_start(start))
                }
                None => self.place(&occ, start),
            };
            if occ.index.is_none() {
                self.anchors.insert(occ.record.id.clone(), anchor);
            }
        }
        Ok(())
    }

    fn window_phase(&mut self) -> Result<(), SchedulerError> {
        let mut queue = Vec::new();
        let active: Vec<&'a ConstraintRecord> = self.active().collect();
        for record in active {
            let ConstraintKind::Window { start, end } = record.constraint.primary() else {
                continue;
            };
            let recurring = record.constraint.is_recurring();
            for occ in self.occurrences(record) {
                let (from, to) = (*start + occ.shift, *end + occ.shift);
                if self.window.intersects(from, to) {
                    queue.push((occ, from, to));
                } else if !recurring {
                    self.anchors.insert(
                        record.id.clone(),
                        Anchor::Failed("outside the rebuild window".into()),
                    );
                }
            }
        }
        queue.sort_by(|(a, a_from, a_to), (b, b_from, b_to)| {
            (a.record.priority, a_to, a_from, &a.id).cmp(&(b.record.priority, b_to, b_from, &b.id))
        });

        for (occ, from, to) in queue {
            self.tick()?;
            let duration = occ.duration();
            let lo = from.max(self.window.start);
            let hi = to.min(self.window.end) - duration;
            let slot = if lo <= hi {
                self.timeline.earliest_fit(lo, hi, duration)
            } else {
                None
            };
            let anchor = match slot {
                Some(start) => self.place(&occ, start),
                None => {
                    let penalty = occ
                        .penalty(PenaltyReason::NoSlotInRange)
                        .with_range(Some(from), Some(to));
                    self.penalize(penalty)
                }
            };
            if occ.index.is_none() {
                self.anchors.insert(occ.record.id.clone(), anchor);
            }
        }
        Ok(())
    }

    fn dependency_phase(&mut self) -> Result<(), SchedulerError> {
        let mut queue: Vec<&'a ConstraintRecord> = self
            .active()
            .filter(|r| r.constraint.dependency().is_some())
            .collect();
        queue.sort_by(|a, b| (a.priority, &a.id).cmp(&(b.priority, &b.id)));

        for record in queue {
            self.tick()?;
            if record.constraint.is_recurring() {
                for occ in self.occurrences(record) {
                    self.tick()?;
                    if self.place_dependent(&occ)?.is_none() {
                        break;
                    }
                }
            } else {
                self.resolve(&record.id)?;
            }
        }
        Ok(())
    }

    /// Placement of a non-recurring task, placing it first when it is a
    /// dependency that has not been handled yet.
    fn resolve(&mut self, id: &TaskId) -> Result<Anchor, SchedulerError> {
        if let Some(anchor) = self.anchors.get(id) {
            return Ok(anchor.clone());
        }
        let Some(record) = self.by_id.get(id).copied() else {
            return Ok(Anchor::Failed("task not found".into()));
        };
        if record.constraint.is_recurring() {
            return Ok(Anchor::Failed("recurring task".into()));
        }
        if record.constraint.dependency().is_none() {
            return Ok(Anchor::Failed("outside the rebuild window".into()));
        }

        let occ = Occurrence {
            record,
            id: record.id.clone(),
            index: None,
            shift: Duration::zero(),
        };
        let anchor = self
            .place_dependent(&occ)?
            .unwrap_or_else(|| Anchor::Failed("past the recurrence end".into()));
        self.anchors.insert(id.clone(), anchor.clone());
        Ok(anchor)
    }

    /// `None` once a recurring occurrence would start after the period end.
    fn place_dependent(&mut self, occ: &Occurrence<'a>) -> Result<Option<Anchor>, SchedulerError> {
        let Some(rule) = occ.record.constraint.dependency() else {
            return Ok(Some(Anchor::Failed("not a dependency task".into())));
        };

        if self.cycles.contains(&occ.record.id) {
            let reason = PenaltyReason::DependencyCycle {
                dependency: rule.target.clone(),
            };
            return Ok(Some(self.penalize(occ.penalty(reason))));
        }

        let target_recurring = self
            .by_id
            .get(&rule.target)
            .is_some_and(|t| t.constraint.is_recurring());
        if target_recurring {
            let reason = PenaltyReason::InvalidConstraint {
                message: format!("dependency target {} is a recurring task", rule.target),
            };
            return Ok(Some(self.penalize(occ.penalty(reason))));
        }

        let (target_start, target_end) = match self.resolve(&rule.target)? {
            Anchor::Placed { start, end } => (start, end),
            Anchor::Failed(cause) => {
                let reason = PenaltyReason::DependencyUnresolved {
                    dependency: rule.target.clone(),
                    cause,
                };
                return Ok(Some(self.penalize(occ.penalty(reason))));
            }
        };

        Ok(self.place_in_dependency_range(occ, rule, target_start, target_end))
    }

    fn place_in_dependency_range(
        &mut self,
        occ: &Occurrence<'a>,
        rule: &DependencyRule,
        target_start: DateTime<Utc>,
        target_end: DateTime<Utc>,
    ) -> Option<Anchor> {
        let (lo, hi) = rule.start_range(target_start, target_end);
        let (lo, hi) = (lo.map(|t| t + occ.shift), hi.map(|t| t + occ.shift));
        let duration = occ.duration();

        let until = occ.record.constraint.recurrence().and_then(|r| r.until);
        let nominal = lo.or(hi).unwrap_or(target_end);
        if until.is_some_and(|until| nominal > until) {
            return None;
        }

        if hi.is_some_and(|h| h < self.window.start) || lo.is_some_and(|l| l >= self.window.end) {
            // Out of scope for this rebuild; dependents still anchor on the nominal slot.
            debug!(task = %occ.id, %nominal, "dependency range outside the rebuild window");
            return Some(Anchor::Placed {
                start: nominal,
                end: nominal + duration,
            });
        }

        let latest = self.window.end - duration;
        let from = lo.map_or(self.window.start, |l| l.max(self.window.start));
        let to = hi.map_or(latest, |h| h.min(latest));
        let slot = if from <= to {
            self.timeline.earliest_fit(from, to, duration)
        } else {
            None
        };
        Some(match slot {
            Some(start) => self.place(occ, start),
            None => {
                let penalty = occ.penalty(PenaltyReason::NoSlotInRange).with_range(lo, hi);
                self.penalize(penalty)
            }
        })
    }

    fn finish(mut self) -> RebuildOutcome {
        self.placed
            .sort_by(|a, b| (a.start(), &a.id).cmp(&(b.start(), &b.id)));
        self.penalties
            .sort_by(|a, b| (&a.source_id, a.count_from).cmp(&(&b.source_id, b.count_from)));
        RebuildOutcome {
            placed: self.placed,
            penalties: self.penalties,
        }
    }
}

/// Ids of active, non-recurring dependency tasks whose reference chain loops
/// back to themselves.
fn dependency_cycles(by_id: &BTreeMap<TaskId, &ConstraintRecord>) -> BTreeSet<TaskId> {
    let mut cycles = BTreeSet::new();
    for id in by_id.keys() {
        let mut current = next_target(by_id, id);
        for _ in 0..by_id.len() {
            match current {
                Some(step) if step == id => {
                    cycles.insert(id.clone());
                    break;
                }
                Some(step) => current = next_target(by_id, step),
                None => break,
            }
        }
    }
    cycles
}

fn next_target<'m>(by_id: &'m BTreeMap<TaskId, &'m ConstraintRecord>, id: &TaskId) -> Option<&'m TaskId> {
    let record = by_id.get(id)?;
    if record.completed || record.constraint.is_recurring() {
        return None;
    }
    record.constraint.dependency().map(|rule| &rule.target)
}
