//! Engine-backed backend that keeps each user's book in memory and,
//! optionally, in a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::backend::{BackendError, ScheduleBackend};
use crate::constraint::ConstraintRecord;
use crate::error::SchedulerError;
use crate::penalty::PenaltyTask;
use crate::scheduler::{RebuildOutcome, RebuildWindow, Scheduler, SchedulerOptions};
use crate::task::{Priority, Task, TaskId, UserId};
use crate::wire::{self, ApiPenaltyTask, ApiTask};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Book {
    next_id: u64,
    records: Vec<ApiTask>,
    #[serde(default)]
    outcome: RebuildOutcome,
}

impl Book {
    fn position(&self, id: &TaskId) -> Option<usize> {
        self.records.iter().position(|r| r.task_id() == Some(id))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    users: BTreeMap<UserId, Book>,
}

pub struct LocalBackend {
    state: RwLock<Snapshot>,
    path: Option<PathBuf>,
    scheduler: Scheduler,
}

impl LocalBackend {
    pub fn in_memory(options: SchedulerOptions) -> Self {
        Self {
            state: RwLock::new(Snapshot::default()),
            path: None,
            scheduler: Scheduler::new(options),
        }
    }

    /// Load the store at `path`, starting empty when the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>, options: SchedulerOptions) -> Result<Self, BackendError> {
        let path = path.into();
        let snapshot = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| BackendError::Storage(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(BackendError::Storage(format!("{}: {e}", path.display()))),
        };
        debug!(path = %path.display(), users = snapshot.users.len(), "opened local store");
        Ok(Self {
            state: RwLock::new(snapshot),
            path: Some(path),
            scheduler: Scheduler::new(options),
        })
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<(), BackendError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let storage = |e: std::io::Error| BackendError::Storage(format!("{}: {e}", path.display()));
        let text = serde_json::to_string_pretty(snapshot).map_err(|e| BackendError::Storage(e.to_string()))?;

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(storage)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text).await.map_err(storage)?;
        tokio::fs::rename(&tmp, path).await.map_err(storage)?;
        Ok(())
    }

    /// Swap in `user`'s new book, keeping the old one if it cannot be stored.
    async fn commit(&self, state: &mut Snapshot, user: UserId, book: Book) -> Result<(), BackendError> {
        let previous = state.users.insert(user, book);
        if let Err(e) = self.persist(state).await {
            match previous {
                Some(old) => state.users.insert(user, old),
                None => state.users.remove(&user),
            };
            return Err(e);
        }
        Ok(())
    }

}

impl Snapshot {
    /// A working copy of `user`'s book and the position of `id` in it.
    fn book_with(&self, user: UserId, id: &TaskId) -> Result<(Book, usize), BackendError> {
        let book = self
            .users
            .get(&user)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(id.clone()))?;
        let at = book.position(id).ok_or_else(|| BackendError::NotFound(id.clone()))?;
        Ok((book, at))
    }
}

/// Penalty for a stored record the engine cannot classify.
fn rejected(api: &ApiTask, error: &wire::WireError) -> PenaltyTask {
    let duration = api
        .duration
        .as_deref()
        .and_then(|d| wire::parse_duration(d).ok())
        .unwrap_or(0);
    PenaltyTask::rejected(
        api.task_id().cloned().unwrap_or_else(TaskId::pending),
        api.name.clone(),
        api.priority.map_or(Priority::DEFAULT, Priority::clamped),
        duration,
        error.to_string(),
    )
}

impl ScheduleBackend for LocalBackend {
    async fn list_tasks(&self, user: UserId) -> Result<Vec<Task>, BackendError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(&user)
            .map(|b| b.outcome.placed.clone())
            .unwrap_or_default())
    }

    async fn records(&self, user: UserId) -> Result<Vec<ApiTask>, BackendError> {
        let state = self.state.read().await;
        Ok(state.users.get(&user).map(|b| b.records.clone()).unwrap_or_default())
    }

    async fn penalty_tasks(&self, user: UserId) -> Result<Vec<ApiPenaltyTask>, BackendError> {
        let state = self.state.read().await;
        let penalties = state
            .users
            .get(&user)
            .map(|b| b.outcome.penalties.as_slice())
            .unwrap_or_default();
        Ok(penalties
            .iter()
            .map(|p| ApiPenaltyTask {
                user_id: Some(user.0),
                ..wire::api_from_penalty(p)
            })
            .collect())
    }

    async fn create_task(&self, user: UserId, record: &ConstraintRecord) -> Result<TaskId, BackendError> {
        let mut state = self.state.write().await;
        let mut book = state.users.get(&user).cloned().unwrap_or_default();
        book.next_id += 1;
        let id = TaskId::new(book.next_id.to_string());
        let stored = record.clone().with_id(id.clone());
        book.records.push(wire::api_from_record(&stored));
        self.commit(&mut state, user, book).await?;
        info!(%user, task = %id, "task created");
        Ok(id)
    }

    async fn update_task(&self, user: UserId, record: &ConstraintRecord) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        let (mut book, at) = state.book_with(user, &record.id)?;

        let mut api = wire::api_from_record(record);
        if api.is_complete {
            api.complete_date_time = book.records[at].complete_date_time.clone();
        }
        book.records[at] = api;
        self.commit(&mut state, user, book).await?;
        info!(%user, task = %record.id, "task updated");
        Ok(())
    }

    async fn delete_task(&self, user: UserId, id: &TaskId) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        let (mut book, at) = state.book_with(user, id)?;
        book.records.remove(at);
        self.commit(&mut state, user, book).await?;
        info!(%user, task = %id, "task deleted");
        Ok(())
    }

    /// Completing a recurring task completes the whole series. A recurring
    /// rule task is pinned to its earliest placed occurrence.
    async fn complete_task(&self, user: UserId, id: &TaskId) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        let (mut book, at) = state.book_with(user, id)?;

        // Rule tasks keep their last placement as the completed slot.
        let slot = book
            .outcome
            .placed
            .iter()
            .find(|t| t.source_id == *id)
            .map(|t| (t.start(), t.end()));
        let record = &mut book.records[at];
        record.is_complete = true;
        record.complete_date_time = Some(wire::format_instant(Utc::now()));
        if record.rule_one_task || record.rule_two_task {
            if let Some((start, end)) = slot {
                record.start_date_time = Some(wire::format_instant(start));
                record.end_date_time = Some(wire::format_instant(end));
            }
        }
        self.commit(&mut state, user, book).await?;
        info!(%user, task = %id, "task completed");
        Ok(())
    }

    async fn rebuild(&self, user: UserId, window: &RebuildWindow) -> Result<(), BackendError> {
        let stored = {
            let state = self.state.read().await;
            state.users.get(&user).map(|b| b.records.clone()).unwrap_or_default()
        };

        let mut records = Vec::with_capacity(stored.len());
        let mut rejects = Vec::new();
        for api in &stored {
            match wire::classify(api) {
                Ok(record) => records.push(record),
                Err(e) => rejects.push(rejected(api, &e)),
            }
        }

        let scheduler = self.scheduler.clone();
        let window = *window;
        let mut outcome = tokio::task::spawn_blocking(move || scheduler.rebuild(&records, &window))
            .await
            .map_err(|e| SchedulerError::Unavailable(e.to_string()))??;

        if !rejects.is_empty() {
            outcome.penalties.extend(rejects);
            outcome
                .penalties
                .sort_by(|a, b| (&a.source_id, a.count_from).cmp(&(&b.source_id, b.count_from)));
        }

        let mut state = self.state.write().await;
        let mut book = state.users.get(&user).cloned().unwrap_or_default();
        book.outcome = outcome;
        self.commit(&mut state, user, book).await
    }
}
