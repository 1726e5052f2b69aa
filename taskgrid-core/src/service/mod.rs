//! Calendar service: validated mutations, serialised per user, each followed
//! by exactly one rebuild.

pub mod backend;
pub mod local;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::draft::{validate, TaskDraft};
use crate::error::{summarize, SchedulerError, SplitError, ValidationError};
use crate::layout::{layout_day, LaidOutTask};
use crate::scheduler::RebuildWindow;
use crate::split::DEFAULT_MAX_SEGMENTS;
use crate::task::{Task, TaskId, UserId};
use crate::wire::{ApiPenaltyTask, ApiTask};

pub use backend::{BackendError, ScheduleBackend};
pub use local::LocalBackend;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("invalid task: {}", summarize(.0))]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Split(#[from] SplitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub weeks_before: u32,
    pub weeks_after: u32,
    pub rebuild_timeout_ms: u64,
    pub max_split_segments: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            weeks_before: 2,
            weeks_after: 2,
            rebuild_timeout_ms: 10_000,
            max_split_segments: DEFAULT_MAX_SEGMENTS,
        }
    }
}

/// How current the placement is after a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementStatus {
    Fresh,
    /// The mutation was stored but the rebuild failed; the previous placement stays.
    Stale(SchedulerError),
}

impl PlacementStatus {
    pub fn is_fresh(&self) -> bool {
        matches!(self, PlacementStatus::Fresh)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReport {
    pub task_id: TaskId,
    pub placement: PlacementStatus,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct CalendarService<B> {
    backend: Arc<B>,
    config: ServiceConfig,
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
    clock: Clock,
}

impl<B: ScheduleBackend> CalendarService<B> {
    pub fn new(backend: B, config: ServiceConfig) -> Self {
        Self::with_shared(Arc::new(backend), config)
    }

    pub fn with_shared(backend: Arc<B>, config: ServiceConfig) -> Self {
        Self {
            backend,
            config,
            locks: Mutex::new(HashMap::new()),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used to anchor rebuild windows.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Window every mutation-triggered rebuild covers.
    pub fn window(&self) -> RebuildWindow {
        RebuildWindow::around((self.clock)(), self.config.weeks_before, self.config.weeks_after)
    }

    async fn user_lock(&self, user: UserId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(user).or_default().clone()
        };
        lock.lock_owned().await
    }

    async fn rebuild_locked(&self, user: UserId, window: RebuildWindow) -> PlacementStatus {
        let budget = Duration::from_millis(self.config.rebuild_timeout_ms);
        let status = match tokio::time::timeout(budget, self.backend.rebuild(user, &window)).await {
            Ok(Ok(())) => PlacementStatus::Fresh,
            Ok(Err(BackendError::Scheduler(e))) => PlacementStatus::Stale(e),
            Ok(Err(e)) => PlacementStatus::Stale(SchedulerError::Unavailable(e.to_string())),
            Err(_) => PlacementStatus::Stale(SchedulerError::Timeout {
                budget_ms: self.config.rebuild_timeout_ms,
            }),
        };
        match &status {
            PlacementStatus::Fresh => info!(%user, "placement rebuilt"),
            PlacementStatus::Stale(e) => warn!(%user, error = %e, "placement is stale"),
        }
        status
    }

    pub async fn create(&self, user: UserId, draft: &TaskDraft) -> Result<MutationReport, ServiceError> {
        let record = validate(draft).map_err(ServiceError::Invalid)?;
        let _guard = self.user_lock(user).await;
        let task_id = self.backend.create_task(user, &record).await?;
        let placement = self.rebuild_locked(user, self.window()).await;
        Ok(MutationReport { task_id, placement })
    }

    pub async fn update(&self, user: UserId, draft: &TaskDraft) -> Result<MutationReport, ServiceError> {
        let mut errors = Vec::new();
        if draft.id.as_ref().is_none_or(TaskId::is_pending) {
            errors.push(ValidationError::missing("id"));
        }
        let record = match validate(draft) {
            Ok(record) if errors.is_empty() => record,
            Ok(_) => return Err(ServiceError::Invalid(errors)),
            Err(more) => {
                errors.extend(more);
                return Err(ServiceError::Invalid(errors));
            }
        };
        let _guard = self.user_lock(user).await;
        self.backend.update_task(user, &record).await?;
        let placement = self.rebuild_locked(user, self.window()).await;
        Ok(MutationReport {
            task_id: record.id,
            placement,
        })
    }

    pub async fn delete(&self, user: UserId, id: &TaskId) -> Result<MutationReport, ServiceError> {
        let _guard = self.user_lock(user).await;
        self.backend.delete_task(user, id).await?;
        let placement = self.rebuild_locked(user, self.window()).await;
        Ok(MutationReport {
            task_id: id.clone(),
            placement,
        })
    }

    pub async fn complete(&self, user: UserId, id: &TaskId) -> Result<MutationReport, ServiceError> {
        let _guard = self.user_lock(user).await;
        self.backend.complete_task(user, id).await?;
        let placement = self.rebuild_locked(user, self.window()).await;
        Ok(MutationReport {
            task_id: id.clone(),
            placement,
        })
    }

    /// Rebuild without a mutation, over the default window or an explicit one.
    pub async fn rebuild(&self, user: UserId, window: Option<RebuildWindow>) -> PlacementStatus {
        let _guard = self.user_lock(user).await;
        self.rebuild_locked(user, window.unwrap_or_else(|| self.window())).await
    }

    pub async fn list(&self, user: UserId) -> Result<Vec<Task>, ServiceError> {
        Ok(self.backend.list_tasks(user).await?)
    }

    pub async fn penalties(&self, user: UserId) -> Result<Vec<ApiPenaltyTask>, ServiceError> {
        Ok(self.backend.penalty_tasks(user).await?)
    }

    /// Records offered in the dependency picker: a concrete start and no repetition.
    pub async fn available_dependency_targets(&self, user: UserId) -> Result<Vec<ApiTask>, ServiceError> {
        let records = self.backend.records(user).await?;
        Ok(records.into_iter().filter(is_dependency_target).collect())
    }

    /// The laid-out boxes of one day, from the current placement.
    pub async fn day(&self, user: UserId, date: NaiveDate) -> Result<Vec<LaidOutTask>, ServiceError> {
        let tasks = self.backend.list_tasks(user).await?;
        Ok(layout_day(&tasks, date, self.config.max_split_segments)?)
    }
}

fn is_dependency_target(record: &ApiTask) -> bool {
    let has_start = record
        .start_date_time
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty());
    has_start && !record.is_repit
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dependency_targets_need_a_start_and_no_repeat() {
        let fixed = ApiTask {
            start_date_time: Some("2026-10-14T09:00:00Z".into()),
            ..ApiTask::default()
        };
        let repeating = ApiTask {
            is_repit: true,
            ..fixed.clone()
        };
        let blank = ApiTask {
            start_date_time: Some("  ".into()),
            ..ApiTask::default()
        };
        assert!(is_dependency_target(&fixed));
        assert!(!is_dependency_target(&repeating));
        assert!(!is_dependency_target(&blank));
        assert!(!is_dependency_target(&ApiTask::default()));
    }

    #[tokio::test]
    async fn invalid_draft_never_reaches_backend() {
        let service = CalendarService::new(
            LocalBackend::in_memory(Default::default()),
            ServiceConfig::default(),
        );
        let err = service.create(UserId(1), &TaskDraft::new("")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(_)));
        assert!(service.backend().records(UserId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_requires_an_id() {
        let service = CalendarService::new(
            LocalBackend::in_memory(Default::default()),
            ServiceConfig::default(),
        );
        let start = Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap();
        let err = service
            .update(UserId(1), &TaskDraft::new("a").fixed(start, 30))
            .await
            .unwrap_err();
        match err {
            ServiceError::Invalid(errors) => assert_eq!(errors[0].field, "id"),
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn window_follows_the_clock() {
        let service = CalendarService::new(
            LocalBackend::in_memory(Default::default()),
            ServiceConfig {
                weeks_before: 1,
                weeks_after: 0,
                ..ServiceConfig::default()
            },
        )
        .with_clock(|| Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap());
        let window = service.window();
        assert_eq!(window.start(), Utc.with_ymd_and_hms(2026, 10, 5, 0, 0, 0).unwrap());
        assert_eq!(window.end(), Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap());
    }
}
