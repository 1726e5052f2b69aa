//! The contract every schedule backend fulfils, local or remote.

use std::future::Future;

use thiserror::Error;

use crate::constraint::ConstraintRecord;
use crate::error::SchedulerError;
use crate::scheduler::RebuildWindow;
use crate::task::{Task, TaskId, UserId};
use crate::wire::{ApiPenaltyTask, ApiTask};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend rejected the request: {0}")]
    Rejected(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Store of constraint records plus the last placement computed for them.
///
/// Mutations only acknowledge; placement changes once [`ScheduleBackend::rebuild`]
/// has run.
pub trait ScheduleBackend: Send + Sync {
    /// Placed tasks from the last successful rebuild.
    fn list_tasks(&self, user: UserId) -> impl Future<Output = Result<Vec<Task>, BackendError>> + Send;

    /// Stored constraint records as the service keeps them.
    fn records(&self, user: UserId) -> impl Future<Output = Result<Vec<ApiTask>, BackendError>> + Send;

    fn penalty_tasks(&self, user: UserId) -> impl Future<Output = Result<Vec<ApiPenaltyTask>, BackendError>> + Send;

    /// Store a new record and return the id the backend assigned.
    fn create_task(
        &self,
        user: UserId,
        record: &ConstraintRecord,
    ) -> impl Future<Output = Result<TaskId, BackendError>> + Send;

    fn update_task(
        &self,
        user: UserId,
        record: &ConstraintRecord,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn delete_task(&self, user: UserId, id: &TaskId) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn complete_task(&self, user: UserId, id: &TaskId) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Recompute placement for `window`. On failure the previous placement stays.
    fn rebuild(
        &self,
        user: UserId,
        window: &RebuildWindow,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}
