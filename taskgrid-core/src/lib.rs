//! taskgrid-core: placement, splitting and layout engine for the taskgrid calendar

pub mod constraint;
pub mod draft;
pub mod error;
pub mod layout;
pub mod penalty;
pub mod scheduler;
pub mod service;
pub mod split;
pub mod task;
pub mod time;
pub mod wire;

pub use constraint::{
    ConstraintKind, ConstraintRecord, DependencyRule, OffsetOperator, Recurrence, RelativePosition, RepeatAnchor,
};
pub use draft::{validate, TaskDraft};
pub use error::{SchedulerError, SplitError, ValidationError, ValidationKind};
pub use layout::{group_overlapping, layout_day, line_clamp, position, text_size, LaidOutTask, Position, TextSize};
pub use penalty::{PenaltyReason, PenaltyTask};
pub use scheduler::{RebuildOutcome, RebuildWindow, Scheduler, SchedulerOptions};
pub use service::{
    BackendError, CalendarService, LocalBackend, MutationReport, PlacementStatus, ScheduleBackend, ServiceConfig,
    ServiceError,
};
pub use split::{all_parts, original_of, split_all, split_by_day, split_by_day_capped};
pub use task::{ConstraintTag, Priority, SplitInfo, Task, TaskId, UserId};
pub use wire::{ApiPenaltyTask, ApiTask, WireError};
