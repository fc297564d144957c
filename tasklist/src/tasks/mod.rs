//! The reconciling task list.
//!
//! [`list::TaskList`] holds the in-memory collection and applies optimistic
//! mutations, their confirmations and compensations, and change-feed
//! events. [`controller::TaskListController`] sequences those steps around
//! remote calls and enrichment. [`runtime`] runs a controller as a single
//! owner task driven by commands, remote completions, and the change feed.

pub mod controller;
pub mod list;
pub mod runtime;
pub mod view;

use tasklist_proto::{SortOrder, TaskId, task::MAX_TASK_TITLE_LENGTH};

use crate::enrich::EnrichmentConfig;
use crate::store::StoreError;

pub use controller::{PreparedAdd, TaskDraft, TaskListController, resolve_new_task};
pub use list::{Compensation, PendingRemoval, PendingUpdate, TaskList};
pub use runtime::{Action, TaskCommand, TaskListEvent, TaskListHandle, spawn_task_list};
pub use view::Filter;

/// Errors surfaced by task-list operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TaskError {
    /// No principal is signed in.
    #[error("not signed in")]
    NotSignedIn,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max {max} characters)")]
    TitleTooLong {
        /// Configured limit.
        max: usize,
    },
    /// Another operation on this task is still in flight.
    #[error("task {0} has an operation in flight")]
    Busy(TaskId),
    /// The remote store call failed; local state was rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The task-list runtime has shut down.
    #[error("task list closed")]
    Closed,
}

/// Settings for a task-list instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListConfig {
    /// Enrichment timing and switch.
    pub enrichment: EnrichmentConfig,
    /// Initial sort order.
    pub sort: SortOrder,
    /// Maximum title length in characters.
    pub max_title_len: usize,
    /// Capacity of the event, command, and change-feed channels.
    pub event_buffer: usize,
}

impl Default for TaskListConfig {
    fn default() -> Self {
        Self {
            enrichment: EnrichmentConfig::default(),
            sort: SortOrder::default(),
            max_title_len: MAX_TASK_TITLE_LENGTH,
            event_buffer: 256,
        }
    }
}
