//! Shared domain definitions for `tasklist`.
//!
//! Holds the [`task::Task`] model, the fixed category and duration
//! taxonomies with their normalization rules, sort orders, and the
//! change-feed event types delivered by the remote store.

pub mod category;
pub mod duration;
pub mod event;
pub mod order;
pub mod task;

pub use category::Category;
pub use duration::{DurationEstimate, DurationTier};
pub use event::{ChangePayload, RemoteEvent, TaskRow};
pub use order::SortOrder;
pub use task::{NewTask, Task, TaskId, TaskPatch, Timestamp, UserId};

/// Errors raised when external strings or payloads do not fit the model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The string is not one of the fixed category names.
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    /// The string is not one of the fixed duration buckets.
    #[error("unknown duration estimate: {0}")]
    UnknownDuration(String),
    /// The string is not a known sort order.
    #[error("unknown sort order: {0}")]
    UnknownSortOrder(String),
    /// A change-feed payload or row could not be decoded.
    #[error("invalid change payload: {0}")]
    InvalidPayload(String),
}
