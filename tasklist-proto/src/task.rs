//! The task entity and the request shapes used to create and patch it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Category, DurationEstimate, ParseError};

/// Prefix carried by locally generated placeholder ids.
const PLACEHOLDER_PREFIX: &str = "local-";

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Opaque task identifier.
///
/// The remote store assigns ids on creation. Until then a provisional task
/// carries a [`placeholder`](Self::placeholder) id, which is unique per call
/// and never sent to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a fresh time-ordered identifier (UUID v7), as a store would.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an identifier received from the store.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Creates a new local placeholder identifier.
    #[must_use]
    pub fn placeholder() -> Self {
        Self(format!("{PLACEHOLDER_PREFIX}{}", Uuid::new_v4()))
    }

    /// Whether this id was generated locally for a provisional task.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    /// Returns the string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the authenticated principal that owns tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a principal identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Milliseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Parses an RFC 3339 timestamp as produced by the store.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidPayload`] for malformed input or
    /// instants before the epoch.
    pub fn parse_rfc3339(raw: &str) -> Result<Self, ParseError> {
        let parsed = DateTime::parse_from_rfc3339(raw)
            .map_err(|e| ParseError::InvalidPayload(format!("timestamp {raw:?}: {e}")))?;
        u64::try_from(parsed.timestamp_millis())
            .map(Self)
            .map_err(|_| ParseError::InvalidPayload(format!("timestamp {raw:?} before epoch")))
    }

    /// Formats the timestamp as RFC 3339 in UTC.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        i64::try_from(self.0)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_default()
            .to_rfc3339()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A task in the signed-in user's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned id, or a placeholder while provisional.
    pub id: TaskId,
    /// Principal that owns the task.
    pub owner_id: UserId,
    /// Non-empty title.
    pub title: String,
    /// Completion flag.
    pub is_complete: bool,
    /// Category, always a taxonomy member.
    pub category: Category,
    /// Optional duration bucket.
    pub duration_estimate: Option<DurationEstimate>,
    /// Optional due date (calendar date only).
    pub due_date: Option<NaiveDate>,
    /// Creation time; authoritative once confirmed by the store.
    pub created_at: Timestamp,
    /// Last modification time reported by the store.
    pub updated_at: Option<Timestamp>,
}

impl Task {
    /// Builds a provisional task for an optimistic insert.
    #[must_use]
    pub fn provisional(placeholder: TaskId, new_task: &NewTask, created_at: Timestamp) -> Self {
        Self {
            id: placeholder,
            owner_id: new_task.owner_id.clone(),
            title: new_task.title.clone(),
            is_complete: false,
            category: new_task.category,
            duration_estimate: new_task.duration_estimate,
            due_date: new_task.due_date,
            created_at,
            updated_at: None,
        }
    }

    /// Whether the task is still waiting for the store to confirm it.
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.id.is_placeholder()
    }

    /// An incomplete task whose due date lies before `today`.
    #[must_use]
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        !self.is_complete && self.due_date.is_some_and(|due| due < today)
    }
}

/// Attributes sent to the store to create a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    /// Owner; must be the signed-in principal.
    pub owner_id: UserId,
    /// Trimmed, non-empty title.
    pub title: String,
    /// Resolved category.
    pub category: Category,
    /// Resolved duration bucket.
    pub duration_estimate: Option<DurationEstimate>,
    /// Optional due date.
    pub due_date: Option<NaiveDate>,
}

/// Partial update of a task. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New completion flag.
    pub is_complete: Option<bool>,
    /// New category.
    pub category: Option<Category>,
    /// New duration bucket (`Some(None)` clears it).
    pub duration_estimate: Option<Option<DurationEstimate>>,
    /// New due date (`Some(None)` clears it).
    pub due_date: Option<Option<NaiveDate>>,
}

impl TaskPatch {
    /// A patch that only sets the completion flag.
    #[must_use]
    pub fn completion(is_complete: bool) -> Self {
        Self {
            is_complete: Some(is_complete),
            ..Self::default()
        }
    }

    /// Applies the patch to a task in place.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(is_complete) = self.is_complete {
            task.is_complete = is_complete;
        }
        if let Some(category) = self.category {
            task.category = category;
        }
        if let Some(duration) = self.duration_estimate {
            task.duration_estimate = duration;
        }
        if let Some(due) = self.due_date {
            task.due_date = due;
        }
    }
}
