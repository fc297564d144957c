//! Change-feed events and the store's row representation.
//!
//! The realtime channel of the remote store delivers JSON payloads of the
//! form `{"eventType": "INSERT" | "UPDATE" | "DELETE", "new": {..},
//! "old": {..}}` whose rows use the store's column names. [`ChangePayload`]
//! decodes them into the closed [`RemoteEvent`] set, coercing category and
//! duration strings onto the taxonomy on the way in.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{Category, DurationEstimate, ParseError, Task, TaskId, Timestamp, UserId};

/// A change to the task collection reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    /// A task was created.
    Inserted(Task),
    /// A task was modified; carries the full new row.
    Updated(Task),
    /// A task was deleted.
    Deleted(TaskId),
}

impl RemoteEvent {
    /// Id of the task this event concerns.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Inserted(task) | Self::Updated(task) => &task.id,
            Self::Deleted(id) => id,
        }
    }

    /// Short lowercase name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Inserted(_) => "inserted",
            Self::Updated(_) => "updated",
            Self::Deleted(_) => "deleted",
        }
    }
}

/// A task row as stored remotely, with raw string columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    /// Row id.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Title.
    pub title: String,
    /// Completion flag.
    #[serde(default)]
    pub is_complete: bool,
    /// Raw category column.
    #[serde(default)]
    pub category: Option<String>,
    /// Raw duration column.
    #[serde(default)]
    pub time_estimate: Option<String>,
    /// Due date (`YYYY-MM-DD`, optionally followed by a time part).
    #[serde(default)]
    pub due_date: Option<String>,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 modification time.
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl TaskRow {
    /// Converts the row into a [`Task`], coercing taxonomy columns.
    ///
    /// Unknown categories become [`Category::Other`]; unknown durations are
    /// normalized with [`DurationEstimate::normalize`].
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidPayload`] if a timestamp or due date is
    /// malformed.
    pub fn into_task(self) -> Result<Task, ParseError> {
        let due_date = self
            .due_date
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(parse_due_date)
            .transpose()?;
        let updated_at = self
            .updated_at
            .as_deref()
            .map(Timestamp::parse_rfc3339)
            .transpose()?;

        Ok(Task {
            id: TaskId::from_raw(self.id),
            owner_id: UserId::new(self.user_id),
            title: self.title,
            is_complete: self.is_complete,
            category: self
                .category
                .as_deref()
                .map_or(Category::Other, Category::coerce),
            duration_estimate: self
                .time_estimate
                .as_deref()
                .map(DurationEstimate::normalize),
            due_date,
            created_at: Timestamp::parse_rfc3339(&self.created_at)?,
            updated_at,
        })
    }
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.to_string(),
            user_id: task.owner_id.to_string(),
            title: task.title.clone(),
            is_complete: task.is_complete,
            category: Some(task.category.as_str().to_string()),
            time_estimate: task.duration_estimate.map(|d| d.as_str().to_string()),
            due_date: task.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
            created_at: task.created_at.to_rfc3339(),
            updated_at: task.updated_at.map(Timestamp::to_rfc3339),
        }
    }
}

fn parse_due_date(raw: &str) -> Result<NaiveDate, ParseError> {
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| ParseError::InvalidPayload(format!("due date {raw:?}: {e}")))
}

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// Row inserted.
    Insert,
    /// Row updated.
    Update,
    /// Row deleted.
    Delete,
}

/// Raw realtime payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    /// What happened.
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
    /// New row image (empty object on delete).
    #[serde(default)]
    pub new: serde_json::Value,
    /// Old row image; on delete carries at least the primary key.
    #[serde(default)]
    pub old: serde_json::Value,
}

#[derive(Deserialize)]
struct RowKey {
    id: String,
}

impl ChangePayload {
    /// Builds the payload the realtime channel sends for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidPayload`] if the row cannot be
    /// serialized.
    pub fn from_event(event: &RemoteEvent) -> Result<Self, ParseError> {
        let (event_type, new, old) = match event {
            RemoteEvent::Inserted(task) => (ChangeKind::Insert, row_value(task)?, json!({})),
            RemoteEvent::Updated(task) => {
                (ChangeKind::Update, row_value(task)?, json!({ "id": task.id.as_str() }))
            }
            RemoteEvent::Deleted(id) => (ChangeKind::Delete, json!({}), json!({ "id": id.as_str() })),
        };
        Ok(Self {
            event_type,
            new,
            old,
        })
    }

    /// Encodes the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidPayload`] if serialization fails.
    pub fn encode(&self) -> Result<String, ParseError> {
        serde_json::to_string(self).map_err(|e| ParseError::InvalidPayload(e.to_string()))
    }

    /// Decodes a JSON change payload.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidPayload`] if the JSON is malformed.
    pub fn decode(json: &str) -> Result<Self, ParseError> {
        serde_json::from_str(json).map_err(|e| ParseError::InvalidPayload(e.to_string()))
    }

    /// Converts the payload into a [`RemoteEvent`].
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidPayload`] if the row image needed for
    /// this kind of change is missing or malformed.
    pub fn into_event(self) -> Result<RemoteEvent, ParseError> {
        match self.event_type {
            ChangeKind::Insert => Ok(RemoteEvent::Inserted(row_to_task(self.new)?)),
            ChangeKind::Update => Ok(RemoteEvent::Updated(row_to_task(self.new)?)),
            ChangeKind::Delete => {
                let key: RowKey = serde_json::from_value(self.old)
                    .map_err(|e| ParseError::InvalidPayload(format!("delete key: {e}")))?;
                Ok(RemoteEvent::Deleted(TaskId::from_raw(key.id)))
            }
        }
    }
}

fn row_value(task: &Task) -> Result<serde_json::Value, ParseError> {
    serde_json::to_value(TaskRow::from(task))
        .map_err(|e| ParseError::InvalidPayload(format!("row: {e}")))
}

fn row_to_task(value: serde_json::Value) -> Result<Task, ParseError> {
    let row: TaskRow = serde_json::from_value(value)
        .map_err(|e| ParseError::InvalidPayload(format!("row: {e}")))?;
    row.into_task()
}
