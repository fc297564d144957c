//! Sort orders shared by the store query and the local view.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ParseError, Task};

/// How a task list is ordered.
///
/// Undated tasks sort last for [`DueAsc`](Self::DueAsc) and first for
/// [`DueDesc`](Self::DueDesc). Ties fall back to creation time, then id,
/// so the order is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Oldest first.
    CreatedAsc,
    /// Newest first.
    #[default]
    CreatedDesc,
    /// Earliest due date first.
    DueAsc,
    /// Latest due date first.
    DueDesc,
}

impl SortOrder {
    /// Every sort order.
    pub const ALL: [Self; 4] = [
        Self::CreatedAsc,
        Self::CreatedDesc,
        Self::DueAsc,
        Self::DueDesc,
    ];

    /// Returns the kebab-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAsc => "created-asc",
            Self::CreatedDesc => "created-desc",
            Self::DueAsc => "due-asc",
            Self::DueDesc => "due-desc",
        }
    }

    /// Compares two tasks under this order.
    #[must_use]
    pub fn compare(self, a: &Task, b: &Task) -> Ordering {
        let by_created = a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id));
        match self {
            Self::CreatedAsc => by_created,
            Self::CreatedDesc => by_created.reverse(),
            Self::DueAsc => match (a.due_date, b.due_date) {
                (Some(x), Some(y)) => x.cmp(&y).then(by_created),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => by_created,
            },
            Self::DueDesc => match (a.due_date, b.due_date) {
                (Some(x), Some(y)) => y.cmp(&x).then(by_created.reverse()),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => by_created.reverse(),
            },
        }
    }
}

impl FromStr for SortOrder {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|o| o.as_str() == normalized)
            .ok_or_else(|| ParseError::UnknownSortOrder(s.to_string()))
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
