//! Derived, display-ready view of the collection.

use std::fmt;
use std::str::FromStr;

use tasklist_proto::{Category, ParseError, SortOrder, Task};

/// Category filter applied to the visible list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    /// Every task.
    #[default]
    All,
    /// Only tasks in one category.
    Only(Category),
}

impl Filter {
    /// Whether `task` passes the filter.
    #[must_use]
    pub fn matches(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Only(category) => task.category == category,
        }
    }
}

impl FromStr for Filter {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse().map(Self::Only)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Only(category) => category.fmt(f),
        }
    }
}

/// Tasks passing `filter`, ordered by `sort`.
#[must_use]
pub fn visible(tasks: &[Task], sort: SortOrder, filter: Filter) -> Vec<&Task> {
    let mut shown: Vec<&Task> = tasks.iter().filter(|t| filter.matches(t)).collect();
    shown.sort_by(|a, b| sort.compare(a, b));
    shown
}
