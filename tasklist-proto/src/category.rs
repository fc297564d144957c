//! The fixed task category taxonomy.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Category a task belongs to.
///
/// Values coming from outside the application (the classifier, change-feed
/// rows) go through [`Category::coerce`], which maps anything unknown to
/// [`Category::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Personal errands and chores.
    Personal,
    /// Work items.
    Work,
    /// Things to buy.
    Shopping,
    /// Health and fitness.
    Health,
    /// Anything else.
    #[default]
    Other,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Self; 5] = [
        Self::Personal,
        Self::Work,
        Self::Shopping,
        Self::Health,
        Self::Other,
    ];

    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Work => "work",
            Self::Shopping => "shopping",
            Self::Health => "health",
            Self::Other => "other",
        }
    }

    /// Maps a raw external string onto the taxonomy.
    ///
    /// Accepts only an exact match after trimming and lowercasing; anything
    /// else becomes [`Category::Other`].
    #[must_use]
    pub fn coerce(raw: &str) -> Self {
        raw.parse().unwrap_or(Self::Other)
    }
}

impl FromStr for Category {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ParseError::UnknownCategory(s.to_string()))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
