//! Duration-estimate buckets and the normalization of free-text estimates.
//!
//! The classifier answers in free text ("about 2 hours", "45 mins",
//! "a week"). [`DurationEstimate::normalize`] maps such text onto the fixed
//! ordered bucket set:
//!
//! 1. An exact bucket name (case- and whitespace-insensitive) wins.
//! 2. Otherwise the first unit keyword (minute, hour, day, week and their
//!    abbreviations) and the first amount (digits, a number word, or
//!    "half"; a later "half" adds 0.5) select the nearest bucket of that
//!    unit. Sub-hour amounts fall through to minutes and 60+ minutes to
//!    hours.
//! 3. Amounts outside a unit's range, and text with no unit, fall back to
//!    [`DurationEstimate::BASELINE`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// A duration-estimate bucket. Variants are declared shortest first, so the
/// derived ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DurationEstimate {
    /// 5 minutes.
    #[serde(rename = "5min")]
    Minutes5,
    /// 10 minutes.
    #[serde(rename = "10min")]
    Minutes10,
    /// 15 minutes.
    #[serde(rename = "15min")]
    Minutes15,
    /// 20 minutes.
    #[serde(rename = "20min")]
    Minutes20,
    /// 30 minutes.
    #[serde(rename = "30min")]
    Minutes30,
    /// 45 minutes.
    #[serde(rename = "45min")]
    Minutes45,
    /// 1 hour.
    #[serde(rename = "1hr")]
    Hours1,
    /// 1.5 hours.
    #[serde(rename = "1.5hrs")]
    Hours1Half,
    /// 2 hours.
    #[serde(rename = "2hrs")]
    Hours2,
    /// 2.5 hours.
    #[serde(rename = "2.5hrs")]
    Hours2Half,
    /// 3 hours.
    #[serde(rename = "3hrs")]
    Hours3,
    /// 4 hours.
    #[serde(rename = "4hrs")]
    Hours4,
    /// 5 hours.
    #[serde(rename = "5hrs")]
    Hours5,
    /// 6 hours.
    #[serde(rename = "6hrs")]
    Hours6,
    /// 8 hours.
    #[serde(rename = "8hrs")]
    Hours8,
    /// 1 day.
    #[serde(rename = "1day")]
    Days1,
    /// 2 days.
    #[serde(rename = "2days")]
    Days2,
    /// 3 days.
    #[serde(rename = "3days")]
    Days3,
    /// 1 week.
    #[serde(rename = "1week")]
    Weeks1,
}

/// Coarse grouping of buckets used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurationTier {
    /// Up to an hour.
    Short,
    /// 1.5 to 3 hours.
    Medium,
    /// 4 to 8 hours.
    Long,
    /// Days or more.
    VeryLong,
}

impl DurationEstimate {
    /// Every bucket, shortest first.
    pub const ALL: [Self; 19] = [
        Self::Minutes5,
        Self::Minutes10,
        Self::Minutes15,
        Self::Minutes20,
        Self::Minutes30,
        Self::Minutes45,
        Self::Hours1,
        Self::Hours1Half,
        Self::Hours2,
        Self::Hours2Half,
        Self::Hours3,
        Self::Hours4,
        Self::Hours5,
        Self::Hours6,
        Self::Hours8,
        Self::Days1,
        Self::Days2,
        Self::Days3,
        Self::Weeks1,
    ];

    /// Bucket used when nothing better can be determined.
    pub const BASELINE: Self = Self::Minutes30;

    /// Returns the canonical bucket name (`"1.5hrs"`, `"1week"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minutes5 => "5min",
            Self::Minutes10 => "10min",
            Self::Minutes15 => "15min",
            Self::Minutes20 => "20min",
            Self::Minutes30 => "30min",
            Self::Minutes45 => "45min",
            Self::Hours1 => "1hr",
            Self::Hours1Half => "1.5hrs",
            Self::Hours2 => "2hrs",
            Self::Hours2Half => "2.5hrs",
            Self::Hours3 => "3hrs",
            Self::Hours4 => "4hrs",
            Self::Hours5 => "5hrs",
            Self::Hours6 => "6hrs",
            Self::Hours8 => "8hrs",
            Self::Days1 => "1day",
            Self::Days2 => "2days",
            Self::Days3 => "3days",
            Self::Weeks1 => "1week",
        }
    }

    /// Returns the display tier of this bucket.
    #[must_use]
    pub const fn tier(self) -> DurationTier {
        match self {
            Self::Minutes5
            | Self::Minutes10
            | Self::Minutes15
            | Self::Minutes20
            | Self::Minutes30
            | Self::Minutes45
            | Self::Hours1 => DurationTier::Short,
            Self::Hours1Half | Self::Hours2 | Self::Hours2Half | Self::Hours3 => {
                DurationTier::Medium
            }
            Self::Hours4 | Self::Hours5 | Self::Hours6 | Self::Hours8 => DurationTier::Long,
            Self::Days1 | Self::Days2 | Self::Days3 | Self::Weeks1 => DurationTier::VeryLong,
        }
    }

    /// Maps free text onto a bucket. Never fails; see the module docs for
    /// the matching rules.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        if let Ok(exact) = raw.parse() {
            return exact;
        }

        let lowered = raw.to_lowercase();
        let tokens = tokenize(&lowered);
        let Some(unit) = tokens.iter().find_map(|t| Unit::from_token(t)) else {
            return Self::BASELINE;
        };
        let amount = amount_of(&tokens).unwrap_or_else(|| unit.default_amount());

        let matched = match unit {
            Unit::Hour if amount < 1.0 => Unit::Minute.nearest(amount * 60.0),
            Unit::Minute if amount >= 60.0 => Unit::Hour.nearest(amount / 60.0),
            _ => unit.nearest(amount),
        };
        matched.unwrap_or(Self::BASELINE)
    }
}

impl FromStr for DurationEstimate {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        Self::ALL
            .into_iter()
            .find(|b| b.as_str() == compact)
            .ok_or_else(|| ParseError::UnknownDuration(s.to_string()))
    }
}

impl std::fmt::Display for DurationEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for DurationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Short => write!(f, "short"),
            Self::Medium => write!(f, "medium"),
            Self::Long => write!(f, "long"),
            Self::VeryLong => write!(f, "very long"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Minute,
    Hour,
    Day,
    Week,
}

impl Unit {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "m" | "min" | "mins" | "minute" | "minutes" => Some(Self::Minute),
            "h" | "hr" | "hrs" | "hour" | "hours" => Some(Self::Hour),
            "d" | "day" | "days" => Some(Self::Day),
            "w" | "wk" | "wks" | "week" | "weeks" => Some(Self::Week),
            _ => None,
        }
    }

    const fn default_amount(self) -> f64 {
        match self {
            Self::Minute => 30.0,
            Self::Hour | Self::Day | Self::Week => 1.0,
        }
    }

    /// Accepted amount range (inclusive) and the buckets of this unit.
    const fn buckets(self) -> (f64, f64, &'static [(f64, DurationEstimate)]) {
        use DurationEstimate as D;
        match self {
            Self::Minute => (
                0.0,
                59.0,
                &[
                    (5.0, D::Minutes5),
                    (10.0, D::Minutes10),
                    (15.0, D::Minutes15),
                    (20.0, D::Minutes20),
                    (30.0, D::Minutes30),
                    (45.0, D::Minutes45),
                ],
            ),
            Self::Hour => (
                1.0,
                8.0,
                &[
                    (1.0, D::Hours1),
                    (1.5, D::Hours1Half),
                    (2.0, D::Hours2),
                    (2.5, D::Hours2Half),
                    (3.0, D::Hours3),
                    (4.0, D::Hours4),
                    (5.0, D::Hours5),
                    (6.0, D::Hours6),
                    (8.0, D::Hours8),
                ],
            ),
            Self::Day => (
                1.0,
                3.0,
                &[(1.0, D::Days1), (2.0, D::Days2), (3.0, D::Days3)],
            ),
            Self::Week => (1.0, 1.0, &[(1.0, D::Weeks1)]),
        }
    }

    /// Nearest bucket of this unit; ties go to the shorter bucket.
    fn nearest(self, amount: f64) -> Option<DurationEstimate> {
        let (low, high, buckets) = self.buckets();
        if !(low..=high).contains(&amount) {
            return None;
        }
        let mut best: Option<(f64, DurationEstimate)> = None;
        for &(value, bucket) in buckets {
            let distance = (value - amount).abs();
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, bucket));
            }
        }
        best.map(|(_, bucket)| bucket)
    }
}

/// Splits text into runs of digits/dots and runs of letters.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut numeric = false;
    for c in text.chars() {
        let is_num = c.is_ascii_digit() || c == '.';
        if c.is_alphabetic() || is_num {
            if !current.is_empty() && is_num != numeric {
                tokens.push(std::mem::take(&mut current));
            }
            numeric = is_num;
            current.push(c);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn number_word(token: &str) -> Option<f64> {
    let value = match token {
        "a" | "an" | "one" => 1.0,
        "two" | "couple" => 2.0,
        "three" => 3.0,
        "four" => 4.0,
        "five" => 5.0,
        "six" => 6.0,
        "seven" => 7.0,
        "eight" => 8.0,
        "nine" => 9.0,
        "ten" => 10.0,
        "fifteen" => 15.0,
        "twenty" => 20.0,
        "thirty" => 30.0,
        "forty" => 40.0,
        "half" => 0.5,
        _ => return None,
    };
    Some(value)
}

/// First amount in the token stream, plus 0.5 for a later "half".
/// Digits take precedence over number words.
fn amount_of(tokens: &[String]) -> Option<f64> {
    let digits = tokens.iter().enumerate().find_map(|(i, t)| {
        t.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| (i, v))
    });
    let (index, base) = digits.or_else(|| {
        tokens
            .iter()
            .enumerate()
            .find_map(|(i, t)| number_word(t).map(|v| (i, v)))
    })?;
    let half_follows = tokens[index + 1..].iter().any(|t| t == "half");
    Some(if half_follows { base + 0.5 } else { base })
}
