//! Enrichment: category and duration suggestions for task text.
//!
//! The [`Enricher`] trait is the opaque classification service. Its raw
//! answers are strings; callers map them onto the taxonomy with
//! [`Category::coerce`] and [`DurationEstimate::normalize`]. Implementations:
//! - [`http::HttpEnricher`]: calls the hosted classification functions
//! - [`fixed::FixedEnricher`]: scripted answers for tests and offline use
//!
//! [`pipeline::EnrichmentPipeline`] debounces previews while text is being
//! composed and resolves final values at submission time.

pub mod fixed;
pub mod http;
pub mod pipeline;

use std::fmt;
use std::time::Duration;

use tasklist_proto::{Category, DurationEstimate};

pub use fixed::FixedEnricher;
pub use http::HttpEnricher;
pub use pipeline::{EnrichmentConfig, EnrichmentPipeline, Resolved, SlotState, Source, Suggestions};

/// Errors from the classification service.
///
/// These never reach the user as failures: every caller falls back to a
/// default when enrichment fails.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// The HTTP request could not be sent or completed.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The response body was not the expected JSON.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The call did not complete within the allowed time.
    #[error("timed out")]
    Timeout,

    /// The service is not available (disabled or unreachable).
    #[error("enrichment unavailable: {0}")]
    Unavailable(String),
}

/// Classification service.
pub trait Enricher: Send + Sync + 'static {
    /// Raw category label for `text`.
    fn classify_category(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<String, EnrichError>> + Send;

    /// Raw duration label for `text`, optionally informed by a longer
    /// description.
    fn estimate_duration(
        &self,
        text: &str,
        description: Option<&str>,
    ) -> impl std::future::Future<Output = Result<String, EnrichError>> + Send;
}

/// Which suggestion a debounce slot produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuggestionKind {
    /// Category suggestion.
    Category,
    /// Duration-estimate suggestion.
    Duration,
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category => write!(f, "category"),
            Self::Duration => write!(f, "duration"),
        }
    }
}

/// A normalized suggestion value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionValue {
    /// Suggested category.
    Category(Category),
    /// Suggested duration bucket.
    Duration(DurationEstimate),
}

impl SuggestionValue {
    /// Normalizes a raw service answer for `kind`.
    #[must_use]
    pub fn from_raw(kind: SuggestionKind, raw: &str) -> Self {
        match kind {
            SuggestionKind::Category => Self::Category(Category::coerce(raw)),
            SuggestionKind::Duration => Self::Duration(DurationEstimate::normalize(raw)),
        }
    }

    /// The category, if this is a category suggestion.
    #[must_use]
    pub const fn category(self) -> Option<Category> {
        match self {
            Self::Category(c) => Some(c),
            Self::Duration(_) => None,
        }
    }

    /// The duration bucket, if this is a duration suggestion.
    #[must_use]
    pub const fn duration(self) -> Option<DurationEstimate> {
        match self {
            Self::Duration(d) => Some(d),
            Self::Category(_) => None,
        }
    }
}

impl fmt::Display for SuggestionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category(c) => c.fmt(f),
            Self::Duration(d) => d.fmt(f),
        }
    }
}

/// Calls the service for `kind`.
pub(crate) async fn classify<E: Enricher>(
    enricher: &E,
    kind: SuggestionKind,
    text: &str,
) -> Result<SuggestionValue, EnrichError> {
    let raw = match kind {
        SuggestionKind::Category => enricher.classify_category(text).await?,
        SuggestionKind::Duration => enricher.estimate_duration(text, None).await?,
    };
    Ok(SuggestionValue::from_raw(kind, &raw))
}

/// Calls the service for `kind`, giving up after `limit`.
pub(crate) async fn classify_within<E: Enricher>(
    enricher: &E,
    kind: SuggestionKind,
    text: &str,
    limit: Duration,
) -> Result<SuggestionValue, EnrichError> {
    tokio::time::timeout(limit, classify(enricher, kind, text))
        .await
        .map_err(|_| EnrichError::Timeout)?
}
