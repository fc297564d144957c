//! Scripted [`Enricher`] for tests and offline runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{EnrichError, Enricher, SuggestionKind};

/// Enricher that answers from a fixed table.
///
/// Texts without a scripted answer get the default answer for the kind.
/// Every call is recorded, so tests can assert exactly which texts reached
/// the service.
pub struct FixedEnricher {
    categories: HashMap<String, String>,
    durations: HashMap<String, String>,
    default_category: String,
    default_duration: String,
    latency: Duration,
    failing: AtomicBool,
    calls: Mutex<Vec<(SuggestionKind, String)>>,
}

impl FixedEnricher {
    /// Answers `other` and `30min` for everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            categories: HashMap::new(),
            durations: HashMap::new(),
            default_category: "other".to_string(),
            default_duration: "30min".to_string(),
            latency: Duration::ZERO,
            failing: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Scripts the raw category answer for `text`.
    #[must_use]
    pub fn with_category(mut self, text: &str, raw: &str) -> Self {
        self.categories.insert(text.to_string(), raw.to_string());
        self
    }

    /// Scripts the raw duration answer for `text`.
    #[must_use]
    pub fn with_duration(mut self, text: &str, raw: &str) -> Self {
        self.durations.insert(text.to_string(), raw.to_string());
        self
    }

    /// Delays every answer by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// An enricher whose every call fails.
    #[must_use]
    pub fn failing() -> Self {
        let enricher = Self::new();
        enricher.set_failing(true);
        enricher
    }

    /// Switches failure mode on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(SuggestionKind, String)> {
        self.calls.lock().clone()
    }

    /// Texts sent for `kind`, in order.
    #[must_use]
    pub fn calls_for(&self, kind: SuggestionKind) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, text)| text.clone())
            .collect()
    }

    async fn answer(
        &self,
        kind: SuggestionKind,
        text: &str,
        table: &HashMap<String, String>,
        default: &str,
    ) -> Result<String, EnrichError> {
        self.calls.lock().push((kind, text.to_string()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(EnrichError::Unavailable(format!("{kind} service down")));
        }
        Ok(table
            .get(text)
            .cloned()
            .unwrap_or_else(|| default.to_string()))
    }
}

impl Default for FixedEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl Enricher for FixedEnricher {
    async fn classify_category(&self, text: &str) -> Result<String, EnrichError> {
        self.answer(
            SuggestionKind::Category,
            text,
            &self.categories,
            &self.default_category,
        )
        .await
    }

    async fn estimate_duration(
        &self,
        text: &str,
        _description: Option<&str>,
    ) -> Result<String, EnrichError> {
        self.answer(
            SuggestionKind::Duration,
            text,
            &self.durations,
            &self.default_duration,
        )
        .await
    }
}
