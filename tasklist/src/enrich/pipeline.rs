//! Debounced enrichment while a task is being composed.
//!
//! Each [`SuggestionKind`] has one slot. Every keystroke bumps the slot's
//! generation and restarts its timer; only a timer that is still current
//! when it fires calls the service, and a result is stored only if its
//! generation is still current when it returns. At submission time
//! [`EnrichmentPipeline::resolve_category`] and
//! [`EnrichmentPipeline::resolve_duration`] reuse a matching suggestion or
//! call the service with a bounded wait, falling back to the caller's
//! default on error or timeout.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tasklist_proto::{Category, DurationEstimate};

use super::{Enricher, SuggestionKind, SuggestionValue, classify, classify_within};

/// Tuning for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentConfig {
    /// When false, no service calls are made and defaults always apply.
    pub enabled: bool,
    /// Quiet period before a category preview is requested.
    pub category_delay: Duration,
    /// Quiet period before a duration preview is requested.
    pub duration_delay: Duration,
    /// Upper bound on a submission-time service call.
    pub submit_timeout: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            category_delay: Duration::from_millis(800),
            duration_delay: Duration::from_millis(1000),
            submit_timeout: Duration::from_secs(3),
        }
    }
}

impl EnrichmentConfig {
    /// Configuration with enrichment switched off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    const fn delay(&self, kind: SuggestionKind) -> Duration {
        match kind {
            SuggestionKind::Category => self.category_delay,
            SuggestionKind::Duration => self.duration_delay,
        }
    }
}

/// A suggestion computed for a specific text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// Trimmed text the suggestion was computed for.
    pub text: String,
    /// Normalized value.
    pub value: SuggestionValue,
}

/// State of one suggestion slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing requested.
    #[default]
    Idle,
    /// A preview is scheduled or in flight.
    Pending,
    /// The latest preview.
    Ready(Suggestion),
    /// The latest preview failed; submission will try again or fall back.
    Unavailable,
}

/// Snapshot of both slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Suggestions {
    /// Category slot.
    pub category: SlotState,
    /// Duration slot.
    pub duration: SlotState,
}

/// Notification that a slot settled after an asynchronous preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionUpdate {
    /// Which slot.
    pub kind: SuggestionKind,
    /// Its new state.
    pub state: SlotState,
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A preview computed for the same text.
    Suggested,
    /// A submission-time service call.
    Service,
    /// The caller's default.
    Fallback,
}

/// A value resolved at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved<T> {
    /// The value to use.
    pub value: T,
    /// Its origin.
    pub source: Source,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    timer: Option<JoinHandle<()>>,
    state: SlotState,
}

impl Slot {
    /// Invalidates any scheduled or in-flight preview.
    fn invalidate(&mut self) -> u64 {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation
    }
}

#[derive(Default)]
struct Slots {
    category: Slot,
    duration: Slot,
}

impl Slots {
    const fn get_mut(&mut self, kind: SuggestionKind) -> &mut Slot {
        match kind {
            SuggestionKind::Category => &mut self.category,
            SuggestionKind::Duration => &mut self.duration,
        }
    }

    const fn get(&self, kind: SuggestionKind) -> &Slot {
        match kind {
            SuggestionKind::Category => &self.category,
            SuggestionKind::Duration => &self.duration,
        }
    }
}

const KINDS: [SuggestionKind; 2] = [SuggestionKind::Category, SuggestionKind::Duration];

/// Debounced, last-issued-wins enrichment for one composer.
pub struct EnrichmentPipeline<E> {
    enricher: Arc<E>,
    config: EnrichmentConfig,
    slots: Arc<Mutex<Slots>>,
    notify: Option<mpsc::Sender<SuggestionUpdate>>,
}

impl<E: Enricher> EnrichmentPipeline<E> {
    /// Creates a pipeline over `enricher`.
    pub fn new(enricher: Arc<E>, config: EnrichmentConfig) -> Self {
        Self {
            enricher,
            config,
            slots: Arc::new(Mutex::new(Slots::default())),
            notify: None,
        }
    }

    /// Sends a [`SuggestionUpdate`] whenever a preview settles.
    #[must_use]
    pub fn with_notifier(mut self, notify: mpsc::Sender<SuggestionUpdate>) -> Self {
        self.notify = Some(notify);
        self
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Current state of both slots.
    #[must_use]
    pub fn suggestions(&self) -> Suggestions {
        let slots = self.slots.lock();
        Suggestions {
            category: slots.category.state.clone(),
            duration: slots.duration.state.clone(),
        }
    }

    /// Records new composer text and restarts both debounce timers.
    ///
    /// Empty text, or a disabled pipeline, clears both slots without
    /// scheduling anything. Must be called from within a tokio runtime.
    pub fn on_input(&self, text: &str) {
        let trimmed = text.trim();
        let mut slots = self.slots.lock();
        for kind in KINDS {
            let slot = slots.get_mut(kind);
            let generation = slot.invalidate();
            if trimmed.is_empty() || !self.config.enabled {
                slot.state = SlotState::Idle;
                continue;
            }
            slot.state = SlotState::Pending;
            slot.timer = Some(tokio::spawn(run_preview(
                Arc::clone(&self.enricher),
                Arc::clone(&self.slots),
                self.notify.clone(),
                kind,
                generation,
                trimmed.to_string(),
                self.config.delay(kind),
            )));
        }
    }

    /// Cancels pending previews and clears both slots.
    pub fn reset(&self) {
        let mut slots = self.slots.lock();
        for kind in KINDS {
            let slot = slots.get_mut(kind);
            slot.invalidate();
            slot.state = SlotState::Idle;
        }
    }

    /// Resolves the category for `text` at submission time.
    pub async fn resolve_category(&self, text: &str, fallback: Category) -> Resolved<Category> {
        match self.resolve(SuggestionKind::Category, text).await {
            Some((SuggestionValue::Category(value), source)) => Resolved { value, source },
            _ => Resolved {
                value: fallback,
                source: Source::Fallback,
            },
        }
    }

    /// Resolves the duration estimate for `text` at submission time.
    pub async fn resolve_duration(
        &self,
        text: &str,
        fallback: Option<DurationEstimate>,
    ) -> Resolved<Option<DurationEstimate>> {
        match self.resolve(SuggestionKind::Duration, text).await {
            Some((SuggestionValue::Duration(value), source)) => Resolved {
                value: Some(value),
                source,
            },
            _ => Resolved {
                value: fallback,
                source: Source::Fallback,
            },
        }
    }

    fn ready_for(&self, kind: SuggestionKind, text: &str) -> Option<SuggestionValue> {
        match &self.slots.lock().get(kind).state {
            SlotState::Ready(suggestion) if suggestion.text == text => Some(suggestion.value),
            _ => None,
        }
    }

    async fn resolve(&self, kind: SuggestionKind, text: &str) -> Option<(SuggestionValue, Source)> {
        let trimmed = text.trim();
        if !self.config.enabled || trimmed.is_empty() {
            return None;
        }
        if let Some(value) = self.ready_for(kind, trimmed) {
            return Some((value, Source::Suggested));
        }

        let limit = self.config.submit_timeout;
        match classify_within(self.enricher.as_ref(), kind, trimmed, limit).await {
            Ok(value) => Some((value, Source::Service)),
            Err(err) => {
                tracing::warn!(kind = %kind, error = %err, "enrichment failed, using default");
                None
            }
        }
    }
}

impl<E> Drop for EnrichmentPipeline<E> {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        for kind in KINDS {
            slots.get_mut(kind).invalidate();
        }
    }
}

async fn run_preview<E: Enricher>(
    enricher: Arc<E>,
    slots: Arc<Mutex<Slots>>,
    notify: Option<mpsc::Sender<SuggestionUpdate>>,
    kind: SuggestionKind,
    generation: u64,
    text: String,
    delay: Duration,
) {
    tokio::time::sleep(delay).await;
    {
        let mut slots = slots.lock();
        let slot = slots.get_mut(kind);
        if slot.generation != generation {
            return;
        }
        // Past this point the call runs to completion; a newer input only
        // invalidates its result.
        slot.timer = None;
    }

    let result = classify(enricher.as_ref(), kind, &text).await;

    let state = {
        let mut slots = slots.lock();
        let slot = slots.get_mut(kind);
        if slot.generation != generation {
            tracing::debug!(kind = %kind, text = %text, "discarding superseded suggestion");
            return;
        }
        slot.state = match result {
            Ok(value) => SlotState::Ready(Suggestion { text, value }),
            Err(err) => {
                tracing::debug!(kind = %kind, error = %err, "preview enrichment failed");
                SlotState::Unavailable
            }
        };
        slot.state.clone()
    };

    if let Some(notify) = notify {
        let _ = notify.try_send(SuggestionUpdate { kind, state });
    }
}
