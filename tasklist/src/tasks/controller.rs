//! Sequencing of optimistic operations around remote calls.
//!
//! Each operation is split into a synchronous `begin_*` step that mutates
//! the list and a `finish_*` step that confirms or compensates once the
//! remote call has returned. The `async` convenience methods run the steps
//! back to back; the runtime actor runs the remote call on its own task in
//! between so several operations can be in flight at once.

use std::sync::Arc;

use chrono::NaiveDate;

use tasklist_proto::{
    Category, DurationEstimate, NewTask, RemoteEvent, SortOrder, Task, TaskId, Timestamp, UserId,
};

use super::list::{Compensation, PendingRemoval, PendingUpdate, TaskList};
use super::view::Filter;
use super::{TaskError, TaskListConfig};
use crate::enrich::{EnrichmentPipeline, Enricher, Suggestions};
use crate::store::{RemoteStore, StoreError};

/// A task as composed by the user, before enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    /// Raw title; trimmed before use.
    pub title: String,
    /// Explicit category; enrichment fills it in when `None`.
    pub category: Option<Category>,
    /// Explicit duration; enrichment fills it in when `None`.
    pub duration_estimate: Option<DurationEstimate>,
    /// Optional due date.
    pub due_date: Option<NaiveDate>,
    /// Category used when enrichment is unavailable.
    pub fallback_category: Category,
    /// Duration used when enrichment is unavailable.
    pub fallback_duration: Option<DurationEstimate>,
}

impl TaskDraft {
    /// A draft with only a title and the neutral fallbacks.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: None,
            duration_estimate: None,
            due_date: None,
            fallback_category: Category::Other,
            fallback_duration: Some(DurationEstimate::BASELINE),
        }
    }

    /// Sets an explicit category.
    #[must_use]
    pub const fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets an explicit duration estimate.
    #[must_use]
    pub const fn with_duration(mut self, duration: DurationEstimate) -> Self {
        self.duration_estimate = Some(duration);
        self
    }

    /// Sets the due date.
    #[must_use]
    pub const fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Sets the values used when enrichment fails.
    #[must_use]
    pub const fn with_fallbacks(
        mut self,
        category: Category,
        duration: Option<DurationEstimate>,
    ) -> Self {
        self.fallback_category = category;
        self.fallback_duration = duration;
        self
    }
}

/// A validated draft ready for enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedAdd {
    owner: UserId,
    draft: TaskDraft,
}

/// Fills in the draft's missing category and duration.
///
/// Both lookups run concurrently; each falls back to the draft's default
/// when enrichment is disabled, fails, or times out.
pub async fn resolve_new_task<E: Enricher>(
    pipeline: &EnrichmentPipeline<E>,
    prepared: PreparedAdd,
) -> NewTask {
    let PreparedAdd { owner, draft } = prepared;

    let category = async {
        if let Some(category) = draft.category {
            return category;
        }
        let resolved = pipeline
            .resolve_category(&draft.title, draft.fallback_category)
            .await;
        tracing::debug!(category = %resolved.value, source = ?resolved.source, "category resolved");
        resolved.value
    };
    let duration = async {
        if draft.duration_estimate.is_some() {
            return draft.duration_estimate;
        }
        let resolved = pipeline
            .resolve_duration(&draft.title, draft.fallback_duration)
            .await;
        tracing::debug!(duration = ?resolved.value, source = ?resolved.source, "duration resolved");
        resolved.value
    };
    let (category, duration_estimate) = tokio::join!(category, duration);

    NewTask {
        owner_id: owner,
        title: draft.title,
        category,
        duration_estimate,
        due_date: draft.due_date,
    }
}

/// Owner of a [`TaskList`] and the collaborators it reconciles with.
pub struct TaskListController<S, E> {
    store: Arc<S>,
    pipeline: Arc<EnrichmentPipeline<E>>,
    list: TaskList,
    max_title_len: usize,
}

impl<S: RemoteStore, E: Enricher> TaskListController<S, E> {
    /// Creates a controller with an empty list.
    pub fn new(store: Arc<S>, pipeline: Arc<EnrichmentPipeline<E>>, config: &TaskListConfig) -> Self {
        Self {
            store,
            pipeline,
            list: TaskList::new(config.sort),
            max_title_len: config.max_title_len,
        }
    }

    /// The remote store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The enrichment pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &Arc<EnrichmentPipeline<E>> {
        &self.pipeline
    }

    /// The underlying list.
    #[must_use]
    pub const fn list(&self) -> &TaskList {
        &self.list
    }

    /// Owned copy of the visible tasks, filtered and sorted.
    #[must_use]
    pub fn visible_tasks(&self) -> Vec<Task> {
        self.list.visible().into_iter().cloned().collect()
    }

    /// Current enrichment suggestions for the composer.
    #[must_use]
    pub fn suggestions(&self) -> Suggestions {
        self.pipeline.suggestions()
    }

    /// Forwards composer text to the enrichment pipeline.
    pub fn on_input(&self, text: &str) {
        self.pipeline.on_input(text);
    }

    /// Clears composer suggestions.
    pub fn reset_composer(&self) {
        self.pipeline.reset();
    }

    fn require_user(&self) -> Result<UserId, TaskError> {
        self.store.current_user().ok_or(TaskError::NotSignedIn)
    }

    // --- load ---

    /// Checks that a load can start; returns the owner and order to query.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotSignedIn`] if nobody is signed in.
    pub fn begin_load(&self) -> Result<(UserId, SortOrder), TaskError> {
        Ok((self.require_user()?, self.list.sort()))
    }

    /// Replaces the list with a successful load; leaves it untouched on
    /// failure. Returns the number of tasks loaded.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Store`] if the load failed.
    pub fn finish_load(&mut self, result: Result<Vec<Task>, StoreError>) -> Result<usize, TaskError> {
        match result {
            Ok(tasks) => {
                self.list.replace_all(tasks);
                tracing::debug!(count = self.list.len(), "task list loaded");
                Ok(self.list.len())
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load tasks");
                Err(err.into())
            }
        }
    }

    /// Fetches the principal's tasks and replaces the list.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotSignedIn`] or [`TaskError::Store`]; the list
    /// is unchanged in both cases.
    pub async fn load(&mut self) -> Result<usize, TaskError> {
        let (owner, sort) = self.begin_load()?;
        let result = self.store.list(&owner, sort).await;
        self.finish_load(result)
    }

    // --- add ---

    /// Validates a draft.
    ///
    /// Returns `Ok(None)` for a blank title, which is silently ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TitleTooLong`] or [`TaskError::NotSignedIn`].
    pub fn prepare_add(&self, mut draft: TaskDraft) -> Result<Option<PreparedAdd>, TaskError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Ok(None);
        }
        if title.chars().count() > self.max_title_len {
            return Err(TaskError::TitleTooLong {
                max: self.max_title_len,
            });
        }
        let owner = self.require_user()?;
        draft.title = title.to_string();
        Ok(Some(PreparedAdd { owner, draft }))
    }

    /// Inserts the provisional task for `new_task`.
    pub fn begin_add(&mut self, new_task: &NewTask) -> (TaskId, Compensation) {
        let provisional = Task::provisional(TaskId::placeholder(), new_task, Timestamp::now());
        let placeholder = provisional.id.clone();
        (placeholder, self.list.begin_add(provisional))
    }

    /// Confirms or rolls back an add.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Store`] if the create call failed.
    pub fn finish_add(
        &mut self,
        compensation: Compensation,
        result: Result<Task, StoreError>,
    ) -> Result<Task, TaskError> {
        match result {
            Ok(task) => {
                tracing::debug!(task_id = %task.id, placeholder = %compensation.task_id(), "task created");
                self.list.confirm_add(compensation.task_id(), task.clone());
                Ok(task)
            }
            Err(err) => {
                tracing::warn!(placeholder = %compensation.task_id(), error = %err, "create failed, rolling back");
                self.list.rollback(compensation);
                Err(err.into())
            }
        }
    }

    /// Adds a task: validates, enriches, inserts provisionally, creates,
    /// and confirms or rolls back.
    ///
    /// Returns `Ok(None)` if the title is blank.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TitleTooLong`] or [`TaskError::NotSignedIn`]
    /// before any mutation, or [`TaskError::Store`] after rolling back.
    pub async fn add(&mut self, draft: TaskDraft) -> Result<Option<Task>, TaskError> {
        let Some(prepared) = self.prepare_add(draft)? else {
            return Ok(None);
        };
        let new_task = resolve_new_task(&self.pipeline, prepared).await;
        self.reset_composer();

        let (_, compensation) = self.begin_add(&new_task);
        let result = self.store.create(&new_task).await;
        self.finish_add(compensation, result).map(Some)
    }

    // --- toggle ---

    /// Flips completion locally. See [`TaskList::begin_toggle`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Busy`] if the task has a call in flight.
    pub fn begin_toggle(&mut self, id: &TaskId) -> Result<Option<PendingUpdate>, TaskError> {
        self.list.begin_toggle(id)
    }

    /// Confirms or reverts an update.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Store`] if the update call failed.
    pub fn finish_update(
        &mut self,
        compensation: Compensation,
        result: Result<(), StoreError>,
    ) -> Result<(), TaskError> {
        match result {
            Ok(()) => {
                self.list.confirm_update(compensation.task_id());
                Ok(())
            }
            Err(err) => {
                tracing::warn!(task_id = %compensation.task_id(), error = %err, "update failed, reverting");
                self.list.rollback(compensation);
                Err(err.into())
            }
        }
    }

    /// Toggles completion of `id`. Returns whether the task exists.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Busy`], or [`TaskError::Store`] after reverting.
    pub async fn toggle_complete(&mut self, id: &TaskId) -> Result<bool, TaskError> {
        let Some(pending) = self.begin_toggle(id)? else {
            return Ok(false);
        };
        let result = self.store.update(&pending.id, &pending.patch).await;
        self.finish_update(pending.compensation, result).map(|()| true)
    }

    // --- remove ---

    /// Removes locally. See [`TaskList::begin_remove`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Busy`] if the task has a call in flight.
    pub fn begin_remove(&mut self, id: &TaskId) -> Result<Option<PendingRemoval>, TaskError> {
        self.list.begin_remove(id)
    }

    /// Confirms or reverts a removal.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Store`] if the delete call failed.
    pub fn finish_remove(
        &mut self,
        compensation: Compensation,
        result: Result<(), StoreError>,
    ) -> Result<(), TaskError> {
        match result {
            Ok(()) => {
                self.list.confirm_remove(compensation.task_id());
                Ok(())
            }
            Err(err) => {
                tracing::warn!(task_id = %compensation.task_id(), error = %err, "delete failed, restoring");
                self.list.rollback(compensation);
                Err(err.into())
            }
        }
    }

    /// Removes `id`. Returns whether the task existed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Busy`], or [`TaskError::Store`] after restoring.
    pub async fn remove(&mut self, id: &TaskId) -> Result<bool, TaskError> {
        let Some(pending) = self.begin_remove(id)? else {
            return Ok(false);
        };
        let result = self.store.delete(&pending.id).await;
        self.finish_remove(pending.compensation, result).map(|()| true)
    }

    // --- feed and view ---

    /// Merges a change-feed event. Returns whether the list changed.
    pub fn apply_remote_event(&mut self, event: RemoteEvent) -> bool {
        let kind = event.kind();
        let id = event.task_id().clone();
        let changed = self.list.apply_remote_event(event);
        tracing::trace!(kind, task_id = %id, changed, "remote event applied");
        changed
    }

    /// Changes the sort order without reloading.
    pub const fn set_sort_local(&mut self, sort: SortOrder) {
        self.list.set_sort(sort);
    }

    /// Changes the sort order and reloads in that order.
    ///
    /// # Errors
    ///
    /// Propagates [`load`](Self::load) errors; the new order stays in
    /// effect for the local view.
    pub async fn set_sort(&mut self, sort: SortOrder) -> Result<usize, TaskError> {
        self.set_sort_local(sort);
        self.load().await
    }

    /// Changes the category filter.
    pub const fn set_filter(&mut self, filter: Filter) {
        self.list.set_filter(filter);
    }
}
