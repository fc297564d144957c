//! In-memory task collection with optimistic mutation and reconciliation.
//!
//! Every optimistic mutation returns a [`Compensation`] describing how to
//! undo it. The caller hands the compensation back through
//! [`TaskList::rollback`] if the remote call fails, or confirms the
//! mutation otherwise.
//!
//! Reconciliation with the change feed is by id membership:
//! - `Inserted` adds the task only if its id is absent, not in flight, and
//!   not known to be deleted.
//! - `Updated` replaces the task only if present.
//! - `Deleted` removes it if present and remembers the id.
//!
//! Deleted ids are kept in a bounded tombstone set so a late `Inserted` or
//! create confirmation cannot resurrect a task that is already gone.

use std::collections::{HashSet, VecDeque};

use tasklist_proto::{RemoteEvent, SortOrder, Task, TaskId, TaskPatch};

use super::TaskError;
use super::view::{Filter, visible};

/// Maximum number of deleted ids remembered.
pub const MAX_TOMBSTONES: usize = 1024;

/// How to undo an optimistic mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Remove a provisional task that was never confirmed.
    DropProvisional {
        /// Placeholder id of the provisional task.
        placeholder: TaskId,
    },
    /// Restore the completion flag of a task.
    RestoreCompletion {
        /// Task that was toggled.
        id: TaskId,
        /// Value before the toggle.
        previous: bool,
    },
    /// Put back a task that was removed locally.
    Reinsert {
        /// The removed task.
        task: Task,
        /// Its former index in the collection.
        index: usize,
    },
}

impl Compensation {
    /// Id of the task the compensation concerns.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::DropProvisional { placeholder } => placeholder,
            Self::RestoreCompletion { id, .. } => id,
            Self::Reinsert { task, .. } => &task.id,
        }
    }
}

/// An optimistic update awaiting the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    /// Task being updated.
    pub id: TaskId,
    /// Patch to send.
    pub patch: TaskPatch,
    /// Undo on failure.
    pub compensation: Compensation,
}

/// An optimistic removal awaiting the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRemoval {
    /// Task being deleted.
    pub id: TaskId,
    /// Undo on failure.
    pub compensation: Compensation,
}

#[derive(Debug, Default)]
struct Tombstones {
    order: VecDeque<TaskId>,
    ids: HashSet<TaskId>,
}

impl Tombstones {
    fn insert(&mut self, id: TaskId) {
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > MAX_TOMBSTONES
            && let Some(oldest) = self.order.pop_front()
        {
            self.ids.remove(&oldest);
        }
    }

    fn contains(&self, id: &TaskId) -> bool {
        self.ids.contains(id)
    }
}

/// The signed-in user's tasks as currently known locally.
#[derive(Debug, Default)]
pub struct TaskList {
    tasks: Vec<Task>,
    pending: HashSet<TaskId>,
    tombstones: Tombstones,
    sort: SortOrder,
    filter: Filter,
}

impl TaskList {
    /// Creates an empty list with the given sort order.
    #[must_use]
    pub fn new(sort: SortOrder) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }

    /// Every task, in storage order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Looks a task up by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Whether `id` has a remote call in flight.
    #[must_use]
    pub fn is_pending(&self, id: &TaskId) -> bool {
        self.pending.contains(id)
    }

    /// Number of remote calls in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Active sort order.
    #[must_use]
    pub const fn sort(&self) -> SortOrder {
        self.sort
    }

    /// Changes the sort order of the view.
    pub const fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
    }

    /// Active category filter.
    #[must_use]
    pub const fn filter(&self) -> Filter {
        self.filter
    }

    /// Changes the category filter of the view.
    pub const fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
    }

    /// Tasks passing the filter, in sort order.
    #[must_use]
    pub fn visible(&self) -> Vec<&Task> {
        visible(&self.tasks, self.sort, self.filter)
    }

    fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| &t.id == id)
    }

    /// Replaces the whole collection with a fresh load.
    ///
    /// Duplicate ids keep their first occurrence; ids known to be deleted
    /// are dropped.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        let mut seen = HashSet::with_capacity(tasks.len());
        self.tasks = tasks
            .into_iter()
            .filter(|t| !self.tombstones.contains(&t.id) && seen.insert(t.id.clone()))
            .collect();
    }

    /// Inserts a provisional task ahead of its creation call.
    pub fn begin_add(&mut self, provisional: Task) -> Compensation {
        let placeholder = provisional.id.clone();
        self.pending.insert(placeholder.clone());
        self.tasks.push(provisional);
        Compensation::DropProvisional { placeholder }
    }

    /// Replaces the provisional task with the store's copy.
    ///
    /// If the change feed already delivered the task, the feed's copy is
    /// kept and moved into the provisional task's position, so the id
    /// appears exactly once. If the feed already deleted it, the provisional
    /// task is dropped.
    pub fn confirm_add(&mut self, placeholder: &TaskId, confirmed: Task) {
        self.pending.remove(placeholder);
        let slot = self.position(placeholder);
        let existing = self.position(&confirmed.id);

        match (slot, existing) {
            (Some(slot), None) if self.tombstones.contains(&confirmed.id) => {
                tracing::debug!(task_id = %confirmed.id, "confirmed task already deleted");
                self.tasks.remove(slot);
            }
            (Some(slot), None) => self.tasks[slot] = confirmed,
            (Some(slot), Some(existing)) => {
                let delivered = self.tasks.remove(existing);
                let slot = if existing < slot { slot - 1 } else { slot };
                tracing::debug!(task_id = %delivered.id, "create confirmed after change feed insert");
                self.tasks[slot] = delivered;
            }
            (None, Some(_)) => {}
            (None, None) => {
                if self.tombstones.contains(&confirmed.id) {
                    tracing::debug!(task_id = %confirmed.id, "confirmed task already deleted");
                } else {
                    self.tasks.push(confirmed);
                }
            }
        }
    }

    /// Flips the completion flag of `id` ahead of its update call.
    ///
    /// Returns `Ok(None)` if `id` is absent.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Busy`] if the task is provisional or another
    /// call for it is in flight.
    pub fn begin_toggle(&mut self, id: &TaskId) -> Result<Option<PendingUpdate>, TaskError> {
        let busy = id.is_placeholder() || self.pending.contains(id);
        let Some(task) = self.tasks.iter_mut().find(|t| &t.id == id) else {
            return Ok(None);
        };
        if busy {
            return Err(TaskError::Busy(id.clone()));
        }

        let previous = task.is_complete;
        task.is_complete = !previous;
        self.pending.insert(id.clone());
        Ok(Some(PendingUpdate {
            id: id.clone(),
            patch: TaskPatch::completion(!previous),
            compensation: Compensation::RestoreCompletion {
                id: id.clone(),
                previous,
            },
        }))
    }

    /// Marks an update of `id` as accepted by the store.
    pub fn confirm_update(&mut self, id: &TaskId) {
        self.pending.remove(id);
    }

    /// Removes `id` ahead of its delete call.
    ///
    /// Returns `Ok(None)` if `id` is absent.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Busy`] if the task is provisional or another
    /// call for it is in flight.
    pub fn begin_remove(&mut self, id: &TaskId) -> Result<Option<PendingRemoval>, TaskError> {
        let Some(index) = self.position(id) else {
            return Ok(None);
        };
        if id.is_placeholder() || self.pending.contains(id) {
            return Err(TaskError::Busy(id.clone()));
        }

        let task = self.tasks.remove(index);
        self.pending.insert(id.clone());
        Ok(Some(PendingRemoval {
            id: id.clone(),
            compensation: Compensation::Reinsert { task, index },
        }))
    }

    /// Marks a delete of `id` as accepted by the store.
    pub fn confirm_remove(&mut self, id: &TaskId) {
        self.pending.remove(id);
        self.tombstones.insert(id.clone());
        if let Some(index) = self.position(id) {
            self.tasks.remove(index);
        }
    }

    /// Undoes a failed optimistic mutation.
    ///
    /// Changes made since by the change feed win: a completion flag is
    /// restored only if it still holds the optimistic value, and a removed
    /// task is put back only if it is absent and not known to be deleted.
    pub fn rollback(&mut self, compensation: Compensation) {
        self.pending.remove(compensation.task_id());
        match compensation {
            Compensation::DropProvisional { placeholder } => {
                if let Some(index) = self.position(&placeholder) {
                    self.tasks.remove(index);
                }
            }
            Compensation::RestoreCompletion { id, previous } => {
                if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id)
                    && task.is_complete != previous
                {
                    task.is_complete = previous;
                }
            }
            Compensation::Reinsert { task, index } => {
                if self.position(&task.id).is_none() && !self.tombstones.contains(&task.id) {
                    let index = index.min(self.tasks.len());
                    self.tasks.insert(index, task);
                }
            }
        }
    }

    /// Merges a change-feed event. Returns whether the collection changed.
    ///
    /// Applying the same event twice has the same effect as applying it
    /// once.
    pub fn apply_remote_event(&mut self, event: RemoteEvent) -> bool {
        match event {
            RemoteEvent::Inserted(task) => {
                if self.position(&task.id).is_some()
                    || self.pending.contains(&task.id)
                    || self.tombstones.contains(&task.id)
                {
                    tracing::debug!(task_id = %task.id, "ignoring insert of known task");
                    return false;
                }
                self.tasks.push(task);
                true
            }
            RemoteEvent::Updated(task) => match self.position(&task.id) {
                Some(index) if self.tasks[index] != task => {
                    self.tasks[index] = task;
                    true
                }
                Some(_) => false,
                None => {
                    tracing::debug!(task_id = %task.id, "ignoring update of unknown task");
                    false
                }
            },
            RemoteEvent::Deleted(id) => {
                self.tombstones.insert(id.clone());
                match self.position(&id) {
                    Some(index) => {
                        self.tasks.remove(index);
                        true
                    }
                    None => false,
                }
            }
        }
    }
}
