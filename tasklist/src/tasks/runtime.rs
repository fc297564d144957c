//! Single-owner runtime for a task list.
//!
//! ```text
//! caller ─── TaskCommand ──→ ┌─────────────┐ ──→ remote calls (spawned)
//!                            │  task list  │ ←── completions
//! caller ←─ TaskListEvent ── └─────────────┘ ←── change feed
//! ```
//!
//! One tokio task owns the [`TaskListController`]. Commands, completions of
//! spawned remote calls, change-feed events, and enrichment previews are
//! processed strictly one at a time in arrival order, so the optimistic
//! mutation always precedes the remote call it belongs to and no lock is
//! needed around the list.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use tasklist_proto::{NewTask, RemoteEvent, SortOrder, Task, TaskId, UserId};

use super::controller::{TaskDraft, TaskListController, resolve_new_task};
use super::list::Compensation;
use super::view::Filter;
use super::{TaskError, TaskListConfig};
use crate::enrich::pipeline::SuggestionUpdate;
use crate::enrich::{EnrichmentPipeline, Enricher, Suggestions};
use crate::store::{RemoteStore, StoreError, Subscription};

/// Requests sent to the runtime.
#[derive(Debug)]
pub enum TaskCommand {
    /// Reload from the store.
    Load,
    /// Add a task.
    Add(TaskDraft),
    /// Toggle completion.
    Toggle(TaskId),
    /// Delete a task.
    Remove(TaskId),
    /// Change the sort order and reload.
    SetSort(SortOrder),
    /// Change the category filter.
    SetFilter(Filter),
    /// Composer text changed.
    Input(String),
    /// Reply with the visible tasks.
    Snapshot(oneshot::Sender<Vec<Task>>),
    /// Reply with the composer suggestions.
    Suggestions(oneshot::Sender<Suggestions>),
    /// Stop the runtime and tear down the subscription.
    Shutdown,
}

/// Operation named in a failure report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Loading the list.
    Load,
    /// Adding a task.
    Add,
    /// Toggling completion.
    Toggle,
    /// Removing a task.
    Remove,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => write!(f, "load"),
            Self::Add => write!(f, "add"),
            Self::Toggle => write!(f, "toggle"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Notifications emitted by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskListEvent {
    /// The visible list changed; carries the new view.
    Changed(Vec<Task>),
    /// A load completed.
    Loaded {
        /// Number of tasks loaded.
        count: usize,
    },
    /// The store confirmed a new task.
    Added(Task),
    /// An operation failed; local state has already been compensated.
    Failed {
        /// What was attempted.
        action: Action,
        /// Why it failed.
        error: TaskError,
    },
    /// An enrichment preview settled.
    Suggested(SuggestionUpdate),
}

enum Completion {
    Loaded {
        generation: u64,
        result: Result<Vec<Task>, StoreError>,
    },
    Resolved(NewTask),
    Created {
        compensation: Compensation,
        result: Result<Task, StoreError>,
    },
    Updated {
        compensation: Compensation,
        result: Result<(), StoreError>,
    },
    Deleted {
        compensation: Compensation,
        result: Result<(), StoreError>,
    },
}

/// Cloneable handle for sending commands to a running task list.
#[derive(Debug, Clone)]
pub struct TaskListHandle {
    commands: mpsc::Sender<TaskCommand>,
}

impl TaskListHandle {
    async fn send(&self, command: TaskCommand) -> Result<(), TaskError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TaskError::Closed)
    }

    /// Requests a reload.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Closed`] if the runtime has stopped.
    pub async fn load(&self) -> Result<(), TaskError> {
        self.send(TaskCommand::Load).await
    }

    /// Requests an add. The outcome arrives as [`TaskListEvent::Added`] or
    /// [`TaskListEvent::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Closed`] if the runtime has stopped.
    pub async fn add(&self, draft: TaskDraft) -> Result<(), TaskError> {
        self.send(TaskCommand::Add(draft)).await
    }

    /// Requests a completion toggle.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Closed`] if the runtime has stopped.
    pub async fn toggle(&self, id: TaskId) -> Result<(), TaskError> {
        self.send(TaskCommand::Toggle(id)).await
    }

    /// Requests a delete.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Closed`] if the runtime has stopped.
    pub async fn remove(&self, id: TaskId) -> Result<(), TaskError> {
        self.send(TaskCommand::Remove(id)).await
    }

    /// Changes the sort order and reloads.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Closed`] if the runtime has stopped.
    pub async fn set_sort(&self, sort: SortOrder) -> Result<(), TaskError> {
        self.send(TaskCommand::SetSort(sort)).await
    }

    /// Changes the category filter.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Closed`] if the runtime has stopped.
    pub async fn set_filter(&self, filter: Filter) -> Result<(), TaskError> {
        self.send(TaskCommand::SetFilter(filter)).await
    }

    /// Reports new composer text.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Closed`] if the runtime has stopped.
    pub async fn input(&self, text: impl Into<String>) -> Result<(), TaskError> {
        self.send(TaskCommand::Input(text.into())).await
    }

    /// The visible tasks, after every command sent before this one.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Closed`] if the runtime has stopped.
    pub async fn snapshot(&self) -> Result<Vec<Task>, TaskError> {
        let (tx, rx) = oneshot::channel();
        self.send(TaskCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| TaskError::Closed)
    }

    /// The composer suggestions.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Closed`] if the runtime has stopped.
    pub async fn suggestions(&self) -> Result<Suggestions, TaskError> {
        let (tx, rx) = oneshot::channel();
        self.send(TaskCommand::Suggestions(tx)).await?;
        rx.await.map_err(|_| TaskError::Closed)
    }

    /// Asks the runtime to stop. Does nothing if it already has.
    pub async fn shutdown(&self) {
        let _ = self.send(TaskCommand::Shutdown).await;
    }
}

/// Spawns the runtime for one signed-in session.
///
/// `subscription` feeds change events into the list; it is torn down when
/// the runtime stops. Returns the command handle, the event receiver, and
/// the runtime's join handle.
pub fn spawn_task_list<S: RemoteStore, E: Enricher>(
    store: Arc<S>,
    enricher: Arc<E>,
    config: &TaskListConfig,
    subscription: Option<Subscription>,
) -> (TaskListHandle, mpsc::Receiver<TaskListEvent>, JoinHandle<()>) {
    let capacity = config.event_buffer.max(1);
    let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
    let (evt_tx, evt_rx) = mpsc::channel(capacity);
    let (done_tx, done_rx) = mpsc::channel(capacity);
    let (suggest_tx, suggest_rx) = mpsc::channel(capacity);

    let pipeline = EnrichmentPipeline::new(enricher, config.enrichment.clone()).with_notifier(suggest_tx);
    let controller = TaskListController::new(store, Arc::new(pipeline), config);

    let runtime = Runtime {
        controller,
        events: evt_tx,
        completions: done_tx,
        load_generation: 0,
    };
    let task = tokio::spawn(runtime.run(cmd_rx, done_rx, suggest_rx, subscription));

    (TaskListHandle { commands: cmd_tx }, evt_rx, task)
}

struct Runtime<S, E> {
    controller: TaskListController<S, E>,
    events: mpsc::Sender<TaskListEvent>,
    completions: mpsc::Sender<Completion>,
    load_generation: u64,
}

async fn next_remote(subscription: &mut Option<Subscription>) -> Option<RemoteEvent> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

impl<S: RemoteStore, E: Enricher> Runtime<S, E> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<TaskCommand>,
        mut completions: mpsc::Receiver<Completion>,
        mut suggestions: mpsc::Receiver<SuggestionUpdate>,
        mut subscription: Option<Subscription>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(TaskCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(done) = completions.recv() => self.handle_completion(done).await,
                event = next_remote(&mut subscription) => match event {
                    Some(event) => {
                        if self.controller.apply_remote_event(event) {
                            self.emit_changed().await;
                        }
                    }
                    None => {
                        tracing::info!("change feed closed");
                        subscription = None;
                    }
                },
                Some(update) = suggestions.recv() => {
                    self.emit(TaskListEvent::Suggested(update)).await;
                }
            }
        }

        if let Some(mut sub) = subscription {
            sub.unsubscribe();
        }
        self.controller.reset_composer();
        tracing::info!("task list stopped");
    }

    async fn emit(&self, event: TaskListEvent) {
        let _ = self.events.send(event).await;
    }

    async fn emit_changed(&self) {
        self.emit(TaskListEvent::Changed(self.controller.visible_tasks()))
            .await;
    }

    async fn emit_failed(&self, action: Action, error: TaskError) {
        self.emit(TaskListEvent::Failed { action, error }).await;
    }

    fn spawn_completion<F>(&self, work: F)
    where
        F: std::future::Future<Output = Completion> + Send + 'static,
    {
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let _ = completions.send(work.await).await;
        });
    }

    async fn handle_command(&mut self, command: TaskCommand) {
        match command {
            TaskCommand::Load => self.start_load().await,
            TaskCommand::Add(draft) => self.start_add(draft).await,
            TaskCommand::Toggle(id) => self.start_toggle(&id).await,
            TaskCommand::Remove(id) => self.start_remove(&id).await,
            TaskCommand::SetSort(sort) => {
                self.controller.set_sort_local(sort);
                self.emit_changed().await;
                self.start_load().await;
            }
            TaskCommand::SetFilter(filter) => {
                self.controller.set_filter(filter);
                self.emit_changed().await;
            }
            TaskCommand::Input(text) => self.controller.on_input(&text),
            TaskCommand::Snapshot(reply) => {
                let _ = reply.send(self.controller.visible_tasks());
            }
            TaskCommand::Suggestions(reply) => {
                let _ = reply.send(self.controller.suggestions());
            }
            TaskCommand::Shutdown => {}
        }
    }

    async fn start_load(&mut self) {
        let (owner, sort): (UserId, SortOrder) = match self.controller.begin_load() {
            Ok(query) => query,
            Err(err) => return self.emit_failed(Action::Load, err).await,
        };
        self.load_generation += 1;
        let generation = self.load_generation;
        let store = Arc::clone(self.controller.store());
        self.spawn_completion(async move {
            let result = store.list(&owner, sort).await;
            Completion::Loaded { generation, result }
        });
    }

    async fn start_add(&mut self, draft: TaskDraft) {
        let prepared = match self.controller.prepare_add(draft) {
            Ok(Some(prepared)) => prepared,
            Ok(None) => return,
            Err(err) => return self.emit_failed(Action::Add, err).await,
        };
        let pipeline = Arc::clone(self.controller.pipeline());
        self.spawn_completion(async move {
            Completion::Resolved(resolve_new_task(&pipeline, prepared).await)
        });
    }

    async fn start_toggle(&mut self, id: &TaskId) {
        let pending = match self.controller.begin_toggle(id) {
            Ok(Some(pending)) => pending,
            Ok(None) => return,
            Err(err) => return self.emit_failed(Action::Toggle, err).await,
        };
        self.emit_changed().await;
        let store = Arc::clone(self.controller.store());
        self.spawn_completion(async move {
            let result = store.update(&pending.id, &pending.patch).await;
            Completion::Updated {
                compensation: pending.compensation,
                result,
            }
        });
    }

    async fn start_remove(&mut self, id: &TaskId) {
        let pending = match self.controller.begin_remove(id) {
            Ok(Some(pending)) => pending,
            Ok(None) => return,
            Err(err) => return self.emit_failed(Action::Remove, err).await,
        };
        self.emit_changed().await;
        let store = Arc::clone(self.controller.store());
        self.spawn_completion(async move {
            let result = store.delete(&pending.id).await;
            Completion::Deleted {
                compensation: pending.compensation,
                result,
            }
        });
    }

    async fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Loaded { generation, result } => {
                if generation != self.load_generation {
                    tracing::debug!(generation, "discarding superseded load");
                    return;
                }
                match self.controller.finish_load(result) {
                    Ok(count) => {
                        self.emit(TaskListEvent::Loaded { count }).await;
                        self.emit_changed().await;
                    }
                    Err(err) => self.emit_failed(Action::Load, err).await,
                }
            }
            Completion::Resolved(new_task) => {
                self.controller.reset_composer();
                let (_, compensation) = self.controller.begin_add(&new_task);
                self.emit_changed().await;
                let store = Arc::clone(self.controller.store());
                self.spawn_completion(async move {
                    let result = store.create(&new_task).await;
                    Completion::Created {
                        compensation,
                        result,
                    }
                });
            }
            Completion::Created {
                compensation,
                result,
            } => match self.controller.finish_add(compensation, result) {
                Ok(task) => {
                    self.emit(TaskListEvent::Added(task)).await;
                    self.emit_changed().await;
                }
                Err(err) => {
                    self.emit_changed().await;
                    self.emit_failed(Action::Add, err).await;
                }
            },
            Completion::Updated {
                compensation,
                result,
            } => {
                if let Err(err) = self.controller.finish_update(compensation, result) {
                    self.emit_changed().await;
                    self.emit_failed(Action::Toggle, err).await;
                }
            }
            Completion::Deleted {
                compensation,
                result,
            } => match self.controller.finish_remove(compensation, result) {
                Ok(()) => self.emit_changed().await,
                Err(err) => {
                    self.emit_changed().await;
                    self.emit_failed(Action::Remove, err).await;
                }
            },
        }
    }
}
