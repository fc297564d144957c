//! Signed-in session: the task list of one principal.
//!
//! [`Session::sign_in`] subscribes to the change feed, starts the task-list
//! runtime and requests the initial load. [`Session::sign_out`] stops the
//! runtime, which unsubscribes from the feed and cancels pending
//! enrichment timers.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tasklist_proto::UserId;

use crate::enrich::Enricher;
use crate::store::RemoteStore;
use crate::tasks::{TaskError, TaskListConfig, TaskListEvent, TaskListHandle, spawn_task_list};

/// A running task list bound to the signed-in principal.
pub struct Session {
    user: UserId,
    handle: TaskListHandle,
    events: mpsc::Receiver<TaskListEvent>,
    task: Option<JoinHandle<()>>,
}

impl Session {
    /// Starts a session for the store's current principal.
    ///
    /// The subscription is opened before the initial load so no change is
    /// missed in between.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotSignedIn`] if nobody is signed in, or
    /// [`TaskError::Store`] if the subscription cannot be opened.
    pub async fn sign_in<S: RemoteStore, E: Enricher>(
        store: Arc<S>,
        enricher: Arc<E>,
        config: &TaskListConfig,
    ) -> Result<Self, TaskError> {
        let user = store.current_user().ok_or(TaskError::NotSignedIn)?;
        let subscription = store.subscribe(config.event_buffer)?;
        let (handle, events, task) = spawn_task_list(store, enricher, config, Some(subscription));
        handle.load().await?;

        tracing::info!(user_id = %user, "session started");
        Ok(Self {
            user,
            handle,
            events,
            task: Some(task),
        })
    }

    /// The signed-in principal.
    #[must_use]
    pub const fn user(&self) -> &UserId {
        &self.user
    }

    /// Command handle for the task list.
    #[must_use]
    pub const fn handle(&self) -> &TaskListHandle {
        &self.handle
    }

    /// Waits for the next task-list event.
    pub async fn next_event(&mut self) -> Option<TaskListEvent> {
        self.events.recv().await
    }

    /// Stops the task list and waits for its teardown to finish.
    pub async fn sign_out(mut self) {
        // Unblocks a runtime waiting on a full event channel.
        self.events.close();
        self.handle.shutdown().await;
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            tracing::warn!(error = %err, "task list runtime ended abnormally");
        }
        tracing::info!(user_id = %self.user, "session ended");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}
