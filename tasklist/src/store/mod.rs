//! Remote store abstraction.
//!
//! Defines the [`RemoteStore`] trait through which the task list reads and
//! writes the signed-in principal's tasks and subscribes to the realtime
//! change feed. Concrete implementations include:
//! - [`memory::InMemoryStore`]: in-process store with a live change feed,
//!   used by the driver binary and in tests

pub mod memory;

use tokio::sync::mpsc;

use tasklist_proto::{NewTask, RemoteEvent, SortOrder, Task, TaskId, TaskPatch, UserId};

pub use memory::InMemoryStore;

/// Errors reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or failed internally.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the request (validation or authorization).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The referenced task does not exist.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// No principal is signed in.
    #[error("not signed in")]
    Unauthenticated,
}

/// Hosted store holding the principal's task collection.
///
/// Authorization (a principal only sees and mutates its own rows) is the
/// store's responsibility.
pub trait RemoteStore: Send + Sync + 'static {
    /// The currently signed-in principal, if any.
    fn current_user(&self) -> Option<UserId>;

    /// Fetch every task owned by `owner`, ordered by `order`.
    fn list(
        &self,
        owner: &UserId,
        order: SortOrder,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, StoreError>> + Send;

    /// Create a task; returns the stored task with its assigned id.
    fn create(
        &self,
        new_task: &NewTask,
    ) -> impl std::future::Future<Output = Result<Task, StoreError>> + Send;

    /// Apply a partial update to an existing task.
    fn update(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete a task.
    fn delete(&self, id: &TaskId)
    -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Open a change-feed subscription for the current principal's tasks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unauthenticated`] if nobody is signed in.
    fn subscribe(&self, capacity: usize) -> Result<Subscription, StoreError>;
}

type Teardown = Box<dyn FnOnce() + Send>;

/// Live change-feed subscription.
///
/// Events arrive in store order. Dropping the subscription tears it down;
/// [`unsubscribe`](Self::unsubscribe) does so explicitly and is idempotent.
pub struct Subscription {
    events: mpsc::Receiver<RemoteEvent>,
    teardown: Option<Teardown>,
}

impl Subscription {
    /// Wraps a receiving channel and the store-side teardown hook.
    pub fn new(events: mpsc::Receiver<RemoteEvent>, teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            events,
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Waits for the next event. Returns `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<RemoteEvent> {
        self.events.recv().await
    }

    /// Returns a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<RemoteEvent> {
        self.events.try_recv().ok()
    }

    /// Whether the subscription has been torn down.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.teardown.is_none()
    }

    /// Stops delivery and releases the store-side registration.
    pub fn unsubscribe(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
            self.events.close();
            tracing::debug!("change feed unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
