//! In-memory [`RemoteStore`] with a live change feed.
//!
//! Behaves like the hosted store from the client's point of view: assigns
//! ids and creation times, scopes every read and write to the signed-in
//! principal, and publishes a change to each subscriber of the row's owner
//! after every committed write. Changes travel in the realtime channel's
//! JSON form ([`ChangePayload`]) and are decoded back into a [`RemoteEvent`]
//! on delivery. Failure injection and latency knobs let tests drive
//! rollback and reordering paths.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use tasklist_proto::{
    ChangePayload, NewTask, ParseError, RemoteEvent, SortOrder, Task, TaskId, TaskPatch, Timestamp,
    UserId,
};

use super::{RemoteStore, StoreError, Subscription};

/// Store operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `list`
    List,
    /// `create`
    Create,
    /// `update`
    Update,
    /// `delete`
    Delete,
}

struct Subscriber {
    id: u64,
    owner: UserId,
    tx: mpsc::Sender<RemoteEvent>,
}

#[derive(Default)]
struct Inner {
    current_user: Option<UserId>,
    tasks: Vec<Task>,
    last_created: u64,
    failures: HashMap<Operation, usize>,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: u64,
}

impl Inner {
    fn take_failure(&mut self, op: Operation) -> Result<(), StoreError> {
        match self.failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Unavailable(format!("injected {op:?} failure")))
            }
            _ => Ok(()),
        }
    }

    fn require_user(&self) -> Result<UserId, StoreError> {
        self.current_user.clone().ok_or(StoreError::Unauthenticated)
    }

    /// Index of a task visible to `user`. Rows of other owners are reported
    /// as missing.
    fn position(&self, id: &TaskId, user: &UserId) -> Result<usize, StoreError> {
        self.tasks
            .iter()
            .position(|t| &t.id == id && &t.owner_id == user)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn next_created_at(&mut self) -> Timestamp {
        let millis = Timestamp::now().as_millis().max(self.last_created + 1);
        self.last_created = millis;
        Timestamp::from_millis(millis)
    }

    /// Publishes a committed write the way the realtime channel would.
    fn publish(&mut self, owner: &UserId, change: &RemoteEvent) {
        let decoded = ChangePayload::from_event(change)
            .and_then(|payload| payload.encode())
            .and_then(|json| ChangePayload::decode(&json))
            .and_then(ChangePayload::into_event);
        match decoded {
            Ok(event) => self.deliver(owner, &event),
            Err(err) => tracing::warn!(
                kind = change.kind(),
                task_id = %change.task_id(),
                error = %err,
                "could not encode change, not published"
            ),
        }
    }

    fn deliver(&mut self, owner: &UserId, event: &RemoteEvent) {
        self.subscribers.retain(|sub| {
            if &sub.owner != owner {
                return !sub.tx.is_closed();
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        subscriber = sub.id,
                        kind = event.kind(),
                        task_id = %event.task_id(),
                        "change feed buffer full, dropping event"
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
    }
}

/// In-process task store.
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
    latency: Duration,
    ack_delay: Duration,
}

impl InMemoryStore {
    /// Creates an empty store with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            latency: Duration::ZERO,
            ack_delay: Duration::ZERO,
        }
    }

    /// Creates an empty store with `user` signed in.
    #[must_use]
    pub fn signed_in(user: UserId) -> Self {
        let store = Self::new();
        store.sign_in(user);
        store
    }

    /// Delays every call by `latency` before it takes effect.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delays the response of every write by `delay` after it has been
    /// committed and published, so change-feed events reach subscribers
    /// before the caller sees the result.
    #[must_use]
    pub const fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    /// Signs `user` in.
    pub fn sign_in(&self, user: UserId) {
        tracing::info!(user_id = %user, "store session started");
        self.inner.lock().current_user = Some(user);
    }

    /// Signs the current principal out.
    pub fn sign_out(&self) {
        self.inner.lock().current_user = None;
    }

    /// Makes the next `op` call fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, op: Operation) {
        *self.inner.lock().failures.entry(op).or_default() += 1;
    }

    /// Inserts a task as if another client had created it and publishes
    /// the `Inserted` event.
    pub fn seed(&self, mut task: Task) -> Task {
        let mut inner = self.inner.lock();
        task.created_at = inner.next_created_at();
        inner.tasks.push(task.clone());
        let owner = task.owner_id.clone();
        inner.publish(&owner, &RemoteEvent::Inserted(task.clone()));
        task
    }

    /// Publishes a raw realtime payload to `owner`'s subscribers without
    /// touching state.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidPayload`] if `payload` does not decode
    /// into a change; nothing is published then.
    pub fn emit(&self, owner: &UserId, payload: &str) -> Result<(), ParseError> {
        let event = ChangePayload::decode(payload)?.into_event()?;
        self.inner.lock().deliver(owner, &event);
        Ok(())
    }

    /// Snapshot of every stored task, in insertion order.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.inner.lock().tasks.clone()
    }

    /// Number of live change-feed subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|sub| !sub.tx.is_closed());
        inner.subscribers.len()
    }

    async fn pause(duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for InMemoryStore {
    fn current_user(&self) -> Option<UserId> {
        self.inner.lock().current_user.clone()
    }

    async fn list(&self, owner: &UserId, order: SortOrder) -> Result<Vec<Task>, StoreError> {
        Self::pause(self.latency).await;
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::List)?;
        let user = inner.require_user()?;
        if &user != owner {
            return Ok(Vec::new());
        }
        let mut tasks: Vec<Task> = inner
            .tasks
            .iter()
            .filter(|t| t.owner_id == user)
            .cloned()
            .collect();
        drop(inner);
        tasks.sort_by(|a, b| order.compare(a, b));
        Ok(tasks)
    }

    async fn create(&self, new_task: &NewTask) -> Result<Task, StoreError> {
        Self::pause(self.latency).await;
        let task = {
            let mut inner = self.inner.lock();
            inner.take_failure(Operation::Create)?;
            let user = inner.require_user()?;
            if new_task.owner_id != user {
                return Err(StoreError::Rejected(format!(
                    "cannot create tasks for {}",
                    new_task.owner_id
                )));
            }
            if new_task.title.trim().is_empty() {
                return Err(StoreError::Rejected("title must not be empty".to_string()));
            }
            let created_at = inner.next_created_at();
            let task = Task::provisional(TaskId::new(), new_task, created_at);
            inner.tasks.push(task.clone());
            inner.publish(&user, &RemoteEvent::Inserted(task.clone()));
            task
        };
        Self::pause(self.ack_delay).await;
        Ok(task)
    }

    async fn update(&self, id: &TaskId, patch: &TaskPatch) -> Result<(), StoreError> {
        Self::pause(self.latency).await;
        {
            let mut inner = self.inner.lock();
            inner.take_failure(Operation::Update)?;
            let user = inner.require_user()?;
            let index = inner.position(id, &user)?;
            let task = &mut inner.tasks[index];
            patch.apply_to(task);
            task.updated_at = Some(Timestamp::now());
            let updated = task.clone();
            inner.publish(&user, &RemoteEvent::Updated(updated));
        }
        Self::pause(self.ack_delay).await;
        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> Result<(), StoreError> {
        Self::pause(self.latency).await;
        {
            let mut inner = self.inner.lock();
            inner.take_failure(Operation::Delete)?;
            let user = inner.require_user()?;
            let index = inner.position(id, &user)?;
            inner.tasks.remove(index);
            inner.publish(&user, &RemoteEvent::Deleted(id.clone()));
        }
        Self::pause(self.ack_delay).await;
        Ok(())
    }

    fn subscribe(&self, capacity: usize) -> Result<Subscription, StoreError> {
        let mut inner = self.inner.lock();
        let owner = inner.require_user()?;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.push(Subscriber { id, owner, tx });
        drop(inner);

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().subscribers.retain(|sub| sub.id != id);
            }
        }))
    }
}
