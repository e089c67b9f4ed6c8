use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use thiserror::Error;
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use crate::task::{NewTask, Task, TaskPatch};

/// Recoverable failures reported by a task record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {id}")]
    NotFound { id: Uuid },

    #[error("store io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record in {source_name} line {line}: {reason}")]
    Corrupt {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Owner-scoped task persistence the planner core talks to.
///
/// Every successful write publishes a fresh full snapshot to all live
/// subscriptions of that owner.
pub trait TaskStore {
    fn subscribe(&mut self, owner: &str) -> Result<Subscription, StoreError>;

    fn create(&mut self, owner: &str, task: NewTask) -> Result<Uuid, StoreError>;

    fn update(&mut self, owner: &str, id: Uuid, patch: &TaskPatch) -> Result<(), StoreError>;

    fn delete(&mut self, owner: &str, id: Uuid) -> Result<(), StoreError>;
}

/// Receiving end of a snapshot stream.
#[derive(Debug)]
pub struct Subscription {
    owner: String,
    rx: Receiver<Vec<Task>>,
}

impl Subscription {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Next queued snapshot, if any, without blocking.
    pub fn try_next(&self) -> Option<Vec<Task>> {
        self.rx.try_recv().ok()
    }

    /// Drains the queue and returns the newest snapshot.
    pub fn latest(&self) -> Option<Vec<Task>> {
        let mut newest = None;
        loop {
            match self.rx.try_recv() {
                Ok(snapshot) => newest = Some(snapshot),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        newest
    }
}

/// Fan-out registry shared by the store adapters.
#[derive(Debug, Default)]
pub struct Subscribers {
    by_owner: HashMap<String, Vec<Sender<Vec<Task>>>>,
}

impl Subscribers {
    pub fn register(&mut self, owner: &str, initial: Vec<Task>) -> Subscription {
        let (tx, rx) = mpsc::channel();
        // The receiver is alive right here, so the first send cannot fail.
        let _ = tx.send(initial);
        self.by_owner.entry(owner.to_string()).or_default().push(tx);
        debug!(owner, "registered snapshot subscriber");
        Subscription {
            owner: owner.to_string(),
            rx,
        }
    }

    pub fn publish(&mut self, owner: &str, snapshot: &[Task]) {
        let Some(senders) = self.by_owner.get_mut(owner) else {
            return;
        };
        senders.retain(|tx| tx.send(snapshot.to_vec()).is_ok());
        trace!(owner, live = senders.len(), count = snapshot.len(), "published snapshot");
    }
}

/// In-process store keyed by owner. Iteration order is insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: HashMap<String, Vec<Task>>,
    subscribers: Subscribers,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, owner: &str) -> Vec<Task> {
        self.tasks.get(owner).cloned().unwrap_or_default()
    }

    fn publish(&mut self, owner: &str) {
        let snapshot = self.snapshot(owner);
        self.subscribers.publish(owner, &snapshot);
    }
}

impl TaskStore for MemoryStore {
    #[instrument(skip(self))]
    fn subscribe(&mut self, owner: &str) -> Result<Subscription, StoreError> {
        let initial = self.snapshot(owner);
        Ok(self.subscribers.register(owner, initial))
    }

    #[instrument(skip(self, task), fields(title = %task.title))]
    fn create(&mut self, owner: &str, task: NewTask) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.tasks
            .entry(owner.to_string())
            .or_default()
            .push(task.into_task(id));
        self.publish(owner);
        Ok(id)
    }

    #[instrument(skip(self, patch))]
    fn update(&mut self, owner: &str, id: Uuid, patch: &TaskPatch) -> Result<(), StoreError> {
        let task = self
            .tasks
            .get_mut(owner)
            .and_then(|tasks| tasks.iter_mut().find(|t| t.id == id))
            .ok_or(StoreError::NotFound { id })?;
        patch.apply_to(task);
        self.publish(owner);
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete(&mut self, owner: &str, id: Uuid) -> Result<(), StoreError> {
        let tasks = self.tasks.entry(owner.to_string()).or_default();
        let idx = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(StoreError::NotFound { id })?;
        tasks.remove(idx);
        self.publish(owner);
        Ok(())
    }
}
