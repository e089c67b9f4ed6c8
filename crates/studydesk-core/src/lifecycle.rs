use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::store::{StoreError, Subscription, TaskStore};
use crate::task::{NewTask, Task, TaskDraft, TaskPatch};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("task title must not be empty")]
    EmptyTitle,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues create/edit/toggle/delete against a store for one owner.
///
/// Holds no task state; the store's snapshots are the source of truth.
#[derive(Debug)]
pub struct TaskLifecycle<S> {
    store: S,
    owner: String,
}

impl<S: TaskStore> TaskLifecycle<S> {
    pub fn new(store: S, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn subscribe(&mut self) -> Result<Subscription, StoreError> {
        self.store.subscribe(&self.owner)
    }

    #[instrument(skip(self, draft, now), fields(owner = %self.owner, title = %draft.title))]
    pub fn create(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Result<Uuid, LifecycleError> {
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return Err(LifecycleError::EmptyTitle);
        }

        let reminder_time = if draft.reminder { draft.reminder_time } else { None };
        let record = NewTask {
            title,
            subject: draft.subject.filter(|s| !s.trim().is_empty()),
            due_date: draft.due_date,
            priority: draft.priority,
            estimated_time: draft.estimated_time.filter(|s| !s.trim().is_empty()),
            reminder: draft.reminder,
            reminder_time,
            completed: false,
            completed_at: None,
            created_at: Some(now),
            order: None,
        };

        let id = self.store.create(&self.owner, record)?;
        info!(%id, "task created");
        Ok(id)
    }

    #[instrument(skip(self, patch, now), fields(owner = %self.owner))]
    pub fn update(
        &mut self,
        id: Uuid,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(LifecycleError::EmptyTitle);
        }
        let current = self.current(id)?;
        let patch = normalize_patch(patch, &current, now);
        if patch.is_empty() {
            return Ok(());
        }
        self.store.update(&self.owner, id, &patch)?;
        info!(%id, "task updated");
        Ok(())
    }

    /// Flips `completed`, stamping or clearing `completed_at` with it.
    #[instrument(skip(self, task, now), fields(owner = %self.owner, id = %task.id))]
    pub fn toggle_complete(&mut self, task: &Task, now: DateTime<Utc>) -> Result<bool, LifecycleError> {
        let completed = !task.completed;
        let patch = TaskPatch {
            completed: Some(completed),
            completed_at: Some(completed.then_some(now)),
            ..TaskPatch::default()
        };
        self.store.update(&self.owner, task.id, &patch)?;
        info!(completed, "task completion toggled");
        Ok(completed)
    }

    /// The stored record for `id`, read from a fresh snapshot.
    fn current(&mut self, id: Uuid) -> Result<Task, LifecycleError> {
        let snapshot = self.store.subscribe(&self.owner)?.latest().unwrap_or_default();
        snapshot
            .into_iter()
            .find(|t| t.id == id)
            .ok_or(LifecycleError::Store(StoreError::NotFound { id }))
    }

    #[instrument(skip(self), fields(owner = %self.owner))]
    pub fn delete(&mut self, id: Uuid) -> Result<(), LifecycleError> {
        self.store.delete(&self.owner, id)?;
        info!(%id, "task deleted");
        Ok(())
    }
}

/// Makes a patch respect `completed_at.is_some() == completed` against the
/// stored record: the completion time only moves when `completed` flips.
pub fn normalize_patch(mut patch: TaskPatch, current: &Task, now: DateTime<Utc>) -> TaskPatch {
    match patch.completed {
        Some(completed) if completed == current.completed => {
            patch.completed = None;
            if patch.completed_at.take().is_some() {
                warn!("dropping completed_at change; completion state is unchanged");
            }
        }
        Some(true) => {
            if !matches!(patch.completed_at, Some(Some(_))) {
                patch.completed_at = Some(Some(now));
            }
        }
        Some(false) => patch.completed_at = Some(None),
        None => {
            if patch.completed_at.take().is_some() {
                warn!("dropping completed_at change without a completed change");
            }
        }
    }

    if patch.reminder == Some(false) {
        patch.reminder_time = Some(None);
    }

    patch
}
