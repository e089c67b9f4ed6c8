use chrono::{DateTime, Duration, TimeZone, Utc};
use studydesk_core::lifecycle::{LifecycleError, TaskLifecycle};
use studydesk_core::store::{MemoryStore, StoreError, Subscription, TaskStore};
use studydesk_core::task::{NewTask, Priority, Task, TaskDraft, TaskPatch};
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0)
        .single()
        .expect("valid now")
}

fn planner() -> TaskLifecycle<MemoryStore> {
    TaskLifecycle::new(MemoryStore::new(), "ana")
}

fn only_task(lifecycle: &TaskLifecycle<MemoryStore>) -> Task {
    let mut tasks = lifecycle.store().snapshot("ana");
    assert_eq!(tasks.len(), 1);
    tasks.remove(0)
}

#[test]
fn create_stamps_creation_and_starts_pending() {
    let mut lifecycle = planner();
    let draft = TaskDraft {
        subject: Some("Chemistry".to_string()),
        priority: Priority::High,
        estimated_time: Some("1h 30m".to_string()),
        ..TaskDraft::titled("  Titration lab  ")
    };
    let id = lifecycle.create(draft, now()).expect("create");

    let task = only_task(&lifecycle);
    assert_eq!(task.id, id);
    assert_eq!(task.title, "Titration lab");
    assert_eq!(task.created_at, Some(now()));
    assert!(!task.completed);
    assert!(task.completed_at.is_none());
    assert_eq!(task.priority, Priority::High);
}

#[test]
fn blank_title_is_rejected_before_the_store() {
    let mut lifecycle = planner();
    let err = lifecycle
        .create(TaskDraft::titled("   "), now())
        .expect_err("blank title");
    assert!(matches!(err, LifecycleError::EmptyTitle));
    assert!(lifecycle.store().snapshot("ana").is_empty());
}

#[test]
fn reminder_time_requires_reminder_flag() {
    let mut lifecycle = planner();
    let draft = TaskDraft {
        reminder: false,
        reminder_time: Some(now() + Duration::hours(1)),
        subject: Some("  ".to_string()),
        ..TaskDraft::titled("Read chapter 3")
    };
    lifecycle.create(draft, now()).expect("create");

    let task = only_task(&lifecycle);
    assert!(!task.reminder);
    assert!(task.reminder_time.is_none());
    assert!(task.subject.is_none());
}

#[test]
fn toggle_stamps_then_clears_completion_time() {
    let mut lifecycle = planner();
    lifecycle
        .create(TaskDraft::titled("Flashcards"), now())
        .expect("create");
    let task = only_task(&lifecycle);

    let later = now() + Duration::minutes(25);
    assert!(lifecycle.toggle_complete(&task, later).expect("complete"));
    let done = only_task(&lifecycle);
    assert!(done.completed);
    assert_eq!(done.completed_at, Some(later));

    assert!(!lifecycle.toggle_complete(&done, later).expect("reopen"));
    let reopened = only_task(&lifecycle);
    assert!(!reopened.completed);
    assert!(reopened.completed_at.is_none());
}

#[test]
fn update_merges_only_named_fields() {
    let mut lifecycle = planner();
    let id = lifecycle
        .create(
            TaskDraft {
                subject: Some("History".to_string()),
                due_date: Some(now() + Duration::days(2)),
                ..TaskDraft::titled("Essay outline")
            },
            now(),
        )
        .expect("create");

    lifecycle
        .update(
            id,
            TaskPatch {
                priority: Some(Priority::Low),
                due_date: Some(None),
                ..TaskPatch::default()
            },
            now(),
        )
        .expect("update");

    let task = only_task(&lifecycle);
    assert_eq!(task.title, "Essay outline");
    assert_eq!(task.subject.as_deref(), Some("History"));
    assert_eq!(task.priority, Priority::Low);
    assert!(task.due_date.is_none());
    assert_eq!(task.created_at, Some(now()));
}

#[test]
fn completing_through_update_keeps_fields_consistent() {
    let mut lifecycle = planner();
    let id = lifecycle
        .create(TaskDraft::titled("Past paper"), now())
        .expect("create");

    lifecycle
        .update(
            id,
            TaskPatch {
                completed: Some(true),
                ..TaskPatch::default()
            },
            now(),
        )
        .expect("update");
    let task = only_task(&lifecycle);
    assert!(task.completed);
    assert_eq!(task.completed_at, Some(now()));
}

#[test]
fn completing_an_already_completed_task_keeps_its_completion_time() {
    let mut lifecycle = planner();
    let id = lifecycle
        .create(TaskDraft::titled("Lab report"), now())
        .expect("create");
    let task = only_task(&lifecycle);
    lifecycle.toggle_complete(&task, now()).expect("complete");

    let later = now() + Duration::hours(5);
    lifecycle
        .update(
            id,
            TaskPatch {
                completed: Some(true),
                title: Some("Lab report (final)".to_string()),
                ..TaskPatch::default()
            },
            later,
        )
        .expect("update");

    let task = only_task(&lifecycle);
    assert!(task.completed);
    assert_eq!(task.completed_at, Some(now()));
    assert_eq!(task.title, "Lab report (final)");
}

#[test]
fn updating_an_unknown_task_surfaces_not_found() {
    let mut lifecycle = planner();
    let missing = Uuid::new_v4();
    let err = lifecycle
        .update(
            missing,
            TaskPatch {
                completed: Some(true),
                ..TaskPatch::default()
            },
            now(),
        )
        .expect_err("missing task");
    assert!(matches!(
        err,
        LifecycleError::Store(StoreError::NotFound { id }) if id == missing
    ));
}

#[test]
fn blank_title_patch_is_rejected() {
    let mut lifecycle = planner();
    let id = lifecycle
        .create(TaskDraft::titled("Revise"), now())
        .expect("create");
    let err = lifecycle
        .update(
            id,
            TaskPatch {
                title: Some(" ".to_string()),
                ..TaskPatch::default()
            },
            now(),
        )
        .expect_err("blank title");
    assert!(matches!(err, LifecycleError::EmptyTitle));
    assert_eq!(only_task(&lifecycle).title, "Revise");
}

#[test]
fn deleting_an_unknown_task_surfaces_not_found() {
    let mut lifecycle = planner();
    let missing = Uuid::new_v4();
    let err = lifecycle.delete(missing).expect_err("missing task");
    assert!(matches!(
        err,
        LifecycleError::Store(StoreError::NotFound { id }) if id == missing
    ));
}

#[test]
fn subscription_follows_each_write() {
    let mut lifecycle = planner();
    let sub = lifecycle.subscribe().expect("subscribe");
    assert_eq!(sub.owner(), "ana");
    assert!(sub.latest().expect("initial").is_empty());

    let id = lifecycle
        .create(TaskDraft::titled("Vocabulary"), now())
        .expect("create");
    assert_eq!(sub.latest().expect("after create").len(), 1);

    lifecycle.delete(id).expect("delete");
    assert!(sub.latest().expect("after delete").is_empty());
}

/// Refuses every write while `down` is set.
#[derive(Default)]
struct OfflineStore {
    inner: MemoryStore,
    down: bool,
}

impl OfflineStore {
    fn check(&self) -> Result<(), StoreError> {
        if self.down {
            Err(StoreError::Unavailable("offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl TaskStore for OfflineStore {
    fn subscribe(&mut self, owner: &str) -> Result<Subscription, StoreError> {
        self.inner.subscribe(owner)
    }

    fn create(&mut self, owner: &str, task: NewTask) -> Result<Uuid, StoreError> {
        self.check()?;
        self.inner.create(owner, task)
    }

    fn update(&mut self, owner: &str, id: Uuid, patch: &TaskPatch) -> Result<(), StoreError> {
        self.check()?;
        self.inner.update(owner, id, patch)
    }

    fn delete(&mut self, owner: &str, id: Uuid) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(owner, id)
    }
}

#[test]
fn store_failures_surface_and_leave_the_snapshot_alone() {
    let mut lifecycle = TaskLifecycle::new(OfflineStore::default(), "ana");
    lifecycle
        .create(TaskDraft::titled("Mock exam"), now())
        .expect("create");
    let sub = lifecycle.subscribe().expect("subscribe");
    let before = sub.latest().expect("initial");

    lifecycle.store_mut().down = true;
    let err = lifecycle
        .toggle_complete(&before[0], now())
        .expect_err("offline");
    assert!(matches!(
        err,
        LifecycleError::Store(StoreError::Unavailable(_))
    ));
    assert!(lifecycle.delete(before[0].id).is_err());

    assert!(sub.latest().is_none());
    assert_eq!(lifecycle.store().inner.snapshot("ana"), before);
}
