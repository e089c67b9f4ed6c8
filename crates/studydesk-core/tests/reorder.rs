use std::collections::HashSet;

use chrono::Utc;
use studydesk_core::reorder::{
    assign_order, move_pending, persist_order, reorder_pending, restore_manual_order,
};
use studydesk_core::store::{MemoryStore, StoreError, Subscription, TaskStore};
use studydesk_core::task::{NewTask, Task, TaskPatch};
use uuid::Uuid;

fn pending(title: &str) -> Task {
    Task::new(title, Utc::now())
}

fn completed(title: &str) -> Task {
    let mut task = Task::new(title, Utc::now());
    task.completed = true;
    task.completed_at = Some(Utc::now());
    task
}

fn titles(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.title.as_str()).collect()
}

fn abcd() -> Vec<Task> {
    vec![pending("A"), pending("B"), pending("C"), pending("D")]
}

#[test]
fn moving_down_shifts_the_tasks_in_between() {
    let tasks = abcd();
    let out = reorder_pending(&tasks, tasks[0].id, tasks[2].id);
    assert_eq!(titles(&out), vec!["B", "C", "A", "D"]);
}

#[test]
fn moving_up_shifts_the_tasks_in_between() {
    let tasks = abcd();
    let out = reorder_pending(&tasks, tasks[3].id, tasks[1].id);
    assert_eq!(titles(&out), vec!["A", "D", "B", "C"]);
}

#[test]
fn neighbours_swap() {
    let tasks = abcd();
    let out = reorder_pending(&tasks, tasks[1].id, tasks[2].id);
    assert_eq!(titles(&out), vec!["A", "C", "B", "D"]);
}

#[test]
fn same_id_returns_input_order() {
    let tasks = vec![pending("A"), completed("X"), pending("B")];
    let out = reorder_pending(&tasks, tasks[2].id, tasks[2].id);
    assert_eq!(out, tasks);
    assert!(move_pending(&tasks, tasks[2].id, tasks[2].id).is_none());
}

#[test]
fn dragging_onto_a_completed_task_is_a_no_op() {
    let tasks = vec![pending("A"), pending("B"), pending("C"), completed("D")];
    let out = reorder_pending(&tasks, tasks[1].id, tasks[3].id);
    assert_eq!(out, tasks);

    let out = reorder_pending(&tasks, tasks[3].id, tasks[0].id);
    assert_eq!(out, tasks);
}

#[test]
fn unknown_ids_are_a_no_op() {
    let tasks = abcd();
    assert!(move_pending(&tasks, Uuid::new_v4(), tasks[0].id).is_none());
    assert!(move_pending(&tasks, tasks[0].id, Uuid::new_v4()).is_none());
}

#[test]
fn completed_tasks_end_up_after_pending_in_their_own_order() {
    let tasks = vec![
        completed("X"),
        pending("A"),
        completed("Y"),
        pending("B"),
        pending("C"),
    ];
    let out = reorder_pending(&tasks, tasks[4].id, tasks[1].id);
    assert_eq!(titles(&out), vec!["C", "A", "B", "X", "Y"]);
}

#[test]
fn reorder_is_a_bijection() {
    let tasks = vec![
        pending("A"),
        completed("X"),
        pending("B"),
        pending("C"),
        completed("Y"),
        pending("D"),
    ];
    let out = reorder_pending(&tasks, tasks[0].id, tasks[5].id);
    assert_eq!(out.len(), tasks.len());

    let before: HashSet<(Uuid, bool)> = tasks.iter().map(|t| (t.id, t.completed)).collect();
    let after: HashSet<(Uuid, bool)> = out.iter().map(|t| (t.id, t.completed)).collect();
    assert_eq!(before, after);
    assert_eq!(titles(&out), vec!["B", "C", "D", "A", "X", "Y"]);
}

#[test]
fn assign_order_numbers_pending_only() {
    let tasks = vec![pending("A"), completed("X"), pending("B")];
    let order = assign_order(&tasks);
    assert_eq!(order, vec![(tasks[0].id, 0), (tasks[2].id, 1)]);
}

#[test]
fn restore_manual_order_prefers_explicit_positions() {
    let mut a = pending("A");
    let mut b = pending("B");
    let c = pending("C");
    let x = completed("X");
    a.order = Some(1);
    b.order = Some(0);

    let out = restore_manual_order(vec![x, a, c, b]);
    assert_eq!(titles(&out), vec!["B", "A", "C", "X"]);
}

#[test]
fn persisted_order_survives_a_fresh_snapshot() {
    let mut store = MemoryStore::new();
    for title in ["A", "B", "C"] {
        store
            .create(
                "ana",
                NewTask {
                    title: title.to_string(),
                    ..NewTask::default()
                },
            )
            .expect("create");
    }
    let tasks = store.snapshot("ana");
    let moved = reorder_pending(&tasks, tasks[2].id, tasks[0].id);

    let report = persist_order(&mut store, "ana", &moved);
    assert!(report.is_complete());
    assert_eq!(report.written.len(), 3);

    let reloaded = restore_manual_order(store.snapshot("ana"));
    assert_eq!(titles(&reloaded), vec!["C", "A", "B"]);

    let again = persist_order(&mut store, "ana", &reloaded);
    assert!(again.written.is_empty());
    assert_eq!(again.unchanged, 3);
}

struct FlakyStore {
    inner: MemoryStore,
    failing: HashSet<Uuid>,
}

impl TaskStore for FlakyStore {
    fn subscribe(&mut self, owner: &str) -> Result<Subscription, StoreError> {
        self.inner.subscribe(owner)
    }

    fn create(&mut self, owner: &str, task: NewTask) -> Result<Uuid, StoreError> {
        self.inner.create(owner, task)
    }

    fn update(&mut self, owner: &str, id: Uuid, patch: &TaskPatch) -> Result<(), StoreError> {
        if self.failing.contains(&id) {
            return Err(StoreError::Unavailable("network down".to_string()));
        }
        self.inner.update(owner, id, patch)
    }

    fn delete(&mut self, owner: &str, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete(owner, id)
    }
}

#[test]
fn partial_order_writes_are_reported_not_rolled_back() {
    let mut store = FlakyStore {
        inner: MemoryStore::new(),
        failing: HashSet::new(),
    };
    for title in ["A", "B", "C"] {
        store
            .create(
                "ana",
                NewTask {
                    title: title.to_string(),
                    ..NewTask::default()
                },
            )
            .expect("create");
    }
    let tasks = store.inner.snapshot("ana");
    store.failing.insert(tasks[1].id);

    let moved = reorder_pending(&tasks, tasks[0].id, tasks[2].id);
    let report = persist_order(&mut store, "ana", &moved);

    assert!(!report.is_complete());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, tasks[1].id);
    assert_eq!(report.written.len(), 2);

    let stored = store.inner.snapshot("ana");
    assert!(stored.iter().find(|t| t.id == tasks[1].id).expect("B").order.is_none());
    assert_eq!(stored.iter().find(|t| t.id == tasks[0].id).expect("A").order, Some(2));
}
