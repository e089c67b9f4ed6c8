use tracing::{
  debug,
  instrument,
  warn
};
use uuid::Uuid;

use crate::store::{
  StoreError,
  TaskStore
};
use crate::task::{
  Task,
  TaskPatch
};

/// Moves `dragged` to the slot held by
/// `target` inside the pending list.
///
/// Returns `None` when the drag is a
/// no-op: same id twice, an unknown id,
/// or either task already completed.
/// Otherwise the result is the reordered
/// pending tasks followed by the
/// completed tasks in their input order.
#[must_use]
pub fn move_pending(
  tasks: &[Task],
  dragged: Uuid,
  target: Uuid
) -> Option<Vec<Task>> {
  if dragged == target {
    return None;
  }

  let (mut pending, completed): (
    Vec<Task>,
    Vec<Task>
  ) = tasks
    .iter()
    .cloned()
    .partition(Task::is_pending);

  let from = pending
    .iter()
    .position(|t| t.id == dragged)?;
  let to = pending
    .iter()
    .position(|t| t.id == target)?;

  let moved = pending.remove(from);
  pending.insert(to, moved);
  debug!(
    %dragged,
    %target,
    from,
    to,
    "moved pending task"
  );

  pending.extend(completed);
  Some(pending)
}

/// Like [`move_pending`] but hands the
/// input back unchanged for a no-op drag.
#[must_use]
pub fn reorder_pending(
  tasks: &[Task],
  dragged: Uuid,
  target: Uuid
) -> Vec<Task> {
  move_pending(tasks, dragged, target)
    .unwrap_or_else(|| tasks.to_vec())
}

/// Numbers pending tasks `0..n` in
/// their current order.
#[must_use]
pub fn assign_order(
  tasks: &[Task]
) -> Vec<(Uuid, i64)> {
  tasks
    .iter()
    .filter(|t| t.is_pending())
    .zip(0_i64..)
    .map(|(task, idx)| (task.id, idx))
    .collect()
}

/// Puts pending tasks carrying an
/// explicit `order` first (ascending),
/// then the remaining pending tasks in
/// input order, then completed tasks.
#[must_use]
pub fn restore_manual_order(
  tasks: Vec<Task>
) -> Vec<Task> {
  let (mut pending, completed): (
    Vec<Task>,
    Vec<Task>
  ) = tasks
    .into_iter()
    .partition(Task::is_pending);
  pending.sort_by_key(|t| {
    (t.order.is_none(), t.order)
  });
  pending.extend(completed);
  pending
}

#[derive(Debug, Default)]
pub struct OrderWriteReport {
  pub written:   Vec<Uuid>,
  pub unchanged: usize,
  pub failed:    Vec<(Uuid, StoreError)>
}

impl OrderWriteReport {
  pub fn is_complete(&self) -> bool {
    self.failed.is_empty()
  }
}

/// Writes the current pending order
/// back as per-task `order` fields.
///
/// Each write is independent; a failure
/// is recorded and the remaining writes
/// still go out. Nothing is rolled back.
#[instrument(skip(store, tasks))]
pub fn persist_order<S>(
  store: &mut S,
  owner: &str,
  tasks: &[Task]
) -> OrderWriteReport
where
  S: TaskStore + ?Sized
{
  let mut report =
    OrderWriteReport::default();

  for (id, order) in assign_order(tasks)
  {
    let current = tasks
      .iter()
      .find(|t| t.id == id)
      .and_then(|t| t.order);
    if current == Some(order) {
      report.unchanged += 1;
      continue;
    }

    match store.update(
      owner,
      id,
      &TaskPatch::order(order)
    ) {
      | Ok(()) => report.written.push(id),
      | Err(err) => {
        warn!(
          %id,
          order,
          error = %err,
          "failed to persist task order"
        );
        report.failed.push((id, err));
      }
    }
  }

  debug!(
    written = report.written.len(),
    unchanged = report.unchanged,
    failed = report.failed.len(),
    "persisted manual order"
  );
  report
}
