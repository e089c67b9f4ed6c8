use std::io::{
  self,
  BufRead,
  Write
};
use std::time::Instant;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Utc
};
use tracing::{
  debug,
  info,
  instrument,
  warn
};

use crate::cli::{
  AddArgs,
  Command,
  EditArgs,
  FocusArgs,
  ListArgs
};
use crate::config::Config;
use crate::datetime::parse_date_expr;
use crate::lifecycle::TaskLifecycle;
use crate::render::Renderer;
use crate::reorder::{
  move_pending,
  persist_order,
  restore_manual_order
};
use crate::report::{
  due_reminders,
  summarize
};
use crate::store::TaskStore;
use crate::task::{
  Task,
  TaskDraft,
  TaskPatch
};
use crate::timer::{
  FocusTimer,
  TerminalBell,
  TimerDriver
};
use crate::view::{
  TaskView,
  ViewConfig,
  compute_view
};

#[instrument(skip(
  lifecycle, cfg, renderer, command
))]
pub fn dispatch<S: TaskStore>(
  lifecycle: &mut TaskLifecycle<S>,
  cfg: &Config,
  renderer: &mut Renderer,
  command: Command
) -> anyhow::Result<()> {
  let now = Utc::now();
  debug!(
    owner = lifecycle.owner(),
    command = ?command,
    "dispatching command"
  );

  match command {
    | Command::Add(args) => {
      cmd_add(lifecycle, args, now)
    }
    | Command::Edit(args) => {
      cmd_edit(lifecycle, args, now)
    }
    | Command::Done {
      id
    } => cmd_done(lifecycle, &id, now),
    | Command::Delete {
      id
    } => cmd_delete(lifecycle, &id),
    | Command::Info {
      id
    } => {
      let tasks =
        current_tasks(lifecycle)?;
      let task =
        resolve_task(&tasks, &id)?;
      renderer.print_task_info(&task)
    }
    | Command::List(args) => {
      cmd_list(
        lifecycle, cfg, renderer, args,
        now
      )
    }
    | Command::Move {
      dragged,
      target
    } => {
      cmd_move(
        lifecycle, &dragged, &target
      )
    }
    | Command::Stats => {
      let tasks =
        current_tasks(lifecycle)?;
      renderer.print_summary(
        &summarize(&tasks, now)
      )
    }
    | Command::Reminders => {
      let tasks =
        current_tasks(lifecycle)?;
      renderer.print_task_table(
        "Reminders due",
        &due_reminders(&tasks, now),
        now
      )
    }
    | Command::Focus(args) => {
      cmd_focus(cfg, renderer, args)
    }
  }
}

/// Latest snapshot for the owner, with
/// any persisted manual order applied.
pub fn current_tasks<S: TaskStore>(
  lifecycle: &mut TaskLifecycle<S>
) -> anyhow::Result<Vec<Task>> {
  let subscription = lifecycle
    .subscribe()
    .context(
      "failed to read task snapshot"
    )?;
  Ok(restore_manual_order(
    subscription
      .latest()
      .unwrap_or_default()
  ))
}

/// Finds the single task whose id starts
/// with `prefix` (hyphens optional).
pub fn resolve_task(
  tasks: &[Task],
  prefix: &str
) -> anyhow::Result<Task> {
  let needle = prefix
    .trim()
    .to_ascii_lowercase()
    .replace('-', "");
  if needle.is_empty() {
    return Err(anyhow!(
      "task id must not be empty"
    ));
  }

  let mut matches =
    tasks.iter().filter(|task| {
      task
        .id
        .simple()
        .to_string()
        .starts_with(&needle)
    });
  let first =
    matches.next().ok_or_else(|| {
      anyhow!("no task matches id {prefix}")
    })?;
  if matches.next().is_some() {
    return Err(anyhow!(
      "id {prefix} is ambiguous; use \
       more characters"
    ));
  }
  Ok(first.clone())
}

#[instrument(skip(lifecycle, args, now))]
fn cmd_add<S: TaskStore>(
  lifecycle: &mut TaskLifecycle<S>,
  args: AddArgs,
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command add");

  let due_date = args
    .due
    .as_deref()
    .map(|raw| parse_date_expr(raw, now))
    .transpose()?;
  let reminder_time = args
    .remind
    .as_deref()
    .map(|raw| parse_date_expr(raw, now))
    .transpose()?;

  let draft = TaskDraft {
    title: args.title.join(" "),
    subject: args.subject,
    due_date,
    priority: args
      .priority
      .unwrap_or_default(),
    estimated_time: args.estimate,
    reminder: reminder_time.is_some(),
    reminder_time
  };

  let id = lifecycle.create(draft, now)?;
  let mut short = id.simple().to_string();
  short.truncate(8);
  println!("Created task {short}.");
  Ok(())
}

#[instrument(skip(lifecycle, args, now))]
fn cmd_edit<S: TaskStore>(
  lifecycle: &mut TaskLifecycle<S>,
  args: EditArgs,
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command edit");

  let tasks = current_tasks(lifecycle)?;
  let task = resolve_task(&tasks, &args.id)?;

  let mut patch = TaskPatch {
    title: args.title,
    priority: args.priority,
    ..TaskPatch::default()
  };

  if args.clear_subject {
    patch.subject = Some(None);
  } else if let Some(subject) =
    args.subject
  {
    patch.subject = Some(Some(subject));
  }

  if args.clear_due {
    patch.due_date = Some(None);
  } else if let Some(raw) = args.due {
    patch.due_date =
      Some(Some(parse_date_expr(&raw, now)?));
  }

  if args.clear_estimate {
    patch.estimated_time = Some(None);
  } else if let Some(estimate) =
    args.estimate
  {
    patch.estimated_time =
      Some(Some(estimate));
  }

  if args.no_remind {
    patch.reminder = Some(false);
  } else if let Some(raw) = args.remind {
    patch.reminder = Some(true);
    patch.reminder_time =
      Some(Some(parse_date_expr(&raw, now)?));
  }

  if patch.is_empty() {
    println!("Nothing to change.");
    return Ok(());
  }

  lifecycle.update(task.id, patch, now)?;
  println!("Updated task {}.", task.short_id());
  Ok(())
}

#[instrument(skip(lifecycle, now))]
fn cmd_done<S: TaskStore>(
  lifecycle: &mut TaskLifecycle<S>,
  id: &str,
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command done");

  let tasks = current_tasks(lifecycle)?;
  let task = resolve_task(&tasks, id)?;
  let completed = lifecycle
    .toggle_complete(&task, now)?;
  if completed {
    println!(
      "Completed task {} '{}'.",
      task.short_id(),
      task.title
    );
  } else {
    println!(
      "Reopened task {} '{}'.",
      task.short_id(),
      task.title
    );
  }
  Ok(())
}

#[instrument(skip(lifecycle))]
fn cmd_delete<S: TaskStore>(
  lifecycle: &mut TaskLifecycle<S>,
  id: &str
) -> anyhow::Result<()> {
  info!("command delete");

  let tasks = current_tasks(lifecycle)?;
  let task = resolve_task(&tasks, id)?;
  lifecycle.delete(task.id)?;
  println!(
    "Deleted task {} '{}'.",
    task.short_id(),
    task.title
  );
  Ok(())
}

/// Resolves the effective view settings
/// (config first, then flags) and
/// computes the view over the current
/// snapshot.
pub fn list_view<S: TaskStore>(
  lifecycle: &mut TaskLifecycle<S>,
  cfg: &Config,
  args: ListArgs,
  now: DateTime<Utc>
) -> anyhow::Result<(ViewConfig, TaskView)>
{
  let mut view_cfg = cfg.view_config();
  if let Some(mode) = args.view {
    view_cfg.mode = mode;
  }
  if let Some(subject) = args.subject {
    view_cfg.filter_subject =
      Some(subject);
  }
  if let Some(search) = args.search {
    view_cfg.search_term = search;
  }
  if let Some(sort) = args.sort {
    view_cfg.sort_by = sort;
  }
  if let Some(order) = args.order {
    view_cfg.sort_order = order;
  }

  let tasks = current_tasks(lifecycle)?;
  let view =
    compute_view(&tasks, &view_cfg, now);
  debug!(
    pending = view.pending.len(),
    completed = view.completed.len(),
    sort = ?view_cfg.sort_by,
    "list view computed"
  );
  Ok((view_cfg, view))
}

#[instrument(skip(
  lifecycle, cfg, renderer, args, now
))]
fn cmd_list<S: TaskStore>(
  lifecycle: &mut TaskLifecycle<S>,
  cfg: &Config,
  renderer: &mut Renderer,
  args: ListArgs,
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  let (view_cfg, view) =
    list_view(lifecycle, cfg, args, now)?;

  renderer.print_task_table(
    &format!("Pending [{}]", view_cfg.mode),
    &view.pending,
    now
  )?;
  if !view.completed.is_empty() {
    renderer.print_task_table(
      "Completed",
      &view.completed,
      now
    )?;
  }
  Ok(())
}

/// Drags the task matching `dragged`
/// onto the slot of `target` and writes
/// the new pending order back.
///
/// Returns the two resolved tasks, or
/// `None` when the drag was a no-op. A
/// partial write is an error naming how
/// many positions were saved.
pub fn move_task<S: TaskStore>(
  lifecycle: &mut TaskLifecycle<S>,
  dragged: &str,
  target: &str
) -> anyhow::Result<Option<(Task, Task)>>
{
  let tasks = current_tasks(lifecycle)?;
  let dragged = resolve_task(&tasks, dragged)?;
  let target = resolve_task(&tasks, target)?;

  let Some(reordered) = move_pending(
    &tasks, dragged.id, target.id
  ) else {
    return Ok(None);
  };

  let owner = lifecycle.owner().to_string();
  let report = persist_order(
    lifecycle.store_mut(),
    &owner,
    &reordered
  );
  if !report.is_complete() {
    for (id, err) in &report.failed {
      warn!(%id, error = %err, "order write failed");
    }
    return Err(anyhow!(
      "saved order for {} of {} tasks; \
       run the move again to retry",
      report.written.len()
        + report.unchanged,
      report.written.len()
        + report.unchanged
        + report.failed.len()
    ));
  }

  Ok(Some((dragged, target)))
}

#[instrument(skip(lifecycle))]
fn cmd_move<S: TaskStore>(
  lifecycle: &mut TaskLifecycle<S>,
  dragged: &str,
  target: &str
) -> anyhow::Result<()> {
  info!("command move");

  match move_task(
    lifecycle, dragged, target
  )? {
    | Some((dragged, target)) => {
      println!(
        "Moved '{}' to the slot of '{}'.",
        dragged.title, target.title
      );
    }
    | None => {
      println!(
        "Nothing moved: both tasks must \
         be different and pending."
      );
    }
  }
  Ok(())
}

#[instrument(skip(cfg, renderer, args))]
fn cmd_focus(
  cfg: &Config,
  renderer: &mut Renderer,
  args: FocusArgs
) -> anyhow::Result<()> {
  let mut settings = cfg.timer_settings();
  if args.mute {
    settings.muted = true;
  }

  let mut driver = TimerDriver::new(
    FocusTimer::new(
      settings,
      Box::new(TerminalBell)
    )
  );
  let mut display = renderer.clone();
  driver.on_tick(move |snapshot| {
    if let Err(err) =
      display.print_timer(snapshot)
    {
      warn!(error = %err, "failed to draw timer");
    }
  });
  driver.select_mode(args.mode);

  let stdin = io::stdin();
  for session in 0..args.sessions {
    if session > 0 {
      print!(
        "\nPress Enter to start the {}. ",
        driver.timer().mode()
      );
      io::stdout().flush()?;
      let mut line = String::new();
      if stdin.lock().read_line(&mut line)?
        == 0
      {
        break;
      }
    }

    driver.start(Instant::now());
    loop {
      if let Some(deadline) =
        driver.next_deadline()
      {
        let wait = deadline
          .saturating_duration_since(
            Instant::now()
          );
        std::thread::sleep(wait);
      }
      if let Some(end) =
        driver.poll(Instant::now())
      {
        println!(
          "\n{} finished; next up: {}.",
          end.finished, end.next
        );
        break;
      }
      if !driver.is_armed() {
        break;
      }
    }
  }

  println!();
  Ok(())
}
