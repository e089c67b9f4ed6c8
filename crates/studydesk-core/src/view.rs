use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Duration,
  Utc
};
use tracing::trace;

use crate::datetime::same_project_day;
use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum ViewMode {
  #[default]
  All,
  Today,
  Week,
  Subject,
  Completed
}

impl ViewMode {
  pub fn as_str(self) -> &'static str {
    match self {
      | ViewMode::All => "all",
      | ViewMode::Today => "today",
      | ViewMode::Week => "week",
      | ViewMode::Subject => "subject",
      | ViewMode::Completed => {
        "completed"
      }
    }
  }
}

impl fmt::Display for ViewMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ViewMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(ViewMode::All),
      | "today" => Ok(ViewMode::Today),
      | "week" => Ok(ViewMode::Week),
      | "subject" => {
        Ok(ViewMode::Subject)
      }
      | "completed" | "done" => {
        Ok(ViewMode::Completed)
      }
      | other => Err(anyhow!(
        "unknown view mode: {other}"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum SortKey {
  #[default]
  CreatedAt,
  DueDate,
  Priority,
  /// Keeps input order, i.e. store
  /// iteration order or the manual
  /// order a drag produced.
  Manual
}

impl FromStr for SortKey {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "createdat" | "created_at"
      | "created" => {
        Ok(SortKey::CreatedAt)
      }
      | "duedate" | "due_date"
      | "due" => Ok(SortKey::DueDate),
      | "priority" => {
        Ok(SortKey::Priority)
      }
      | "manual" | "order" => {
        Ok(SortKey::Manual)
      }
      | other => Err(anyhow!(
        "unknown sort key: {other}"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum SortOrder {
  #[default]
  Asc,
  Desc
}

impl FromStr for SortOrder {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "asc" | "+" => {
        Ok(SortOrder::Asc)
      }
      | "desc" | "-" => {
        Ok(SortOrder::Desc)
      }
      | other => Err(anyhow!(
        "unknown sort order: {other}"
      ))
    }
  }
}

#[derive(
  Debug, Clone, Default, PartialEq,
)]
pub struct ViewConfig {
  pub mode:           ViewMode,
  pub filter_subject: Option<String>,
  pub search_term:    String,
  pub sort_by:        SortKey,
  pub sort_order:     SortOrder
}

/// Display-ready split of a filtered,
/// sorted task list.
#[derive(
  Debug, Clone, Default, PartialEq,
)]
pub struct TaskView {
  pub pending:   Vec<Task>,
  pub completed: Vec<Task>
}

impl TaskView {
  pub fn len(&self) -> usize {
    self.pending.len()
      + self.completed.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Filters and sorts `tasks` for
/// display. Pure: the same inputs always
/// give the same output, and nothing is
/// ever rejected as malformed.
#[must_use]
pub fn filter_and_sort(
  tasks: &[Task],
  cfg: &ViewConfig,
  now: DateTime<Utc>
) -> Vec<Task> {
  let needle =
    cfg.search_term.to_lowercase();

  let mut out: Vec<Task> = tasks
    .iter()
    .filter(|task| {
      needle.is_empty()
        || matches_search(task, &needle)
    })
    .filter(|task| {
      matches_mode(task, cfg, now)
    })
    .cloned()
    .collect();

  out.sort_by(|a, b| {
    let ordering =
      compare_on_key(a, b, cfg.sort_by);
    match cfg.sort_order {
      | SortOrder::Asc => ordering,
      | SortOrder::Desc => {
        ordering.reverse()
      }
    }
  });

  trace!(
    mode = %cfg.mode,
    input = tasks.len(),
    output = out.len(),
    "computed task view"
  );
  out
}

/// Runs [`filter_and_sort`] and splits
/// the result into pending and completed
/// lists, keeping the sorted order.
#[must_use]
pub fn compute_view(
  tasks: &[Task],
  cfg: &ViewConfig,
  now: DateTime<Utc>
) -> TaskView {
  let (completed, pending) =
    filter_and_sort(tasks, cfg, now)
      .into_iter()
      .partition(|task| task.completed);
  TaskView {
    pending,
    completed
  }
}

fn matches_search(
  task: &Task,
  needle: &str
) -> bool {
  task
    .title
    .to_lowercase()
    .contains(needle)
    || task.subject.as_deref().is_some_and(
      |subject| {
        subject
          .to_lowercase()
          .contains(needle)
      }
    )
}

fn matches_mode(
  task: &Task,
  cfg: &ViewConfig,
  now: DateTime<Utc>
) -> bool {
  match cfg.mode {
    | ViewMode::All => !task.completed,
    | ViewMode::Today => {
      !task.completed
        && task.due_date.is_some_and(
          |due| same_project_day(due, now)
        )
    }
    | ViewMode::Week => {
      let horizon =
        now + Duration::days(7);
      !task.completed
        && task.due_date.is_some_and(
          |due| due > now && due < horizon
        )
    }
    | ViewMode::Subject => {
      // An unset subject filter matches
      // tasks without a subject.
      !task.completed
        && task
          .subject
          .as_deref()
          .unwrap_or_default()
          == cfg
            .filter_subject
            .as_deref()
            .unwrap_or_default()
    }
    | ViewMode::Completed => {
      task.completed
    }
  }
}

fn compare_on_key(
  a: &Task,
  b: &Task,
  key: SortKey
) -> Ordering {
  match key {
    | SortKey::CreatedAt => {
      cmp_missing_last(
        a.created_at.as_ref(),
        b.created_at.as_ref()
      )
    }
    | SortKey::DueDate => {
      cmp_missing_last(
        a.due_date.as_ref(),
        b.due_date.as_ref()
      )
    }
    | SortKey::Priority => {
      a.priority
        .rank()
        .cmp(&b.priority.rank())
    }
    | SortKey::Manual => Ordering::Equal
  }
}

/// Absent values compare as infinitely
/// late.
fn cmp_missing_last<T: Ord>(
  left: Option<&T>,
  right: Option<&T>
) -> Ordering {
  match (left, right) {
    | (Some(a), Some(b)) => a.cmp(b),
    | (Some(_), None) => Ordering::Less,
    | (None, Some(_)) => {
      Ordering::Greater
    }
    | (None, None) => Ordering::Equal
  }
}
