use std::collections::BTreeMap;

use chrono::{
  DateTime,
  Utc
};

use crate::datetime::same_project_day;
use crate::estimate::parse_minutes;
use crate::task::Task;

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct Summary {
  pub pending:                usize,
  pub completed:              usize,
  pub overdue:                usize,
  pub due_today:              usize,
  pub estimated_pending_min:  u64,
  pub estimated_done_min:     u64,
  pub unparsed_estimates:     usize,
  pub subjects:
    Vec<(String, usize)>
}

/// Aggregate figures over an owner's
/// tasks. Estimates only feed these
/// totals; they never affect ordering.
#[must_use]
pub fn summarize(
  tasks: &[Task],
  now: DateTime<Utc>
) -> Summary {
  let mut summary = Summary::default();
  let mut subjects = BTreeMap::new();

  for task in tasks {
    let minutes = match task
      .estimated_time
      .as_deref()
    {
      | Some(raw) => {
        let parsed = parse_minutes(raw);
        if parsed.is_none() {
          summary.unparsed_estimates += 1;
        }
        u64::from(
          parsed.unwrap_or_default()
        )
      }
      | None => 0
    };

    if task.completed {
      summary.completed += 1;
      summary.estimated_done_min +=
        minutes;
      continue;
    }

    summary.pending += 1;
    summary.estimated_pending_min +=
      minutes;

    if let Some(due) = task.due_date {
      if same_project_day(due, now) {
        summary.due_today += 1;
      }
      if due < now {
        summary.overdue += 1;
      }
    }

    if let Some(subject) =
      task.subject.as_ref()
    {
      *subjects
        .entry(subject.clone())
        .or_insert(0_usize) += 1;
    }
  }

  summary.subjects =
    subjects.into_iter().collect();
  summary
}

/// Pending tasks whose reminder time has
/// arrived, earliest first.
#[must_use]
pub fn due_reminders(
  tasks: &[Task],
  now: DateTime<Utc>
) -> Vec<Task> {
  let mut due: Vec<Task> = tasks
    .iter()
    .filter(|task| {
      task.is_pending()
        && task.reminder
        && task
          .reminder_time
          .is_some_and(|at| at <= now)
    })
    .cloned()
    .collect();
  due.sort_by_key(|task| {
    task.reminder_time
  });
  due
}

/// `95` -> `1h35m`.
#[must_use]
pub fn format_minutes(
  minutes: u64
) -> String {
  match (minutes / 60, minutes % 60) {
    | (0, m) => format!("{m}m"),
    | (h, 0) => format!("{h}h"),
    | (h, m) => format!("{h}h{m:02}m")
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };

  use super::{
    due_reminders,
    format_minutes,
    summarize
  };
  use crate::task::Task;

  #[test]
  fn summary_counts_pending_work() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 3, 10, 12, 0, 0
      )
      .single()
      .expect("valid now");

    let mut late =
      Task::new("Problem set", now);
    late.subject =
      Some("Math".to_string());
    late.due_date =
      Some(now - Duration::hours(1));
    late.estimated_time =
      Some("1h30m".to_string());
    late.reminder = true;
    late.reminder_time =
      Some(now - Duration::minutes(5));

    let mut later =
      Task::new("Flashcards", now);
    later.subject =
      Some("Math".to_string());
    later.estimated_time =
      Some("someday".to_string());
    later.reminder = true;
    later.reminder_time =
      Some(now + Duration::hours(2));

    let mut done =
      Task::new("Essay", now);
    done.completed = true;
    done.completed_at = Some(now);
    done.estimated_time =
      Some("45m".to_string());

    let tasks = vec![late, later, done];
    let summary = summarize(&tasks, now);
    assert_eq!(summary.pending, 2);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.overdue, 1);
    assert_eq!(summary.due_today, 1);
    assert_eq!(
      summary.estimated_pending_min,
      90
    );
    assert_eq!(
      summary.estimated_done_min,
      45
    );
    assert_eq!(
      summary.unparsed_estimates,
      1
    );
    assert_eq!(
      summary.subjects,
      vec![("Math".to_string(), 2)]
    );

    let reminders =
      due_reminders(&tasks, now);
    assert_eq!(reminders.len(), 1);
    assert_eq!(
      reminders[0].title,
      "Problem set"
    );
  }

  #[test]
  fn formats_minutes() {
    assert_eq!(format_minutes(0), "0m");
    assert_eq!(format_minutes(45), "45m");
    assert_eq!(format_minutes(120), "2h");
    assert_eq!(
      format_minutes(95),
      "1h35m"
    );
  }
}
