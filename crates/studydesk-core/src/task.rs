use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::stamp_serde;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Numeric rank used for sorting: high=3, medium=2, low=1.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "h" => Ok(Priority::High),
            "medium" | "m" => Ok(Priority::Medium),
            "low" | "l" => Ok(Priority::Low),
            other => Err(anyhow!("unknown priority: {other} (expected high, medium or low)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,

    pub title: String,

    #[serde(default)]
    pub subject: Option<String>,

    #[serde(default, with = "stamp_serde")]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub estimated_time: Option<String>,

    #[serde(default)]
    pub reminder: bool,

    #[serde(default, with = "stamp_serde")]
    pub reminder_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed: bool,

    #[serde(default, with = "stamp_serde")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, with = "stamp_serde")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub order: Option<i64>,
}

impl Task {
    /// A pending task with a fresh id and default fields.
    pub fn new(title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        NewTask {
            title: title.into(),
            created_at: Some(created_at),
            ..NewTask::default()
        }
        .into_task(Uuid::new_v4())
    }

    pub fn is_pending(&self) -> bool {
        !self.completed
    }

    pub fn short_id(&self) -> String {
        let mut text = self.id.simple().to_string();
        text.truncate(8);
        text
    }
}

/// Everything a store needs to create a record. The store assigns the id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub subject: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub estimated_time: Option<String>,
    pub reminder: bool,
    pub reminder_time: Option<DateTime<Utc>>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub order: Option<i64>,
}

impl NewTask {
    pub fn into_task(self, id: Uuid) -> Task {
        Task {
            id,
            title: self.title,
            subject: self.subject,
            due_date: self.due_date,
            priority: self.priority,
            estimated_time: self.estimated_time,
            reminder: self.reminder,
            reminder_time: self.reminder_time,
            completed: self.completed,
            completed_at: self.completed_at,
            created_at: self.created_at,
            order: self.order,
        }
    }
}

/// User-supplied fields for a new task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub subject: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub estimated_time: Option<String>,
    pub reminder: bool,
    pub reminder_time: Option<DateTime<Utc>>,
}

impl TaskDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update. `None` leaves a field alone; for clearable fields
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub subject: Option<Option<String>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub priority: Option<Priority>,
    pub estimated_time: Option<Option<String>>,
    pub reminder: Option<bool>,
    pub reminder_time: Option<Option<DateTime<Utc>>>,
    pub completed: Option<bool>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub order: Option<Option<i64>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn order(order: i64) -> Self {
        Self {
            order: Some(Some(order)),
            ..Self::default()
        }
    }

    /// Merges the patch into `task`. `id` and `created_at` are never touched.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(subject) = &self.subject {
            task.subject = subject.clone();
        }
        if let Some(due) = self.due_date {
            task.due_date = due;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(estimate) = &self.estimated_time {
            task.estimated_time = estimate.clone();
        }
        if let Some(reminder) = self.reminder {
            task.reminder = reminder;
        }
        if let Some(reminder_time) = self.reminder_time {
            task.reminder_time = reminder_time;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
        if let Some(order) = self.order {
            task.order = order;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Priority, Task, TaskPatch};

    #[test]
    fn missing_fields_take_defaults() {
        let raw = r#"{"id":"6f1c1a8e-3f0a-4a57-9d0c-0f3a8f7e2b11","title":"Read chapter 3"}"#;
        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.priority, Priority::Medium);
        assert!(!task.completed);
        assert!(task.created_at.is_none());
        assert!(task.order.is_none());
    }

    #[test]
    fn bad_timestamp_reads_as_absent() {
        let raw = r#"{"id":"6f1c1a8e-3f0a-4a57-9d0c-0f3a8f7e2b11","title":"x","dueDate":"next week-ish","createdAt":"20260101T080000Z"}"#;
        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert!(task.due_date.is_none());
        assert!(task.created_at.is_some());
    }

    #[test]
    fn serializes_camel_case_with_compact_stamps() {
        let created = Utc
            .with_ymd_and_hms(2026, 1, 5, 9, 30, 0)
            .single()
            .expect("valid time");
        let task = Task::new("Flashcards", created);
        let json = serde_json::to_value(&task).expect("serialize");
        assert_eq!(json["createdAt"], "20260105T093000Z");
        assert_eq!(json["priority"], "medium");
        assert!(json.get("completedAt").is_some());
    }

    #[test]
    fn patch_clears_and_sets() {
        let mut task = Task::new("Essay", Utc::now());
        task.subject = Some("History".to_string());
        let patch = TaskPatch {
            subject: Some(None),
            priority: Some(Priority::High),
            ..TaskPatch::default()
        };
        patch.apply_to(&mut task);
        assert!(task.subject.is_none());
        assert_eq!(task.priority, Priority::High);
        assert!(TaskPatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn priority_parses_short_forms() {
        assert_eq!("H".parse::<Priority>().expect("parse"), Priority::High);
        assert_eq!("low".parse::<Priority>().expect("parse"), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }
}
