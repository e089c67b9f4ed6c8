use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_project_date, format_project_datetime};
use crate::report::{Summary, format_minutes};
use crate::task::{Priority, Task};
use crate::timer::TimerSnapshot;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table(
        &mut self,
        heading: &str,
        tasks: &[Task],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{heading} ({})", tasks.len())?;
        if tasks.is_empty() {
            writeln!(out)?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Pri".to_string(),
            "Due".to_string(),
            "Subject".to_string(),
            "Title".to_string(),
            "Est".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let due = task.due_date.map(format_project_date).unwrap_or_default();
            let due = match task.due_date {
                Some(task_due) if task_due < now && !task.completed => self.paint(&due, "31"),
                _ => due,
            };

            let priority = match task.priority {
                Priority::High => self.paint("H", "31"),
                Priority::Medium => "M".to_string(),
                Priority::Low => self.paint("L", "2"),
            };

            let title = if task.reminder {
                format!("{} (!)", task.title)
            } else {
                task.title.clone()
            };

            rows.push(vec![
                self.paint(&task.short_id(), "33"),
                priority,
                due,
                task.subject.clone().unwrap_or_default(),
                title,
                task.estimated_time.clone().unwrap_or_default(),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        writeln!(out)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id         {}", task.id)?;
        writeln!(out, "title      {}", task.title)?;
        writeln!(out, "subject    {}", task.subject.clone().unwrap_or_default())?;
        writeln!(out, "priority   {}", task.priority)?;
        writeln!(out, "completed  {}", task.completed)?;

        if let Some(due) = task.due_date {
            writeln!(out, "due        {}", format_project_date(due))?;
        }
        if let Some(estimate) = &task.estimated_time {
            writeln!(out, "estimate   {estimate}")?;
        }
        if let Some(at) = task.reminder_time.filter(|_| task.reminder) {
            writeln!(out, "reminder   {}", format_project_datetime(at))?;
        }
        if let Some(created) = task.created_at {
            writeln!(out, "created    {}", format_project_datetime(created))?;
        }
        if let Some(done) = task.completed_at {
            writeln!(out, "done       {}", format_project_datetime(done))?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, summary))]
    pub fn print_summary(&mut self, summary: &Summary) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "pending     {}", summary.pending)?;
        writeln!(out, "completed   {}", summary.completed)?;
        let overdue = summary.overdue.to_string();
        let overdue = if summary.overdue > 0 {
            self.paint(&overdue, "31")
        } else {
            overdue
        };
        writeln!(out, "overdue     {overdue}")?;
        writeln!(out, "due today   {}", summary.due_today)?;
        writeln!(
            out,
            "estimated   {} pending, {} done",
            format_minutes(summary.estimated_pending_min),
            format_minutes(summary.estimated_done_min)
        )?;
        if summary.unparsed_estimates > 0 {
            writeln!(out, "unreadable estimates: {}", summary.unparsed_estimates)?;
        }

        if !summary.subjects.is_empty() {
            writeln!(out)?;
            let rows = summary
                .subjects
                .iter()
                .map(|(subject, count)| vec![subject.clone(), count.to_string()])
                .collect();
            write_table(&mut out, vec!["Subject".to_string(), "Pending".to_string()], rows)?;
        }

        Ok(())
    }

    /// Redraws the countdown in place.
    pub fn print_timer(&mut self, snapshot: &TimerSnapshot) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let state = if snapshot.running { "running" } else { "paused" };
        let clock = self.paint(&snapshot.remaining.to_string(), "1");
        write!(
            out,
            "\r{:<12} {clock}  {state:<8} pomodoros: {}",
            snapshot.mode.label(),
            snapshot.pomodoros_completed
        )?;
        out.flush()?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
