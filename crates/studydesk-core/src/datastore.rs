use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::{StoreError, Subscribers, Subscription, TaskStore};
use crate::task::{NewTask, Task, TaskPatch};

/// Durable JSONL store: one `<owner>.data` file per owner inside `data_dir`.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    subscribers: Subscribers,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened datastore");

        Ok(Self {
            data_dir,
            subscribers: Subscribers::default(),
        })
    }

    pub fn owner_path(&self, owner: &str) -> Result<PathBuf, StoreError> {
        let valid = !owner.is_empty()
            && owner
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !owner.starts_with('.');
        if !valid {
            return Err(StoreError::Unavailable(format!(
                "invalid owner name: {owner:?}"
            )));
        }
        Ok(self.data_dir.join(format!("{owner}.data")))
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self, owner: &str) -> Result<Vec<Task>, StoreError> {
        let path = self.owner_path(owner)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        load_jsonl(&path)
    }

    #[tracing::instrument(skip(self, tasks))]
    fn save(&mut self, owner: &str, tasks: &[Task]) -> Result<(), StoreError> {
        let path = self.owner_path(owner)?;
        save_jsonl_atomic(&path, tasks)?;
        self.subscribers.publish(owner, tasks);
        Ok(())
    }
}

impl TaskStore for DataStore {
    #[tracing::instrument(skip(self))]
    fn subscribe(&mut self, owner: &str) -> Result<Subscription, StoreError> {
        let initial = self.load(owner)?;
        Ok(self.subscribers.register(owner, initial))
    }

    #[tracing::instrument(skip(self, task), fields(title = %task.title))]
    fn create(&mut self, owner: &str, task: NewTask) -> Result<Uuid, StoreError> {
        let mut tasks = self.load(owner)?;
        let id = Uuid::new_v4();
        tasks.push(task.into_task(id));
        self.save(owner, &tasks)?;
        debug!(%id, count = tasks.len(), "task created");
        Ok(id)
    }

    #[tracing::instrument(skip(self, patch))]
    fn update(&mut self, owner: &str, id: Uuid, patch: &TaskPatch) -> Result<(), StoreError> {
        let mut tasks = self.load(owner)?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound { id })?;
        patch.apply_to(task);
        self.save(owner, &tasks)
    }

    #[tracing::instrument(skip(self))]
    fn delete(&mut self, owner: &str, id: Uuid) -> Result<(), StoreError> {
        let mut tasks = self.load(owner)?;
        let idx = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(StoreError::NotFound { id })?;
        tasks.remove(idx);
        self.save(owner, &tasks)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> Result<Vec<Task>, StoreError> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let task: Task = serde_json::from_str(trimmed).map_err(|err| StoreError::Corrupt {
            source_name: path.display().to_string(),
            line: idx + 1,
            reason: err.to_string(),
        })?;
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, tasks))]
fn save_jsonl_atomic(path: &Path, tasks: &[Task]) -> Result<(), StoreError> {
    debug!(file = %path.display(), count = tasks.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for task in tasks {
        let serialized = serde_json::to_string(task).map_err(std::io::Error::other)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path).map_err(|err| StoreError::Io(err.error))?;

    Ok(())
}
