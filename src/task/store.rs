//! Persistent task store
//!
//! The store is the only state that outlives a run. `FileTaskStore` keeps
//! one JSON document per task and one per result bundle, written
//! atomically while holding an advisory lock on the store directory.

use super::Task;
use crate::error::StoreError;
use crate::pipeline::TaskResults;
use crate::util::write_atomic;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

const LOCK_TIMEOUT_SECS: u64 = 5;
const LOCK_RETRY_MS: u64 = 50;
const TASKS_DIR: &str = "tasks";
const RESULTS_DIR: &str = "results";

pub trait TaskStore: Send + Sync {
    fn save_task(&self, task: &Task) -> Result<(), StoreError>;
    fn load_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;
    /// All tasks, newest first
    fn list_tasks(&self) -> Result<Vec<Task>, StoreError>;
    fn save_results(&self, id: Uuid, results: &TaskResults) -> Result<(), StoreError>;
    fn load_results(&self, id: Uuid) -> Result<Option<TaskResults>, StoreError>;
}

/// JSON files under one directory
pub struct FileTaskStore {
    dir: PathBuf,
}

struct StoreLock {
    file: fs::File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FileTaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dirs(&self) -> Result<(), StoreError> {
        for sub in [TASKS_DIR, RESULTS_DIR] {
            let path = self.dir.join(sub);
            fs::create_dir_all(&path).map_err(io_error(&path))?;
        }
        Ok(())
    }

    fn lock(&self, exclusive: bool) -> Result<StoreLock, StoreError> {
        self.ensure_dirs()?;
        let lock_path = self.dir.join(".lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(io_error(&lock_path))?;

        let start = Instant::now();
        loop {
            let result = if exclusive {
                FileExt::try_lock_exclusive(&file)
            } else {
                FileExt::try_lock_shared(&file)
            };
            match result {
                Ok(()) => break,
                Err(err) => {
                    if err.kind() != ErrorKind::WouldBlock {
                        return Err(io_error(&lock_path)(err));
                    }
                    if start.elapsed() >= Duration::from_secs(LOCK_TIMEOUT_SECS) {
                        return Err(StoreError::LockTimeout(LOCK_TIMEOUT_SECS));
                    }
                    std::thread::sleep(Duration::from_millis(LOCK_RETRY_MS));
                }
            }
        }

        Ok(StoreLock { file })
    }

    fn task_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(TASKS_DIR).join(format!("{}.json", id))
    }

    fn results_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(RESULTS_DIR).join(format!("{}.json", id))
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let _lock = self.lock(true)?;
        let content = serde_json::to_string_pretty(value).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomic(path, &content).map_err(io_error(path))
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        let _lock = self.lock(false)?;
        read_json_unlocked(path)
    }
}

fn read_json_unlocked<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_error(path)(err)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

impl TaskStore for FileTaskStore {
    fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        self.write_json(&self.task_path(task.id), task)
    }

    fn load_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        self.read_json(&self.task_path(id))
    }

    fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let _lock = self.lock(false)?;
        let dir = self.dir.join(TASKS_DIR);
        let entries = fs::read_dir(&dir).map_err(io_error(&dir))?;

        let mut tasks = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json_unlocked::<Task>(&path) {
                Ok(Some(task)) => tasks.push(task),
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "Skipping unreadable task record"),
            }
        }
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    fn save_results(&self, id: Uuid, results: &TaskResults) -> Result<(), StoreError> {
        self.write_json(&self.results_path(id), results)
    }

    fn load_results(&self, id: Uuid) -> Result<Option<TaskResults>, StoreError> {
        self.read_json(&self.results_path(id))
    }
}

/// In-process store
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<Uuid, Task>>,
    results: Mutex<HashMap<Uuid, TaskResults>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryTaskStore {
    fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().map_err(|_| StoreError::Poisoned)?;
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    fn load_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(tasks.get(&id).cloned())
    }

    fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.lock().map_err(|_| StoreError::Poisoned)?;
        let mut list: Vec<Task> = tasks.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    fn save_results(&self, id: Uuid, results: &TaskResults) -> Result<(), StoreError> {
        let mut all = self.results.lock().map_err(|_| StoreError::Poisoned)?;
        all.insert(id, results.clone());
        Ok(())
    }

    fn load_results(&self, id: Uuid) -> Result<Option<TaskResults>, StoreError> {
        let all = self.results.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(all.get(&id).cloned())
    }
}
