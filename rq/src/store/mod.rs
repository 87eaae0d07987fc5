//! TaskStore - durable task registry with per-task storage
//!
//! Every mutation rewrites the whole registry file atomically. Each task owns
//! a directory named by its storage ID:
//!
//! ```text
//! <root>/
//! ├── tasks.json              # registry envelope { version, tasks }
//! ├── .lock                   # held by mutating commands
//! └── tasks/
//!     └── {storage_id}/
//!         ├── {input name}    # copy of the submitted document
//!         ├── chunks.json     # chunk manifest
//!         ├── qa_pairs.json   # Q&A record, rewritten after every chunk
//!         └── config.json     # chunking parameters fixed at submission
//! ```
//!
//! Only one rq process may work against a root at a time. Mutating commands
//! hold [`StoreLock`]; running two processes without it is unsupported.

mod fsutil;
mod lock;
pub mod migrate;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::chunker::{Chunk, SizeMetric};
use crate::domain::{QaPair, RewriteTask, TaskStatus, id};
use crate::error::{Result, RewriteError};

pub use fsutil::{read_json, write_atomic, write_json};
pub use lock::StoreLock;
use migrate::SCHEMA_VERSION;

const REGISTRY_FILE: &str = "tasks.json";
const TASKS_DIR: &str = "tasks";
const MANIFEST_FILE: &str = "chunks.json";
const QA_FILE: &str = "qa_pairs.json";
const CONFIG_FILE: &str = "config.json";

/// Chunking parameters fixed at submission time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub chunk_size: usize,
    pub memory_size: usize,
    #[serde(default)]
    pub size_metric: SizeMetric,
}

impl TaskConfig {
    fn from_task(task: &RewriteTask) -> Self {
        Self {
            chunk_size: task.chunk_size,
            memory_size: task.memory_size,
            size_metric: task.size_metric,
        }
    }
}

/// Parameters for a new task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub input: PathBuf,
    /// Output artifact path; defaults to `rewritten_{stem}.md` in the task directory
    pub output: Option<PathBuf>,
    pub chunk_size: usize,
    pub memory_size: usize,
    pub size_metric: SizeMetric,
}

/// Durable id -> task mapping
#[derive(Debug)]
pub struct TaskStore {
    root: PathBuf,
    tasks: Vec<RewriteTask>,
}

impl TaskStore {
    /// Open or create a store at the given root
    ///
    /// Older registry shapes are migrated; a migrated registry is backed up to
    /// `tasks.json.bak` and rewritten at the current schema version.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        debug!(root = %root.display(), "TaskStore::open: called");
        fs::create_dir_all(root.join(TASKS_DIR)).map_err(|e| RewriteError::io(&root, e))?;

        let mut store = Self { root, tasks: Vec::new() };
        store.reload()?;
        Ok(store)
    }

    /// Take the exclusive store lock and re-read the registry under it
    ///
    /// Another process may have rewritten the registry since this store was
    /// opened; mutating against the list loaded at open time would drop its
    /// tasks on the next save.
    pub fn lock(&mut self) -> Result<StoreLock> {
        let lock = StoreLock::acquire(&self.root)?;
        self.reload()?;
        Ok(lock)
    }

    /// Replace the in-memory task list with the registry on disk
    fn reload(&mut self) -> Result<()> {
        let registry_path = self.root.join(REGISTRY_FILE);
        let doc: Option<serde_json::Value> = read_json(&registry_path)?;

        self.tasks.clear();
        if let Some(doc) = doc {
            let migrated = migrate::migrate(doc, crate::DEFAULT_CHUNK_SIZE);
            let needs_rewrite = migrated.needs_rewrite();
            self.tasks = migrated.tasks;

            if needs_rewrite {
                let backup = self.root.join(format!("{}.bak", REGISTRY_FILE));
                fs::copy(&registry_path, &backup).map_err(|e| RewriteError::io(&backup, e))?;
                self.save()?;
                info!(backup = %backup.display(), "Rewrote task registry at schema version {}", SCHEMA_VERSION);
            }
        }

        debug!(task_count = self.tasks.len(), "reload: loaded registry");
        Ok(())
    }

    /// Directory holding a task's files
    pub fn task_dir(&self, task: &RewriteTask) -> PathBuf {
        self.root.join(TASKS_DIR).join(&task.storage_id)
    }

    pub fn manifest_path(&self, task: &RewriteTask) -> PathBuf {
        self.task_dir(task).join(MANIFEST_FILE)
    }

    pub fn qa_path(&self, task: &RewriteTask) -> PathBuf {
        self.task_dir(task).join(QA_FILE)
    }

    pub fn config_path(&self, task: &RewriteTask) -> PathBuf {
        self.task_dir(task).join(CONFIG_FILE)
    }

    /// Path of the stored copy of the input document
    pub fn input_copy_path(&self, task: &RewriteTask) -> PathBuf {
        let name = Path::new(&task.input_file)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "input.md".into());
        self.task_dir(task).join(name)
    }

    /// Create a new pending task with its own storage directory
    pub fn create(&mut self, new: NewTask) -> Result<RewriteTask> {
        debug!(
            input = %new.input.display(),
            output = ?new.output,
            chunk_size = new.chunk_size,
            memory_size = new.memory_size,
            "create: called"
        );
        if !new.input.is_file() {
            debug!("create: input missing");
            return Err(RewriteError::Input(new.input));
        }

        let input = std::path::absolute(&new.input).map_err(|e| RewriteError::io(&new.input, e))?;
        let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let mut task = RewriteTask::new(
            input.to_string_lossy(),
            String::new(),
            new.chunk_size,
            new.memory_size,
            new.size_metric,
        );
        while self.get(&task.id).is_some() || self.tasks.iter().any(|t| t.storage_id == task.storage_id) {
            debug!(task_id = %task.id, "create: id collision, regenerating");
            task.id = id::generate_id("task", &stem);
            task.storage_id = id::generate_storage_id();
        }

        let task_dir = self.task_dir(&task);
        fs::create_dir_all(&task_dir).map_err(|e| RewriteError::io(&task_dir, e))?;

        let output = match new.output {
            Some(output) => std::path::absolute(&output).map_err(|e| RewriteError::io(&output, e))?,
            None => task_dir.join(format!("rewritten_{}.md", stem)),
        };
        task.output_file = output.to_string_lossy().into_owned();

        let copy = self.input_copy_path(&task);
        fs::copy(&input, &copy).map_err(|e| RewriteError::io(&copy, e))?;
        write_json(&self.config_path(&task), &TaskConfig::from_task(&task))?;

        self.tasks.push(task.clone());
        self.save()?;

        info!(task_id = %task.id, storage_id = %task.storage_id, "Created task");
        Ok(task)
    }

    /// Get a task by exact ID
    pub fn get(&self, id: &str) -> Option<&RewriteTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Resolve a full ID, unique prefix or slug fragment to a task
    pub fn resolve(&self, reference: &str) -> Result<&RewriteTask> {
        debug!(%reference, "resolve: called");
        match id::resolve(self.tasks.iter().map(|t| t.id.as_str()), reference) {
            Ok(Some(found)) => self.get(&found).ok_or(RewriteError::TaskNotFound(found)),
            Ok(None) => Err(RewriteError::TaskNotFound(reference.to_string())),
            Err(candidates) => Err(RewriteError::AmbiguousTask {
                reference: reference.to_string(),
                candidates,
            }),
        }
    }

    /// All tasks in creation order
    pub fn list(&self) -> &[RewriteTask] {
        &self.tasks
    }

    /// Pending tasks, after returning interrupted ones to the queue
    ///
    /// No process legitimately holds Processing across a restart, so any task
    /// found in that state was interrupted. It goes back to Pending with its
    /// pairs and counters intact.
    pub fn list_pending(&mut self) -> Result<Vec<RewriteTask>> {
        debug!("list_pending: called");
        let mut recovered = 0usize;
        for task in self.tasks.iter_mut().filter(|t| t.status == TaskStatus::Processing) {
            warn!(
                task_id = %task.id,
                processed = task.processed_chunks,
                total = task.total_chunks,
                "Recovering interrupted task"
            );
            task.set_status(TaskStatus::Pending, None);
            recovered += 1;
        }

        if recovered > 0 {
            self.save()?;
            info!(recovered, "Returned interrupted tasks to the queue");
        }

        Ok(self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect())
    }

    /// Transition a task's status and persist immediately
    pub fn update_status(&mut self, id: &str, status: TaskStatus, error: Option<String>) -> Result<RewriteTask> {
        debug!(%id, %status, ?error, "update_status: called");
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| RewriteError::TaskNotFound(id.to_string()))?;
        task.set_status(status, error);
        let updated = task.clone();
        self.save()?;
        Ok(updated)
    }

    /// Replace a task record and persist the registry
    pub fn update(&mut self, task: &RewriteTask) -> Result<()> {
        debug!(task_id = %task.id, "update: called");
        let slot = self
            .tasks
            .iter_mut()
            .find(|t| t.id == task.id)
            .ok_or_else(|| RewriteError::TaskNotFound(task.id.clone()))?;
        *slot = task.clone();
        self.save()
    }

    /// Durable checkpoint after a chunk: Q&A record first, then the registry
    pub fn checkpoint(&mut self, task: &RewriteTask) -> Result<()> {
        debug!(task_id = %task.id, processed = task.processed_chunks, "checkpoint: called");
        write_json(&self.qa_path(task), &task.qa_pairs)?;
        self.update(task)
    }

    /// Persist the chunk manifest for a task
    pub fn write_manifest(&self, task: &RewriteTask, chunks: &[Chunk]) -> Result<()> {
        debug!(task_id = %task.id, chunk_count = chunks.len(), "write_manifest: called");
        write_json(&self.manifest_path(task), chunks)
    }

    /// Read the chunk manifest, None if it was never written
    pub fn read_manifest(&self, task: &RewriteTask) -> Result<Option<Vec<Chunk>>> {
        debug!(task_id = %task.id, "read_manifest: called");
        read_json(&self.manifest_path(task)).map_err(|e| RewriteError::manifest(&task.id, e.to_string()))
    }

    /// Read the Q&A record, None if no chunk has been checkpointed yet
    ///
    /// Pairs written before the `error` field existed are repaired the same
    /// way the registry migration repairs them.
    pub fn load_qa_pairs(&self, task: &RewriteTask) -> Result<Option<Vec<QaPair>>> {
        debug!(task_id = %task.id, "load_qa_pairs: called");
        let path = self.qa_path(task);
        let Some(mut doc) = read_json::<serde_json::Value>(&path)? else {
            return Ok(None);
        };
        if let serde_json::Value::Array(pairs) = &mut doc {
            migrate::repair_pairs(pairs);
        }
        serde_json::from_value(doc).map(Some).map_err(|e| RewriteError::json(&path, e))
    }

    /// Chunking parameters recorded at submission
    ///
    /// Falls back to the registry record if the per-task config is missing.
    pub fn read_task_config(&self, task: &RewriteTask) -> Result<TaskConfig> {
        debug!(task_id = %task.id, "read_task_config: called");
        match read_json(&self.config_path(task))? {
            Some(config) => Ok(config),
            None => {
                debug!("read_task_config: no config.json, using registry values");
                Ok(TaskConfig::from_task(task))
            }
        }
    }

    /// Files currently in a task's directory
    pub fn task_files(&self, task: &RewriteTask) -> Result<Vec<PathBuf>> {
        let dir = self.task_dir(task);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| RewriteError::io(&dir, e))? {
            let entry = entry.map_err(|e| RewriteError::io(&dir, e))?;
            files.push(entry.path());
        }
        files.sort();
        Ok(files)
    }

    fn save(&self) -> Result<()> {
        debug!(task_count = self.tasks.len(), "save: called");
        let registry = RegistryRef {
            version: SCHEMA_VERSION,
            tasks: &self.tasks,
        };
        write_json(&self.root.join(REGISTRY_FILE), &registry)
    }
}

/// On-disk registry envelope, borrowed from the store for writing
#[derive(Serialize)]
struct RegistryRef<'a> {
    version: u32,
    tasks: &'a [RewriteTask],
}
