//! Pipeline - drives tasks through chunking, rewriting and assembly
//!
//! A run walks a task's chunks in ascending order, one collaborator call at a
//! time. After every chunk the Q&A record and registry are checkpointed before
//! the answer is appended to the output, so an interrupted run resumes at the
//! first chunk without a pair and never repeats one that has a pair.

mod memory;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::assembler::OutputAssembler;
use crate::chunker::{Chunk, Chunker};
use crate::domain::{QaPair, RewriteTask, TaskStatus};
use crate::error::{Result, RewriteError};
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::prompts::{PromptContext, PromptLoader};
use crate::store::{NewTask, TaskStore};

pub use memory::memory_turns;

/// How a single task run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Every chunk has a pair; `chunk_errors` of them are error markers
    Completed { chunk_errors: usize },
    /// A structural error stopped the run
    Failed(String),
}

/// Result of `run_pending`
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<(String, TaskOutcome)>,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TaskOutcome::Completed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TaskOutcome::Failed(_)))
            .count()
    }

    pub fn chunk_errors(&self) -> usize {
        self.outcomes
            .iter()
            .map(|(_, o)| match o {
                TaskOutcome::Completed { chunk_errors } => *chunk_errors,
                TaskOutcome::Failed(_) => 0,
            })
            .sum()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "completed: {}, failed: {}, chunk errors: {}",
            self.completed(),
            self.failed(),
            self.chunk_errors()
        )
    }
}

/// Everything `rq show` prints about a task
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task: RewriteTask,
    pub task_dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Command surface over one storage root
pub struct Pipeline {
    store: TaskStore,
    client: Option<Arc<dyn LlmClient>>,
    prompts: PromptLoader,
    max_tokens: u32,
}

impl Pipeline {
    /// Pipeline for commands that never call the model (submit, list, show)
    pub fn new(store: TaskStore, prompts: PromptLoader) -> Self {
        Self {
            store,
            client: None,
            prompts,
            max_tokens: 4096,
        }
    }

    /// Attach the rewriting collaborator needed by `run_pending`
    pub fn with_client(mut self, client: Arc<dyn LlmClient>, max_tokens: u32) -> Self {
        self.client = Some(client);
        self.max_tokens = max_tokens;
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Register a document and chunk it
    ///
    /// The manifest is written right away so `run` works from a fixed chunk
    /// list; if that write fails the task still exists and is chunked from
    /// its stored input copy on first run.
    pub fn submit(&mut self, new: NewTask) -> Result<RewriteTask> {
        debug!(
            input = %new.input.display(),
            chunk_size = new.chunk_size,
            memory_size = new.memory_size,
            "submit: called"
        );
        if new.chunk_size == 0 {
            return Err(RewriteError::Config("chunk size must be greater than zero".to_string()));
        }
        let _lock = self.store.lock()?;

        let mut task = self.store.create(new)?;
        let chunks = self.chunk_input(&task)?;
        self.store.write_manifest(&task, &chunks)?;
        task.total_chunks = chunks.len();
        self.store.update(&task)?;

        info!(task_id = %task.id, total_chunks = task.total_chunks, "Submitted task");
        Ok(task)
    }

    /// All tasks in creation order
    pub fn list(&self) -> &[RewriteTask] {
        self.store.list()
    }

    /// Full view of one task, looked up by id, prefix or slug fragment
    pub fn describe(&self, reference: &str) -> Result<TaskReport> {
        debug!(%reference, "describe: called");
        let task = self.store.resolve(reference)?.clone();
        let files = self.store.task_files(&task)?;
        Ok(TaskReport {
            task_dir: self.store.task_dir(&task),
            task,
            files,
        })
    }

    /// Drive every resumable task to completion or failure
    ///
    /// Interrupted tasks are returned to the queue first. A structural error
    /// fails only the task it occurred in; the run moves on to the next one.
    pub async fn run_pending(&mut self) -> Result<RunSummary> {
        debug!("run_pending: called");
        let _lock = self.store.lock()?;

        let pending = self.store.list_pending()?;
        let resumed = pending.iter().filter(|t| t.processed_chunks > 0).count();
        info!(pending = pending.len(), resumed, "Starting run");

        let mut summary = RunSummary::default();
        for task in pending {
            let outcome = self.process_task(&task.id).await?;
            summary.outcomes.push((task.id, outcome));
        }

        info!("Run finished: {}", summary);
        Ok(summary)
    }

    /// Process one task from its first chunk without a pair
    ///
    /// Errors that fail the task are recorded on it and reported as
    /// [`TaskOutcome::Failed`]; anything else is returned.
    pub async fn process_task(&mut self, task_id: &str) -> Result<TaskOutcome> {
        debug!(%task_id, "process_task: called");
        let client = self
            .client
            .clone()
            .ok_or_else(|| RewriteError::Config("no LLM client configured".to_string()))?;

        let mut task = self.store.update_status(task_id, TaskStatus::Processing, None)?;
        match self.drive(&mut task, client.as_ref()).await {
            Ok(()) => {
                let chunk_errors = task.error_count();
                task.set_status(TaskStatus::Completed, None);
                self.store.update(&task)?;
                info!(task_id = %task.id, total_chunks = task.total_chunks, chunk_errors, "Task completed");
                Ok(TaskOutcome::Completed { chunk_errors })
            }
            Err(e) if e.fails_task() => {
                let message = e.to_string();
                warn!(task_id = %task.id, error = %message, "Task failed");
                task.set_status(TaskStatus::Failed, Some(message.clone()));
                if let Err(save_err) = self.store.update(&task) {
                    error!(task_id = %task.id, error = %save_err, "Could not record task failure");
                    return Err(e);
                }
                Ok(TaskOutcome::Failed(message))
            }
            Err(e) => Err(e),
        }
    }

    async fn drive(&mut self, task: &mut RewriteTask, client: &dyn LlmClient) -> Result<()> {
        let config = self.store.read_task_config(task)?;
        task.chunk_size = config.chunk_size;
        task.memory_size = config.memory_size;
        task.size_metric = config.size_metric;

        // the Q&A record is written before the registry, so it is never behind
        if let Some(pairs) = self.store.load_qa_pairs(task)? {
            task.replace_pairs(pairs);
        }

        let chunks = self.load_chunks(task)?;
        task.total_chunks = chunks.len();
        let pairs = std::mem::take(&mut task.qa_pairs);
        task.replace_pairs(pairs);

        let output = OutputAssembler::new(&task.output_file);
        if task.qa_pairs.is_empty() {
            output.truncate()?;
        } else {
            info!(
                task_id = %task.id,
                processed = task.processed_chunks,
                total = task.total_chunks,
                next_chunk = task.first_missing(),
                "Resuming task"
            );
            output.rebuild(&task.qa_pairs)?;
        }
        self.store.checkpoint(task)?;

        for chunk in &chunks {
            if task.has_pair(chunk.index) {
                debug!(chunk_index = chunk.index, "drive: chunk already has a pair, skipping");
                continue;
            }

            let pair = self.rewrite_chunk(task, chunk, client).await?;
            task.record(pair);
            self.store.checkpoint(task)?;

            // appending keeps order only when this pair is the highest index so far
            match task.qa_pairs.last() {
                Some(qa) if qa.chunk_index == chunk.index => output.append(qa)?,
                _ => output.rebuild(&task.qa_pairs)?,
            }

            info!(task_id = %task.id, progress = %task.progress(), "Chunk checkpointed");
        }

        if task.total_chunks > 0 && !task.is_fully_processed() {
            return Err(RewriteError::manifest(
                &task.id,
                format!("run ended with {} of {} chunks recorded", task.processed_chunks, task.total_chunks),
            ));
        }
        Ok(())
    }

    /// Invoke the collaborator for one chunk
    ///
    /// Collaborator failures become error-marker pairs; only prompt rendering
    /// errors propagate.
    async fn rewrite_chunk(&self, task: &RewriteTask, chunk: &Chunk, client: &dyn LlmClient) -> Result<QaPair> {
        debug!(task_id = %task.id, chunk_index = chunk.index, size = chunk.size, "rewrite_chunk: called");
        let system_prompt = self
            .prompts
            .system_prompt(&PromptContext::new(&task.input_file, chunk.index, task.total_chunks))?;

        let mut messages = memory_turns(&task.qa_pairs, chunk.index, task.memory_size);
        messages.push(Message::user(chunk.content.clone()));
        let request = CompletionRequest {
            system_prompt,
            messages,
            max_tokens: self.max_tokens,
        };

        let pair = match client.complete(request).await {
            Ok(response) => match response.content {
                Some(answer) if !answer.trim().is_empty() => {
                    debug!(
                        output_tokens = response.usage.output_tokens,
                        stop_reason = ?response.stop_reason,
                        "rewrite_chunk: rewritten"
                    );
                    QaPair::rewritten(
                        chunk.content.clone(),
                        answer,
                        response.reasoning_content,
                        chunk.index,
                        chunk.size,
                    )
                }
                _ => {
                    warn!(task_id = %task.id, chunk_index = chunk.index, "Model returned no content");
                    QaPair::failed(chunk.content.clone(), "model returned no content", chunk.index, chunk.size)
                }
            },
            Err(e) => {
                warn!(task_id = %task.id, chunk_index = chunk.index, error = %e, "Chunk rewrite failed");
                QaPair::failed(chunk.content.clone(), e.to_string(), chunk.index, chunk.size)
            }
        };
        Ok(pair)
    }

    /// Read the manifest, chunking the stored input if none was written yet
    fn load_chunks(&self, task: &RewriteTask) -> Result<Vec<Chunk>> {
        debug!(task_id = %task.id, "load_chunks: called");
        let chunks = match self.store.read_manifest(task)? {
            Some(chunks) => chunks,
            None if task.qa_pairs.is_empty() => {
                info!(task_id = %task.id, "No chunk manifest, chunking stored input");
                let chunks = self.chunk_input(task)?;
                self.store.write_manifest(task, &chunks)?;
                chunks
            }
            None => {
                return Err(RewriteError::manifest(&task.id, "manifest is missing but chunks were already processed"));
            }
        };

        if task.total_chunks > 0 && chunks.len() != task.total_chunks {
            return Err(RewriteError::manifest(
                &task.id,
                format!("manifest has {} chunks, task expects {}", chunks.len(), task.total_chunks),
            ));
        }
        if let Some((position, chunk)) = chunks.iter().enumerate().find(|(i, c)| c.index != *i) {
            return Err(RewriteError::manifest(
                &task.id,
                format!("chunk at position {} has index {}", position, chunk.index),
            ));
        }
        Ok(chunks)
    }

    fn chunk_input(&self, task: &RewriteTask) -> Result<Vec<Chunk>> {
        let path = self.store.input_copy_path(task);
        let text = fs::read_to_string(&path).map_err(|e| RewriteError::io(&path, e))?;
        let chunks = Chunker::new(task.chunk_size, task.size_metric).split(&text);
        debug!(task_id = %task.id, chunk_count = chunks.len(), "chunk_input: chunked");
        Ok(chunks)
    }
}
