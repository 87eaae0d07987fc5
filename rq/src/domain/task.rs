//! RewriteTask domain type
//!
//! Tracks one document through chunking, per-chunk rewriting and assembly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{generate_id, generate_storage_id};
use crate::chunker::SizeMetric;

/// Prefix of the answer recorded for a chunk whose rewrite failed
pub const ERROR_MARKER_PREFIX: &str = "[Error: ";

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted or interrupted, waiting for a run
    #[default]
    Pending,
    /// Claimed by a running pipeline
    Processing,
    /// Every chunk has a QaPair
    Completed,
    /// Structural error (manifest, persistence)
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Original chunk paired with its rewritten result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    /// Original chunk content
    pub question: String,

    /// Rewritten content, or an error marker
    pub answer: String,

    /// Reasoning trace returned by the model (if any)
    #[serde(default)]
    pub reasoning_content: Option<String>,

    /// Index of the chunk this pair belongs to
    pub chunk_index: usize,

    /// Size of the original chunk
    #[serde(alias = "char_count", alias = "word_count")]
    pub size: usize,

    /// Failure message when the rewrite call failed
    ///
    /// Always written, as null for a rewrite; records without the field are
    /// repaired by the registry migration.
    #[serde(default)]
    pub error: Option<String>,
}

impl QaPair {
    /// Pair for a successful rewrite
    pub fn rewritten(
        question: impl Into<String>,
        answer: impl Into<String>,
        reasoning_content: Option<String>,
        chunk_index: usize,
        size: usize,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            reasoning_content,
            chunk_index,
            size,
            error: None,
        }
    }

    /// Pair recording a failed rewrite
    pub fn failed(question: impl Into<String>, message: impl Into<String>, chunk_index: usize, size: usize) -> Self {
        let message = message.into();
        Self {
            question: question.into(),
            answer: format!("{}{}]", ERROR_MARKER_PREFIX, message),
            reasoning_content: None,
            chunk_index,
            size,
            error: Some(message),
        }
    }

    /// Whether this pair records a failed rewrite
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A document rewriting task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteTask {
    /// Primary identifier
    pub id: String,

    /// Names the task's isolated storage directory
    pub storage_id: String,

    /// Path of the submitted input document
    pub input_file: String,

    /// Path of the output artifact
    pub output_file: String,

    /// Current status
    pub status: TaskStatus,

    pub created_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Last structural error (if any)
    pub error_message: Option<String>,

    /// Completed chunks, sorted by chunk index
    pub qa_pairs: Vec<QaPair>,

    pub total_chunks: usize,

    pub processed_chunks: usize,

    /// Chunk size bound used when chunking
    pub chunk_size: usize,

    /// Number of prior pairs supplied as memory context
    pub memory_size: usize,

    /// Metric the chunk size bound is measured in
    #[serde(default)]
    pub size_metric: SizeMetric,
}

impl RewriteTask {
    /// Create a new pending task with generated IDs
    pub fn new(
        input_file: impl Into<String>,
        output_file: impl Into<String>,
        chunk_size: usize,
        memory_size: usize,
        size_metric: SizeMetric,
    ) -> Self {
        let input_file = input_file.into();
        let stem = std::path::Path::new(&input_file)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            id: generate_id("task", &stem),
            storage_id: generate_storage_id(),
            input_file,
            output_file: output_file.into(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
            qa_pairs: Vec::new(),
            total_chunks: 0,
            processed_chunks: 0,
            chunk_size,
            memory_size,
            size_metric,
        }
    }

    /// Update the status
    ///
    /// Completed stamps the completion time, Failed records the message.
    pub fn set_status(&mut self, status: TaskStatus, error: Option<String>) {
        self.status = status;
        if status == TaskStatus::Completed {
            self.completed_at = Some(Utc::now());
        }
        if let Some(message) = error {
            self.error_message = Some(message);
        }
    }

    /// Whether a pair exists for the chunk index
    pub fn has_pair(&self, chunk_index: usize) -> bool {
        self.qa_pairs
            .binary_search_by_key(&chunk_index, |qa| qa.chunk_index)
            .is_ok()
    }

    /// Record a pair, keeping the list sorted by index
    ///
    /// Returns false (and leaves the task untouched) if the index already has a pair.
    pub fn record(&mut self, pair: QaPair) -> bool {
        match self.qa_pairs.binary_search_by_key(&pair.chunk_index, |qa| qa.chunk_index) {
            Ok(_) => false,
            Err(pos) => {
                self.qa_pairs.insert(pos, pair);
                self.recount();
                true
            }
        }
    }

    /// Replace the pair list, enforcing ordering and uniqueness
    ///
    /// Pairs are sorted by index, the first pair for each index wins and pairs
    /// outside [0, total_chunks) are dropped once the chunk count is known.
    pub fn replace_pairs(&mut self, mut pairs: Vec<QaPair>) {
        pairs.sort_by_key(|qa| qa.chunk_index);
        pairs.dedup_by_key(|qa| qa.chunk_index);
        if self.total_chunks > 0 {
            pairs.retain(|qa| qa.chunk_index < self.total_chunks);
        }
        self.qa_pairs = pairs;
        self.recount();
    }

    /// Recompute processed_chunks from the pair list
    pub fn recount(&mut self) {
        let total = self.total_chunks;
        self.processed_chunks = self
            .qa_pairs
            .iter()
            .filter(|qa| total == 0 || qa.chunk_index < total)
            .count();
    }

    /// The first chunk index without a pair
    pub fn first_missing(&self) -> usize {
        (0..self.total_chunks).find(|i| !self.has_pair(*i)).unwrap_or(self.total_chunks)
    }

    /// Whether every chunk index has a pair
    pub fn is_fully_processed(&self) -> bool {
        self.total_chunks > 0 && (0..self.total_chunks).all(|i| self.has_pair(i))
    }

    /// Number of chunks whose rewrite failed
    pub fn error_count(&self) -> usize {
        self.qa_pairs.iter().filter(|qa| qa.is_error()).count()
    }

    /// Progress as "processed/total", or "N/A" before chunking
    pub fn progress(&self) -> String {
        if self.total_chunks > 0 {
            format!("{}/{}", self.processed_chunks, self.total_chunks)
        } else {
            "N/A".to_string()
        }
    }
}
