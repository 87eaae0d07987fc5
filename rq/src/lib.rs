//! rewriteq - resumable chunked document rewriting
//!
//! Long technical documents are split into line-aligned chunks, each chunk is
//! rewritten by an LLM, and the results are stitched back together in order.
//! Every completed chunk is checkpointed, so a crashed or interrupted run picks
//! up at the first chunk that has no result.
//!
//! # Architecture
//!
//! ```text
//! submit ─▶ Chunker ─▶ TaskStore (tasks.json, tasks/{storage_id}/...)
//!                          │
//! run ──▶ Pipeline ─▶ LlmClient ─▶ checkpoint ─▶ OutputAssembler
//! ```
//!
//! # Modules
//!
//! - [`chunker`] - Line-aligned, size-bounded text partitioning
//! - [`store`] - Durable task registry and per-task storage
//! - [`pipeline`] - Resumable per-chunk processing
//! - [`assembler`] - Output document assembly
//! - [`llm`] - LLM client trait and OpenAI-compatible implementation
//! - [`prompts`] - System prompt templates
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod assembler;
pub mod chunker;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod store;

pub use chunker::{Chunk, Chunker, SizeMetric};
pub use domain::{QaPair, RewriteTask, TaskStatus};
pub use error::{Result, RewriteError};
pub use pipeline::{Pipeline, RunSummary, TaskOutcome};
pub use store::{NewTask, TaskStore};

/// Default chunk size bound (800 characters)
pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// Default number of earlier Q&A pairs replayed as context
pub const DEFAULT_MEMORY_SIZE: usize = 0;
