//! Prompt Loader
//!
//! Loads prompt templates from a user override directory or falls back to
//! the embedded defaults.

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;
use crate::error::{Result, RewriteError};

/// Values available to the system prompt template
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    /// File name of the document being rewritten
    pub document: String,
    /// 1-based position of the current chunk
    pub chunk_number: usize,
    pub total_chunks: usize,
}

impl PromptContext {
    pub fn new(input_file: &str, chunk_index: usize, total_chunks: usize) -> Self {
        let document = Path::new(input_file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input_file.to_string());
        Self {
            document,
            chunk_number: chunk_index + 1,
            total_chunks,
        }
    }
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory (e.g., `~/.config/rewriteq/prompts/`)
    user_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that prefers templates in `user_dir`
    pub fn new(user_dir: impl AsRef<Path>) -> Self {
        let user_dir = user_dir.as_ref();
        let exists = user_dir.is_dir();
        debug!(?user_dir, %exists, "PromptLoader::new: called");
        Self {
            hbs: Self::engine(),
            user_dir: exists.then(|| user_dir.to_path_buf()),
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            user_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // prompts are plain text, not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks `{user_dir}/{name}.pmt` first, then the embedded default.
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref user_dir) = self.user_dir {
            let path = user_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in user override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| RewriteError::Prompt(format!("Failed to read prompt {}: {}", path.display(), e)));
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| RewriteError::Prompt(format!("Prompt template not found: {}", name)))
    }

    /// Render a template with the given context
    pub fn render(&self, template_name: &str, context: &PromptContext) -> Result<String> {
        debug!(%template_name, chunk_number = context.chunk_number, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| RewriteError::Prompt(format!("Failed to render template {}: {}", template_name, e)))
    }

    /// Render the system prompt for one chunk
    pub fn system_prompt(&self, context: &PromptContext) -> Result<String> {
        self.render("system", context)
    }
}
