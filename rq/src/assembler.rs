//! OutputAssembler - builds the rewritten document from QaPairs
//!
//! The artifact is every answer in ascending chunk order, each followed by a
//! paragraph separator. Rebuilding from a pair list and appending pairs one by
//! one produce the same bytes, so recovery and live streaming agree.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::QaPair;
use crate::error::{Result, RewriteError};
use crate::store::write_atomic;

/// Separator written after each chunk's answer
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Writes the output artifact for one task
#[derive(Debug, Clone)]
pub struct OutputAssembler {
    path: PathBuf,
}

impl OutputAssembler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render pairs in ascending chunk order
    pub fn render(pairs: &[QaPair]) -> String {
        let mut ordered: Vec<&QaPair> = pairs.iter().collect();
        ordered.sort_by_key(|qa| qa.chunk_index);

        let mut out = String::new();
        for qa in ordered {
            out.push_str(&qa.answer);
            out.push_str(CHUNK_SEPARATOR);
        }
        out
    }

    /// Regenerate the whole artifact from the pair list
    pub fn rebuild(&self, pairs: &[QaPair]) -> Result<()> {
        debug!(path = %self.path.display(), pair_count = pairs.len(), "rebuild: called");
        self.ensure_parent()?;
        write_atomic(&self.path, Self::render(pairs).as_bytes())
    }

    /// Start an empty artifact
    pub fn truncate(&self) -> Result<()> {
        debug!(path = %self.path.display(), "truncate: called");
        self.rebuild(&[])
    }

    /// Append one newly completed chunk
    ///
    /// Callers append in ascending index order; the pipeline guarantees it.
    pub fn append(&self, pair: &QaPair) -> Result<()> {
        debug!(path = %self.path.display(), chunk_index = pair.chunk_index, "append: called");
        self.ensure_parent()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| RewriteError::io(&self.path, e))?;
        file.write_all(pair.answer.as_bytes())
            .and_then(|_| file.write_all(CHUNK_SEPARATOR.as_bytes()))
            .and_then(|_| file.sync_data())
            .map_err(|e| RewriteError::io(&self.path, e))
    }

    fn ensure_parent(&self) -> Result<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).map_err(|e| RewriteError::io(parent, e))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pairs() -> Vec<QaPair> {
        vec![
            QaPair::rewritten("q0", "First section.", None, 0, 2),
            QaPair::failed("q1", "rate limited", 1, 2),
            QaPair::rewritten("q2", "Third section.\nWith two lines.", Some("thinking".to_string()), 2, 2),
        ]
    }

    #[test]
    fn test_append_matches_rebuild() {
        let temp = TempDir::new().unwrap();
        let streamed = OutputAssembler::new(temp.path().join("streamed.md"));
        let rebuilt = OutputAssembler::new(temp.path().join("rebuilt.md"));

        streamed.truncate().unwrap();
        for qa in pairs() {
            streamed.append(&qa).unwrap();
        }
        rebuilt.rebuild(&pairs()).unwrap();

        let a = fs::read(streamed.path()).unwrap();
        let b = fs::read(rebuilt.path()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_render_orders_by_index() {
        let mut shuffled = pairs();
        shuffled.reverse();
        let text = OutputAssembler::render(&shuffled);
        assert_eq!(
            text,
            "First section.\n\n[Error: rate limited]\n\nThird section.\nWith two lines.\n\n"
        );
    }

    #[test]
    fn test_rebuild_empty_creates_file() {
        let temp = TempDir::new().unwrap();
        let out = OutputAssembler::new(temp.path().join("nested").join("out.md"));
        out.rebuild(&[]).unwrap();
        assert_eq!(fs::read_to_string(out.path()).unwrap(), "");
    }
}
