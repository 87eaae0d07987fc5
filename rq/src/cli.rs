//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::chunker::SizeMetric;

/// rq - resumable chunked document rewriting
#[derive(Debug, Parser)]
#[command(name = "rq", author, version, about = "Queue long documents for chunk-by-chunk LLM rewriting")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Queue a document for rewriting
    Submit {
        /// Markdown or text document to rewrite
        file: PathBuf,

        /// Output path (default: rewritten_<name>.md in the task directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Chunk size bound (default from config, 800)
        #[arg(short = 's', long)]
        chunk_size: Option<usize>,

        /// Earlier Q&A pairs to include as context (default from config, 0)
        #[arg(short = 'm', long)]
        memory_size: Option<usize>,

        /// How chunk size is measured: chars or words
        #[arg(long)]
        metric: Option<SizeMetric>,
    },

    /// List all tasks
    List,

    /// Process every pending or interrupted task
    Run,

    /// Show everything about one task
    Show {
        /// Task ID, unique prefix or name fragment
        task: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_submit_with_options() {
        let cli = Cli::try_parse_from([
            "rq", "submit", "ch1.md", "-o", "out.md", "-s", "1200", "-m", "2", "--metric", "words",
        ])
        .unwrap();

        match cli.command {
            Command::Submit {
                file,
                output,
                chunk_size,
                memory_size,
                metric,
            } => {
                assert_eq!(file, PathBuf::from("ch1.md"));
                assert_eq!(output, Some(PathBuf::from("out.md")));
                assert_eq!(chunk_size, Some(1200));
                assert_eq!(memory_size, Some(2));
                assert_eq!(metric, Some(SizeMetric::Words));
            }
            other => panic!("Expected Submit, got {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["rq", "list", "--log-level", "debug", "-c", "rq.yml"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("rq.yml")));
        assert!(matches!(cli.command, Command::List));
    }

    #[test]
    fn test_show_requires_task() {
        assert!(Cli::try_parse_from(["rq", "show"]).is_err());
    }

    #[test]
    fn test_bad_metric_rejected() {
        assert!(Cli::try_parse_from(["rq", "submit", "a.md", "--metric", "bytes"]).is_err());
    }
}
