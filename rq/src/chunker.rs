//! Line-aligned text chunker
//!
//! Splits a document into an ordered, non-overlapping partition of whole lines.
//! Chunk index is the resume key for the pipeline, so the same (text, bound,
//! metric) must always produce the same chunks.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the size of a line is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizeMetric {
    /// Unicode scalar values in the line, terminator excluded
    #[default]
    Chars,
    /// Whitespace-separated tokens
    Words,
}

impl SizeMetric {
    /// Size of a single line under this metric
    pub fn measure(&self, line: &str) -> usize {
        match self {
            Self::Chars => line.chars().count(),
            Self::Words => line.split_whitespace().count(),
        }
    }

    /// Unit label for console output
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Chars => "characters",
            Self::Words => "words",
        }
    }
}

impl std::fmt::Display for SizeMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chars => write!(f, "chars"),
            Self::Words => write!(f, "words"),
        }
    }
}

impl std::str::FromStr for SizeMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chars" | "characters" => Ok(Self::Chars),
            "words" => Ok(Self::Words),
            other => Err(format!("Unknown size metric '{}'. Supported: chars, words", other)),
        }
    }
}

/// A contiguous run of whole lines from the source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the chunk sequence (0-based)
    pub index: usize,

    /// Lines joined with '\n'
    pub content: String,

    /// First line of the chunk (0-based, inclusive)
    pub start_line: usize,

    /// Last line of the chunk (0-based, inclusive)
    pub end_line: usize,

    /// Cumulative size of the chunk's lines under the chunker's metric
    #[serde(alias = "char_count", alias = "word_count")]
    pub size: usize,
}

/// Deterministic line-aligned splitter
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    bound: usize,
    metric: SizeMetric,
}

impl Chunker {
    pub fn new(bound: usize, metric: SizeMetric) -> Self {
        Self { bound, metric }
    }

    /// Split text into chunks
    ///
    /// Lines accumulate while the running size stays within the bound. The
    /// first line that would push it over closes the current chunk and opens
    /// the next one. A line that alone exceeds the bound becomes a one-line
    /// chunk; lines are never split.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        debug!(len = text.len(), bound = self.bound, metric = %self.metric, "split: called");
        if text.is_empty() {
            debug!("split: empty input");
            return Vec::new();
        }

        let lines: Vec<&str> = text.split('\n').collect();
        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut size = 0usize;

        for (i, line) in lines.iter().enumerate() {
            let line_size = self.metric.measure(line);
            if i > start && size + line_size > self.bound {
                chunks.push(self.make_chunk(chunks.len(), &lines, start, i - 1, size));
                start = i;
                size = 0;
            }
            size += line_size;
        }
        chunks.push(self.make_chunk(chunks.len(), &lines, start, lines.len() - 1, size));

        debug!(chunk_count = chunks.len(), line_count = lines.len(), "split: done");
        chunks
    }

    fn make_chunk(&self, index: usize, lines: &[&str], start: usize, end: usize, size: usize) -> Chunk {
        Chunk {
            index,
            content: lines[start..=end].join("\n"),
            start_line: start,
            end_line: end,
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(n: usize) -> String {
        "x".repeat(n)
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let chunker = Chunker::new(50, SizeMetric::Chars);
        assert!(chunker.split("").is_empty());
    }

    #[test]
    fn test_input_under_bound_is_one_chunk() {
        let text = [line(16), line(16), line(16)].join("\n");
        let chunks = Chunker::new(50, SizeMetric::Chars).split(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].size, 48);
        assert_eq!(chunks[0].start_line, 0);
        assert_eq!(chunks[0].end_line, 2);
        assert_eq!(chunks[0].content, text);
    }

    #[test]
    fn test_three_twenty_char_lines_split_at_bound() {
        let text = [line(20), line(20), line(20)].join("\n");
        let chunks = Chunker::new(50, SizeMetric::Chars).split(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].size, 40);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (0, 1));
        assert_eq!(chunks[1].size, 20);
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (2, 2));
    }

    #[test]
    fn test_oversize_line_forms_own_chunk() {
        let chunks = Chunker::new(10, SizeMetric::Chars).split(&line(30));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].size, 30);
    }

    #[test]
    fn test_oversize_line_in_middle_is_isolated() {
        let text = format!("ab\n{}\ncd", line(30));
        let chunks = Chunker::new(10, SizeMetric::Chars).split(&text);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.size).collect();
        assert_eq!(sizes, vec![2, 30, 2]);
        assert_eq!(chunks[1].start_line, 1);
        assert_eq!(chunks[1].end_line, 1);
    }

    #[test]
    fn test_repeated_empty_lines_terminate() {
        let text = "\n".repeat(1000);
        let chunks = Chunker::new(0, SizeMetric::Chars).split(&text);
        // empty lines never exceed even a zero bound
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].size, 0);
        assert_eq!(chunks[0].end_line, 1000);
        assert_eq!(chunks[0].content, text);
    }

    #[test]
    fn test_trailing_newline_is_preserved() {
        let text = "alpha\nbeta\n";
        let chunks = Chunker::new(100, SizeMetric::Chars).split(text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].end_line, 2);
    }

    #[test]
    fn test_word_metric() {
        let text = "one two three\nfour five\nsix seven eight nine";
        let chunks = Chunker::new(5, SizeMetric::Words).split(text);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.size).collect();
        assert_eq!(sizes, vec![5, 4]);
    }

    #[test]
    fn test_chars_counts_unicode_scalars() {
        assert_eq!(SizeMetric::Chars.measure("héllo"), 5);
        assert_eq!(SizeMetric::Words.measure("  a \t b  "), 2);
    }

    #[test]
    fn test_indices_are_sequential() {
        let text = (0..20).map(|_| line(7)).collect::<Vec<_>>().join("\n");
        let chunks = Chunker::new(15, SizeMetric::Chars).split(&text);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn test_metric_from_str() {
        assert_eq!("chars".parse::<SizeMetric>().unwrap(), SizeMetric::Chars);
        assert_eq!("Words".parse::<SizeMetric>().unwrap(), SizeMetric::Words);
        assert!("bytes".parse::<SizeMetric>().is_err());
    }

    #[test]
    fn test_manifest_accepts_legacy_size_field() {
        let json = r#"{"index":0,"content":"a","start_line":0,"end_line":0,"char_count":1}"#;
        let chunk: Chunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.size, 1);
    }

    fn arb_text() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-z ]{0,40}", 0..40).prop_map(|lines| lines.join("\n"))
    }

    proptest! {
        #[test]
        fn prop_partition_is_lossless(text in arb_text(), bound in 1usize..120) {
            let chunks = Chunker::new(bound, SizeMetric::Chars).split(&text);
            let rebuilt = chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n");
            prop_assert_eq!(rebuilt, text);
        }

        #[test]
        fn prop_chunking_is_deterministic(text in arb_text(), bound in 1usize..120) {
            let chunker = Chunker::new(bound, SizeMetric::Words);
            prop_assert_eq!(chunker.split(&text), chunker.split(&text));
        }

        #[test]
        fn prop_size_bound_holds(text in arb_text(), bound in 1usize..120) {
            for chunk in Chunker::new(bound, SizeMetric::Chars).split(&text) {
                let one_line = chunk.start_line == chunk.end_line;
                prop_assert!(chunk.size <= bound || one_line);
            }
        }

        #[test]
        fn prop_lines_are_contiguous(text in arb_text(), bound in 1usize..120) {
            let chunks = Chunker::new(bound, SizeMetric::Chars).split(&text);
            let mut next = 0;
            for chunk in &chunks {
                prop_assert_eq!(chunk.start_line, next);
                prop_assert!(chunk.end_line >= chunk.start_line);
                next = chunk.end_line + 1;
            }
        }
    }
}
