//! Registry schema versions and load-time migration
//!
//! Version 1 is the bare JSON array written by the first generation of the
//! tool: records may lack `storage_id` (or carry it as `task_id`), chunk
//! counters, sizes and memory settings, and timestamps have no UTC offset.
//! Version 2 wraps the task list in an envelope with an explicit version.
//!
//! Migration works on raw JSON values and repairs each record in place, so an
//! older record shape never makes the load fail.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::domain::{ERROR_MARKER_PREFIX, RewriteTask, generate_storage_id};

/// Current registry schema version
pub const SCHEMA_VERSION: u32 = 2;

/// Result of loading a registry document
#[derive(Debug)]
pub struct Migrated {
    pub tasks: Vec<RewriteTask>,
    /// Version found on disk
    pub from_version: u32,
    /// Whether any record needed repair
    pub repaired: bool,
}

impl Migrated {
    /// Whether the registry should be rewritten at the current version
    pub fn needs_rewrite(&self) -> bool {
        self.from_version < SCHEMA_VERSION || self.repaired
    }
}

/// Migrate a parsed registry document to the current schema
pub fn migrate(doc: Value, default_chunk_size: usize) -> Migrated {
    debug!("migrate: called");
    let (from_version, records) = match doc {
        Value::Array(records) => (1, records),
        Value::Object(mut envelope) => {
            let version = envelope.get("version").and_then(Value::as_u64).unwrap_or(1) as u32;
            let records = match envelope.remove("tasks") {
                Some(Value::Array(records)) => records,
                _ => Vec::new(),
            };
            (version, records)
        }
        other => {
            warn!(kind = %value_kind(&other), "migrate: registry is not a list or envelope, starting empty");
            (1, Vec::new())
        }
    };

    if from_version > SCHEMA_VERSION {
        warn!(from_version, SCHEMA_VERSION, "migrate: registry written by a newer version");
    }

    let mut repaired = false;
    let mut tasks = Vec::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        let Value::Object(mut record) = record else {
            warn!(position, "migrate: skipping non-object task record");
            repaired = true;
            continue;
        };

        repaired |= repair_record(&mut record, default_chunk_size);

        match serde_json::from_value::<RewriteTask>(Value::Object(record)) {
            Ok(mut task) => {
                let before = task.processed_chunks;
                let pairs = std::mem::take(&mut task.qa_pairs);
                task.replace_pairs(pairs);
                if task.processed_chunks != before {
                    debug!(task_id = %task.id, before, after = task.processed_chunks, "migrate: recounted");
                    repaired = true;
                }
                tasks.push(task);
            }
            Err(e) => {
                warn!(position, error = %e, "migrate: skipping unreadable task record");
                repaired = true;
            }
        }
    }

    if from_version < SCHEMA_VERSION || repaired {
        info!(from_version, task_count = tasks.len(), repaired, "Migrated task registry");
    }

    Migrated {
        tasks,
        from_version,
        repaired,
    }
}

/// Fill in fields introduced by later schema versions
///
/// Returns true if anything changed.
fn repair_record(record: &mut Map<String, Value>, default_chunk_size: usize) -> bool {
    let mut changed = false;

    if !has_string(record, "storage_id") {
        let storage_id = match record.remove("task_id") {
            Some(Value::String(dir_id)) if !dir_id.is_empty() => dir_id,
            _ => generate_storage_id(),
        };
        debug!(%storage_id, "repair_record: assigned storage_id");
        record.insert("storage_id".to_string(), Value::String(storage_id));
        changed = true;
    }

    if !has_string(record, "id") {
        let id = crate::domain::generate_id("task", "recovered");
        record.insert("id".to_string(), Value::String(id));
        changed = true;
    }

    for key in ["input_file", "output_file"] {
        if !has_string(record, key) {
            record.insert(key.to_string(), Value::String(String::new()));
            changed = true;
        }
    }

    changed |= default_if_missing(record, "status", Value::String("pending".to_string()));
    changed |= default_if_missing(record, "qa_pairs", Value::Array(Vec::new()));
    if let Some(Value::Array(pairs)) = record.get_mut("qa_pairs") {
        changed |= repair_pairs(pairs);
    }
    changed |= default_if_missing(record, "total_chunks", Value::from(0u64));
    changed |= default_if_missing(record, "processed_chunks", Value::from(0u64));
    changed |= default_if_missing(record, "chunk_size", Value::from(default_chunk_size as u64));
    changed |= default_if_missing(record, "memory_size", Value::from(0u64));

    changed |= repair_timestamp(record, "created_at", true);
    changed |= repair_timestamp(record, "completed_at", false);
    changed |= default_if_missing(record, "error_message", Value::Null);

    changed
}

/// Give pairs written before the `error` field existed an explicit one
///
/// Those records marked a failed chunk only through the `[Error: ...]` answer
/// text. Pairs that carry the field, even as null, are left alone, so a
/// current rewrite that happens to start with the marker stays a rewrite.
pub fn repair_pairs(pairs: &mut [Value]) -> bool {
    let mut changed = false;
    for pair in pairs.iter_mut().filter_map(Value::as_object_mut) {
        if pair.contains_key("error") {
            continue;
        }
        let message = pair
            .get("answer")
            .and_then(Value::as_str)
            .and_then(|answer| answer.strip_prefix(ERROR_MARKER_PREFIX))
            .map(|rest| rest.strip_suffix(']').unwrap_or(rest).to_string());
        pair.insert("error".to_string(), message.map(Value::String).unwrap_or(Value::Null));
        changed = true;
    }
    changed
}

/// Bring a timestamp field into RFC 3339 form
///
/// Offset-less timestamps are taken as UTC. Unparseable values fall back to
/// now (required fields) or null.
fn repair_timestamp(record: &mut Map<String, Value>, key: &str, required: bool) -> bool {
    let raw = record.get(key).and_then(Value::as_str).map(str::to_string);
    let replacement = match raw {
        Some(raw) if DateTime::parse_from_rfc3339(&raw).is_ok() => return false,
        Some(raw) => parse_naive_timestamp(&raw).map(Value::String),
        None if !required && record.get(key).is_some_and(Value::is_null) => return false,
        None => None,
    };

    let fallback = if required {
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true))
    } else {
        Value::Null
    };
    record.insert(key.to_string(), replacement.unwrap_or(fallback));
    true
}

fn parse_naive_timestamp(raw: &str) -> Option<String> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn has_string(record: &Map<String, Value>, key: &str) -> bool {
    matches!(record.get(key), Some(Value::String(_)))
}

fn default_if_missing(record: &mut Map<String, Value>, key: &str, value: Value) -> bool {
    match record.get(key) {
        Some(existing) if !existing.is_null() => false,
        Some(_) if value.is_null() => false,
        _ => {
            record.insert(key.to_string(), value);
            true
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;
    use serde_json::json;

    #[test]
    fn test_v1_array_without_storage_id() {
        let doc = json!([{
            "id": "6b1f0c4e-0000-0000-0000-000000000000",
            "input_file": "chapter.md",
            "output_file": "out.md",
            "status": "pending",
            "created_at": "2025-03-01T10:15:30.123456",
            "completed_at": null,
            "error_message": null
        }]);

        let migrated = migrate(doc, 800);
        assert_eq!(migrated.from_version, 1);
        assert!(migrated.needs_rewrite());
        assert_eq!(migrated.tasks.len(), 1);

        let task = &migrated.tasks[0];
        assert!(!task.storage_id.is_empty());
        assert_ne!(task.storage_id, task.id);
        assert_eq!(task.chunk_size, 800);
        assert_eq!(task.memory_size, 0);
        assert_eq!(task.total_chunks, 0);
        assert_eq!(task.created_at.to_rfc3339(), "2025-03-01T10:15:30.123456+00:00");
    }

    #[test]
    fn test_v1_directory_id_becomes_storage_id() {
        let doc = json!([{
            "id": "abc",
            "task_id": "dir-123",
            "input_file": "a.md",
            "output_file": "b.md",
            "status": "processing",
            "created_at": "2025-03-01T10:15:30",
            "qa_pairs": [
                {"question": "q1", "answer": "a1", "reasoning_content": null, "chunk_index": 1, "char_count": 5},
                {"question": "q0", "answer": "a0", "reasoning_content": null, "chunk_index": 0, "char_count": 4}
            ],
            "total_chunks": 3,
            "processed_chunks": 2,
            "chunk_size": 500,
            "memory_size": 1
        }]);

        let migrated = migrate(doc, 800);
        let task = &migrated.tasks[0];
        assert_eq!(task.storage_id, "dir-123");
        assert_eq!(task.status, TaskStatus::Processing);
        assert_eq!(task.qa_pairs[0].chunk_index, 0);
        assert_eq!(task.qa_pairs[1].size, 5);
        assert_eq!(task.processed_chunks, 2);
        assert_eq!(task.chunk_size, 500);
    }

    #[test]
    fn test_v2_envelope_round_trip_needs_no_rewrite() {
        let task = RewriteTask::new("/in/a.md", "/out/a.md", 800, 0, Default::default());
        let doc = json!({ "version": SCHEMA_VERSION, "tasks": [serde_json::to_value(&task).unwrap()] });

        let migrated = migrate(doc, 800);
        assert_eq!(migrated.from_version, SCHEMA_VERSION);
        assert!(!migrated.needs_rewrite());
        assert_eq!(migrated.tasks[0].id, task.id);
        assert_eq!(migrated.tasks[0].storage_id, task.storage_id);
    }

    #[test]
    fn test_counter_repaired_from_pairs() {
        let mut task = RewriteTask::new("/in/a.md", "/out/a.md", 800, 0, Default::default());
        task.total_chunks = 2;
        task.processed_chunks = 5;
        let doc = json!({ "version": 2, "tasks": [serde_json::to_value(&task).unwrap()] });

        let migrated = migrate(doc, 800);
        assert!(migrated.repaired);
        assert_eq!(migrated.tasks[0].processed_chunks, 0);
    }

    #[test]
    fn test_legacy_marker_answers_become_failures() {
        let doc = json!([{
            "id": "abc",
            "input_file": "a.md",
            "output_file": "b.md",
            "status": "completed",
            "created_at": "2025-03-01T10:15:30",
            "qa_pairs": [
                {"question": "q0", "answer": "[Error: quota exceeded]", "chunk_index": 0, "char_count": 4},
                {"question": "q1", "answer": "a1", "chunk_index": 1, "char_count": 5}
            ],
            "total_chunks": 2
        }]);

        let task = &migrate(doc, 800).tasks[0];
        assert!(task.qa_pairs[0].is_error());
        assert_eq!(task.qa_pairs[0].error.as_deref(), Some("quota exceeded"));
        assert!(!task.qa_pairs[1].is_error());
    }

    #[test]
    fn test_current_pairs_keep_marker_like_text() {
        let mut pairs = vec![json!({
            "question": "q", "answer": "[Error: ] is how the log prints it", "chunk_index": 0, "size": 1, "error": null
        })];
        assert!(!repair_pairs(&mut pairs));
        assert_eq!(pairs[0]["error"], Value::Null);
    }

    #[test]
    fn test_garbage_records_are_skipped() {
        let doc = json!([42, {"status": "bogus-status"}]);
        let migrated = migrate(doc, 800);
        assert!(migrated.tasks.is_empty());
        assert!(migrated.repaired);
    }

    #[test]
    fn test_parse_naive_timestamp() {
        assert_eq!(
            parse_naive_timestamp("2025-01-02T03:04:05").as_deref(),
            Some("2025-01-02T03:04:05Z")
        );
        assert_eq!(
            parse_naive_timestamp("2025-01-02T03:04:05.250").as_deref(),
            Some("2025-01-02T03:04:05.250Z")
        );
        assert!(parse_naive_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_bad_completed_at_becomes_null() {
        let mut record = Map::new();
        record.insert("completed_at".to_string(), Value::String("someday".to_string()));
        assert!(repair_timestamp(&mut record, "completed_at", false));
        assert_eq!(record["completed_at"], Value::Null);
        assert!(!repair_timestamp(&mut record, "completed_at", false));
    }
}
