use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blake3::Hasher;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::PipelineError;

/// One loosely-typed JSON object plus where it came from.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub source: Arc<Path>,
    pub index: usize,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    /// Looks up a key, descending into nested objects on `.` separators
    /// (`sleepScores.overallScore`). A literal key containing dots wins over
    /// the nested interpretation.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.fields.get(key) {
            return Some(value);
        }
        let mut parts = key.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub records: usize,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DroppedRecord {
    pub path: PathBuf,
    pub index: usize,
    pub reason: String,
}

/// Every record read for one dataset, in locator order then file order.
#[derive(Debug, Default)]
pub struct RawRecordSet {
    pub records: Vec<RawRecord>,
    pub files: Vec<FileSummary>,
    pub skipped_files: Vec<SkippedFile>,
    pub dropped_records: Vec<DroppedRecord>,
}

impl RawRecordSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

struct FileRecords {
    records: Vec<(usize, Map<String, Value>)>,
    dropped: Vec<(usize, String)>,
    hash: String,
}

/// Reads and concatenates every file. A file that cannot be read, is not
/// JSON, or whose top level is neither an array nor an object is recorded in
/// `skipped_files` and aggregation moves on to the next file.
pub fn aggregate(paths: &[PathBuf]) -> RawRecordSet {
    let mut set = RawRecordSet::default();
    let mut seen_hashes: HashMap<String, PathBuf> = HashMap::new();

    for path in paths {
        let parsed = match read_file(path) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping malformed file");
                set.skipped_files.push(SkippedFile {
                    path: path.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
        };

        if let Some(first) = seen_hashes.get(&parsed.hash) {
            warn!(
                path = %path.display(),
                first = %first.display(),
                "file is byte-identical to an earlier file"
            );
        } else {
            seen_hashes.insert(parsed.hash.clone(), path.clone());
        }

        let source: Arc<Path> = Arc::from(path.as_path());
        for (index, reason) in parsed.dropped {
            warn!(path = %path.display(), index, %reason, "dropping record");
            set.dropped_records.push(DroppedRecord {
                path: path.clone(),
                index,
                reason,
            });
        }

        let count = parsed.records.len();
        set.records
            .extend(parsed.records.into_iter().map(|(index, fields)| RawRecord {
                source: Arc::clone(&source),
                index,
                fields,
            }));
        info!(path = %path.display(), records = count, "loaded file");
        set.files.push(FileSummary {
            path: path.clone(),
            records: count,
            hash: parsed.hash,
        });
    }

    info!(
        records = set.records.len(),
        files = set.files.len(),
        skipped = set.skipped_files.len(),
        "aggregated files"
    );

    set
}

fn read_file(path: &Path) -> Result<FileRecords, PipelineError> {
    let bytes = std::fs::read(path)
        .map_err(|err| PipelineError::malformed_file(path, format!("unreadable: {err}")))?;
    let hash = compute_hash(&bytes);
    let document: Value = serde_json::from_slice(&bytes)
        .map_err(|err| PipelineError::malformed_file(path, format!("invalid JSON: {err}")))?;

    let mut records = Vec::new();
    let mut dropped = Vec::new();
    match document {
        Value::Array(items) => {
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(map) => records.push((index, map)),
                    other => dropped.push((
                        index,
                        format!("expected a JSON object, found {}", value_kind(&other)),
                    )),
                }
            }
        }
        Value::Object(map) => records.push((0, map)),
        other => {
            return Err(PipelineError::malformed_file(
                path,
                format!(
                    "top-level value must be an array or object, found {}",
                    value_kind(&other)
                ),
            ))
        }
    }

    Ok(FileRecords {
        records,
        dropped,
        hash,
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn compute_hash(contents: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(contents);
    hasher.finalize().to_hex().to_string()
}
