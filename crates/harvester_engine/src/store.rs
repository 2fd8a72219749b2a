use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use engine_logging::{engine_debug, engine_info, engine_warn};
use harvester_core::{CursorSet, Fingerprint};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Field every stored record carries its fingerprint in.
pub const ID_FIELD: &str = "id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store directory missing or not writable: {0}")]
    Dir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("existing content at {location} is unreadable: {message}")]
    Corrupt { location: String, message: String },
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage task failed: {0}")]
    Task(String),
}

/// Where an append landed and how much it added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReceipt {
    pub target_key: String,
    pub location: String,
    pub appended: usize,
    pub total: usize,
}

/// Read access to the fingerprints already harvested for a target.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Missing data is an empty set, not an error.
    async fn load_known(&self, target_key: &str) -> Result<CursorSet, StoreError>;
}

/// Append-only destination of accepted records.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn append_records(
        &self,
        target_key: &str,
        records: Vec<Value>,
    ) -> Result<PersistReceipt, StoreError>;

    /// Business keys stored so far for `target_key`, or across every target
    /// when `None`.
    async fn list_known_business_keys(
        &self,
        target_key: Option<&str>,
    ) -> Result<HashSet<String>, StoreError>;
}

/// Directory of `{key}.json` arrays, one per target key.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    business_key_field: String,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>, business_key_field: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            business_key_field: business_key_field.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, target_key: &str) -> PathBuf {
        self.dir.join(storage_file_name(target_key))
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T, StoreError> + Send + 'static,
    {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || work(dir))
            .await
            .map_err(|err| StoreError::Task(err.to_string()))?
    }
}

#[async_trait]
impl CursorStore for JsonFileStore {
    async fn load_known(&self, target_key: &str) -> Result<CursorSet, StoreError> {
        let name = storage_file_name(target_key);
        self.blocking(move |dir| {
            let path = dir.join(name);
            let Some(records) = read_array(&path)? else {
                return Ok(CursorSet::new());
            };
            let known: CursorSet = records
                .iter()
                .filter_map(|record| record.get(ID_FIELD)?.as_str()?.parse::<Fingerprint>().ok())
                .collect();
            engine_debug!("{} known fingerprints in {}", known.len(), path.display());
            Ok(known)
        })
        .await
    }
}

#[async_trait]
impl Sink for JsonFileStore {
    async fn append_records(
        &self,
        target_key: &str,
        records: Vec<Value>,
    ) -> Result<PersistReceipt, StoreError> {
        let name = storage_file_name(target_key);
        let target_key = target_key.to_string();
        self.blocking(move |dir| {
            ensure_store_dir(&dir)?;
            let path = dir.join(name);
            let mut merged = read_array(&path)?.unwrap_or_default();
            let mut ids: HashSet<String> = merged.iter().filter_map(record_id).collect();

            let mut appended = 0;
            for record in records {
                if let Some(id) = record_id(&record) {
                    if !ids.insert(id) {
                        continue;
                    }
                }
                merged.push(record);
                appended += 1;
            }

            let body = serde_json::to_string_pretty(&merged)?;
            write_atomic(&dir, &path, &body)?;
            engine_info!("appended {} records to {} ({} total)", appended, path.display(), merged.len());
            Ok(PersistReceipt {
                target_key,
                location: path.display().to_string(),
                appended,
                total: merged.len(),
            })
        })
        .await
    }

    async fn list_known_business_keys(
        &self,
        target_key: Option<&str>,
    ) -> Result<HashSet<String>, StoreError> {
        let field = self.business_key_field.clone();
        let only = target_key.map(storage_file_name);
        self.blocking(move |dir| {
            let mut keys = HashSet::new();
            if let Some(name) = only {
                let records = read_array(&dir.join(name))?.unwrap_or_default();
                keys.extend(records.iter().filter_map(|record| business_key(record, &field)));
                return Ok(keys);
            }
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(keys),
                Err(err) => return Err(err.into()),
            };
            for entry in entries {
                let path = entry?.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                match read_array(&path) {
                    Ok(records) => keys.extend(
                        records
                            .unwrap_or_default()
                            .iter()
                            .filter_map(|record| business_key(record, &field)),
                    ),
                    Err(err) => engine_warn!("skipping {}: {}", path.display(), err),
                }
            }
            Ok(keys)
        })
        .await
    }
}

/// Group serialized records by target key, keeping first-seen order.
pub fn group_by_key(records: Vec<(String, Value)>) -> Vec<(String, Vec<Value>)> {
    let mut order: Vec<(String, Vec<Value>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (key, record) in records {
        match index.get(&key) {
            Some(&slot) => order[slot].1.push(record),
            None => {
                index.insert(key.clone(), order.len());
                order.push((key, vec![record]));
            }
        }
    }
    order
}

fn business_key(record: &Value, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(key) => Some(key.clone()),
        Value::Number(key) => Some(key.to_string()),
        _ => None,
    }
}

fn record_id(record: &Value) -> Option<String> {
    record.get(ID_FIELD)?.as_str().map(str::to_string)
}

fn read_array(path: &Path) -> Result<Option<Vec<Value>>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if raw.trim().is_empty() {
        return Ok(Some(Vec::new()));
    }
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|err| StoreError::Corrupt {
            location: path.display().to_string(),
            message: err.to_string(),
        })
}

/// Ensure the store directory exists; create if missing.
pub fn ensure_store_dir(dir: &Path) -> Result<(), StoreError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| StoreError::Dir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(StoreError::Dir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| StoreError::Dir(e.to_string()))?;
    }
    Ok(())
}

fn write_atomic(dir: &Path, target: &Path, content: &str) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(target).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// File name for a target key: `{sanitized}.json`, with a short hash of the
/// original key appended whenever sanitizing changed it.
pub fn storage_file_name(key: &str) -> String {
    let sanitized = sanitize_key(key);
    if sanitized == key {
        format!("{sanitized}.json")
    } else {
        format!("{sanitized}--{}.json", short_hash(key))
    }
}

fn sanitize_key(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);
    if cleaned.is_empty() {
        return "unnamed".to_string();
    }
    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        compacted.push(c);
    }
    let mut final_name: String = compacted.chars().take(80).collect();
    if is_reserved_windows_name(&final_name) {
        final_name.push('_');
    }
    final_name
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_keys_map_directly() {
        assert_eq!(storage_file_name("1234567"), "1234567.json");
        assert_eq!(storage_file_name("공덕역 맛집"), "공덕역 맛집.json");
    }

    #[test]
    fn altered_keys_get_a_hash_suffix() {
        let name = storage_file_name("a/b");
        assert!(name.starts_with("a_b--"));
        assert_eq!(name.len(), "a_b--".len() + 8 + ".json".len());
        assert_ne!(storage_file_name("a/b"), storage_file_name("a:b"));
    }

    #[test]
    fn reserved_and_empty_names() {
        assert!(storage_file_name("CON").starts_with("CON_--"));
        assert!(storage_file_name("..").starts_with("unnamed--"));
    }

    #[test]
    fn grouping_keeps_first_seen_order() {
        let grouped = group_by_key(vec![
            ("b".into(), Value::from(1)),
            ("a".into(), Value::from(2)),
            ("b".into(), Value::from(3)),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "b");
        assert_eq!(grouped[0].1, vec![Value::from(1), Value::from(3)]);
        assert_eq!(grouped[1].0, "a");
    }
}
