//! Per-user level completion facts.
//!
//! The store is a directory with one JSON file per user, each holding an array of
//! `{ "id": <level id>, "completed": <bool>, ... }` entries. Fields this crate does not
//! know about are preserved on rewrite, and a file that cannot be parsed reads as empty.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TrainerError};

/// The one persisted fact a successful attempt produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub user: String,
    pub level_id: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEntry {
    pub id: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub trait CompletionSink {
    /// Marks `record.level_id` for `record.user`. Repeating the same record is a no-op.
    fn upsert(&mut self, record: &CompletionRecord) -> Result<()>;
    fn entries(&self, user: &str) -> Vec<CompletionEntry>;
}

/// Applies a record to a raw entry array, leaving every other entry untouched.
fn upsert_value(items: &mut Vec<Value>, record: &CompletionRecord) {
    let existing = items
        .iter_mut()
        .filter_map(Value::as_object_mut)
        .find(|entry| entry.get("id").and_then(Value::as_str) == Some(record.level_id.as_str()));
    if let Some(entry) = existing {
        entry.insert("completed".to_string(), Value::Bool(record.completed));
        return;
    }

    let mut entry = Map::new();
    entry.insert("id".to_string(), Value::String(record.level_id.clone()));
    entry.insert("completed".to_string(), Value::Bool(record.completed));
    items.push(Value::Object(entry));
}

fn parse_entries(items: &[Value]) -> Vec<CompletionEntry> {
    items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

#[derive(Debug, Clone)]
pub struct CompletionStore {
    dir: PathBuf,
}

impl CompletionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    pub fn from_lookup(mut lookup: impl FnMut(&str) -> Option<OsString>) -> Self {
        if let Some(explicit) = lookup("TRAINER_PROGRESS_DIR") {
            return Self::new(PathBuf::from(explicit));
        }
        let base = lookup("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                lookup("HOME").map(|home| {
                    let mut p = PathBuf::from(home);
                    p.push(".local");
                    p.push("share");
                    p
                })
            })
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join("driving-trainer").join("progress"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, user: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(user)))
    }

    fn read_raw(&self, user: &str) -> Vec<Value> {
        let path = self.path_for(user);
        let Ok(bytes) = fs::read(&path) else {
            return Vec::new();
        };
        match serde_json::from_slice::<Vec<Value>>(&bytes) {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "treating malformed progress file as empty");
                Vec::new()
            }
        }
    }
}

impl CompletionSink for CompletionStore {
    fn upsert(&mut self, record: &CompletionRecord) -> Result<()> {
        let path = self.path_for(&record.user);
        let mut items = self.read_raw(&record.user);
        upsert_value(&mut items, record);

        let io_err = |source| TrainerError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let text = serde_json::to_string_pretty(&items).map_err(|source| TrainerError::Parse {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, text).map_err(io_err)?;
        tracing::info!(user = %record.user, level = %record.level_id, "level completion recorded");
        Ok(())
    }

    fn entries(&self, user: &str) -> Vec<CompletionEntry> {
        parse_entries(&self.read_raw(user))
    }
}

/// Keeps every user in a distinct, filesystem-safe file name.
fn file_stem(user: &str) -> String {
    let mut out = String::with_capacity(user.len());
    for byte in user.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("_{byte:02x}"));
        }
    }
    out
}

/// In-memory store, used by tests and by scripted play that should not persist.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    users: BTreeMap<String, Vec<Value>>,
}

impl CompletionSink for MemoryStore {
    fn upsert(&mut self, record: &CompletionRecord) -> Result<()> {
        upsert_value(self.users.entry(record.user.clone()).or_default(), record);
        Ok(())
    }

    fn entries(&self, user: &str) -> Vec<CompletionEntry> {
        self.users
            .get(user)
            .map(|items| parse_entries(items))
            .unwrap_or_default()
    }
}
