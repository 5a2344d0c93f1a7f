//! Durable local fallback for undeliverable payloads.
//!
//! Each payload is written to a temp file in the spill directory, synced,
//! then renamed into place, so a reader never sees a partial file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::types::IngestKind;
use crate::types::{Error, Result};

/// On-disk spill file content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpillRecord {
    pub kind: IngestKind,
    pub payload: Value,
    pub spilled_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SpillStore {
    dir: PathBuf,
}

impl SpillStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<kind>-<key or uuid>-<unix millis>.json`
    fn file_name(kind: IngestKind, key: Option<&str>, at: DateTime<Utc>) -> String {
        let key = key
            .filter(|k| !k.is_empty())
            .map(|k| k.replace(|c: char| !c.is_ascii_alphanumeric() && c != '-', "_"))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        format!("{}-{}-{}.json", kind.as_str(), key, at.timestamp_millis())
    }

    /// Write `payload` atomically and return the final path.
    pub fn write(&self, kind: IngestKind, key: Option<&str>, payload: &Value) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let record = SpillRecord {
            kind,
            payload: payload.clone(),
            spilled_at: Utc::now(),
        };
        let path = self
            .dir
            .join(Self::file_name(kind, key, record.spilled_at));

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(&record)?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
        Ok(path)
    }

    /// Spill files in name order. Temp files and other entries are ignored.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if !name.starts_with('.') && name.ends_with(".json") && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn read(path: &Path) -> Result<SpillRecord> {
        let raw = std::fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn remove(path: &Path) -> Result<()> {
        std::fs::remove_file(path)?;
        Ok(())
    }
}
