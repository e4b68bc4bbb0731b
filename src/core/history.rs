use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub const HISTORY_FILE: &str = ".history.jsonl";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AlbumHistoryRecord {
    pub timestamp: String,
    pub album: String,
    pub members: Vec<String>,
    pub action: String, // "created" or "extended"
}

impl AlbumHistoryRecord {
    pub fn now(album: &str, members: Vec<String>, created: bool) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            album: album.to_string(),
            members,
            action: if created { "created" } else { "extended" }.to_string(),
        }
    }
}

/// Append-only JSON-lines log of album changes.
pub struct HistoryJournal {
    path: PathBuf,
}

impl HistoryJournal {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(HISTORY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &AlbumHistoryRecord) -> std::io::Result<()> {
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(out, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    /// Records in file order; malformed lines are logged and skipped.
    pub fn read(&self) -> std::io::Result<Vec<AlbumHistoryRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AlbumHistoryRecord>(&line) {
                Ok(rec) => records.push(rec),
                Err(err) => tracing::warn!("Skipping malformed history entry {}: {}", i, err),
            }
        }
        Ok(records)
    }
}
