//! Append-only record of prior conversation turns.
//!
//! Readers always see entries in the order they were appended. The file-backed
//! log stores one JSON object per line and serializes appends behind a lock, so
//! concurrent writers never interleave partial lines.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use argo_types::ConversationEntry;
use chrono::{SecondsFormat, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history io error: {0}")]
    Io(String),
    #[error("history line {line} unreadable: {message}")]
    Parse { line: usize, message: String },
    #[error("history lock poisoned")]
    Lock,
}

pub trait ConversationLog: Send + Sync {
    /// All entries, oldest first.
    fn entries(&self) -> Result<Vec<ConversationEntry>, HistoryError>;
    fn append(&self, entry: ConversationEntry) -> Result<(), HistoryError>;

    /// The last `n` entries, oldest first.
    fn tail(&self, n: usize) -> Result<Vec<ConversationEntry>, HistoryError> {
        let mut all = self.entries()?;
        let skip = all.len().saturating_sub(n);
        Ok(all.split_off(skip))
    }
}

/// Entry stamped with the current UTC time.
pub fn entry_now(user_message: impl Into<String>, ai_response: impl Into<String>) -> ConversationEntry {
    ConversationEntry {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        user_message: user_message.into(),
        ai_response: ai_response.into(),
    }
}

pub struct JsonlConversationLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlConversationLog {
    /// A missing file is an empty log; it is created on first append.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConversationLog for JsonlConversationLog {
    fn entries(&self) -> Result<Vec<ConversationEntry>, HistoryError> {
        let _guard = self.lock.lock().map_err(|_| HistoryError::Lock)?;
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path).map_err(|e| HistoryError::Io(e.to_string()))?;
        let mut out = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| HistoryError::Io(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line).map_err(|e| HistoryError::Parse {
                line: idx + 1,
                message: e.to_string(),
            })?;
            out.push(entry);
        }
        Ok(out)
    }

    fn append(&self, entry: ConversationEntry) -> Result<(), HistoryError> {
        let _guard = self.lock.lock().map_err(|_| HistoryError::Lock)?;
        let line = serde_json::to_string(&entry).map_err(|e| HistoryError::Parse {
            line: 0,
            message: e.to_string(),
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HistoryError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| HistoryError::Io(e.to_string()))
    }
}

#[derive(Default)]
pub struct InMemoryConversationLog {
    entries: Mutex<Vec<ConversationEntry>>,
}

impl InMemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<ConversationEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl ConversationLog for InMemoryConversationLog {
    fn entries(&self) -> Result<Vec<ConversationEntry>, HistoryError> {
        Ok(self.entries.lock().map_err(|_| HistoryError::Lock)?.clone())
    }

    fn append(&self, entry: ConversationEntry) -> Result<(), HistoryError> {
        self.entries.lock().map_err(|_| HistoryError::Lock)?.push(entry);
        Ok(())
    }
}
