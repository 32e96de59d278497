//! Audit sinks recording a human-readable summary of every sync outcome

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Destination for audit events.
///
/// Recording never fails from the caller's point of view; sinks report their
/// own write problems through logging.
pub trait AuditSink: Send + Sync {
    fn record(&self, action: &str, details: &str);
}

/// Writes audit events to the `audit` tracing target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, action: &str, details: &str) {
        tracing::info!(target: "audit", action, details, "Audit event");
    }
}

/// One line of a JSON-lines audit file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub recorded_at_utc: DateTime<Utc>,
    pub action: String,
    pub details: String,
}

/// Append-only JSON-lines audit log
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Read back every entry, oldest first. A missing file has no entries.
    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(std::fs::File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }

    fn append(&self, entry: &AuditEntry) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, action: &str, details: &str) {
        let entry = AuditEntry {
            id: Uuid::now_v7(),
            recorded_at_utc: Utc::now(),
            action: action.to_string(),
            details: details.to_string(),
        };
        if let Err(error) = self.append(&entry) {
            tracing::warn!(path = %self.path.display(), %error, "Failed to write audit entry");
        }
        tracing::info!(target: "audit", action, details, "Audit event");
    }
}
