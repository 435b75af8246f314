//! Append-only record of successful workflows.
//!
//! The sink is injected into the orchestrator at construction time. Each
//! record is one JSON object per line, written and flushed under a lock so
//! concurrent workflows never interleave partial lines.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::AuditError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub details: String,
}

impl AuditRecord {
    pub fn new(action: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.into(),
            details: details.into(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;

    /// Flush and release the sink. Later records fail with `Closed`.
    async fn close(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Audit sink appending JSON lines to a file.
pub struct FileAuditSink {
    path: PathBuf,
    file: tokio::sync::Mutex<Option<File>>,
}

impl FileAuditSink {
    /// Open `path` for appending, creating it and its parent directories.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!("Opened audit log {}", path.display());

        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(AuditError::Closed)?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), AuditError> {
        if let Some(mut file) = self.file.lock().await.take() {
            file.flush().await?;
            file.sync_all().await?;
            debug!("Closed audit log {}", self.path.display());
        }
        Ok(())
    }
}

/// Audit sink that keeps records in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    closed: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        if self.is_closed() {
            return Err(AuditError::Closed);
        }
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
        Ok(())
    }

    async fn close(&self) -> Result<(), AuditError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
