//! Reasoning Audit Log
//!
//! Keeps every raw model generation, keyed by a hash of the prompt, so a
//! reasoning decision can be traced back to the exact text that produced it.
//! Optionally mirrored to a JSONL file.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::provider::InferenceOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Parsed,
    Unparseable,
    Timeout,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub scenario: String,
    pub prompt_hash: String,
    pub model: String,
    pub options: InferenceOptions,
    /// Raw generation; absent when the call never returned
    pub raw: Option<String>,
    pub outcome: AuditOutcome,
    pub recorded_at: DateTime<Utc>,
}

pub struct ReasoningAudit {
    records: Arc<RwLock<Vec<AuditRecord>>>,
    sink: Option<PathBuf>,
}

impl ReasoningAudit {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            sink: None,
        }
    }

    /// Also append each record as one JSON line to `path`
    pub fn with_sink(path: impl Into<PathBuf>) -> Self {
        Self {
            sink: Some(path.into()),
            ..Self::new()
        }
    }

    pub fn hash(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    pub async fn record(&self, record: AuditRecord) -> Result<()> {
        if let Some(path) = &self.sink {
            let mut line = serde_json::to_string(&record)?;
            line.push('\n');
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("Failed to open audit log {:?}", path))?;
            file.write_all(line.as_bytes()).await?;
        }
        self.records.write().await.push(record);
        Ok(())
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

impl Default for ReasoningAudit {
    fn default() -> Self {
        Self::new()
    }
}
