//! Summary Store - persists evaluation results for the dashboard

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

use super::evaluator::ResultsSummary;

pub struct SummaryStore {
    path: PathBuf,
}

impl SummaryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the summary as pretty JSON, creating parent directories
    pub async fn save(&self, summary: &ResultsSummary) -> Result<()> {
        let json = serde_json::to_string_pretty(summary)
            .context("Failed to serialize results summary")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        fs::write(&self.path, json)
            .await
            .context("Failed to write results summary")?;

        Ok(())
    }

    /// Last saved summary, if any
    pub async fn load(&self) -> Result<Option<ResultsSummary>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)
            .await
            .context("Failed to read results summary")?;

        let summary = serde_json::from_str(&json)
            .context("Failed to deserialize results summary")?;

        Ok(Some(summary))
    }

    pub async fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }
}
