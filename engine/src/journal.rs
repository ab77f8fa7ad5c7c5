//! Session journal
//!
//! Finished navigation reports are appended to a JSON-lines file in the data
//! directory, one report per line.

use crate::navigation::NavigationReport;
use carnav_sdk::errors::EngineError;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Append-only JSON-lines journal of navigation reports
#[derive(Debug, Clone)]
pub struct SessionJournal {
    path: PathBuf,
}

impl SessionJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one report
    pub async fn append(&self, report: &NavigationReport) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(report)
            .map_err(|e| EngineError::Config(format!("Failed to serialize report: {}", e)))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(
            "Journaled session {} to {}",
            report.session_id,
            self.path.display()
        );
        Ok(())
    }

    /// The most recent `limit` reports, newest first
    ///
    /// Lines that fail to parse are skipped with a warning.
    pub async fn recent(&self, limit: usize) -> Result<Vec<NavigationReport>, EngineError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let reports = contents
            .lines()
            .rev()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<NavigationReport>(line) {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("Skipping unreadable journal line: {}", e);
                    None
                }
            })
            .take(limit)
            .collect();

        Ok(reports)
    }
}
