//! Run report - what one ETL run read, dropped and wrote

use crate::cleaner::CleanStats;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EtlReport {
    pub messages_path: PathBuf,
    pub categories_path: PathBuf,
    pub database_path: PathBuf,
    pub table_name: String,

    /// Rows out of the left join (before any cleaning)
    pub joined_rows: usize,
    pub clean: CleanStats,
    pub rows_written: usize,
    pub categories: Vec<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl EtlReport {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Write the report as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
