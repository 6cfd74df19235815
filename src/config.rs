//! Run configuration for one ETL invocation.
//!
//! The three paths come from the command line; everything else has a default
//! that reproduces the classic behavior (table `messages`, 28-character
//! threshold, fail if the table already exists).

use crate::error::{EtlError, Result};
use clap::ValueEnum;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Table written when no `--table` is given
pub const DEFAULT_TABLE_NAME: &str = "messages";

/// Messages shorter than this many characters are dropped as noise
pub const DEFAULT_MIN_MESSAGE_LENGTH: usize = 28;

lazy_static! {
    static ref TABLE_NAME_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// What to do when the target table already exists in the database
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    /// Abort with a schema conflict
    #[default]
    Fail,
    /// Drop the existing table and recreate it
    Replace,
    /// Insert into the existing table
    Append,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EtlConfig {
    pub messages_path: PathBuf,
    pub categories_path: PathBuf,
    pub database_path: PathBuf,
    pub table_name: String,
    pub min_message_length: usize,
    pub if_exists: IfExists,
    /// Optional destination for the JSON run report
    pub report_path: Option<PathBuf>,
}

impl EtlConfig {
    pub fn new(
        messages_path: impl AsRef<Path>,
        categories_path: impl AsRef<Path>,
        database_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            messages_path: messages_path.as_ref().to_path_buf(),
            categories_path: categories_path.as_ref().to_path_buf(),
            database_path: database_path.as_ref().to_path_buf(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            min_message_length: DEFAULT_MIN_MESSAGE_LENGTH,
            if_exists: IfExists::default(),
            report_path: None,
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_min_message_length(mut self, min_message_length: usize) -> Self {
        self.min_message_length = min_message_length;
        self
    }

    pub fn with_if_exists(mut self, if_exists: IfExists) -> Self {
        self.if_exists = if_exists;
        self
    }

    pub fn with_report_path(mut self, report_path: Option<PathBuf>) -> Self {
        self.report_path = report_path;
        self
    }

    /// Reject settings that would only fail later, deep inside a stage
    pub fn validate(&self) -> Result<()> {
        if !TABLE_NAME_RE.is_match(&self.table_name) {
            return Err(EtlError::Argument(format!(
                "Invalid table name '{}': expected letters, digits and underscores",
                self.table_name
            )));
        }

        for (label, path) in [
            ("messages", &self.messages_path),
            ("categories", &self.categories_path),
            ("database", &self.database_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(EtlError::Argument(format!("Empty {} filepath", label)));
            }
        }

        Ok(())
    }
}
