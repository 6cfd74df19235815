//! Pipeline - runs load, clean and save in sequence
//!
//! Progress lines go to the caller's writer (stdout in the binary); any stage
//! error aborts the run and is returned unchanged.

use crate::cleaner::clean_data;
use crate::config::EtlConfig;
use crate::error::Result;
use crate::loader::load_data;
use crate::report::EtlReport;
use crate::writer::save_data;
use chrono::Utc;
use std::fmt;
use std::io::Write;
use tracing::{info, info_span};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Load,
    Clean,
    Save,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Load => write!(f, "load"),
            Stage::Clean => write!(f, "clean"),
            Stage::Save => write!(f, "save"),
        }
    }
}

pub fn run(config: &EtlConfig, progress: &mut dyn Write) -> Result<EtlReport> {
    config.validate()?;
    let started_at = Utc::now();

    let joined = {
        let _span = info_span!("stage", stage = %Stage::Load).entered();
        writeln!(
            progress,
            "Loading data...\n    MESSAGES: {}\n    CATEGORIES: {}",
            config.messages_path.display(),
            config.categories_path.display()
        )?;
        load_data(&config.messages_path, &config.categories_path)?
    };
    let joined_rows = joined.height();

    let cleaned = {
        let _span = info_span!("stage", stage = %Stage::Clean).entered();
        writeln!(progress, "Cleaning data...")?;
        clean_data(joined, config.min_message_length)?
    };

    let rows_written = {
        let _span = info_span!("stage", stage = %Stage::Save).entered();
        writeln!(
            progress,
            "Saving data...\n    DATABASE: {}",
            config.database_path.display()
        )?;
        save_data(
            &cleaned.frame,
            &config.database_path,
            &config.table_name,
            config.if_exists,
        )?
    };

    writeln!(progress, "Cleaned data saved to database!")?;

    let report = EtlReport {
        messages_path: config.messages_path.clone(),
        categories_path: config.categories_path.clone(),
        database_path: config.database_path.clone(),
        table_name: config.table_name.clone(),
        joined_rows,
        clean: cleaned.stats,
        rows_written,
        categories: cleaned.categories,
        started_at,
        finished_at: Utc::now(),
    };

    info!(
        "Run finished in {} ms: {} joined rows, {} written, {} categories",
        report.duration_ms(),
        report.joined_rows,
        report.rows_written,
        report.categories.len()
    );

    if let Some(path) = &config.report_path {
        report.save(path)?;
        info!("Report written to {}", path.display());
    }

    Ok(report)
}
