//! Loader - reads the message and category files and left-joins them on `id`
//!
//! Each file gets a cheap header check with the `csv` crate first so that a
//! missing header or key column surfaces as a clear error instead of a
//! parser message; the actual parse goes through `LazyCsvReader`.

use crate::error::{EtlError, Result};
use csv::ReaderBuilder;
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

pub const ID_COLUMN: &str = "id";
pub const MESSAGE_COLUMN: &str = "message";
pub const ORIGINAL_COLUMN: &str = "original";
pub const GENRE_COLUMN: &str = "genre";
pub const CATEGORIES_COLUMN: &str = "categories";

const MESSAGE_FILE_COLUMNS: &[&str] = &[ID_COLUMN, MESSAGE_COLUMN, GENRE_COLUMN];
const CATEGORY_FILE_COLUMNS: &[&str] = &[ID_COLUMN, CATEGORIES_COLUMN];

/// Load both files and return the left join of messages with categories.
///
/// Every message row survives; rows without a category record carry a null
/// `categories` value.
pub fn load_data(messages_path: &Path, categories_path: &Path) -> Result<DataFrame> {
    let messages = read_table(messages_path, MESSAGE_FILE_COLUMNS)?;
    let categories = read_table(categories_path, CATEGORY_FILE_COLUMNS)?;

    info!(
        "Loaded {} message rows and {} category rows",
        messages.height(),
        categories.height()
    );

    join_on_id(messages, categories)
}

/// Parse one delimited file with a header row into a DataFrame
pub fn read_table(path: &Path, required: &[&str]) -> Result<DataFrame> {
    let headers = read_headers(path)?;
    require_columns(&headers, required, path)?;

    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(None)
        .finish()
        .and_then(|lf| lf.collect())
        .map_err(|e| EtlError::DataLoad(format!("Failed to parse {}: {}", path.display(), e)))?;

    debug!(
        "Parsed {} ({} rows, {} columns)",
        path.display(),
        df.height(),
        df.width()
    );

    Ok(df)
}

fn read_headers(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Err(EtlError::DataLoad(format!("File not found: {}", path.display())));
    }

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| EtlError::DataLoad(format!("Failed to open {}: {}", path.display(), e)))?;

    let headers = rdr
        .headers()
        .map_err(|e| {
            EtlError::DataLoad(format!("Failed to read header of {}: {}", path.display(), e))
        })?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(EtlError::DataLoad(format!(
            "No header row in {}",
            path.display()
        )));
    }

    Ok(headers)
}

fn require_columns(headers: &[String], required: &[&str], path: &Path) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| !headers.iter().any(|h| h == name))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EtlError::Schema(format!(
            "{} is missing required column(s): {}",
            path.display(),
            missing.join(", ")
        )))
    }
}

/// Left join on `id`, casting the right key to the left key's dtype first
pub fn join_on_id(messages: DataFrame, categories: DataFrame) -> Result<DataFrame> {
    let id_dtype = messages
        .column(ID_COLUMN)
        .map_err(|_| EtlError::Schema("Messages table has no 'id' column".to_string()))?
        .dtype()
        .clone();

    if categories.column(ID_COLUMN).is_err() {
        return Err(EtlError::Schema("Categories table has no 'id' column".to_string()));
    }

    let left_rows = messages.height();

    let joined = messages
        .lazy()
        .join(
            categories
                .lazy()
                .with_column(col(ID_COLUMN).cast(id_dtype)),
            [col(ID_COLUMN)],
            [col(ID_COLUMN)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()
        .map_err(|e| EtlError::DataLoad(format!("Join on '{}' failed: {}", ID_COLUMN, e)))?;

    if joined.height() > left_rows {
        debug!(
            "Join fanned out {} message rows into {} rows (repeated category ids)",
            left_rows,
            joined.height()
        );
    }

    Ok(joined)
}
