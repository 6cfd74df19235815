//! Writer - persists the cleaned table into a SQLite database
//!
//! Creation and inserts share one transaction, so a failed run leaves no
//! partial rows behind. No row-index column is written.

use crate::config::IfExists;
use crate::error::{EtlError, Result};
use polars::prelude::*;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use std::path::Path;
use tracing::{debug, info};

/// Write `df` as table `table_name` in the database at `database_path`.
///
/// Returns the number of rows inserted.
pub fn save_data(
    df: &DataFrame,
    database_path: &Path,
    table_name: &str,
    if_exists: IfExists,
) -> Result<usize> {
    let mut conn = Connection::open(database_path).map_err(|e| {
        EtlError::Persistence(format!(
            "Failed to open database {}: {}",
            database_path.display(),
            e
        ))
    })?;

    let tx = conn.transaction()?;

    let exists = table_exists(&tx, table_name)?;
    match (exists, if_exists) {
        (true, IfExists::Fail) => {
            return Err(EtlError::SchemaConflict(format!(
                "Table '{}' already exists in {}",
                table_name,
                database_path.display()
            )));
        }
        (true, IfExists::Replace) => {
            debug!("Dropping existing table '{}'", table_name);
            tx.execute(&format!("DROP TABLE {}", quote_ident(table_name)), [])?;
            create_table(&tx, df, table_name)?;
        }
        (true, IfExists::Append) => {
            debug!("Appending to existing table '{}'", table_name);
        }
        (false, _) => create_table(&tx, df, table_name)?,
    }

    let written = insert_rows(&tx, df, table_name)?;

    tx.commit().map_err(|e| {
        EtlError::Persistence(format!("Failed to commit {}: {}", database_path.display(), e))
    })?;

    info!(
        "Wrote {} rows to '{}' in {}",
        written,
        table_name,
        database_path.display()
    );

    Ok(written)
}

fn table_exists(tx: &Transaction<'_>, table_name: &str) -> Result<bool> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table_name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn create_table(tx: &Transaction<'_>, df: &DataFrame, table_name: &str) -> Result<()> {
    let columns = df
        .get_columns()
        .iter()
        .map(|s| format!("{} {}", quote_ident(s.name()), sql_type(s.dtype())))
        .collect::<Vec<_>>()
        .join(", ");

    let ddl = format!("CREATE TABLE {} ({})", quote_ident(table_name), columns);
    debug!("{}", ddl);

    tx.execute(&ddl, []).map_err(|e| {
        EtlError::Persistence(format!("Failed to create table '{}': {}", table_name, e))
    })?;
    Ok(())
}

fn insert_rows(tx: &Transaction<'_>, df: &DataFrame, table_name: &str) -> Result<usize> {
    let columns = df.get_columns();

    let names = columns
        .iter()
        .map(|s| quote_ident(s.name()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");

    let mut stmt = tx.prepare(&format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table_name),
        names,
        placeholders
    ))?;

    for row in 0..df.height() {
        let values = columns
            .iter()
            .map(|s| s.get(row).map(sql_value))
            .collect::<PolarsResult<Vec<Value>>>()?;
        stmt.execute(params_from_iter(values.iter()))?;
    }

    Ok(df.height())
}

fn sql_type(dtype: &DataType) -> &'static str {
    if dtype.is_integer() || matches!(dtype, DataType::Boolean) {
        "INTEGER"
    } else if dtype.is_float() {
        "REAL"
    } else {
        "TEXT"
    }
}

fn sql_value(value: AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Integer(i64::from(b)),
        AnyValue::Int32(v) => Value::Integer(i64::from(v)),
        AnyValue::Int64(v) => Value::Integer(v),
        AnyValue::UInt32(v) => Value::Integer(i64::from(v)),
        AnyValue::UInt64(v) => match i64::try_from(v) {
            Ok(v) => Value::Integer(v),
            Err(_) => Value::Real(v as f64),
        },
        AnyValue::Float32(v) => Value::Real(f64::from(v)),
        AnyValue::Float64(v) => Value::Real(v),
        AnyValue::String(s) => Value::Text(s.to_string()),
        AnyValue::StringOwned(s) => Value::Text(s.to_string()),
        other => Value::Text(other.to_string()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
