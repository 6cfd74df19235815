//! Cleaner - turns the joined table into one row per distinct message
//!
//! Steps, in order:
//! 1. expand the packed `categories` string into one integer column per category
//! 2. keep only `id, message, genre` and the category columns
//! 3. drop byte-identical rows (first occurrence wins)
//! 4. collapse rows sharing (id, message, genre), taking the max of each category
//! 5. drop rows whose message is shorter than the threshold

use crate::error::{EtlError, Result};
use crate::loader::{CATEGORIES_COLUMN, GENRE_COLUMN, ID_COLUMN, MESSAGE_COLUMN};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

const KEY_COLUMNS: [&str; 3] = [ID_COLUMN, MESSAGE_COLUMN, GENRE_COLUMN];

const TOKEN_SEPARATOR: char = ';';
const FLAG_SEPARATOR: char = '-';

/// Row counts observed after each cleaning step
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanStats {
    pub input_rows: usize,
    pub deduplicated_rows: usize,
    pub reconciled_rows: usize,
    pub degenerate_dropped: usize,
    pub output_rows: usize,
}

/// Output of [`clean_data`]
#[derive(Clone, Debug)]
pub struct CleanedTable {
    /// Columns `id, message, genre` followed by one Int64 column per category
    pub frame: DataFrame,
    /// Category names in column order
    pub categories: Vec<String>,
    pub stats: CleanStats,
}

pub fn clean_data(df: DataFrame, min_message_length: usize) -> Result<CleanedTable> {
    let input_rows = df.height();

    let (df, categories) = expand_categories(df)?;
    debug!("Expanded {} category columns", categories.len());

    let df = prune_columns(df, &categories)?;

    let df = drop_exact_duplicates(df)?;
    let deduplicated_rows = df.height();

    let df = reconcile_duplicates(df, &categories)?;
    let reconciled_rows = df.height();

    let df = drop_degenerate_messages(df, min_message_length)?;
    let output_rows = df.height();

    let stats = CleanStats {
        input_rows,
        deduplicated_rows,
        reconciled_rows,
        degenerate_dropped: reconciled_rows - output_rows,
        output_rows,
    };

    info!(
        "Cleaned {} rows -> {} after dedup -> {} after reconciliation -> {} kept",
        stats.input_rows, stats.deduplicated_rows, stats.reconciled_rows, stats.output_rows
    );

    Ok(CleanedTable {
        frame: df,
        categories,
        stats,
    })
}

/// Split a `name-flag` token into its name and integer flag.
///
/// The flag is the single trailing character and must be a decimal digit.
pub fn parse_token(token: &str) -> Option<(&str, i64)> {
    let mut rev = token.char_indices().rev();
    let (_, flag) = rev.next()?;
    let (sep_idx, sep) = rev.next()?;

    if sep != FLAG_SEPARATOR || sep_idx == 0 {
        return None;
    }

    let value = flag.to_digit(10)?;
    Some((&token[..sep_idx], i64::from(value)))
}

fn split_tokens(packed: &str, row: usize) -> Result<Vec<(&str, i64)>> {
    packed
        .split(TOKEN_SEPARATOR)
        .map(|token| {
            parse_token(token).ok_or_else(|| {
                EtlError::Transform(format!(
                    "Row {}: malformed category token '{}' (expected '<name>-<digit>')",
                    row, token
                ))
            })
        })
        .collect()
}

/// Replace the packed `categories` column with one Int64 column per category.
///
/// Names come from the first row that has a categories value; every other
/// row must list the same names in the same order. Rows with no categories
/// value (left-join misses) get nulls.
pub fn expand_categories(df: DataFrame) -> Result<(DataFrame, Vec<String>)> {
    let packed = df
        .column(CATEGORIES_COLUMN)
        .map_err(|_| EtlError::Transform(format!("Missing '{}' column", CATEGORIES_COLUMN)))?;
    let packed = packed.str().map_err(|_| {
        EtlError::Transform(format!(
            "'{}' column has type {} instead of text",
            CATEGORIES_COLUMN,
            packed.dtype()
        ))
    })?;

    let (first_row, first_value) = packed
        .into_iter()
        .enumerate()
        .find_map(|(row, value)| value.map(|v| (row, v)))
        .ok_or_else(|| {
            EtlError::Transform("No row has a categories value to derive names from".to_string())
        })?;

    let names: Vec<String> = split_tokens(first_value, first_row)?
        .into_iter()
        .map(|(name, _)| name.to_string())
        .collect();
    check_category_names(&names)?;

    let mut values: Vec<Vec<Option<i64>>> = vec![Vec::with_capacity(df.height()); names.len()];

    for (row, value) in packed.into_iter().enumerate() {
        let Some(value) = value else {
            values.iter_mut().for_each(|column| column.push(None));
            continue;
        };

        let tokens = split_tokens(value, row)?;
        if tokens.len() != names.len() {
            return Err(EtlError::Transform(format!(
                "Row {}: {} category tokens, expected {}",
                row,
                tokens.len(),
                names.len()
            )));
        }

        for (pos, (name, flag)) in tokens.into_iter().enumerate() {
            if name != names[pos] {
                return Err(EtlError::Transform(format!(
                    "Row {}: category '{}' at position {}, expected '{}'",
                    row, name, pos, names[pos]
                )));
            }
            values[pos].push(Some(flag));
        }
    }

    let columns: Vec<Series> = names
        .iter()
        .zip(values)
        .map(|(name, column)| Series::new(name.as_str(), column))
        .collect();

    let expanded = df.drop(CATEGORIES_COLUMN)?.hstack(&columns)?;
    Ok((expanded, names))
}

fn check_category_names(names: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if KEY_COLUMNS.contains(&name.as_str()) {
            return Err(EtlError::Transform(format!(
                "Category '{}' collides with a key column",
                name
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(EtlError::Transform(format!("Category '{}' appears twice", name)));
        }
    }
    Ok(())
}

/// Keep `id, message, genre` and the category columns, in that order
pub fn prune_columns(df: DataFrame, categories: &[String]) -> Result<DataFrame> {
    require_keys(&df)?;

    let keep: Vec<String> = KEY_COLUMNS
        .iter()
        .map(|k| k.to_string())
        .chain(categories.iter().cloned())
        .collect();

    let dropped: Vec<&str> = df
        .get_column_names()
        .into_iter()
        .filter(|name| !keep.iter().any(|k| k.as_str() == *name))
        .collect();
    if !dropped.is_empty() {
        debug!("Dropping columns: {}", dropped.join(", "));
    }

    Ok(df.select(keep)?)
}

pub fn drop_exact_duplicates(df: DataFrame) -> Result<DataFrame> {
    let before = df.height();
    let df = df
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    debug!("Removed {} exact duplicate rows", before - df.height());
    Ok(df)
}

/// One row per (id, message, genre), each category the max over the group.
///
/// Rows with a null key are dropped. Groups keep first-appearance order.
pub fn reconcile_duplicates(df: DataFrame, categories: &[String]) -> Result<DataFrame> {
    require_keys(&df)?;

    let not_null = col(ID_COLUMN)
        .is_not_null()
        .and(col(MESSAGE_COLUMN).is_not_null())
        .and(col(GENRE_COLUMN).is_not_null());

    let aggs: Vec<Expr> = categories.iter().map(|name| col(name).max()).collect();

    let df = df
        .lazy()
        .filter(not_null)
        .group_by_stable([col(ID_COLUMN), col(MESSAGE_COLUMN), col(GENRE_COLUMN)])
        .agg(aggs)
        .collect()?;

    Ok(df)
}

/// Drop rows whose message has fewer than `min_length` characters
pub fn drop_degenerate_messages(df: DataFrame, min_length: usize) -> Result<DataFrame> {
    let messages = df
        .column(MESSAGE_COLUMN)
        .map_err(|_| EtlError::Transform(format!("Missing '{}' column", MESSAGE_COLUMN)))?
        .str()
        .map_err(|_| EtlError::Transform(format!("'{}' column is not text", MESSAGE_COLUMN)))?;

    let mask: BooleanChunked = messages
        .into_iter()
        .map(|message| message.map_or(false, |m| m.chars().count() >= min_length))
        .collect();

    Ok(df.filter(&mask)?)
}

fn require_keys(df: &DataFrame) -> Result<()> {
    for key in KEY_COLUMNS {
        if df.column(key).is_err() {
            return Err(EtlError::Transform(format!("Missing grouping key '{}'", key)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_column(df: &DataFrame, name: &str) -> Vec<Option<i64>> {
        df.column(name).unwrap().i64().unwrap().into_iter().collect()
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token("related-1"), Some(("related", 1)));
        assert_eq!(parse_token("aid_related-0"), Some(("aid_related", 0)));
        assert_eq!(parse_token("related-2"), Some(("related", 2)));
        assert_eq!(parse_token("related-x"), None);
        assert_eq!(parse_token("related1"), None);
        assert_eq!(parse_token("-1"), None);
        assert_eq!(parse_token(""), None);
    }

    #[test]
    fn test_expand_categories_is_positional_and_typed() -> Result<()> {
        let df = df![
            "id" => [1i64],
            "categories" => ["a-1;b-0;c-1"]
        ]?;

        let (expanded, names) = expand_categories(df)?;
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(expanded.get_column_names(), vec!["id", "a", "b", "c"]);
        assert_eq!(int_column(&expanded, "a"), vec![Some(1)]);
        assert_eq!(int_column(&expanded, "b"), vec![Some(0)]);
        assert_eq!(int_column(&expanded, "c"), vec![Some(1)]);
        Ok(())
    }

    #[test]
    fn test_expand_categories_nulls_for_unmatched_rows() -> Result<()> {
        let df = df![
            "id" => [1i64, 2],
            "categories" => [None, Some("related-1;request-0")]
        ]?;

        let (expanded, names) = expand_categories(df)?;
        assert_eq!(names, vec!["related", "request"]);
        assert_eq!(int_column(&expanded, "related"), vec![None, Some(1)]);
        assert_eq!(int_column(&expanded, "request"), vec![None, Some(0)]);
        Ok(())
    }

    #[test]
    fn test_expand_categories_rejects_misaligned_rows() -> Result<()> {
        let short = df![
            "id" => [1i64, 2],
            "categories" => ["related-1;request-0", "related-1"]
        ]?;
        assert!(matches!(expand_categories(short), Err(EtlError::Transform(_))));

        let reordered = df![
            "id" => [1i64, 2],
            "categories" => ["related-1;request-0", "request-0;related-1"]
        ]?;
        match expand_categories(reordered) {
            Err(EtlError::Transform(msg)) => assert!(msg.contains("Row 1")),
            other => panic!("expected transform error, got {:?}", other.map(|(_, n)| n)),
        }
        Ok(())
    }

    #[test]
    fn test_expand_categories_rejects_bad_input() -> Result<()> {
        let no_column = df!["id" => [1i64]]?;
        assert!(matches!(expand_categories(no_column), Err(EtlError::Transform(_))));

        let bad_flag = df!["id" => [1i64], "categories" => ["related-?"]]?;
        assert!(matches!(expand_categories(bad_flag), Err(EtlError::Transform(_))));

        let duplicate = df!["id" => [1i64], "categories" => ["a-1;a-0"]]?;
        assert!(matches!(expand_categories(duplicate), Err(EtlError::Transform(_))));

        let all_null = df!["id" => [1i64], "categories" => [None::<&str>]]?;
        assert!(matches!(expand_categories(all_null), Err(EtlError::Transform(_))));
        Ok(())
    }

    #[test]
    fn test_prune_drops_original_and_extras() -> Result<()> {
        let df = df![
            "id" => [1i64],
            "message" => ["m"],
            "original" => ["o"],
            "genre" => ["direct"],
            "related" => [1i64]
        ]?;

        let pruned = prune_columns(df, &["related".to_string()])?;
        assert_eq!(pruned.get_column_names(), vec!["id", "message", "genre", "related"]);
        Ok(())
    }

    #[test]
    fn test_prune_without_genre_is_transform_error() -> Result<()> {
        let df = df!["id" => [1i64], "message" => ["m"]]?;
        assert!(matches!(prune_columns(df, &[]), Err(EtlError::Transform(_))));
        Ok(())
    }

    #[test]
    fn test_exact_duplicates_collapse_to_first() -> Result<()> {
        let df = df![
            "id" => [1i64, 1, 2],
            "message" => ["same", "same", "other"],
            "genre" => ["direct", "direct", "news"],
            "related" => [1i64, 1, 0]
        ]?;

        let deduped = drop_exact_duplicates(df)?;
        assert_eq!(deduped.height(), 2);
        assert_eq!(int_column(&deduped, "id"), vec![Some(1), Some(2)]);
        Ok(())
    }

    fn conflicting_duplicates() -> PolarsResult<DataFrame> {
        df![
            "id" => [1i64, 1, 2],
            "message" => ["same text", "same text", "another text"],
            "genre" => ["direct", "direct", "news"],
            "related" => [1i64, 0, 0],
            "request" => [0i64, 1, 0]
        ]
    }

    #[test]
    fn test_reconcile_takes_max_per_category() -> Result<()> {
        let categories = vec!["related".to_string(), "request".to_string()];
        let merged = reconcile_duplicates(conflicting_duplicates()?, &categories)?;

        assert_eq!(merged.height(), 2);
        assert_eq!(
            merged.get_column_names(),
            vec!["id", "message", "genre", "related", "request"]
        );
        assert_eq!(int_column(&merged, "id"), vec![Some(1), Some(2)]);
        assert_eq!(int_column(&merged, "related"), vec![Some(1), Some(0)]);
        assert_eq!(int_column(&merged, "request"), vec![Some(1), Some(0)]);
        Ok(())
    }

    #[test]
    fn test_reconcile_is_idempotent() -> Result<()> {
        let categories = vec!["related".to_string(), "request".to_string()];
        let once = reconcile_duplicates(conflicting_duplicates()?, &categories)?;
        let twice = reconcile_duplicates(once.clone(), &categories)?;
        assert!(once.equals_missing(&twice));
        Ok(())
    }

    #[test]
    fn test_reconcile_ignores_row_order_within_group() -> Result<()> {
        let categories = vec!["related".to_string(), "request".to_string()];
        let forward = df![
            "id" => [1i64, 1],
            "message" => ["same text", "same text"],
            "genre" => ["direct", "direct"],
            "related" => [1i64, 0],
            "request" => [0i64, 1]
        ]?;
        let reversed = df![
            "id" => [1i64, 1],
            "message" => ["same text", "same text"],
            "genre" => ["direct", "direct"],
            "related" => [0i64, 1],
            "request" => [1i64, 0]
        ]?;

        let a = reconcile_duplicates(forward, &categories)?;
        let b = reconcile_duplicates(reversed, &categories)?;
        assert!(a.equals_missing(&b));
        Ok(())
    }

    #[test]
    fn test_reconcile_drops_null_keys() -> Result<()> {
        let df = df![
            "id" => [1i64, 2],
            "message" => [Some("kept message"), None],
            "genre" => ["direct", "direct"],
            "related" => [1i64, 1]
        ]?;

        let merged = reconcile_duplicates(df, &["related".to_string()])?;
        assert_eq!(merged.height(), 1);
        Ok(())
    }

    #[test]
    fn test_degenerate_filter_boundary() -> Result<()> {
        let len_27 = "a".repeat(27);
        let len_28 = "b".repeat(28);
        let df = df![
            "id" => [1i64, 2],
            "message" => [len_27.as_str(), len_28.as_str()],
            "genre" => ["direct", "direct"]
        ]?;

        let kept = drop_degenerate_messages(df, 28)?;
        assert_eq!(kept.height(), 1);
        assert_eq!(int_column(&kept, "id"), vec![Some(2)]);
        Ok(())
    }

    #[test]
    fn test_degenerate_filter_counts_characters() -> Result<()> {
        // 28 characters, more than 28 bytes
        let accented = "é".repeat(28);
        let df = df![
            "id" => [1i64],
            "message" => [accented.as_str()],
            "genre" => ["direct"]
        ]?;

        assert_eq!(drop_degenerate_messages(df, 28)?.height(), 1);
        Ok(())
    }

    #[test]
    fn test_clean_data_end_to_end() -> Result<()> {
        let joined = df![
            "id" => [1i64, 1, 1, 2],
            "message" => [
                "This is a sufficiently long test message.",
                "This is a sufficiently long test message.",
                "This is a sufficiently long test message.",
                "Short"
            ],
            "original" => ["orig", "orig", "orig", "o2"],
            "genre" => ["direct", "direct", "direct", "social"],
            "categories" => [
                "related-1;request-0",
                "related-1;request-0",
                "related-0;request-1",
                "related-0;request-1"
            ]
        ]?;

        let cleaned = clean_data(joined, 28)?;
        assert_eq!(cleaned.categories, vec!["related", "request"]);
        assert_eq!(
            cleaned.stats,
            CleanStats {
                input_rows: 4,
                deduplicated_rows: 3,
                reconciled_rows: 2,
                degenerate_dropped: 1,
                output_rows: 1,
            }
        );
        assert_eq!(int_column(&cleaned.frame, "id"), vec![Some(1)]);
        assert_eq!(int_column(&cleaned.frame, "related"), vec![Some(1)]);
        assert_eq!(int_column(&cleaned.frame, "request"), vec![Some(1)]);
        Ok(())
    }
}
