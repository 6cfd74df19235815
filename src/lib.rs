//! Batch ETL for labelled disaster-response messages.
//!
//! `loader` reads and joins the two CSV inputs, `cleaner` expands and
//! reconciles the category labels, `writer` stores the result in SQLite and
//! `pipeline` runs the three in order.

pub mod cleaner;
pub mod config;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod report;
pub mod writer;

pub use cleaner::{clean_data, CleanStats, CleanedTable};
pub use config::{EtlConfig, IfExists};
pub use error::{EtlError, Result};
pub use loader::load_data;
pub use pipeline::{run, Stage};
pub use report::EtlReport;
pub use writer::save_data;
