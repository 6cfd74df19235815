use anyhow::Result;
use clap::Parser;
use disaster_etl::{pipeline, EtlConfig, IfExists};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const EXAMPLE: &str = "Example: process-data disaster_messages.csv disaster_categories.csv DisasterResponse.db";

#[derive(Parser)]
#[command(name = "process-data")]
#[command(about = "Load, clean and store disaster response messages in a SQLite database")]
#[command(after_help = EXAMPLE)]
struct Args {
    /// CSV file with id, message, original and genre columns
    messages_filepath: PathBuf,

    /// CSV file with id and categories columns
    categories_filepath: PathBuf,

    /// SQLite database to write the cleaned table to
    database_filepath: PathBuf,

    /// Name of the table to create
    #[arg(long, default_value = disaster_etl::config::DEFAULT_TABLE_NAME)]
    table: String,

    /// Messages with fewer characters than this are dropped
    #[arg(long, default_value_t = disaster_etl::config::DEFAULT_MIN_MESSAGE_LENGTH)]
    min_message_length: usize,

    /// What to do when the table already exists
    #[arg(long, value_enum, default_value_t = IfExists::Fail)]
    if_exists: IfExists,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = EtlConfig::new(
        &args.messages_filepath,
        &args.categories_filepath,
        &args.database_filepath,
    )
    .with_table_name(args.table)
    .with_min_message_length(args.min_message_length)
    .with_if_exists(args.if_exists)
    .with_report_path(args.report);

    let mut stdout = std::io::stdout().lock();
    pipeline::run(&config, &mut stdout)?;

    Ok(())
}
