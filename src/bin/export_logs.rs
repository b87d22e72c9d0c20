//! export_logs - dump the detection log to CSV

use anyhow::Result;
use clap::Parser;

use ecosort::export;
use ecosort::storage::{LogFilter, LogStore, SqliteLogStore};
use ecosort::Category;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the detection log database.
    #[arg(long, default_value = "ecosort.db", env = "SORTD_DB_PATH")]
    db_path: String,
    /// Output CSV path ("-" for stdout).
    #[arg(long, default_value = "ecosort_logs.csv")]
    output: String,
    /// Maximum entries to export (newest first).
    #[arg(long)]
    limit: Option<usize>,
    /// Only entries for these class names (comma separated).
    #[arg(long)]
    classes: Option<String>,
    /// Only entries in this category (organic|inorganic).
    #[arg(long)]
    category: Option<String>,
    /// Append a statistics summary after the rows.
    #[arg(long, default_value_t = false)]
    summary: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let store = SqliteLogStore::open(&args.db_path)?;
    let filter = LogFilter {
        limit: args.limit,
        classes: args.classes.as_deref().map(split_csv),
        category: args
            .category
            .as_deref()
            .map(|raw| raw.parse::<Category>())
            .transpose()?,
        ..LogFilter::default()
    };

    let entries = store.query(&filter)?;
    let mut rendered = export::render_csv(&entries);
    if args.summary {
        rendered.push('\n');
        rendered.push_str(&export::render_statistics(&store.statistics()?));
    }

    if args.output == "-" {
        print!("{}", rendered);
    } else {
        std::fs::write(&args.output, rendered)?;
        println!("exported {} entries to {}", entries.len(), args.output);
    }
    Ok(())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
