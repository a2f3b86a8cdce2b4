//! Reference database ingest.
//!
//! Builds the SQLite reference database from CSV inputs: administrative
//! divisions, context-scoped abbreviations, and the optional division
//! migration map. Normalization and the invariant checks (leading-zero
//! migration, abbreviation-key validation) happen here so the runtime
//! store can trust its data.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use lotus::store::bootstrap;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Build the address reference database")]
struct Args {
    /// Administrative divisions CSV (.csv or .csv.gz) with columns
    /// province_prefix, province_name, district_prefix, district_name,
    /// ward_prefix, ward_name
    #[arg(long)]
    admin_csv: PathBuf,

    /// Abbreviations CSV with columns key, word, province_context,
    /// district_context
    #[arg(long)]
    abbrev_csv: Option<PathBuf>,

    /// Division migration CSV with columns old_province, old_district,
    /// old_ward, new_province, new_district, new_ward
    #[arg(long)]
    migration_csv: Option<PathBuf>,

    /// Output database path
    #[arg(long, default_value = "lotus.db")]
    output: PathBuf,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Lotus reference ingest");
    let stats = bootstrap::build_database(
        &args.output,
        &args.admin_csv,
        args.abbrev_csv.as_deref(),
        args.migration_csv.as_deref(),
    )?;

    info!(
        "Done: {} rows, {} abbreviations, {} migrations ({} duplicates skipped)",
        stats.admin_rows, stats.abbreviations, stats.migrations, stats.duplicate_rows
    );
    Ok(())
}
