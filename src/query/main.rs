//! Query CLI for address normalization.
//!
//! Resolves a single address from the command line or a whole file of
//! addresses (one per line, processed in parallel) and prints one JSON
//! result record per input.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use lotus::geocoder::HttpGeocoder;
use lotus::{AddressMatcher, Hints, MatcherConfig, ReferenceStore};

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "Vietnamese address normalization query tool")]
struct Args {
    /// Address to resolve (omit when using --file)
    address: Option<String>,

    /// Reference database path
    #[arg(long, default_value = "lotus.db")]
    db: PathBuf,

    /// Known province hint
    #[arg(long)]
    province: Option<String>,

    /// Known district hint
    #[arg(long)]
    district: Option<String>,

    /// File with one address per line; results are printed in input order
    #[arg(long)]
    file: Option<PathBuf>,

    /// TOML config overriding the default thresholds
    #[arg(long)]
    config: Option<PathBuf>,

    /// External geocoder endpoint consulted on low local confidence
    #[arg(long)]
    geocoder: Option<String>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => MatcherConfig::load_from_file(path)?,
        None => MatcherConfig::default(),
    };

    let store = Arc::new(ReferenceStore::open(&args.db)?);
    info!(
        "Loaded {} administrative rows from {}",
        store.load_all_rows().len(),
        args.db.display()
    );

    let mut matcher = AddressMatcher::new(store, config.clone());
    if let Some(endpoint) = &args.geocoder {
        let geocoder = HttpGeocoder::new(endpoint, config.external_timeout_ms)?;
        matcher = matcher.with_geocoder(Box::new(geocoder));
    }

    let hints = Hints {
        province: args.province.clone(),
        district: args.district.clone(),
    };

    let addresses: Vec<String> = match (&args.address, &args.file) {
        (Some(address), None) => vec![address.clone()],
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read address file: {}", path.display()))?
            .lines()
            .map(str::to_string)
            .collect(),
        _ => anyhow::bail!("provide exactly one of an address argument or --file"),
    };

    // One address in, one result out; independent requests run in parallel
    // over the shared immutable store.
    let results: Vec<String> = addresses
        .par_iter()
        .map(|address| {
            let result = matcher.resolve(address, &hints);
            if args.pretty {
                serde_json::to_string_pretty(&result)
            } else {
                serde_json::to_string(&result)
            }
        })
        .collect::<Result<_, _>>()?;

    for line in results {
        println!("{line}");
    }

    Ok(())
}
