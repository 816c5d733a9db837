use std::path::PathBuf;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use beer_price_crawler::archiver;
use beer_price_crawler::models::{ProductRecord, Source};
use beer_price_crawler::sites;

/// Multi-source beer price crawling.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Sources to crawl. `all` expands to the five storefront crawls.
    #[arg(long, value_enum, num_args = 1.., default_values_t = [SourceArg::All])]
    sources: Vec<SourceArg>,

    /// Run the Chrome sessions headless.
    #[arg(long)]
    headless: bool,

    /// Output CSV path. Defaults to output/all_beer_prices_<YYYYMMDD>.csv.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also dump the combined records as pretty JSON.
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    All,
    Bhx,
    Mega,
    Lotte,
    Kingfood,
    Coop,
    BhxApi,
}

impl SourceArg {
    fn source(self) -> Option<Source> {
        match self {
            SourceArg::All => None,
            SourceArg::Bhx => Some(Source::Bhx),
            SourceArg::Mega => Some(Source::Mega),
            SourceArg::Lotte => Some(Source::Lotte),
            SourceArg::Kingfood => Some(Source::Kingfood),
            SourceArg::Coop => Some(Source::Coop),
            SourceArg::BhxApi => Some(Source::BhxApi),
        }
    }
}

/// `all` anywhere in the list wins and selects the five browser crawls.
/// Explicit lists keep their order, repeats included.
fn resolve_sources(args: &[SourceArg]) -> Vec<Source> {
    if args.contains(&SourceArg::All) {
        return vec![
            Source::Bhx,
            Source::Mega,
            Source::Lotte,
            Source::Kingfood,
            Source::Coop,
        ];
    }
    args.iter().filter_map(|arg| arg.source()).collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting the crawling pipeline");

    let mut records: Vec<ProductRecord> = Vec::new();
    for source in resolve_sources(&cli.sources) {
        info!("running the {source} crawler");
        match sites::crawl_source(source, cli.headless) {
            Ok(found) => {
                info!("{source}: {} products collected", found.len());
                records.extend(found);
            }
            Err(err) => error!("{source} crawl failed: {err:#}"),
        }
    }
    info!("total combined products: {}", records.len());

    let output = cli.output.unwrap_or_else(|| {
        let today = Local::now().format("%Y%m%d");
        PathBuf::from(format!("output/all_beer_prices_{today}.csv"))
    });
    archiver::write_csv(&output, &records)?;
    if let Some(json_path) = cli.json.as_deref() {
        archiver::write_json(json_path, &records)?;
    }

    info!("crawling pipeline completed");
    Ok(())
}
