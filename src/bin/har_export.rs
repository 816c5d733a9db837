use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use beer_price_crawler::{fetcher, har};

/// Pull the beer listing API calls out of a browser HAR capture.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// HAR file saved from the browser devtools.
    #[arg(long)]
    input: PathBuf,

    /// Text report destination.
    #[arg(long, default_value = "bhx_bia_api.txt")]
    output: PathBuf,

    /// Category id to look for in the request payloads.
    #[arg(long, default_value_t = fetcher::BEER_CATEGORY_ID)]
    category_id: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("reading HAR {}", cli.input.display());
    let har = har::load_har(&cli.input)?;

    let entries = har::beer_entries(&har, cli.category_id);
    if entries.is_empty() {
        bail!(
            "no CategoryId={} calls in the capture, check the id or record the HAR again",
            cli.category_id
        );
    }
    info!(
        "found {} listing calls for CategoryId={}",
        entries.len(),
        cli.category_id
    );

    har::write_report(&cli.output, &entries)?;
    info!("report written to {}", cli.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
