//! leadscout CLI: scrape business listings, dedupe them against a Google Sheet,
//! enrich new leads from their websites and append them.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
    commands::run(cli).await
}
