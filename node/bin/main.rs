use clap::Parser;

use shuttermint::cli::Cli;
use shuttermint::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    Cli::parse().execute().await?;
    Ok(())
}
