use anyhow::Result;
use balancebook::cli::Cli;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    balancebook::logging::init_logging(cli.verbose)?;
    cli.run().await
}
