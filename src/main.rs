use anyhow::Result;
use clap::Parser;
use airvend::cli::{Cli, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    cli.run().await
}
