use clap::Parser;
use meds_processor::cli::{run, Cli};
use meds_processor::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
