mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "adsync")]
#[command(about = "Synchronize advertising performance reports into SQLite")]
struct Cli {
    /// Output format: table or json
    #[arg(long, default_value = "table", global = true)]
    output: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sync now and wait for it
    Sync(commands::sync::SyncArgs),
    /// Show the last sync status
    Status(commands::status::StatusArgs),
    /// Serve the status/trigger endpoints and sync on a schedule
    Serve(commands::serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("adsync=info".parse().unwrap())
                .add_directive("adreports_api=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    match &cli.command {
        Commands::Sync(args) => commands::sync::run(args, &format).await?,
        Commands::Status(args) => commands::status::run(args, &format)?,
        Commands::Serve(args) => commands::serve::run(args).await?,
    }

    Ok(())
}
