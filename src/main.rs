//! The Banisher - bans IPv4 addresses that misbehave in your logs.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use banisher::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false);

    // The journal timestamps every line already
    if cli.systemd {
        tracing::subscriber::set_global_default(builder.without_time().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    match cli.command {
        Commands::Run { db, source } => banisher::commands::run::run(&cli.config, &db, source).await,
        Commands::List { db, json } => banisher::commands::list::run(&db, json).await,
        Commands::Check { example } => banisher::commands::check::run(&cli.config, example).await,
    }
}
