//! inkdash: rotates content sources onto an e-paper frame file.
//! Single-process binary embedding the renderer, sources and scheduler.

use clap::Parser;

mod cli;
mod config;
mod run;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("INKDASH_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let config = config::Config::load(&args.config)?;

    match args.command.unwrap_or(cli::Command::Run) {
        cli::Command::Run => {
            tracing::info!("inkdash starting");
            run::run(config).await
        }
        cli::Command::CheckConfig => {
            println!("{config:#?}");
            Ok(())
        }
    }
}
