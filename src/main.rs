use clap::{Parser, Subcommand};
use logtail::cli::run::{HistoryArgs, TailArgs};
use logtail::config::resolve_config_path;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "logtail")]
#[command(about = "Stream application logs from the live-tail API or the log archive", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow recent logs of an application
    Tail(TailArgs),
    /// Replay archived logs for a time window, in timestamp order
    History(HistoryArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries records, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logtail=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = logtail::cli::run::load(config_path)?;

    match cli.command {
        Commands::Tail(args) => logtail::cli::run::tail(&config, args).await?,
        Commands::History(args) => logtail::cli::run::history(&config, args).await?,
    }

    Ok(())
}
