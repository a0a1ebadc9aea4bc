use clap::{Parser, Subcommand};
use std::path::PathBuf;
use synclog::cli::run::RunOverrides;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "synclog")]
#[command(about = "Timing-sync log collector with overlap deduplication", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set, e.g. "debug" or "synclog=trace"
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the configured collectors until Ctrl+C or the poll count is reached
    Collect {
        /// Collector to run (repeatable); "all" runs every registered collector
        #[arg(long = "collector", short = 'c')]
        collectors: Vec<String>,

        /// Polls per collector before stopping
        #[arg(long)]
        count: Option<u64>,

        /// Output file for the log collector
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = cli
        .log_level
        .clone()
        .unwrap_or_else(|| "synclog=info".to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = synclog::config::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Collect {
            collectors,
            count,
            output,
        }) => {
            let overrides = RunOverrides {
                collectors,
                poll_count: count,
                output,
            };
            synclog::cli::run::run(config_path, overrides).await?;
        }
        None => {
            synclog::cli::run::run(config_path, RunOverrides::default()).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                synclog::cli::config::init(stdout)?;
            }
            ConfigAction::Validate => {
                synclog::cli::config::validate(config_path)?;
            }
        },
    }

    Ok(())
}
