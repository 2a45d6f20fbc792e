//! Vigil CLI, the main entry point.
//!
//! Commands:
//! - `investigate`: replay a scripted transcript against an alert
//! - `config`: show, validate or locate the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod replay;

#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Vigil: AI-driven alert investigation runtime",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file to use instead of ~/.vigil/config.toml
    #[arg(short, long, global = true, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Investigate an alert by replaying a scripted AI transcript
    Investigate {
        /// Alert JSON file
        #[arg(short, long)]
        alert: PathBuf,

        /// Transcript JSON file with the assistant turns to replay
        #[arg(short, long)]
        script: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Check the configuration for errors
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    let config_path = cli.config;
    match cli.command {
        Commands::Investigate {
            alert,
            script,
            json,
        } => commands::investigate::run(config_path.as_deref(), &alert, &script, json).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path.as_deref())?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path.as_deref())?,
            ConfigAction::Path => commands::config_cmd::path(config_path.as_deref()),
        },
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
