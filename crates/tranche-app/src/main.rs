//! tranche: scheduled order dispatch service - Entry Point

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tranche_app::{AppConfig, Application};

/// Scheduled order dispatch service
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "TRANCHE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the dispatcher (default)
    Run {
        /// JSON array of generation requests to create on startup
        #[arg(short, long)]
        instructions: Option<String>,
    },
    /// Print the orders an instruction file would produce, without saving them
    Plan {
        #[arg(short, long)]
        instructions: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    tranche_telemetry::init_logging(&config.telemetry.log_level, config.telemetry.json_logs)?;

    info!("Starting tranche v{}", env!("CARGO_PKG_VERSION"));
    info!(broker = ?config.broker, store = ?config.store.backend, "Configuration loaded");

    match cli.command.unwrap_or(Command::Run { instructions: None }) {
        Command::Plan { instructions } => {
            let app = Application::new(config)?;
            for request in app.load_instructions(&instructions)? {
                let report = app.service().plan(&request)?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Command::Run { instructions } => {
            let app = Application::new(config)?;
            app.warm_start()?;

            if let Some(path) = instructions {
                let requests = app.load_instructions(&path)?;
                let created = app.apply_instructions(&requests);
                info!(path = %path, requests = requests.len(), created, "Instructions applied");
            }

            app.run(CancellationToken::new()).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_path_reads_env() {
        let command = Cli::command();
        let config = command
            .get_arguments()
            .find(|arg| arg.get_id() == "config")
            .unwrap();
        assert_eq!(config.get_env(), Some(std::ffi::OsStr::new("TRANCHE_CONFIG")));
    }

    #[test]
    fn test_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["tranche", "plan", "-i", "orders.json", "--config", "custom.toml"])
            .unwrap();
        assert_eq!(cli.config.as_deref(), Some("custom.toml"));
        assert!(matches!(cli.command, Some(Command::Plan { .. })));
    }
}
