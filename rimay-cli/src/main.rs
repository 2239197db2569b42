//! Rimay Alert CLI - runs the HTTP server and administers the database.
//!
//! Everything the management pages cannot do (creating groups, granting
//! permissions, seeding incident types, testing push delivery) lives here.

mod commands;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use rimay_core::config::AppConfig;
use rimay_core::error::RimayResult;
use rimay_core::logging;

/// Rimay Alert - community incident reporting.
#[derive(Parser)]
#[command(
    name = "rimay",
    version,
    about = "Rimay Alert server and administration CLI",
    long_about = "Run the Rimay Alert HTTP server and manage its users, groups,\n\
                  communities, incident types and push notifications."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server until Ctrl+C.
    Serve {
        /// Bind address (overrides config).
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Database management commands.
    Db {
        #[command(subcommand)]
        action: commands::db::DbAction,
    },
    /// Manage user accounts.
    User {
        #[command(subcommand)]
        action: commands::user::UserAction,
    },
    /// Manage permission groups.
    Group {
        #[command(subcommand)]
        action: commands::group::GroupAction,
    },
    /// Manage communities.
    Community {
        #[command(subcommand)]
        action: commands::community::CommunityAction,
    },
    /// Manage the incident type catalogue.
    #[command(name = "incident-type")]
    IncidentType {
        #[command(subcommand)]
        action: commands::incident_type::IncidentTypeAction,
    },
    /// Push notification tools.
    Push {
        #[command(subcommand)]
        action: commands::push::PushAction,
    },
}

fn load_config(path: Option<&str>) -> RimayResult<AppConfig> {
    match path {
        Some(path) => {
            let mut config = AppConfig::load_from_file(Path::new(path))?;
            config.apply_env_overrides();
            Ok(config)
        }
        None => AppConfig::load_default(),
    }
}

#[tokio::main]
async fn main() -> RimayResult<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let log_level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    let log_dir = config.effective_log_dir().unwrap_or_else(|_| PathBuf::from("logs"));
    let _guard = logging::init_logging(log_level, &log_dir, config.logging.json_output)?;

    info!("Rimay Alert CLI v{}", rimay_core::constants::APP_VERSION);

    match cli.command {
        Commands::Serve { bind } => commands::serve::run(config, bind).await,
        Commands::Db { action } => commands::db::run(&config, action, cli.format),
        Commands::User { action } => commands::user::run(&config, action, cli.format),
        Commands::Group { action } => commands::group::run(&config, action, cli.format),
        Commands::Community { action } => commands::community::run(&config, action, cli.format),
        Commands::IncidentType { action } => commands::incident_type::run(&config, action, cli.format),
        Commands::Push { action } => commands::push::run(&config, action, cli.format).await,
    }
}
