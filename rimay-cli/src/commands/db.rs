//! Database management commands.

use clap::Subcommand;
use console::style;
use dialoguer::Confirm;

use rimay_core::config::AppConfig;
use rimay_core::error::{RimayError, RimayResult};

use super::{format_bytes, new_table, open_database, print_json};
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum DbAction {
    /// Create the database and apply migrations.
    Init,
    /// Show row counts and file sizes.
    Stats,
    /// Run integrity and foreign key checks.
    Check,
    /// Drop and recreate every table (destroys all data).
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Show the database file path.
    Path,
}

pub fn run(config: &AppConfig, action: DbAction, format: OutputFormat) -> RimayResult<()> {
    let db_path = config.effective_db_path()?;

    match action {
        DbAction::Init => {
            open_database(config)?;
            println!("  {} Database ready at {}", style("OK").green().bold(), db_path.display());
        }
        DbAction::Stats => {
            let db = open_database(config)?;
            let stats = db.stats()?;
            let file_size = std::fs::metadata(&db_path).ok().map(|m| m.len());
            let wal_size = std::fs::metadata(db_path.with_extension("db-wal")).ok().map(|m| m.len());

            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "path": db_path.display().to_string(),
                    "tables": stats,
                    "file_size_bytes": file_size,
                    "wal_size_bytes": wal_size,
                }))?,
                OutputFormat::Text => {
                    println!("{}", style("Database Statistics").bold().underlined());
                    println!("  Path:          {}", db_path.display());
                    println!();

                    let mut table = new_table(["Table", "Rows"]);
                    table.add_row(vec!["users".to_string(), stats.users.to_string()]);
                    table.add_row(vec!["communities".to_string(), stats.communities.to_string()]);
                    table.add_row(vec!["memberships".to_string(), stats.memberships.to_string()]);
                    table.add_row(vec!["incidents".to_string(), stats.incidents.to_string()]);
                    table.add_row(vec!["notifications".to_string(), stats.notifications.to_string()]);
                    table.add_row(vec!["fcm_tokens".to_string(), stats.fcm_tokens.to_string()]);
                    println!("{table}");

                    println!();
                    if let Some(size) = file_size {
                        println!("  Database:      {}", format_bytes(size));
                    }
                    if let Some(size) = wal_size {
                        println!("  WAL file:      {}", format_bytes(size));
                    }
                }
            }
        }
        DbAction::Check => {
            let db = open_database(config)?;
            match db.run_integrity_check() {
                Ok(()) => println!("  {} Integrity check passed.", style("OK").green().bold()),
                Err(e) => println!("  {} Integrity check failed: {e}", style("FAIL").red().bold()),
            }

            let conn = db.conn()?;
            let mut stmt = conn
                .prepare("PRAGMA foreign_key_check")
                .map_err(|e| RimayError::Database(e.to_string()))?;
            let violations: Vec<String> = stmt
                .query_map([], |row| {
                    let table: String = row.get(0)?;
                    let rowid: i64 = row.get(1)?;
                    let parent: String = row.get(2)?;
                    Ok(format!("{table} row {rowid} -> {parent}"))
                })
                .map_err(|e| RimayError::Database(e.to_string()))?
                .filter_map(|r| r.ok())
                .collect();

            if violations.is_empty() {
                println!("  {} Foreign key constraints OK.", style("OK").green().bold());
            } else {
                println!(
                    "  {} {} foreign key violation(s):",
                    style("WARN").yellow().bold(),
                    violations.len()
                );
                for v in violations.iter().take(10) {
                    println!("    - {v}");
                }
                if violations.len() > 10 {
                    println!("    ... and {} more", violations.len() - 10);
                }
            }
        }
        DbAction::Reset { yes } => {
            println!("  {} This will delete ALL data.", style("WARNING").red().bold());
            println!("  Database: {}", db_path.display());

            let confirmed = yes
                || Confirm::new()
                    .with_prompt("  Are you sure you want to reset the database?")
                    .default(false)
                    .interact()
                    .unwrap_or(false);
            if !confirmed {
                println!("  Reset cancelled.");
                return Ok(());
            }

            open_database(config)?.reset()?;
            println!("  {} Database reset complete.", style("OK").green().bold());
        }
        DbAction::Path => match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "path": db_path.display().to_string() }))?,
            OutputFormat::Text => println!("{}", db_path.display()),
        },
    }

    Ok(())
}
