//! Incident type catalogue commands.

use clap::Subcommand;
use console::style;

use rimay_core::config::AppConfig;
use rimay_core::error::{RimayError, RimayResult};
use rimay_models::IncidentType;

use super::{new_table, open_database, print_json};
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum IncidentTypeAction {
    /// List incident types.
    List,
    /// Add an incident type.
    Add {
        name: String,
        /// CSS icon class, e.g. `fas fa-fire`.
        #[arg(long, default_value = "")]
        icon: String,
        /// Color as `#RRGGBB`.
        #[arg(long, default_value = "")]
        color: String,
        /// Default severity level.
        #[arg(long)]
        severity: Option<i64>,
        /// Reports of this type need an authority.
        #[arg(long)]
        requires_authority: bool,
    },
    /// Delete an incident type no incident uses.
    Delete { id: i64 },
}

pub fn run(config: &AppConfig, action: IncidentTypeAction, format: OutputFormat) -> RimayResult<()> {
    let db = open_database(config)?;
    let conn = db.conn()?;

    match action {
        IncidentTypeAction::List => {
            let types = IncidentType::list(&conn)?;
            match format {
                OutputFormat::Json => print_json(&types)?,
                OutputFormat::Text => {
                    let mut table = new_table(["ID", "Name", "Code", "Icon", "Color", "Severity"]);
                    for t in &types {
                        table.add_row(vec![
                            t.id.unwrap_or_default().to_string(),
                            t.name.clone(),
                            t.code.clone().unwrap_or_default(),
                            t.icon.clone(),
                            t.color_hex.clone(),
                            t.default_severity.map(|s| s.to_string()).unwrap_or_default(),
                        ]);
                    }
                    println!("{table}");
                }
            }
        }
        IncidentTypeAction::Add { name, icon, color, severity, requires_authority } => {
            let name = name.trim();
            if name.is_empty() {
                return Err(RimayError::field("name", "name is required"));
            }
            if IncidentType::find_by_name(&conn, name)?.is_some() {
                return Err(RimayError::Conflict(format!("incident type {name} already exists")));
            }
            let mut t = IncidentType::new(name);
            t.icon = icon;
            t.color_hex = color;
            t.default_severity = severity;
            t.requires_authority = requires_authority;
            let id = t.save(&conn)?;
            println!("  {} Added incident type {name} (id {id})", style("OK").green().bold());
        }
        IncidentTypeAction::Delete { id } => {
            if IncidentType::delete(&conn, id)? {
                println!("  {} Deleted incident type {id}", style("OK").green().bold());
            } else {
                return Err(RimayError::NotFound(format!("incident type {id}")));
            }
        }
    }

    Ok(())
}
