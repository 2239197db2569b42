//! Permission group commands.

use clap::Subcommand;
use console::style;

use rimay_core::config::AppConfig;
use rimay_core::error::{RimayError, RimayResult};
use rimay_models::{Database, Group, Permission};

use super::{find_user, new_table, open_database, print_json};
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum GroupAction {
    /// List groups with their permissions.
    List,
    /// List the known permission codenames.
    Permissions,
    /// Create a group.
    Create { name: String },
    /// Delete a group.
    Delete { group: String },
    /// Grant a permission codename to a group.
    Grant { group: String, codename: String },
    /// Add a user to a group.
    Add { group: String, user: String },
    /// Remove a user from a group.
    Remove { group: String, user: String },
}

fn find_group(db: &Database, name: &str) -> RimayResult<Group> {
    Group::find_by_name(&*db.conn()?, name)?.ok_or_else(|| RimayError::NotFound(format!("group {name}")))
}

pub fn run(config: &AppConfig, action: GroupAction, format: OutputFormat) -> RimayResult<()> {
    let db = open_database(config)?;

    match action {
        GroupAction::List => {
            let conn = db.conn()?;
            let mut rows = Vec::new();
            for group in Group::list(&conn)? {
                let codenames: Vec<String> = Group::permissions(&conn, group.id)?
                    .into_iter()
                    .map(|p| p.codename)
                    .collect();
                rows.push((group, codenames));
            }
            match format {
                OutputFormat::Json => {
                    let groups: Vec<_> = rows
                        .iter()
                        .map(|(g, p)| serde_json::json!({ "id": g.id, "name": g.name, "permissions": p }))
                        .collect();
                    print_json(&groups)?;
                }
                OutputFormat::Text => {
                    let mut table = new_table(["ID", "Name", "Permissions"]);
                    for (g, p) in &rows {
                        table.add_row(vec![g.id.to_string(), g.name.clone(), p.join(", ")]);
                    }
                    println!("{table}");
                }
            }
        }
        GroupAction::Permissions => {
            let permissions = Permission::list(&*db.conn()?)?;
            match format {
                OutputFormat::Json => print_json(&permissions)?,
                OutputFormat::Text => {
                    let mut table = new_table(["Codename", "Name"]);
                    for p in &permissions {
                        table.add_row(vec![p.codename.clone(), p.name.clone()]);
                    }
                    println!("{table}");
                }
            }
        }
        GroupAction::Create { name } => {
            let group = Group::create(&*db.conn()?, name.trim())?;
            println!("  {} Created group {} (id {})", style("OK").green().bold(), group.name, group.id);
        }
        GroupAction::Delete { group } => {
            let group = find_group(&db, &group)?;
            Group::delete(&*db.conn()?, group.id)?;
            println!("  {} Deleted group {}", style("OK").green().bold(), group.name);
        }
        GroupAction::Grant { group, codename } => {
            let group = find_group(&db, &group)?;
            Group::grant(&*db.conn()?, group.id, &codename)?;
            println!("  {} {} now grants {codename}", style("OK").green().bold(), group.name);
        }
        GroupAction::Add { group, user } => {
            let group = find_group(&db, &group)?;
            let user = find_user(&db, &user)?;
            Group::add_user(&*db.conn()?, group.id, user.require_id()?)?;
            println!("  {} Added {} to {}", style("OK").green().bold(), user.username, group.name);
        }
        GroupAction::Remove { group, user } => {
            let group = find_group(&db, &group)?;
            let user = find_user(&db, &user)?;
            if Group::remove_user(&*db.conn()?, group.id, user.require_id()?)? {
                println!("  {} Removed {} from {}", style("OK").green().bold(), user.username, group.name);
            } else {
                println!("  {} {} was not in {}", style("WARN").yellow().bold(), user.username, group.name);
            }
        }
    }

    Ok(())
}
