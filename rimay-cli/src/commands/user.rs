//! User account commands.

use clap::Subcommand;
use console::style;
use dialoguer::{Confirm, Password};

use rimay_core::config::AppConfig;
use rimay_core::error::{RimayError, RimayResult};
use rimay_models::{FcmToken, Group, User};
use rimay_services::auth::{DniLoginRequest, SignupForm};

use super::{find_user, new_table, open_registry, print_json, truncate};
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum UserAction {
    /// List users, newest first.
    List {
        /// Maximum number of users to show.
        #[arg(short, long, default_value = "50")]
        limit: i64,
        /// Number of users to skip.
        #[arg(long, default_value = "0")]
        offset: i64,
    },
    /// Show one user with their groups and device tokens.
    Show {
        /// User id or username.
        user: String,
    },
    /// Create an account. Prompts for the password when not given.
    Create {
        username: String,
        #[arg(long)]
        dni: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Return the account with this dni, creating it when absent, and print its API token.
    Dni {
        dni: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// Set as password when the account has none.
        #[arg(long)]
        password: Option<String>,
    },
    /// Allow the user to log in again.
    Activate { user: String },
    /// Block the user from logging in.
    Deactivate { user: String },
    /// Delete the user and everything they own.
    Delete {
        user: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

fn report_validation(e: RimayError) -> RimayError {
    if let RimayError::Validation(errors) = &e {
        for (field, messages) in errors.iter() {
            for m in messages {
                eprintln!("  {} {field}: {m}", style("ERROR").red().bold());
            }
        }
    }
    e
}

pub fn run(config: &AppConfig, action: UserAction, format: OutputFormat) -> RimayResult<()> {
    let registry = open_registry(config)?;
    let db = &registry.database;

    match action {
        UserAction::List { limit, offset } => {
            let users = User::list(&*db.conn()?, limit, offset)?;
            match format {
                OutputFormat::Json => print_json(&users)?,
                OutputFormat::Text => {
                    if users.is_empty() {
                        println!("  No users.");
                        return Ok(());
                    }
                    let mut table = new_table(["ID", "Username", "Name", "Email", "DNI", "Active", "Joined"]);
                    for u in &users {
                        table.add_row(vec![
                            u.id.unwrap_or_default().to_string(),
                            u.username.clone(),
                            truncate(&u.full_name(), 30),
                            u.email.clone(),
                            u.dni.clone(),
                            if u.is_active { "yes" } else { "no" }.to_string(),
                            u.date_joined.chars().take(10).collect(),
                        ]);
                    }
                    println!("{table}");
                }
            }
        }
        UserAction::Show { user } => {
            let user = find_user(db, &user)?;
            let id = user.require_id()?;
            let conn = db.conn()?;
            let groups = Group::for_user(&conn, id)?;
            let tokens = FcmToken::for_user(&conn, id)?;
            let stats = registry.stats.user_stats(id)?;

            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "user": user,
                    "groups": groups,
                    "fcm_tokens": tokens,
                    "stats": stats,
                }))?,
                OutputFormat::Text => {
                    println!("{}", style(&user.username).bold().underlined());
                    println!("  ID:        {id}");
                    println!("  Name:      {}", user.full_name());
                    println!("  Email:     {}", user.email);
                    println!("  DNI:       {}", user.dni);
                    println!("  Active:    {}", user.is_active);
                    println!("  Joined:    {}", user.date_joined);
                    println!("  Last login: {}", user.last_login.as_deref().unwrap_or("never"));
                    let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
                    println!("  Groups:    {}", if names.is_empty() { "-".to_string() } else { names.join(", ") });
                    println!("  Stats:     {stats}");
                    if !tokens.is_empty() {
                        println!();
                        let mut table = new_table(["Token", "Device", "Active", "Updated"]);
                        for t in &tokens {
                            table.add_row(vec![
                                t.preview(),
                                t.device_id.clone().unwrap_or_default(),
                                t.is_active.to_string(),
                                t.updated_at.clone(),
                            ]);
                        }
                        println!("{table}");
                    }
                }
            }
        }
        UserAction::Create { username, dni, email, first_name, last_name, password } => {
            let password = match password {
                Some(p) => p,
                None => Password::new()
                    .with_prompt("  Password")
                    .with_confirmation("  Repeat password", "Passwords do not match")
                    .interact()
                    .map_err(|e| RimayError::Internal(format!("password prompt failed: {e}")))?,
            };
            let form = SignupForm {
                username: Some(username),
                dni: Some(dni),
                first_name: Some(first_name),
                last_name: Some(last_name),
                email: Some(email),
                password1: Some(password.clone()),
                password2: Some(password),
            };
            let user = registry.auth.signup(&form).map_err(report_validation)?;
            match format {
                OutputFormat::Json => print_json(&user)?,
                OutputFormat::Text => println!(
                    "  {} Created user {} (id {})",
                    style("OK").green().bold(),
                    user.username,
                    user.id.unwrap_or_default()
                ),
            }
        }
        UserAction::Dni { dni, username, email, first_name, last_name, password } => {
            let req = DniLoginRequest {
                username: Some(username),
                password,
                dni: Some(dni),
                first_name: Some(first_name),
                last_name: Some(last_name),
                email: Some(email),
            };
            let (user, token) = registry.auth.get_or_create_user_by_dni(&req).map_err(report_validation)?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({ "user": user, "token": token.key }))?,
                OutputFormat::Text => {
                    println!("  User:  {} (id {})", user.username, user.id.unwrap_or_default());
                    println!("  Token: {}", token.key);
                }
            }
        }
        UserAction::Activate { user } => set_active(&registry.database, &user, true)?,
        UserAction::Deactivate { user } => set_active(&registry.database, &user, false)?,
        UserAction::Delete { user, yes } => {
            let user = find_user(db, &user)?;
            let id = user.require_id()?;
            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!(
                        "  Delete {} with their profile, tokens, memberships and incidents?",
                        user.username
                    ))
                    .default(false)
                    .interact()
                    .unwrap_or(false);
            if !confirmed {
                println!("  Delete cancelled.");
                return Ok(());
            }
            User::delete(&*db.conn()?, id)?;
            println!("  {} Deleted user {}", style("OK").green().bold(), user.username);
        }
    }

    registry.shutdown_all()
}

fn set_active(db: &rimay_models::Database, who: &str, active: bool) -> RimayResult<()> {
    let user = find_user(db, who)?;
    User::set_active(&*db.conn()?, user.require_id()?, active)?;
    println!(
        "  {} {} is now {}",
        style("OK").green().bold(),
        user.username,
        if active { "active" } else { "inactive" }
    );
    Ok(())
}
