//! Push notification commands.

use std::time::Duration;

use clap::Subcommand;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use rimay_core::config::AppConfig;
use rimay_core::error::RimayResult;
use rimay_push::PushMessage;

use super::{find_user, open_registry, print_json};
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum PushAction {
    /// Show whether push delivery is configured.
    Status,
    /// Send a test notification to every active device of a user.
    Send {
        /// User id or username.
        user: String,
        #[arg(long, default_value = "Rimay Alert")]
        title: String,
        #[arg(long, default_value = "Notificación de prueba")]
        body: String,
    },
    /// Deactivate all of a user's device tokens except one.
    DeactivateOld {
        user: String,
        /// Token to keep active.
        #[arg(long)]
        keep: String,
    },
}

pub async fn run(config: &AppConfig, action: PushAction, format: OutputFormat) -> RimayResult<()> {
    let registry = open_registry(config)?;

    match action {
        PushAction::Status => {
            let push = &config.push;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "configured": push.is_configured(),
                    "sender": registry.notification.sender_name(),
                    "project_id": push.project_id,
                    "endpoint": push.endpoint,
                }))?,
                OutputFormat::Text => {
                    let state = if push.is_configured() {
                        style("configured").green().bold()
                    } else {
                        style("not configured").yellow().bold()
                    };
                    println!("  Push:      {state}");
                    println!("  Sender:    {}", registry.notification.sender_name());
                    println!("  Project:   {}", if push.project_id.is_empty() { "-" } else { &push.project_id });
                    println!("  Endpoint:  {}", push.endpoint);
                }
            }
        }
        PushAction::Send { user, title, body } => {
            let user = find_user(&registry.database, &user)?;
            let message = PushMessage::new(title, body).with_data("click_action", "TEST");

            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("  {spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
            pb.set_message(format!("Sending to {}...", user.username));
            let summary = registry
                .notification
                .send_to_users(&[user.require_id()?], &message)
                .await;
            pb.finish_and_clear();
            let summary = summary?;

            match format {
                OutputFormat::Json => print_json(&summary)?,
                OutputFormat::Text => {
                    println!(
                        "  {} {} sent, {} failed",
                        style("OK").green().bold(),
                        summary.success,
                        summary.failed
                    );
                    if !summary.invalid_tokens.is_empty() {
                        println!(
                            "  {} {} unregistered token(s) deactivated",
                            style("WARN").yellow().bold(),
                            summary.invalid_tokens.len()
                        );
                    }
                }
            }
        }
        PushAction::DeactivateOld { user, keep } => {
            let user = find_user(&registry.database, &user)?;
            let count = registry.auth.deactivate_old_tokens(user.require_id()?, &keep)?;
            println!("  {} Deactivated {count} token(s) of {}", style("OK").green().bold(), user.username);
        }
    }

    registry.shutdown_all()
}
