//! CLI command implementations.

pub mod community;
pub mod db;
pub mod group;
pub mod incident_type;
pub mod push;
pub mod serve;
pub mod user;

use std::sync::Arc;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;

use rimay_core::config::AppConfig;
use rimay_core::error::{RimayError, RimayResult};
use rimay_models::{Database, User};
use rimay_push::PushSender;
use rimay_services::registry::push_sender_from_config;
use rimay_services::ServiceRegistry;

/// Open the configured database, running migrations when needed.
pub fn open_database(config: &AppConfig) -> RimayResult<Database> {
    let db_path = config.effective_db_path()?;
    Database::init(&db_path, &config.database)
}

/// Services over the configured database, initialized.
pub fn open_registry(config: &AppConfig) -> RimayResult<ServiceRegistry> {
    let sender: Arc<dyn PushSender> = push_sender_from_config(&config.push);
    let registry = ServiceRegistry::build(config, open_database(config)?, sender)?;
    registry.init_all()?;
    Ok(registry)
}

/// Look a user up by id when `who` is numeric, else by username.
pub fn find_user(db: &Database, who: &str) -> RimayResult<User> {
    let conn = db.conn()?;
    let found = match who.parse::<i64>() {
        Ok(id) => User::find_by_id(&conn, id)?,
        Err(_) => User::find_by_username(&conn, who)?,
    };
    found.ok_or_else(|| RimayError::NotFound(format!("user {who}")))
}

/// Table with the CLI's standard look.
pub fn new_table<I, S>(header: I) -> Table
where
    I: IntoIterator<Item = S>,
    S: Into<comfy_table::Cell>,
{
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn print_json<T: Serialize>(value: &T) -> RimayResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Truncate a string to a maximum number of characters, appending an
/// ellipsis if truncated.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else if max_chars > 3 {
        let head: String = s.chars().take(max_chars - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("Comunidad", 20), "Comunidad");
        assert_eq!(truncate("Señalización vial", 8), "Señal...");
        assert_eq!(truncate("abcdef", 2), "ab");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_find_user_by_id_or_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::init(&dir.path().join("cli.db"), &Default::default()).unwrap();
        let conn = db.conn().unwrap();
        let mut user = User::new("quispe", "4455", "quispe@example.com", "Rosa", "Quispe");
        let id = user.save(&conn).unwrap();
        drop(conn);

        assert_eq!(find_user(&db, "quispe").unwrap().id, Some(id));
        assert_eq!(find_user(&db, &id.to_string()).unwrap().username, "quispe");
        assert!(matches!(find_user(&db, "nadie"), Err(RimayError::NotFound(_))));
    }
}
