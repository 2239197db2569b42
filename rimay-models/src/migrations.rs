//! Versioned database migrations.
//!
//! Migrations run sequentially from the current stored version to the latest.
//! Each migration is idempotent.

use rusqlite::{params, Connection};
use tracing::{info, warn};
use rimay_core::constants::{permissions, status_codes, DB_SCHEMA_VERSION};
use rimay_core::error::{RimayError, RimayResult};

/// Run all pending migrations on the database.
pub fn run_migrations(conn: &Connection) -> RimayResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version >= DB_SCHEMA_VERSION {
        info!("database schema is up to date (version {current_version})");
        return Ok(());
    }

    info!("running migrations from version {current_version} to {DB_SCHEMA_VERSION}");

    for version in (current_version + 1)..=DB_SCHEMA_VERSION {
        run_migration(conn, version)?;
    }

    set_schema_version(conn, DB_SCHEMA_VERSION)?;
    info!("migrations complete, schema at version {DB_SCHEMA_VERSION}");
    Ok(())
}

/// Get the current schema version from the database.
fn get_schema_version(conn: &Connection) -> RimayResult<i32> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
        .map_err(|e| RimayError::Migration(e.to_string()))?;

    if count == 0 {
        conn.execute("INSERT INTO schema_version (version) VALUES (0)", [])
            .map_err(|e| RimayError::Migration(e.to_string()))?;
        return Ok(0);
    }

    conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
        row.get(0)
    })
    .map_err(|e| RimayError::Migration(e.to_string()))
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> RimayResult<()> {
    conn.execute("UPDATE schema_version SET version = ?1", [version])
        .map_err(|e| RimayError::Migration(e.to_string()))?;
    Ok(())
}

fn run_migration(conn: &Connection, version: i32) -> RimayResult<()> {
    info!("applying migration version {version}");

    match version {
        1 => migration_v1(conn),
        _ => {
            warn!("unknown migration version {version}, skipping");
            Ok(())
        }
    }
}

/// Seed incident statuses.
const SEED_STATUSES: &[(&str, &str, &str)] = &[
    (status_codes::REPORTED, "Reported", "Incident has been reported and is pending review."),
    (status_codes::IN_REVIEW, "En revisión", "El incidente está siendo revisado."),
    (status_codes::RESOLVED, status_codes::RESOLVED_NAME, "El incidente fue atendido y resuelto."),
];

/// Migration v1: tables come from schema::create_tables; this seeds the
/// status catalogue and the community management permission.
fn migration_v1(conn: &Connection) -> RimayResult<()> {
    for (code, name, description) in SEED_STATUSES {
        conn.execute(
            "INSERT OR IGNORE INTO incident_statuses (code, name, description) VALUES (?1, ?2, ?3)",
            params![code, name, description],
        )
        .map_err(|e| RimayError::Migration(e.to_string()))?;
    }

    conn.execute(
        "INSERT OR IGNORE INTO permissions (codename, name) VALUES (?1, ?2)",
        params![permissions::CAN_MANAGE_COMMUNITY, "Puede gestionar la comunidad"],
    )
    .map_err(|e| RimayError::Migration(e.to_string()))?;

    info!("seeded incident statuses and permissions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    #[test]
    fn test_migrations_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, DB_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
    }

    #[test]
    fn test_seed_data() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let resolved: String = conn
            .query_row("SELECT name FROM incident_statuses WHERE code = '003'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(resolved, "Resuelto");

        let perms: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM permissions WHERE codename = 'can_manage_community'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(perms, 1);
    }
}
