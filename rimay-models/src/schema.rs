//! Database schema definitions and table creation.
//!
//! Relational layout for accounts, communities, incidents and notifications.
//! Timestamps are TEXT in fixed-width RFC 3339 so ORDER BY on them is
//! chronological. Community boundaries are GeoJSON text with a cached
//! bounding box for SQL prefiltering.

use rusqlite::Connection;
use rimay_core::error::{RimayError, RimayResult};
use tracing::info;

/// Create all database tables and indexes if they do not exist.
pub fn create_tables(conn: &Connection) -> RimayResult<()> {
    conn.execute_batch(SCHEMA_SQL)
        .map_err(|e| RimayError::Database(format!("failed to create schema: {e}")))?;
    info!("database schema verified");
    Ok(())
}

/// Drop all tables (used for database reset).
pub fn drop_tables(conn: &Connection) -> RimayResult<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys=OFF;
         DROP TABLE IF EXISTS incident_notifications;
         DROP TABLE IF EXISTS incident_comments;
         DROP TABLE IF EXISTS incident_media;
         DROP TABLE IF EXISTS incidents;
         DROP TABLE IF EXISTS incident_statuses;
         DROP TABLE IF EXISTS incident_types;
         DROP TABLE IF EXISTS community_memberships;
         DROP TABLE IF EXISTS communities;
         DROP TABLE IF EXISTS fcm_tokens;
         DROP TABLE IF EXISTS user_stats;
         DROP TABLE IF EXISTS user_groups;
         DROP TABLE IF EXISTS group_permissions;
         DROP TABLE IF EXISTS sessions;
         DROP TABLE IF EXISTS auth_groups;
         DROP TABLE IF EXISTS permissions;
         DROP TABLE IF EXISTS auth_tokens;
         DROP TABLE IF EXISTS user_profiles;
         DROP TABLE IF EXISTS users;
         DROP TABLE IF EXISTS schema_version;
         PRAGMA foreign_keys=ON;",
    )
    .map_err(|e| RimayError::Database(format!("failed to drop tables: {e}")))?;
    Ok(())
}

/// Complete SQL schema for all tables.
const SCHEMA_SQL: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Accounts
CREATE TABLE IF NOT EXISTS users (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    username        TEXT NOT NULL UNIQUE,
    dni             TEXT NOT NULL UNIQUE,
    email           TEXT NOT NULL UNIQUE,
    first_name      TEXT NOT NULL DEFAULT '',
    last_name       TEXT NOT NULL DEFAULT '',
    password        TEXT NOT NULL DEFAULT '',
    is_active       INTEGER NOT NULL DEFAULT 1,
    is_staff        INTEGER NOT NULL DEFAULT 0,
    date_joined     TEXT NOT NULL,
    last_login      TEXT
);

CREATE TABLE IF NOT EXISTS user_profiles (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    bio             TEXT,
    alias_name      TEXT,
    latitude        REAL,
    longitude       REAL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_profiles_location ON user_profiles(latitude, longitude);

CREATE TABLE IF NOT EXISTS auth_tokens (
    key             TEXT PRIMARY KEY,
    user_id         INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    created_at      TEXT NOT NULL
);

-- Groups and permissions
CREATE TABLE IF NOT EXISTS auth_groups (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS permissions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    codename        TEXT NOT NULL UNIQUE,
    name            TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS group_permissions (
    group_id        INTEGER NOT NULL REFERENCES auth_groups(id) ON DELETE CASCADE,
    permission_id   INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
    PRIMARY KEY (group_id, permission_id)
);

CREATE TABLE IF NOT EXISTS user_groups (
    user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    group_id        INTEGER NOT NULL REFERENCES auth_groups(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, group_id)
);

-- Browser sessions
CREATE TABLE IF NOT EXISTS sessions (
    key             TEXT PRIMARY KEY,
    user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    group_id        INTEGER REFERENCES auth_groups(id) ON DELETE SET NULL,
    flash           TEXT NOT NULL DEFAULT '[]',
    created_at      TEXT NOT NULL,
    expires_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);

-- Push tokens
CREATE TABLE IF NOT EXISTS fcm_tokens (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    token           TEXT NOT NULL UNIQUE,
    device_id       TEXT,
    is_active       INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fcm_tokens_user_active ON fcm_tokens(user_id, is_active);

-- Communities
CREATE TABLE IF NOT EXISTS communities (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    description     TEXT NOT NULL DEFAULT '',
    boundary_area   TEXT,
    min_lat         REAL,
    min_lng         REAL,
    max_lat         REAL,
    max_lng         REAL,
    postal_code     TEXT NOT NULL DEFAULT '',
    is_active       INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_communities_bbox ON communities(min_lat, max_lat, min_lng, max_lng);

CREATE TABLE IF NOT EXISTS community_memberships (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    community_id    INTEGER NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
    role            TEXT NOT NULL DEFAULT 'member',
    is_verified     INTEGER NOT NULL DEFAULT 0,
    joined_at       TEXT NOT NULL,
    UNIQUE (user_id, community_id)
);

CREATE INDEX IF NOT EXISTS idx_memberships_community ON community_memberships(community_id, joined_at);

-- Incident catalogues
CREATE TABLE IF NOT EXISTS incident_types (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    name                TEXT NOT NULL UNIQUE,
    code                TEXT UNIQUE,
    description         TEXT NOT NULL DEFAULT '',
    icon                TEXT NOT NULL DEFAULT '',
    color_hex           TEXT NOT NULL DEFAULT '',
    default_severity    INTEGER,
    requires_authority  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS incident_statuses (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL UNIQUE,
    code            TEXT NOT NULL UNIQUE,
    description     TEXT NOT NULL DEFAULT ''
);

-- Incidents
CREATE TABLE IF NOT EXISTS incidents (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    reported_by         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    incident_type_id    INTEGER NOT NULL REFERENCES incident_types(id) ON DELETE RESTRICT,
    incident_status_id  INTEGER NOT NULL REFERENCES incident_statuses(id) ON DELETE RESTRICT,
    title               TEXT NOT NULL,
    description         TEXT NOT NULL DEFAULT '',
    latitude            REAL,
    longitude           REAL,
    address             TEXT,
    is_anonymous        INTEGER NOT NULL DEFAULT 0,
    severity_level      INTEGER,
    is_active           INTEGER NOT NULL DEFAULT 1,
    occurred_at         TEXT,
    reported_at         TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_incidents_reporter ON incidents(reported_by, reported_at);
CREATE INDEX IF NOT EXISTS idx_incidents_active_reported ON incidents(is_active, reported_at);
CREATE INDEX IF NOT EXISTS idx_incidents_location ON incidents(latitude, longitude);

CREATE TABLE IF NOT EXISTS incident_media (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id     INTEGER NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
    media_type      TEXT NOT NULL,
    file_path       TEXT,
    description     TEXT,
    uploaded_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_incident_media_incident ON incident_media(incident_id);

CREATE TABLE IF NOT EXISTS incident_comments (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id     INTEGER NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
    user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    comment         TEXT NOT NULL,
    is_anonymous    INTEGER NOT NULL DEFAULT 0,
    is_active       INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_incident_comments_incident ON incident_comments(incident_id, created_at);

CREATE TABLE IF NOT EXISTS incident_notifications (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id             INTEGER NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
    notified_user_id        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    notification_sent_at    TEXT NOT NULL,
    was_read                INTEGER NOT NULL DEFAULT 0,
    read_at                 TEXT,
    UNIQUE (incident_id, notified_user_id)
);

CREATE INDEX IF NOT EXISTS idx_notifications_user_sent ON incident_notifications(notified_user_id, notification_sent_at);

-- Per-user counters
CREATE TABLE IF NOT EXISTS user_stats (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id                 INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    total_alerts            INTEGER NOT NULL DEFAULT 0 CHECK (total_alerts >= 0),
    total_alerts_resolved   INTEGER NOT NULL DEFAULT 0 CHECK (total_alerts_resolved >= 0),
    total_alerts_pending    INTEGER NOT NULL DEFAULT 0 CHECK (total_alerts_pending >= 0),
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, table: &str) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let tables = ["users", "user_profiles", "auth_tokens", "sessions", "auth_groups",
                      "permissions", "group_permissions", "user_groups", "fcm_tokens",
                      "communities", "community_memberships", "incident_types",
                      "incident_statuses", "incidents", "incident_media",
                      "incident_comments", "incident_notifications", "user_stats",
                      "schema_version"];
        for table in &tables {
            assert!(table_exists(&conn, table), "table {table} should exist");
        }
    }

    #[test]
    fn test_create_tables_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
    }

    #[test]
    fn test_drop_and_recreate() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        drop_tables(&conn).unwrap();
        assert!(!table_exists(&conn, "incidents"));
        create_tables(&conn).unwrap();
        assert!(table_exists(&conn, "incidents"));
    }

    #[test]
    fn test_stats_cannot_go_negative() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (username, dni, email, date_joined) VALUES ('a', '1', 'a@x.com', 'now')",
            [],
        )
        .unwrap();
        let res = conn.execute(
            "INSERT INTO user_stats (user_id, total_alerts_pending, created_at, updated_at)
             VALUES (1, -1, 'now', 'now')",
            [],
        );
        assert!(res.is_err());
    }
}
