//! Database initialization, connection pooling, and lifecycle management.
//!
//! Uses SQLite in WAL mode with r2d2 connection pooling.
//! Runs integrity checks on startup and applies versioned migrations.

use std::path::Path;
use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{info, warn, error};

use rimay_core::error::{RimayError, RimayResult};
use rimay_core::config::DatabaseConfig;

use crate::schema;
use crate::migrations;

/// Type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Map a rusqlite error, surfacing constraint violations as conflicts.
pub fn sql_err(e: rusqlite::Error) -> RimayError {
    match &e {
        rusqlite::Error::SqliteFailure(err, msg)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            RimayError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()))
        }
        _ => RimayError::Database(e.to_string()),
    }
}

/// Database wrapper providing initialization, pooling, and lifecycle management.
#[derive(Clone)]
pub struct Database {
    pool: Arc<DbPool>,
}

impl Database {
    /// Initialize the database at the given path with the provided configuration.
    ///
    /// This:
    /// 1. Creates the database file and parent directories if needed
    /// 2. Enables WAL mode and foreign keys on every pooled connection
    /// 3. Runs integrity checks if configured
    /// 4. Creates the schema tables
    /// 5. Runs pending migrations (seed statuses and permissions)
    pub fn init(db_path: &Path, config: &DatabaseConfig) -> RimayResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("initializing database at {}", db_path.display());

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_customizer(Box::new(ConnectionCustomizer {
                wal_mode: config.wal_mode,
            }))
            .build(manager)
            .map_err(|e| RimayError::Pool(e.to_string()))?;

        let db = Self {
            pool: Arc::new(pool),
        };

        if config.integrity_check_on_startup {
            db.run_integrity_check()?;
        }

        {
            let conn = db.conn()?;
            schema::create_tables(&conn)?;
            migrations::run_migrations(&conn)?;
        }

        info!("database initialized successfully");
        Ok(db)
    }

    /// Get a connection from the pool.
    pub fn conn(&self) -> RimayResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| RimayError::Pool(e.to_string()))
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Run a SQLite integrity check.
    pub fn run_integrity_check(&self) -> RimayResult<()> {
        let conn = self.conn()?;
        let result: String = conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .map_err(|e| RimayError::Database(e.to_string()))?;

        if result != "ok" {
            error!("database integrity check failed: {result}");
            return Err(RimayError::IntegrityCheck(result));
        }

        info!("database integrity check passed");
        Ok(())
    }

    /// Execute a function within a database transaction.
    ///
    /// The transaction is rolled back if `f` returns an error.
    pub fn transaction<T, F>(&self, f: F) -> RimayResult<T>
    where
        F: FnOnce(&Connection) -> RimayResult<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RimayError::Database(e.to_string()))?;

        let result = f(&tx)?;

        tx.commit()
            .map_err(|e| RimayError::Database(e.to_string()))?;

        Ok(result)
    }

    /// Get database statistics (row counts per table).
    pub fn stats(&self) -> RimayResult<DatabaseStats> {
        let conn = self.conn()?;

        let count = |table: &str| -> RimayResult<i64> {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            conn.query_row(&sql, [], |row| row.get(0))
                .map_err(|e| RimayError::Database(e.to_string()))
        };

        Ok(DatabaseStats {
            users: count("users")?,
            communities: count("communities")?,
            memberships: count("community_memberships")?,
            incidents: count("incidents")?,
            notifications: count("incident_notifications")?,
            fcm_tokens: count("fcm_tokens")?,
        })
    }

    /// Reset the database by dropping and recreating all tables.
    pub fn reset(&self) -> RimayResult<()> {
        warn!("resetting database - all data will be lost");
        let conn = self.conn()?;
        schema::drop_tables(&conn)?;
        schema::create_tables(&conn)?;
        migrations::run_migrations(&conn)?;
        info!("database reset complete");
        Ok(())
    }
}

/// Database row count statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseStats {
    pub users: i64,
    pub communities: i64,
    pub memberships: i64,
    pub incidents: i64,
    pub notifications: i64,
    pub fcm_tokens: i64,
}

impl std::fmt::Display for DatabaseStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "users={}, communities={}, memberships={}, incidents={}, notifications={}, fcm_tokens={}",
            self.users, self.communities, self.memberships, self.incidents,
            self.notifications, self.fcm_tokens
        )
    }
}

/// r2d2 connection customizer that applies PRAGMA settings.
#[derive(Debug)]
struct ConnectionCustomizer {
    wal_mode: bool,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        if self.wal_mode {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }

        // Cascades and PROTECT rely on foreign_keys being on per connection.
        conn.execute_batch(
            "PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=MEMORY;
             PRAGMA busy_timeout=5000;
             PRAGMA foreign_keys=ON;",
        )?;

        Ok(())
    }
}
