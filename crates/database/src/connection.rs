//! Database connection management

use fieldsync_core::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Database connection pool
pub type DbPool = Pool<Sqlite>;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Enable Write-Ahead Logging (WAL) mode
    pub enable_wal: bool,
    /// Create database if it doesn't exist
    pub create_if_missing: bool,
    /// How long a connection waits for another writer's lock
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "fieldsync.db".to_string(),
            max_connections: 4,
            enable_wal: true,
            create_if_missing: true,
            busy_timeout: Duration::from_secs(10),
        }
    }
}

impl DatabaseConfig {
    /// Creates a new configuration with a custom path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Sets the maximum number of connections
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Enables or disables WAL mode
    pub fn with_wal(mut self, enable: bool) -> Self {
        self.enable_wal = enable;
        self
    }

    /// Sets whether to create the database if missing
    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Sets the lock wait for concurrent writers
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

/// Establishes a connection pool to the database
pub async fn connect(config: DatabaseConfig) -> Result<DbPool, AppError> {
    let mut options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))
        .map_err(|e| AppError::database("Invalid database path", e))?
        .create_if_missing(config.create_if_missing)
        .busy_timeout(config.busy_timeout);

    // FULL keeps every committed enqueue on disk before the mutation returns
    if config.enable_wal {
        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .map_err(|e| AppError::database("Failed to connect to database", e))?;

    log::debug!("Opened database at {}", config.path);
    Ok(pool)
}

/// Creates an in-memory database
///
/// The pool is pinned to a single connection that never expires, since the
/// database lives exactly as long as that connection.
pub async fn connect_in_memory() -> Result<DbPool, AppError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| AppError::database("Failed to create in-memory database", e))?
        .journal_mode(SqliteJournalMode::Memory);

    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|e| AppError::database("Failed to connect to in-memory database", e))
}

/// Closes the database connection pool
pub async fn close(pool: DbPool) {
    pool.close().await;
}

/// Checks if the database file exists
pub fn database_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().exists()
}
