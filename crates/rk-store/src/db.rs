//! Pool setup, schema and timeout plumbing

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use rk_core::config::DatabaseConfig;
use rk_core::{ListQuery, RequestContext, StorageError};

/// Schema, applied statement by statement
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS resource_host (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        label TEXT NOT NULL DEFAULT '',
        ssh_ip TEXT NOT NULL,
        ssh_port INTEGER NOT NULL,
        ssh_user TEXT NOT NULL,
        interpreter TEXT,
        remark TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CONSTRAINT uq_host_name UNIQUE (name),
        CONSTRAINT uq_host_endpoint UNIQUE (ssh_ip, ssh_port, ssh_user)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_host_label ON resource_host (label)",
    r#"
    CREATE TABLE IF NOT EXISTS resource_package (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        label TEXT NOT NULL,
        version TEXT NOT NULL,
        storage_filename TEXT NOT NULL,
        original_filename TEXT NOT NULL,
        uploaded_at TEXT NOT NULL,
        CONSTRAINT uq_package_storage UNIQUE (storage_filename)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_package_label ON resource_package (label)",
];

/// Per-call timeout budgets, one per operation class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Single-record reads
    pub read: Duration,
    /// Inserts, updates and deletes
    pub write: Duration,
    /// Count plus page queries
    pub list: Duration,
}

impl From<&DatabaseConfig> for Timeouts {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            read: config.read_timeout,
            write: config.write_timeout,
            list: config.list_timeout,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&DatabaseConfig::default())
    }
}

/// Open a pool for `config.url`, creating the database file if needed.
///
/// An in-memory URL gets a single connection that is never recycled, since
/// every SQLite connection would otherwise see its own empty database.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| StorageError::Backend(format!("Invalid database url: {}", e)))?
        .create_if_missing(true);

    let pool_options = if config.url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    tracing::debug!("Opening database {}", config.url);
    let pool = pool_options
        .acquire_timeout(config.write_timeout)
        .connect_with(options)
        .await
        .map_err(backend)?;

    Ok(pool)
}

/// Create tables and indexes that do not exist yet
pub async fn migrate(pool: &SqlitePool) -> Result<(), StorageError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await.map_err(backend)?;
    }
    tracing::debug!("Database schema is up to date");
    Ok(())
}

/// Run `fut` within `budget` and the request's cancellation scope
pub(crate) async fn bounded<T, F>(
    ctx: &RequestContext,
    operation: &'static str,
    budget: Duration,
    fut: F,
) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match ctx.run(tokio::time::timeout(budget, fut)).await? {
        Ok(result) => result.map_err(classify),
        Err(_) => {
            tracing::warn!(
                trace_id = %ctx.trace_id(),
                "Database {} exceeded {:?}",
                operation,
                budget
            );
            Err(StorageError::Timeout {
                operation,
                after: budget,
            })
        }
    }
}

/// Map a driver error onto the storage taxonomy
pub(crate) fn classify(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StorageError::DuplicateKey(db_err.message().to_string())
        }
        sqlx::Error::RowNotFound => StorageError::NotFound(err.to_string()),
        _ => backend(err),
    }
}

fn backend(err: sqlx::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

/// LIMIT and OFFSET binds for `query`.
///
/// SQLite reads a negative OFFSET as 0, so an offset beyond `i64::MAX` is
/// refused instead of wrapped.
pub(crate) fn page_window(query: &ListQuery) -> Result<(i64, i64), StorageError> {
    let offset = i64::try_from(query.offset()).map_err(|_| {
        StorageError::InvalidQuery(format!(
            "page {} of size {} is out of range",
            query.page,
            query.limit()
        ))
    })?;
    Ok((i64::from(query.limit()), offset))
}

/// `%term%` with LIKE wildcards in `term` escaped by `\`
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let config = DatabaseConfig {
        url: "sqlite::memory:".into(),
        ..DatabaseConfig::default()
    };
    let pool = connect(&config).await.unwrap();
    migrate(&pool).await.unwrap();
    pool
}
