//! Database initialization and versioned schema migrations.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

/// Applied in order, each at most once per database file.
const MIGRATIONS: &[Migration] = &[Migration {
    version: "0001_valuation_tables",
    sql: include_str!("schema.sql"),
}];

/// Open (or create) the SQLite file at `db_path` and apply any pending
/// migrations.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "Could not create database directory");
            }
        }
    }

    // WAL lets readers proceed while a rebuild writes.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    let applied = run_migrations(&pool).await?;
    info!(path = db_path, migrations_applied = applied, "Database ready");
    Ok(pool)
}

/// Apply every migration not yet recorded in `schema_migrations`, each in
/// its own transaction. Returns how many were applied.
async fn run_migrations(pool: &SqlitePool) -> Result<usize, sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let mut applied = 0usize;
    for migration in MIGRATIONS {
        let recorded: Option<(String,)> =
            sqlx::query_as("SELECT version FROM schema_migrations WHERE version = ?")
                .bind(migration.version)
                .fetch_optional(pool)
                .await?;
        if recorded.is_some() {
            debug!(version = migration.version, "Migration already applied");
            continue;
        }

        let mut tx = pool.begin().await?;
        let mut statements = 0usize;
        for statement in split_statements(migration.sql) {
            sqlx::query(statement).execute(&mut *tx).await?;
            statements += 1;
        }
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(migration.version)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(version = migration.version, statements, "Applied migration");
        applied += 1;
    }

    Ok(applied)
}

/// Statements of a schema file. Statements must not contain `;` in literals.
fn split_statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(';').map(str::trim).filter(|s| !s.is_empty())
}
