mod emails;
mod logs;
mod senders;
mod state;
mod suggestions;
mod tasks;
mod waiting;

pub use logs::{LlmLogEntry, ProcessingStats};
pub use suggestions::{CorrectionRecord, OverdueReply};

use std::path::Path;

use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};

use crate::error::{AppError, AppResult};

/// Facade over the relational store. The `Store` is the sole writer of every
/// table; collaborators receive it as `Arc<Store>` and go through its typed
/// operations, grouped per table in the sibling modules.
pub struct Store {
    conn: DatabaseConnection,
}

impl Store {
    /// Open (creating if needed) the database file, enable WAL and a busy
    /// timeout, run pending migrations, and clamp file permissions.
    pub async fn connect(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Internal(anyhow::anyhow!(
                        "failed to create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let mut options = ConnectOptions::new(url);
        // One pooled connection: SQLite has a single writer anyway, and this
        // keeps the busy-timeout pragma applied to every statement we run.
        options.sqlx_logging(false).max_connections(1);

        let conn = Database::connect(options).await?;
        conn.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        conn.execute_unprepared("PRAGMA busy_timeout=5000;").await?;

        Migrator::up(&conn, None).await?;

        restrict_permissions(db_path);

        tracing::info!(db_path = %db_path.display(), "database initialized");
        Ok(Store { conn })
    }

    /// In-memory database with the full schema, for tests.
    pub async fn connect_in_memory() -> AppResult<Self> {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.sqlx_logging(false).max_connections(1);
        let conn = Database::connect(options).await?;
        Migrator::up(&conn, None).await?;
        Ok(Store { conn })
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }
}

#[cfg(unix)]
fn restrict_permissions(db_path: &Path) {
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;

    let mut targets = vec![db_path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        targets.push(name.into());
    }
    for target in targets {
        if target.exists() {
            if let Err(e) = std::fs::set_permissions(&target, Permissions::from_mode(0o600)) {
                tracing::warn!(path = %target.display(), error = %e, "failed to restrict database file permissions");
            }
        }
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_db_path: &Path) {}
