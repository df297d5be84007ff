use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AppResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS proxies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_ip TEXT NOT NULL,
    port INTEGER NOT NULL,
    external_ip TEXT,
    use_count INTEGER NOT NULL DEFAULT 0 CHECK (use_count >= 0),
    status TEXT NOT NULL DEFAULT 'active',
    last_used_at INTEGER,
    last_toggle_at INTEGER,
    rotation_epoch INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE(server_ip, port)
);
CREATE INDEX IF NOT EXISTS idx_proxies_pick ON proxies(status, use_count, last_used_at);

CREATE TABLE IF NOT EXISTS work_slots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword TEXT NOT NULL,
    code TEXT,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    daily_target INTEGER NOT NULL DEFAULT 100,
    priority INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    settings TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS daily_work_tracking (
    work_slot_id INTEGER NOT NULL REFERENCES work_slots(id) ON DELETE CASCADE,
    work_date TEXT NOT NULL,
    target_count INTEGER NOT NULL,
    allocated_count INTEGER NOT NULL DEFAULT 0 CHECK (allocated_count >= 0),
    completed_count INTEGER NOT NULL DEFAULT 0,
    failed_count INTEGER NOT NULL DEFAULT 0,
    first_allocation_at INTEGER,
    last_allocation_at INTEGER,
    PRIMARY KEY (work_slot_id, work_date)
);

CREATE TABLE IF NOT EXISTS work_allocations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    allocation_key TEXT NOT NULL UNIQUE,
    work_slot_id INTEGER NOT NULL REFERENCES work_slots(id),
    work_date TEXT NOT NULL,
    proxy_id INTEGER NOT NULL REFERENCES proxies(id),
    proxy_epoch INTEGER NOT NULL,
    client_ip TEXT NOT NULL,
    instance_number INTEGER NOT NULL,
    user_folder INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'allocated',
    allocated_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    completed_at INTEGER,
    work_slot_snapshot TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_allocations_status_expiry
    ON work_allocations(status, expires_at);
CREATE INDEX IF NOT EXISTS idx_allocations_proxy ON work_allocations(proxy_id, status);
CREATE UNIQUE INDEX IF NOT EXISTS idx_allocations_active_tuple
    ON work_allocations(work_slot_id, work_date, client_ip, instance_number, user_folder)
    WHERE status = 'allocated';

CREATE TABLE IF NOT EXISTS work_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    allocation_id INTEGER NOT NULL UNIQUE REFERENCES work_allocations(id),
    started_at TEXT,
    completed_at TEXT,
    execution_time_ms INTEGER,
    client_ip TEXT NOT NULL,
    instance_number INTEGER,
    user_folder INTEGER,
    applied_settings TEXT NOT NULL,
    status TEXT NOT NULL,
    status_code INTEGER,
    current_page INTEGER,
    is_blocked INTEGER NOT NULL DEFAULT 0,
    block_details TEXT,
    performance TEXT NOT NULL,
    products TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS client_activity_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_ip TEXT NOT NULL,
    instance_number INTEGER,
    user_folder INTEGER,
    allocation_id INTEGER,
    work_slot_id INTEGER,
    status TEXT NOT NULL,
    execution_time_ms INTEGER,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_client_activity_created ON client_activity_logs(created_at);

CREATE TABLE IF NOT EXISTS clients (
    client_ip TEXT PRIMARY KEY,
    first_seen_at INTEGER NOT NULL,
    last_seen_at INTEGER NOT NULL,
    total_requests INTEGER NOT NULL DEFAULT 0,
    observed_max_instance INTEGER NOT NULL DEFAULT 0,
    observed_max_user_folder INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS proxy_toggle_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    proxy_id INTEGER NOT NULL,
    old_ip TEXT,
    new_ip TEXT NOT NULL,
    processing_ms INTEGER,
    is_virtual INTEGER NOT NULL DEFAULT 0,
    toggled_at INTEGER NOT NULL
);
";

/// Handle to the SQLite store. Cheap to clone; every operation opens its own
/// connection so blocking callers on different threads never share one.
#[derive(Debug, Clone)]
pub struct Store {
    path: Arc<PathBuf>,
    busy_timeout: Duration,
}

impl Store {
    pub fn open(path: impl Into<PathBuf>, busy_timeout: Duration) -> AppResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            path: Arc::new(path),
            busy_timeout,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn connect(&self) -> AppResult<Connection> {
        let conn = Connection::open(self.path.as_path())?;
        conn.busy_timeout(self.busy_timeout)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    pub fn init_schema(&self) -> AppResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("Store schema ready at {}", self.path.display());
        Ok(())
    }

    /// Runs `f` inside an IMMEDIATE transaction: the write lock is taken at
    /// BEGIN, so candidate selection and counter updates see no interleaved
    /// writer. Commits on `Ok`; any error drops the transaction, rolling back.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> AppResult<T>) -> AppResult<T> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> AppResult<T>) -> AppResult<T> {
        let conn = self.connect()?;
        f(&conn)
    }

    /// Moves a blocking store closure onto the blocking pool.
    pub async fn run_blocking<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> AppResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(AppError::from_join)?
    }
}

pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
pub(crate) fn temp_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = Store::open(dir.path().join("hub.db"), Duration::from_secs(10))
        .expect("open temp store");
    (dir, store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_schema_is_idempotent() {
        let (_dir, store) = temp_store();
        store.init_schema().expect("second init");
        let tables: i64 = store
            .read(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                     ('proxies', 'work_slots', 'daily_work_tracking', 'work_allocations')",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn failed_write_rolls_back() {
        let (_dir, store) = temp_store();
        let res: AppResult<()> = store.write(|tx| {
            tx.execute(
                "INSERT INTO clients (client_ip, first_seen_at, last_seen_at) VALUES ('1.1.1.1', 0, 0)",
                [],
            )?;
            Err(AppError::Unknown("abort".into()))
        });
        assert!(res.is_err());
        let count: i64 = store
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM clients", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn run_blocking_returns_closure_result() {
        let (_dir, store) = temp_store();
        let n = store
            .run_blocking(|s| s.read(|conn| Ok(conn.query_row("SELECT 41 + 1", [], |r| r.get::<_, i64>(0))?)))
            .await
            .unwrap();
        assert_eq!(n, 42);
    }
}
