use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use crate::error::{Result, FlowdexError};

pub mod migrate;

/// Connection pragmas applied to every connection.
///
/// WAL lets readers proceed while a reindex writes; the busy timeout makes
/// concurrent writers queue on SQLite's write lock instead of failing.
const PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
     PRAGMA synchronous = NORMAL; \
     PRAGMA foreign_keys = ON; \
     PRAGMA temp_store = MEMORY; \
     PRAGMA cache_size = -65536; \
     PRAGMA mmap_size = 268435456; \
     PRAGMA wal_autocheckpoint = 1000;";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the index database.
///
/// Cheap to clone; all clones share the closed flag, so `close()` on any of
/// them stops the others from opening new connections.
#[derive(Debug, Clone)]
pub struct Db {
    path: PathBuf,
    closed: Arc<AtomicBool>,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(FlowdexError::StoreClosed);
        }

        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = open_with_pragmas(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| FlowdexError::Task(format!("database task failed: {}", e)))?
    }

    /// Create the schema if absent and apply pending migrations.
    ///
    /// Safe to call repeatedly.
    pub async fn initialize(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.with_connection(|conn| migrate::run_migrations(conn)).await
    }

    /// Flush the WAL into the main file and refuse further connections.
    ///
    /// Idempotent; a second call is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let checkpoint = self
            .with_connection(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE); PRAGMA optimize;")?;
                Ok(())
            })
            .await;
        self.closed.store(true, Ordering::SeqCst);
        log::debug!("Index store closed: {}", self.path.display());
        checkpoint
    }
}

fn open_with_pragmas(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(FlowdexError::Database)?;
    conn.execute_batch(PRAGMAS)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_db_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);

        let result = db.with_connection(|conn| {
            conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", [])
                .map_err(FlowdexError::Database)?;
            Ok(())
        }).await;

        assert!(result.is_ok());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_pragmas_set() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));

        db.with_connection(|conn| {
            let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            assert_eq!(journal_mode.to_uppercase(), "WAL");

            let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
            assert_eq!(foreign_keys, 1);

            let busy: i64 = conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0))?;
            assert_eq!(busy, 5000);

            Ok::<(), FlowdexError>(())
        }).await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("nested").join("index.db"));

        db.initialize().await.unwrap();
        db.initialize().await.unwrap();

        let applied = db
            .with_connection(|conn| migrate::get_applied_migrations(conn))
            .await
            .unwrap();
        assert_eq!(applied.len(), migrate::MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_close_rejects_further_use() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("index.db"));
        db.initialize().await.unwrap();

        let clone = db.clone();
        db.close().await.unwrap();
        db.close().await.unwrap();

        let err = clone.with_connection(|_conn| Ok(())).await.unwrap_err();
        assert!(matches!(err, FlowdexError::StoreClosed));
    }
}
