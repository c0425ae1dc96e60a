//! `DuckDB` connection pooling.
//!
//! A warehouse file is opened exactly once. Further connections are cloned
//! from that root handle so they share its catalog and see each other's
//! committed writes; opening the same file twice in one process is refused
//! by `DuckDB`.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::duckdb::Connection;

const SESSION_SETUP: &str = "PRAGMA disable_progress_bar;";

struct SharedPool {
    db_path: PathBuf,
    capacity: usize,
    root: Mutex<Connection>,
    spare: Mutex<Vec<Connection>>,
}

impl SharedPool {
    fn clone_root(&self) -> Result<Connection, ::duckdb::Error> {
        let connection = self
            .root
            .lock()
            .expect("duckdb root connection mutex poisoned")
            .try_clone()?;
        connection.execute_batch(SESSION_SETUP)?;
        Ok(connection)
    }
}

/// Pool of connections to one `DuckDB` file.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    shared: Arc<SharedPool>,
}

impl DuckDbConnectionManager {
    /// Open `path`, keeping at most `capacity` idle connections for reuse.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened as a `DuckDB` database.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, ::duckdb::Error> {
        let db_path = path.into();
        let root = Connection::open(&db_path)?;
        root.execute_batch(SESSION_SETUP)?;

        Ok(Self {
            shared: Arc::new(SharedPool {
                db_path,
                capacity: capacity.max(1),
                root: Mutex::new(root),
                spare: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Take an idle connection, or clone a new one from the root.
    ///
    /// # Errors
    /// Returns an error if cloning the root connection fails.
    ///
    /// # Panics
    /// Panics if a pool mutex was poisoned by an earlier panic.
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        let spare = self
            .shared
            .spare
            .lock()
            .expect("duckdb connection pool mutex poisoned")
            .pop();
        let connection = match spare {
            Some(connection) => connection,
            None => self.shared.clone_root()?,
        };

        Ok(PooledConnection {
            pool: Arc::clone(&self.shared),
            connection: Some(connection),
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.shared.db_path
    }
}

/// Connection on loan from the pool; handed back on drop.
pub struct PooledConnection {
    pool: Arc<SharedPool>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection.as_ref().expect("connection already returned")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection.as_mut().expect("connection already returned")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let (Some(connection), Ok(mut spare)) = (self.connection.take(), self.pool.spare.lock())
        {
            if spare.len() < self.pool.capacity {
                spare.push(connection);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn cloned_connections_see_committed_writes() {
        let temp = tempdir().expect("tempdir");
        let manager =
            DuckDbConnectionManager::open(temp.path().join("pool.duckdb"), 2).expect("open");

        manager
            .acquire()
            .expect("writer")
            .execute_batch("CREATE TABLE shared (id INTEGER); INSERT INTO shared VALUES (1);")
            .expect("create");

        let _held = manager.acquire().expect("first");
        let reader = manager.acquire().expect("second");
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM shared", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn returned_connections_are_capped_at_capacity() {
        let temp = tempdir().expect("tempdir");
        let manager =
            DuckDbConnectionManager::open(temp.path().join("pool.duckdb"), 1).expect("open");

        let first = manager.acquire().expect("first");
        let second = manager.acquire().expect("second");
        drop(first);
        drop(second);

        assert_eq!(manager.shared.spare.lock().expect("spare lock").len(), 1);
    }
}
