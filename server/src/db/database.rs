//! Embedded record store wrapper.
//!
//! A process-wide mutex serializes all statement work because SQLite is not
//! reentrant under concurrent writers: the world thread and the save worker
//! share one connection through this type. Prepared statements are cached
//! on the connection (`prepare_cached`), so callers get prepare-once /
//! rebind semantics for free.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, Transaction};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Database> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("could not open database {}", path.display()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Database> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("could not open read-only database {}", path.display()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Database> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Database {
        conn.set_prepared_statement_cache_capacity(64);
        Database {
            conn: Mutex::new(conn),
        }
    }

    /// Run a batch of statements, e.g. the schema bootstrap script.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run arbitrary statement work under the store lock.
    pub fn with_conn<R>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<R>) -> Result<R> {
        let conn = self.lock();
        Ok(f(&conn)?)
    }

    /// Run `f` inside an explicit transaction. Commits on `Ok`, rolls back
    /// on error.
    pub fn with_transaction<R>(
        &self,
        f: impl FnOnce(&Transaction) -> rusqlite::Result<R>,
    ) -> Result<R> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                // Dropping the transaction rolls it back.
                Err(e.into())
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned store mutex means another thread died mid-statement;
        // the data is still consistent (SQLite rolls back), keep going.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_commits_on_ok() {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();

        db.with_transaction(|tx| {
            tx.execute("INSERT INTO t (v) VALUES (1)", [])?;
            tx.execute("INSERT INTO t (v) VALUES (2)", [])?;
            Ok(())
        })
        .unwrap();

        let count: i64 = db
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();

        let result = db.with_transaction(|tx| {
            tx.execute("INSERT INTO t (v) VALUES (1)", [])?;
            tx.execute("INSERT INTO missing_table (v) VALUES (2)", [])?;
            Ok(())
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn cached_statements_can_rebind() {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();

        for v in 0..3 {
            db.with_conn(|conn| {
                let mut stmt = conn.prepare_cached("INSERT INTO t (v) VALUES (?1)")?;
                stmt.execute([v])?;
                Ok(())
            })
            .unwrap();
        }

        let sum: i64 = db
            .with_conn(|conn| conn.query_row("SELECT SUM(v) FROM t", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(sum, 3);
    }
}
