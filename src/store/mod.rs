mod db_migration;
pub mod schema;

use diesel::prelude::*;
use diesel::sql_query;
use diesel::sqlite::SqliteConnection;
use std::error::Error;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub enum StoreError {
    DBMigrationError {
        source: db_migration::MigrationError,
    },
    DBConnectionError {
        source: diesel::result::ConnectionError,
    },
    GenericSQLError {
        source: diesel::result::Error,
    },
    // The connection is gone for good, e.g. a thread died while holding it.
    LostConnection,
}
pub type Result<T> = std::result::Result<T, StoreError>;

/// Owns the single embedded-SQL connection every component runs on.
///
/// The connection is not safe for concurrent use, so it sits behind a mutex
/// and all access goes through `Store::conn()`. Holding the returned guard
/// across a multi-statement sequence is what gives callers the "no partial
/// visibility" guarantee; components lock once per public operation.
pub struct Store {
    conn: Mutex<SqliteConnection>,
}

impl Store {
    /// Opens the store file located at the given path and performs schema
    /// migrations to the current application version if required.
    pub fn open(path: &str) -> Result<Store> {
        let result = Store {
            conn: Mutex::new(SqliteConnection::establish(path)?),
        };

        result.default_db_settings()?;
        result.upgrade_db()?;

        Ok(result)
    }

    /// Grants serialized access to the underlying connection.
    /// All statements issued on the guard happen under one critical section.
    pub fn conn(&self) -> Result<MutexGuard<SqliteConnection>> {
        self.conn.lock().map_err(|_| StoreError::LostConnection)
    }

    /// Re-packs the underlying database file
    /// (can save space and speed up operations).
    pub fn optimize(&self) -> Result<()> {
        let conn = self.conn()?;
        sql_query("VACUUM").execute(&*conn)?;

        Ok(())
    }

    fn upgrade_db(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.transaction::<_, db_migration::MigrationError, _>(|| {
            db_migration::upgrade_db(&conn)?;
            Ok(())
        })?;

        Ok(())
    }

    fn default_db_settings(&self) -> Result<()> {
        let conn = self.conn()?;
        sql_query("PRAGMA locking_mode = exclusive").execute(&*conn)?;
        sql_query("PRAGMA journal_mode = WAL").execute(&*conn)?;
        sql_query("PRAGMA foreign_keys = 1").execute(&*conn)?;

        Ok(())
    }
}

// Error Boilerplate (Error display, conversion and source)
impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error During Store Interaction({:?})", self)
    }
}
impl From<db_migration::MigrationError> for StoreError {
    fn from(error: db_migration::MigrationError) -> Self {
        Self::DBMigrationError { source: error }
    }
}
impl From<diesel::result::ConnectionError> for StoreError {
    fn from(error: diesel::result::ConnectionError) -> Self {
        Self::DBConnectionError { source: error }
    }
}
impl From<diesel::result::Error> for StoreError {
    fn from(error: diesel::result::Error) -> Self {
        Self::GenericSQLError { source: error }
    }
}
impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DBMigrationError { ref source } => Some(source),
            Self::DBConnectionError { ref source } => Some(source),
            Self::GenericSQLError { ref source } => Some(source),
            Self::LostConnection => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_store() {
        let store = Store::open(":memory:").unwrap();

        // The schema must be in place after open.
        let conn = store.conn().unwrap();
        use super::schema::files;
        let count: i64 = files::table.count().get_result(&*conn).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn optimize_database_file() {
        let store = Store::open(":memory:").unwrap();
        store.optimize().unwrap();
    }
}
