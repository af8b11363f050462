/// Module performing database migrations to newer application/database
/// format versions. Used on an existing DB connection to upgrade it to the
/// most recent version.
///
/// upgrade_db(&connection); // upgrades to latest DB version
mod version_001;
mod version_002;

use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::Integer;
use diesel::sqlite::SqliteConnection;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum MigrationError {
    ReadWriteDBVersion { source: diesel::result::Error },
    UnknownDBVersion { version: DBVersion },
    SQLError { source: diesel::result::Error },
}
pub type Result<T> = std::result::Result<T, MigrationError>;

pub type DBVersion = u32;
const REQUIRED_DB_VERSION: DBVersion = 2;
const PRAGMA_USER_VERSION: &str = "user_version";

/// Upgrades the given database connection to the REQUIRED_DB_VERSION of the
/// current application build.
///
/// As the application and therefore the database schema evolves, this
/// routine is used to step-by-step keep database files up to date with the
/// application. A database stamped with a version this build does not know
/// (i.e. written by a newer build) can not be touched and fails the open.
///
/// MUST be run before any other action on the database.
pub fn upgrade_db(connection: &SqliteConnection) -> Result<DBVersion> {
    loop {
        let current_version = read_db_version(connection)?;
        if current_version < REQUIRED_DB_VERSION {
            migrate_up_from(connection, current_version)?;
        } else if current_version > REQUIRED_DB_VERSION {
            return Err(MigrationError::UnknownDBVersion {
                version: current_version,
            });
        } else {
            return Ok(current_version);
        }
    }
}

/// Migrates the given database connection from the DBVersion version to
/// (version + 1). Expects the database to be in the given version and
/// updates the user_version pragma to the new value if successful.
///
/// Does not wrap the operation in a transaction,
/// the caller is supposed to if a rollback might be required.
fn migrate_up_from(connection: &SqliteConnection, version: DBVersion) -> Result<()> {
    match version {
        // Just run the known migration steps as regular functions.
        0 => version_001::migrate(connection)?,
        1 => version_002::migrate(connection)?,
        // We do not know how to handle this migration.
        _ => return Err(MigrationError::UnknownDBVersion { version }),
    };

    write_db_version(connection, version + 1)?;
    Ok(())
}

#[derive(QueryableByName)]
struct UserVersionRow {
    #[sql_type = "Integer"]
    user_version: i32,
}

fn read_db_version(connection: &SqliteConnection) -> Result<DBVersion> {
    let row = sql_query(format!("PRAGMA {}", PRAGMA_USER_VERSION))
        .get_result::<UserVersionRow>(connection)
        .map_err(|source| MigrationError::ReadWriteDBVersion { source })?;

    Ok(row.user_version as DBVersion)
}

fn write_db_version(connection: &SqliteConnection, version: DBVersion) -> Result<()> {
    sql_query(format!("PRAGMA {} = {}", PRAGMA_USER_VERSION, version))
        .execute(connection)
        .map_err(|source| MigrationError::ReadWriteDBVersion { source })?;

    Ok(())
}

// Error Boilerplate (Error display, conversion and source)
impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error During Database Migration ({:?})", self)
    }
}
impl From<diesel::result::Error> for MigrationError {
    fn from(error: diesel::result::Error) -> Self {
        Self::SQLError { source: error }
    }
}
impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ReadWriteDBVersion { ref source } => Some(source),
            Self::UnknownDBVersion { .. } => None,
            Self::SQLError { ref source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::sql_types::Text;

    fn open_connection() -> SqliteConnection {
        SqliteConnection::establish(":memory:").unwrap()
    }

    #[derive(QueryableByName)]
    struct TableNameRow {
        #[sql_type = "Text"]
        name: String,
    }

    fn query_table_names(connection: &SqliteConnection) -> Vec<String> {
        sql_query("SELECT name FROM sqlite_master WHERE type='table'")
            .load::<TableNameRow>(connection)
            .unwrap()
            .into_iter()
            .map(|row| row.name)
            .collect()
    }

    #[test]
    fn read_and_write_db_version() {
        let connection = open_connection();

        assert_eq!(read_db_version(&connection).unwrap(), 0);
        write_db_version(&connection, 42).unwrap();
        assert_eq!(read_db_version(&connection).unwrap(), 42);
    }

    #[test]
    fn properly_upgrade_to_version_1() {
        let connection = open_connection();

        migrate_up_from(&connection, 0).unwrap();

        let table_names = query_table_names(&connection);
        assert!(table_names.contains(&"files".to_string()));
        assert!(table_names.contains(&"file_id_lookups".to_string()));
        assert!(table_names.contains(&"histories".to_string()));
        assert!(table_names.contains(&"handled_events".to_string()));
        assert!(table_names.contains(&"users".to_string()));
        assert!(table_names.contains(&"assets".to_string()));
        assert!(table_names.contains(&"file_types".to_string()));
        assert!(table_names.contains(&"engine_types".to_string()));
        assert!(table_names.contains(&"rcs_users".to_string()));
        assert!(table_names.contains(&"asset_usages".to_string()));
        assert!(table_names.contains(&"entities_x_shaders".to_string()));
        assert!(table_names.contains(&"levels_x_entities".to_string()));
        assert!(table_names.contains(&"attributes".to_string()));
        assert!(table_names.contains(&"asset_x_attributes".to_string()));

        assert_eq!(read_db_version(&connection).unwrap(), 1);
    }

    #[test]
    fn properly_upgrade_to_required_version() {
        let connection = open_connection();

        upgrade_db(&connection).unwrap();
        assert_eq!(read_db_version(&connection).unwrap(), REQUIRED_DB_VERSION);
    }

    #[test]
    fn refuse_to_open_newer_database_versions() {
        let connection = open_connection();

        write_db_version(&connection, REQUIRED_DB_VERSION + 1).unwrap();
        match upgrade_db(&connection) {
            Err(MigrationError::UnknownDBVersion { version }) => {
                assert_eq!(version, REQUIRED_DB_VERSION + 1)
            }
            _ => panic!("Must not touch a database written by a newer build!"),
        }
    }
}
