use super::*;

pub fn migrate(conn: &SqliteConnection) -> Result<()> {
    create_table_files(conn)?;
    create_table_file_id_lookups(conn)?;
    create_table_histories(conn)?;
    create_table_handled_events(conn)?;
    create_table_users(conn)?;

    create_table_assets(conn)?;
    create_table_file_types(conn)?;
    create_table_engine_types(conn)?;
    create_table_rcs_users(conn)?;
    create_table_asset_usages(conn)?;
    create_table_entities_x_shaders(conn)?;
    create_table_levels_x_entities(conn)?;
    create_table_attributes(conn)?;
    create_table_asset_x_attributes(conn)?;

    Ok(())
}

// One row per managed file. The id is the file's TUID, minted by the client
// that first saw the file. Rows are soft-deleted (was_deleted) so history
// stays resolvable; only a path collision hard-retires a row.
fn create_table_files(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE files(
                id              BIGINT PRIMARY KEY NOT NULL,
                path            TEXT NOT NULL,
                created         TEXT NOT NULL,
                modified        TEXT NOT NULL,
                user_id         INTEGER NOT NULL DEFAULT 0,
                was_deleted     INTEGER NOT NULL DEFAULT 0
             )",
    )
    .execute(conn)?;

    sql_query("CREATE INDEX files_path_index ON files (path)").execute(conn)?;

    Ok(())
}

// Resolves identifiers minted by disconnected clients to the canonical
// record their path already had. Kept flat: an existing_file_id is never
// itself a duplicate_file_id.
fn create_table_file_id_lookups(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE file_id_lookups(
                duplicate_file_id   BIGINT PRIMARY KEY NOT NULL,
                existing_file_id    BIGINT NOT NULL,

                FOREIGN KEY(existing_file_id) REFERENCES files(id)
             )",
    )
    .execute(conn)?;

    Ok(())
}

// Append-only log of every identity mutation, keyed by file id and time.
// The data column carries an optional payload (e.g. the previous path of a
// rename).
fn create_table_histories(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE histories(
                id          INTEGER PRIMARY KEY NOT NULL,
                file_id     BIGINT NOT NULL,
                operation   TEXT NOT NULL,
                modified    TEXT NOT NULL,
                user_id     INTEGER NOT NULL,
                data        TEXT
             )",
    )
    .execute(conn)?;

    Ok(())
}

// Replay ledger for the external change-event log: event ids that have
// already been applied, so a crashed ingestion run can skip them.
fn create_table_handled_events(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE handled_events(
                id          BIGINT PRIMARY KEY NOT NULL,
                created     TEXT NOT NULL,
                username    TEXT NOT NULL DEFAULT ''
             )",
    )
    .execute(conn)?;

    Ok(())
}

fn create_table_users(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE users(
                id          INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                username    TEXT NOT NULL UNIQUE
             )",
    )
    .execute(conn)?;

    Ok(())
}

// One row per tracked asset. The rowid (id) exists purely for edge-table
// join performance; the stable identity is file_id. Dependency edges always
// reference id, never file_id, which forces dependencies to be inserted
// before any edge naming them.
fn create_table_assets(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE assets(
                id              INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                file_id         BIGINT NOT NULL UNIQUE,
                path            TEXT NOT NULL,
                name            TEXT NOT NULL DEFAULT '',
                file_type_id    BIGINT NOT NULL,
                engine_type_id  BIGINT NOT NULL,
                rcs_user_id     BIGINT NOT NULL DEFAULT 0,
                rcs_revision    BIGINT NOT NULL DEFAULT 0,
                size            BIGINT NOT NULL DEFAULT 0,
                last_updated    TEXT NOT NULL,

                FOREIGN KEY(file_type_id)   REFERENCES file_types(id),
                FOREIGN KEY(engine_type_id) REFERENCES engine_types(id),
                FOREIGN KEY(rcs_user_id)    REFERENCES rcs_users(id)
             )",
    )
    .execute(conn)?;

    Ok(())
}

fn create_table_file_types(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE file_types(
                id      INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                name    TEXT NOT NULL UNIQUE
             )",
    )
    .execute(conn)?;

    Ok(())
}

fn create_table_engine_types(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE engine_types(
                id      INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                name    TEXT NOT NULL UNIQUE
             )",
    )
    .execute(conn)?;

    Ok(())
}

fn create_table_rcs_users(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE rcs_users(
                id          INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                username    TEXT NOT NULL UNIQUE
             )",
    )
    .execute(conn)?;

    Ok(())
}

// Generic "asset uses dependency" edges. Replaced wholesale on every
// re-index of the owning asset.
fn create_table_asset_usages(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE asset_usages(
                asset_id        BIGINT NOT NULL,
                dependency_id   BIGINT NOT NULL,

                UNIQUE(asset_id, dependency_id),
                FOREIGN KEY(asset_id)       REFERENCES assets(id),
                FOREIGN KEY(dependency_id)  REFERENCES assets(id)
             )",
    )
    .execute(conn)?;

    Ok(())
}

// Which shaders an entity (transitively) uses.
fn create_table_entities_x_shaders(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE entities_x_shaders(
                entity_id   BIGINT NOT NULL,
                shader_id   BIGINT NOT NULL,

                UNIQUE(entity_id, shader_id),
                FOREIGN KEY(entity_id)  REFERENCES assets(id),
                FOREIGN KEY(shader_id)  REFERENCES assets(id)
             )",
    )
    .execute(conn)?;

    Ok(())
}

// Which entities a level (transitively) places.
fn create_table_levels_x_entities(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE levels_x_entities(
                level_id    BIGINT NOT NULL,
                entity_id   BIGINT NOT NULL,

                UNIQUE(level_id, entity_id),
                FOREIGN KEY(level_id)   REFERENCES assets(id),
                FOREIGN KEY(entity_id)  REFERENCES assets(id)
             )",
    )
    .execute(conn)?;

    Ok(())
}

fn create_table_attributes(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE attributes(
                id      INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                name    TEXT NOT NULL UNIQUE
             )",
    )
    .execute(conn)?;

    Ok(())
}

// Sparse per-asset key/value attributes, searchable through the query
// builder.
fn create_table_asset_x_attributes(conn: &SqliteConnection) -> Result<()> {
    sql_query(
        "CREATE TABLE asset_x_attributes(
                asset_id        BIGINT NOT NULL,
                attribute_id    BIGINT NOT NULL,
                value           TEXT,

                UNIQUE(asset_id, attribute_id),
                FOREIGN KEY(asset_id)       REFERENCES assets(id),
                FOREIGN KEY(attribute_id)   REFERENCES attributes(id)
             )",
    )
    .execute(conn)?;

    Ok(())
}
