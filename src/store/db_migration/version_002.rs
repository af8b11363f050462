use super::*;

// Search and traversal touch these columns constantly, full scans showed up
// as soon as the asset count left toy range.
pub fn migrate(conn: &SqliteConnection) -> Result<()> {
    sql_query("CREATE INDEX assets_file_id_index ON assets (file_id)").execute(conn)?;
    sql_query("CREATE INDEX assets_path_index ON assets (path)").execute(conn)?;
    sql_query("CREATE INDEX histories_file_id_index ON histories (file_id)").execute(conn)?;
    sql_query("CREATE INDEX asset_usages_dependency_index ON asset_usages (dependency_id)")
        .execute(conn)?;

    Ok(())
}
