use store::schema::file_id_lookups;

/// Resolves a duplicate identifier (minted offline for a path that already
/// had a canonical record) to the identifier of record.
#[derive(Debug, Queryable, Clone)]
pub struct FileIdLookup {
    pub duplicate_file_id: i64,
    pub existing_file_id: i64,
}

#[derive(Insertable)]
#[table_name = "file_id_lookups"]
pub struct InsertFull {
    pub duplicate_file_id: i64,
    pub existing_file_id: i64,
}
