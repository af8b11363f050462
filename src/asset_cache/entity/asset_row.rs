use store::schema::assets;
use tuid::Tuid;

/// One row of the assets table. `id` is the local rowid dependency edges
/// reference, `file_id` is the stable identifier.
#[derive(Debug, Queryable, Clone)]
pub struct AssetRow {
    pub id: i64,

    pub file_id: i64,
    pub path: String,
    pub name: String,

    pub file_type_id: i64,
    pub engine_type_id: i64,
    pub rcs_user_id: i64,
    pub rcs_revision: i64,
    pub size: i64,

    pub last_updated: chrono::NaiveDateTime,
}

impl AssetRow {
    pub fn asset_id(&self) -> Tuid {
        self.file_id as Tuid
    }
}

#[derive(Insertable)]
#[table_name = "assets"]
pub struct InsertFull<'a> {
    pub file_id: i64,
    pub path: &'a str,
    pub name: &'a str,

    pub file_type_id: i64,
    pub engine_type_id: i64,
    pub rcs_user_id: i64,
    pub rcs_revision: i64,
    pub size: i64,

    pub last_updated: &'a chrono::NaiveDateTime,
}
