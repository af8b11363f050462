use store::schema::files;
use tuid::Tuid;

/// The canonical record of one managed file: its identifier, its current
/// path and its soft-delete state.
#[derive(Debug, Queryable, Clone)]
pub struct ManagedFile {
    pub id: i64,
    pub path: String,
    pub created: chrono::NaiveDateTime,
    pub modified: chrono::NaiveDateTime,
    pub user_id: i32,
    pub was_deleted: bool,
}

impl ManagedFile {
    pub fn file_id(&self) -> Tuid {
        self.id as Tuid
    }
}

#[derive(Insertable)]
#[table_name = "files"]
pub struct InsertFull<'a> {
    pub id: i64,
    pub path: &'a str,
    pub created: &'a chrono::NaiveDateTime,
    pub modified: &'a chrono::NaiveDateTime,
    pub user_id: i32,
    pub was_deleted: bool,
}
