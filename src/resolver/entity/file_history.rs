use super::PatchOperation;
use store::schema::histories;

#[derive(Debug, Queryable, Clone)]
pub struct FileHistory {
    pub id: i64,
    pub file_id: i64,
    pub operation: PatchOperation,
    pub modified: chrono::NaiveDateTime,
    pub user_id: i32,
    pub data: Option<String>,
}

#[derive(Insertable)]
#[table_name = "histories"]
pub struct InsertFull<'a> {
    pub file_id: i64,
    pub operation: PatchOperation,
    pub modified: &'a chrono::NaiveDateTime,
    pub user_id: i32,
    pub data: Option<&'a str>,
}
