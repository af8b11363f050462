use store::schema::handled_events;

#[derive(Debug, Queryable, Clone)]
pub struct HandledEvent {
    pub id: i64,
    pub created: chrono::NaiveDateTime,
    pub username: String,
}

#[derive(Insertable)]
#[table_name = "handled_events"]
pub struct InsertFull<'a> {
    pub id: i64,
    pub created: &'a chrono::NaiveDateTime,
    pub username: &'a str,
}
