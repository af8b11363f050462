use store::schema::users;

#[derive(Debug, Queryable, Clone)]
pub struct User {
    pub id: i32,
    pub username: String,
}

#[derive(Insertable)]
#[table_name = "users"]
pub struct InsertName<'a> {
    pub username: &'a str,
}
