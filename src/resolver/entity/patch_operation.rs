use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::*;
use std::io::Write;

/// The kinds of identity mutation recorded in the history ledger.
/// Obliterate is internal only: it marks the hard retirement of a record
/// whose path was taken over by a newer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromSqlRow, AsExpression)]
#[sql_type = "Text"]
pub enum PatchOperation {
    Insert,
    Update,
    Delete,
    Restore,
    Branch,
    Obliterate,
}

impl PatchOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert => "Insert",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Restore => "Restore",
            Self::Branch => "Branch",
            Self::Obliterate => "Obliterate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Insert" => Some(Self::Insert),
            "Update" => Some(Self::Update),
            "Delete" => Some(Self::Delete),
            "Restore" => Some(Self::Restore),
            "Branch" => Some(Self::Branch),
            "Obliterate" => Some(Self::Obliterate),
            _ => None,
        }
    }
}

impl<DB> FromSql<Text, DB> for PatchOperation
where
    DB: Backend,
    String: FromSql<Text, DB>,
{
    fn from_sql(bytes: Option<&DB::RawValue>) -> deserialize::Result<Self> {
        let name = String::from_sql(bytes)?;
        Self::from_name(&name).ok_or_else(|| format!("Unrecognized operation '{}'", name).into())
    }
}

impl<DB> ToSql<Text, DB> for PatchOperation
where
    DB: Backend,
    str: ToSql<Text, DB>,
{
    fn to_sql<W: Write>(&self, out: &mut Output<W, DB>) -> serialize::Result {
        self.name().to_sql(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_names_round_trip() {
        let all = [
            PatchOperation::Insert,
            PatchOperation::Update,
            PatchOperation::Delete,
            PatchOperation::Restore,
            PatchOperation::Branch,
            PatchOperation::Obliterate,
        ];

        for operation in all.iter() {
            assert_eq!(PatchOperation::from_name(operation.name()), Some(*operation));
        }

        assert_eq!(PatchOperation::from_name("Vandalize"), None);
    }
}
