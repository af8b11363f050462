use store::StoreError;
use tuid::Tuid;

use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum ResolverError {
    StoreUnavailable {
        source: StoreError,
    },
    // Two different files claim the same identifier. Surfaced to the caller
    // instead of being patched over, a human has to decide.
    DuplicateEntry {
        existing_id: Tuid,
        path: String,
    },
    NotFound,
    // A stored history row could not be parsed back into a known operation.
    BadHistoryRecord {
        source: Box<dyn Error + Send + Sync>,
    },
    GenericSQLError {
        source: diesel::result::Error,
    },
}
pub type Result<T> = std::result::Result<T, ResolverError>;

// Error Boilerplate (Error display, conversion and source)
impl fmt::Display for ResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error During Resolver Interaction({:?})", self)
    }
}
impl From<StoreError> for ResolverError {
    fn from(error: StoreError) -> Self {
        Self::StoreUnavailable { source: error }
    }
}
impl From<diesel::result::Error> for ResolverError {
    fn from(error: diesel::result::Error) -> Self {
        match error {
            diesel::result::Error::NotFound => Self::NotFound,
            diesel::result::Error::DeserializationError(source) => {
                Self::BadHistoryRecord { source }
            }
            error => Self::GenericSQLError { source: error },
        }
    }
}
impl Error for ResolverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable { ref source } => Some(source),
            Self::DuplicateEntry { .. } => None,
            Self::NotFound => None,
            Self::BadHistoryRecord { ref source } => Some(source.as_ref()),
            Self::GenericSQLError { ref source } => Some(source),
        }
    }
}
