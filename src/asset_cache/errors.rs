use store::StoreError;

use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum CacheDBError {
    StoreUnavailable {
        source: StoreError,
    },
    NotFound,
    // A traversal or re-index observed the cooperative cancellation flag
    // and unwound before completing. Not a failure, the store is left in
    // the state of the last fully committed statement.
    Cancelled,
    GenericSQLError {
        source: diesel::result::Error,
    },
}
pub type Result<T> = std::result::Result<T, CacheDBError>;

// Error Boilerplate (Error display, conversion and source)
impl fmt::Display for CacheDBError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error During Asset Cache Interaction({:?})", self)
    }
}
impl From<StoreError> for CacheDBError {
    fn from(error: StoreError) -> Self {
        Self::StoreUnavailable { source: error }
    }
}
impl From<diesel::result::Error> for CacheDBError {
    fn from(error: diesel::result::Error) -> Self {
        match error {
            diesel::result::Error::NotFound => Self::NotFound,
            error => Self::GenericSQLError { source: error },
        }
    }
}
impl Error for CacheDBError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable { ref source } => Some(source),
            Self::NotFound => None,
            Self::Cancelled => None,
            Self::GenericSQLError { ref source } => Some(source),
        }
    }
}
