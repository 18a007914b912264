use thiserror::Error;

use crate::construct::{EntityId, TxId};

// ------------- Storage -------------
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Data corruption: {0}")]
    Corrupt(String),
    // a timed out write may or may not have been applied
    #[error("Storage operation timed out: {0}")]
    Timeout(String),
    #[error("Commit marker conflict: expected {expected:?} to be durable, found {found:?}")]
    Conflict {
        expected: Option<TxId>,
        found: Option<TxId>,
    },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Only writes have an ambiguous outcome. A read that timed out is simply
    /// unavailable.
    pub fn for_read(self) -> Self {
        match self {
            Self::Timeout(msg) => Self::Unavailable(msg),
            other => other,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Timeout(e.to_string())
            }
            rusqlite::Error::SqliteFailure(ref code, _)
                if code.code == rusqlite::ErrorCode::DatabaseCorrupt =>
            {
                Self::Corrupt(e.to_string())
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..) => Self::Corrupt(e.to_string()),
            _ => Self::Unavailable(e.to_string()),
        }
    }
}

// ------------- Connection -------------
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Connection unavailable: {0}")]
    Unavailable(String),
    #[error("Unknown t {requested}, latest committed is {latest}")]
    UnknownT { requested: TxId, latest: TxId },
    #[error("Data corruption: {0}")]
    Corrupt(String),
    #[error("Config error: {0}")]
    Config(String),
}

pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

impl From<StorageError> for ConnectionError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Corrupt(msg) => Self::Corrupt(msg),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for ConnectionError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

// ------------- Query -------------
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Data corruption: {0}")]
    Corrupt(String),
    #[error("Unresolved entity reference: {0}")]
    UnresolvedEntity(String),
    #[error("Value of entity {entity} attribute {attribute} is not a {expected}")]
    TypeMismatch {
        entity: EntityId,
        attribute: EntityId,
        expected: &'static str,
    },
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

impl From<StorageError> for QueryError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Corrupt(msg) => Self::Corrupt(msg),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<QueryError> for ConnectionError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Corrupt(msg) => Self::Corrupt(msg),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

// ------------- Transaction -------------
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Conflicting operations: {0}")]
    ConflictingOps(String),
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Storage failure: {0}")]
    StorageFailure(String),
    #[error("Write conflict: reserved t {reserved} but storage is at {found:?}")]
    WriteConflict { reserved: TxId, found: Option<TxId> },
}

pub type TxResult<T> = std::result::Result<T, TransactionError>;

// reads performed while staging
impl From<QueryError> for TransactionError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::UnresolvedEntity(msg) => Self::ValidationFailed(msg),
            QueryError::TypeMismatch { .. } => Self::ValidationFailed(e.to_string()),
            other => Self::StorageFailure(other.to_string()),
        }
    }
}

impl From<StorageError> for TransactionError {
    fn from(e: StorageError) -> Self {
        Self::StorageFailure(e.to_string())
    }
}

// ------------- Notation -------------
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotationError {
    #[error("Malformed fact notation: {0}")]
    Malformed(String),
    #[error("Non-finite floats have no notation")]
    NonFinite,
}
