//! Document storage contract behind the object manager.
//!
//! # Responsibility
//! - Load and query serialized objects by class and identifier.
//! - Apply one flush worth of writes atomically.
//!
//! # Invariants
//! - `commit` applies every operation of a batch or none of them.
//! - Inserted rows start at version 1; every update increments the version.
//! - Updates and versioned deletes only touch rows whose version matches.

use crate::db::DbError;
use crate::model::identifier::Identifier;
use crate::repository::criteria::Criteria;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod sqlite;

pub type StoreResult<T> = Result<T, StoreError>;

/// One persisted object.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub class_name: String,
    pub identifier: Identifier,
    pub data: Value,
    pub version: i64,
}

/// One write inside a `ChangeBatch`.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOperation {
    Insert {
        class_name: String,
        identifier: Identifier,
        data: Value,
    },
    Update {
        class_name: String,
        identifier: Identifier,
        data: Value,
        expected_version: i64,
    },
    /// `expected_version` is `None` when the object was never loaded.
    Delete {
        class_name: String,
        identifier: Identifier,
        expected_version: Option<i64>,
    },
}

/// Ordered writes committed together by `ObjectStore::commit`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    pub operations: Vec<StoreOperation>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

/// Backing store for managed objects.
pub trait ObjectStore {
    /// Loads one document, `None` when absent.
    fn load(&self, class_name: &str, identifier: &Identifier) -> StoreResult<Option<Document>>;

    fn exists(&self, class_name: &str, identifier: &Identifier) -> StoreResult<bool> {
        self.load(class_name, identifier)
            .map(|document| document.is_some())
    }

    /// Documents of `class_name` matching `criteria`, in criteria order.
    fn query(&self, class_name: &str, criteria: &Criteria) -> StoreResult<Vec<Document>>;

    /// Number of documents matching the filters; ordering and paging are ignored.
    fn count(&self, class_name: &str, criteria: &Criteria) -> StoreResult<u64>;

    /// Applies all operations in order, atomically.
    fn commit(&mut self, batch: &ChangeBatch) -> StoreResult<()>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for Box<S> {
    fn load(&self, class_name: &str, identifier: &Identifier) -> StoreResult<Option<Document>> {
        (**self).load(class_name, identifier)
    }

    fn exists(&self, class_name: &str, identifier: &Identifier) -> StoreResult<bool> {
        (**self).exists(class_name, identifier)
    }

    fn query(&self, class_name: &str, criteria: &Criteria) -> StoreResult<Vec<Document>> {
        (**self).query(class_name, criteria)
    }

    fn count(&self, class_name: &str, criteria: &Criteria) -> StoreResult<u64> {
        (**self).count(class_name, criteria)
    }

    fn commit(&mut self, batch: &ChangeBatch) -> StoreResult<()> {
        (**self).commit(batch)
    }
}

/// Storage errors.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    DuplicateKey {
        class_name: String,
        identifier: Identifier,
    },
    /// Row version differs from the one the writer loaded.
    StaleVersion {
        class_name: String,
        identifier: Identifier,
        expected_version: Option<i64>,
    },
    NotFound {
        class_name: String,
        identifier: Identifier,
    },
    /// Persisted data cannot be decoded.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{table}.{column}` is missing")
            }
            Self::DuplicateKey {
                class_name,
                identifier,
            } => write!(f, "{class_name}#{identifier} is already stored"),
            Self::StaleVersion {
                class_name,
                identifier,
                expected_version,
            } => match expected_version {
                Some(version) => write!(
                    f,
                    "{class_name}#{identifier} changed since version {version} was loaded"
                ),
                None => write!(f, "{class_name}#{identifier} changed concurrently"),
            },
            Self::NotFound {
                class_name,
                identifier,
            } => write!(f, "{class_name}#{identifier} is not stored"),
            Self::InvalidData(message) => write!(f, "invalid persisted object data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
