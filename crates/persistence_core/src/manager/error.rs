//! Object manager errors.

use crate::config::ConfigError;
use crate::logging::LoggingError;
use crate::mapping::metadata::MappingError;
use crate::model::identifier::Identifier;
use crate::repository::criteria::CriteriaError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors surfaced by `ObjectManager` and `ObjectRepository` operations.
#[derive(Debug)]
pub enum ManagerError {
    Mapping(MappingError),
    Store(StoreError),
    Serialization(serde_json::Error),
    InvalidCriteria(CriteriaError),
    Config(ConfigError),
    Logging(LoggingError),
    /// The object is not tracked by this manager.
    NotManaged {
        class_name: String,
        identifier: Option<Identifier>,
    },
    EntityNotFound {
        class_name: String,
        identifier: Identifier,
    },
    /// Another object with the same identifier is already managed.
    IdentityConflict {
        class_name: String,
        identifier: Identifier,
    },
    /// A row with the identifier already exists in the store.
    DuplicateIdentifier {
        class_name: String,
        identifier: Identifier,
    },
    IdentifierChanged {
        class_name: String,
        original: Identifier,
        current: Identifier,
    },
    /// The managed counterpart is scheduled for removal.
    RemovedEntity {
        class_name: String,
        identifier: Identifier,
    },
    /// The stored row changed since it was loaded.
    OptimisticLock {
        class_name: String,
        identifier: Identifier,
    },
    /// The identity map holds a different Rust type under this class name.
    ClassMismatch { class_name: String },
    /// A proxy that was never loaded cannot be persisted or merged.
    UninitializedProxy {
        class_name: String,
        identifier: Option<Identifier>,
    },
    /// The object is borrowed by the caller while the manager needs it.
    ObjectBorrowed { class_name: String },
}

impl Display for ManagerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mapping(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "object serialization failed: {err}"),
            Self::InvalidCriteria(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Logging(err) => write!(f, "{err}"),
            Self::NotManaged {
                class_name,
                identifier,
            } => match identifier {
                Some(id) => write!(f, "{class_name}#{id} is not managed"),
                None => write!(f, "{class_name} object is not managed"),
            },
            Self::EntityNotFound {
                class_name,
                identifier,
            } => write!(f, "{class_name}#{identifier} not found"),
            Self::IdentityConflict {
                class_name,
                identifier,
            } => write!(
                f,
                "another {class_name} object with identifier {identifier} is already managed"
            ),
            Self::DuplicateIdentifier {
                class_name,
                identifier,
            } => write!(f, "{class_name}#{identifier} already exists"),
            Self::IdentifierChanged {
                class_name,
                original,
                current,
            } => write!(
                f,
                "identifier of managed {class_name}#{original} changed to {current}"
            ),
            Self::RemovedEntity {
                class_name,
                identifier,
            } => write!(f, "{class_name}#{identifier} is scheduled for removal"),
            Self::OptimisticLock {
                class_name,
                identifier,
            } => write!(
                f,
                "{class_name}#{identifier} was modified by another writer since it was loaded"
            ),
            Self::ClassMismatch { class_name } => write!(
                f,
                "identity map entry for {class_name} belongs to a different type"
            ),
            Self::UninitializedProxy {
                class_name,
                identifier,
            } => match identifier {
                Some(id) => write!(f, "{class_name}#{id} proxy is not initialized"),
                None => write!(f, "{class_name} proxy is not initialized"),
            },
            Self::ObjectBorrowed { class_name } => {
                write!(f, "{class_name} object is borrowed by the caller")
            }
        }
    }
}

impl Error for ManagerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Mapping(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::InvalidCriteria(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Logging(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MappingError> for ManagerError {
    fn from(value: MappingError) -> Self {
        Self::Mapping(value)
    }
}

impl From<ConfigError> for ManagerError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LoggingError> for ManagerError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<CriteriaError> for ManagerError {
    fn from(value: CriteriaError) -> Self {
        Self::InvalidCriteria(value)
    }
}

impl From<serde_json::Error> for ManagerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Store conflicts map onto manager-level semantics.
impl From<StoreError> for ManagerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::StaleVersion {
                class_name,
                identifier,
                ..
            } => Self::OptimisticLock {
                class_name,
                identifier,
            },
            StoreError::DuplicateKey {
                class_name,
                identifier,
            } => Self::DuplicateIdentifier {
                class_name,
                identifier,
            },
            StoreError::NotFound {
                class_name,
                identifier,
            } => Self::EntityNotFound {
                class_name,
                identifier,
            },
            other => Self::Store(other),
        }
    }
}
