//! Object persistence manager.
//!
//! Entities are plain serde types mapped through `ClassMetadata`; an
//! `EntityManager` tracks them in a unit of work and writes every pending
//! change to an `ObjectStore` on `flush`.

pub mod config;
pub mod contract;
pub mod db;
pub mod event;
pub mod logging;
pub mod manager;
pub mod mapping;
pub mod model;
pub mod repository;
pub mod store;
mod unit_of_work;

pub use config::{ConfigError, LogLevel, LoggingConfig, ManagerConfig, StorageLocation};
pub use contract::{ObjectManager, ObjectRepository};
pub use db::{DbError, DbOptions, DbResult};
pub use event::{EventArgs, EventError, EventManager, LifecycleEvent, LifecycleListener};
pub use logging::{active_logging, init_logging, LoggingError};
pub use manager::error::{ManagerError, ManagerResult};
pub use manager::EntityManager;
pub use mapping::factory::ClassMetadataFactory;
pub use mapping::metadata::{
    AssociationKind, AssociationMapping, ClassMetadata, ClassMetadataBuilder, FieldMapping,
    FieldType, MappingError,
};
pub use model::entity::Entity;
pub use model::handle::{EntityState, Handle};
pub use model::identifier::Identifier;
pub use repository::criteria::{Criteria, CriteriaError, SortOrder};
pub use repository::entity_repo::EntityRepository;
pub use store::sqlite::SqliteObjectStore;
pub use store::{ChangeBatch, Document, ObjectStore, StoreError, StoreOperation, StoreResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
