//! Object manager and repository contracts.
//!
//! # Responsibility
//! - Define the public persistence API independent of storage.
//!
//! # Invariants
//! - Writes requested through `persist`/`remove` or made on managed handles
//!   reach storage only on `flush`.
//! - Within one manager, an identifier resolves to at most one handle.

use crate::manager::error::ManagerResult;
use crate::mapping::factory::ClassMetadataFactory;
use crate::mapping::metadata::ClassMetadata;
use crate::model::entity::Entity;
use crate::model::handle::Handle;
use crate::model::identifier::Identifier;
use crate::repository::criteria::Criteria;
use std::rc::Rc;

/// Persistence manager for entity objects.
pub trait ObjectManager {
    /// Repository type returned by `get_repository`.
    type Repository<'a, T: Entity>: ObjectRepository<T>
    where
        Self: 'a;

    /// Finds an object by identifier.
    ///
    /// # Contract
    /// - Returns the already managed handle when the identifier is in the
    ///   identity map.
    /// - Returns `None` when no row exists or the object is scheduled for
    ///   removal.
    fn find<T: Entity>(&mut self, id: impl Into<Identifier>) -> ManagerResult<Option<Handle<T>>>;

    /// Makes an object managed and schedules its insertion.
    ///
    /// # Contract
    /// - No-op for managed objects.
    /// - Cancels a pending removal.
    /// - An object the manager does not track is always treated as new.
    fn persist<T: Entity>(&mut self, object: &Handle<T>) -> ManagerResult<()>;

    /// Schedules a managed object for deletion at the next flush.
    ///
    /// # Contract
    /// - An object still waiting for insertion is just untracked.
    /// - Fails with `NotManaged` for objects the manager does not track.
    fn remove<T: Entity>(&mut self, object: &Handle<T>) -> ManagerResult<()>;

    /// Copies the state of `object` onto the managed object with the same
    /// identifier and returns the managed handle.
    ///
    /// # Contract
    /// - Loads the managed object when needed; persists a copy when no row
    ///   exists.
    /// - `object` itself does not become managed.
    /// - Fails with `RemovedEntity` when the target is scheduled for removal.
    #[deprecated(note = "copy state onto a handle returned by `find` instead")]
    fn merge<T: Entity>(&mut self, object: &Handle<T>) -> ManagerResult<Handle<T>>;

    /// Detaches all objects, or only objects of `class_name`.
    ///
    /// Pending work of detached objects is discarded.
    fn clear(&mut self, class_name: Option<&str>);

    /// Stops tracking one object and discards its pending work.
    ///
    /// No-op for unmanaged objects.
    #[deprecated(note = "use `clear` with the class name instead")]
    fn detach<T: Entity>(&mut self, object: &Handle<T>);

    /// Overwrites a managed object with its persisted state.
    ///
    /// # Contract
    /// - Fails with `NotManaged` for objects the manager does not track.
    /// - Fails with `EntityNotFound` when no persisted row exists.
    fn refresh<T: Entity>(&mut self, object: &Handle<T>) -> ManagerResult<()>;

    /// Writes all pending inserts, updates and deletes in one transaction.
    ///
    /// On failure nothing is written and pending work is kept.
    fn flush(&mut self) -> ManagerResult<()>;

    fn get_repository<T: Entity>(&mut self) -> ManagerResult<Self::Repository<'_, T>>;

    /// Metadata of a class the manager knows about.
    fn get_class_metadata(&self, class_name: &str) -> ManagerResult<Rc<ClassMetadata>>;

    fn metadata_factory(&self) -> &ClassMetadataFactory;

    /// Loads the state of an uninitialized proxy. No-op for loaded objects.
    fn initialize_object<T: Entity>(&mut self, object: &Handle<T>) -> ManagerResult<()>;

    /// Whether `object` is managed and not scheduled for removal.
    fn contains<T: Entity>(&self, object: &Handle<T>) -> bool;
}

/// Lookup API scoped to one entity class.
///
/// Results pass through the owning manager's identity map.
pub trait ObjectRepository<T: Entity> {
    fn find(&mut self, id: impl Into<Identifier>) -> ManagerResult<Option<Handle<T>>>;

    fn find_all(&mut self) -> ManagerResult<Vec<Handle<T>>>;

    /// Stored objects matching `criteria`, skipping objects scheduled for
    /// removal.
    fn find_by(&mut self, criteria: &Criteria) -> ManagerResult<Vec<Handle<T>>>;

    fn find_one_by(&mut self, criteria: &Criteria) -> ManagerResult<Option<Handle<T>>>;

    /// Number of persisted rows matching the filters of `criteria`.
    ///
    /// # Contract
    /// - Counts stored rows only: pending inserts are not counted, and rows
    ///   of objects scheduled for removal are counted until the next flush.
    ///   The result can therefore differ from `find_by(..).len()`.
    /// - `limit` and `offset` are ignored.
    fn count(&mut self, criteria: &Criteria) -> ManagerResult<u64>;

    fn class_name(&self) -> &'static str;
}
