//! Unit-of-work based object manager.
//!
//! # Responsibility
//! - Implement `ObjectManager` over any `ObjectStore`.
//! - Route every loaded row through the identity map.
//! - Translate pending work into one atomic store commit per flush.
//!
//! # Invariants
//! - A handle returned by this manager stays the managed instance for its
//!   identifier until it is detached or deleted.
//! - A failed flush leaves the persistence context untouched.

pub mod error;

use crate::config::{ManagerConfig, StorageLocation};
use crate::contract::ObjectManager;
use crate::event::{EventArgs, EventManager, LifecycleEvent};
use crate::logging::init_logging;
use crate::mapping::factory::ClassMetadataFactory;
use crate::mapping::metadata::ClassMetadata;
use crate::model::entity::Entity;
use crate::model::handle::{EntityState, Handle};
use crate::model::identifier::Identifier;
use crate::repository::criteria::{Criteria, SortOrder};
use crate::repository::entity_repo::EntityRepository;
use crate::store::sqlite::SqliteObjectStore;
use crate::store::{Document, ObjectStore};
use crate::unit_of_work::{EntityKey, EntryStatus, LoadedState, PlannedChange, UnitOfWork};
use error::{ManagerError, ManagerResult};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::rc::Rc;
use std::time::Instant;

/// Object manager owning one persistence context.
///
/// Not thread-safe: handles are reference counted and interior mutable.
pub struct EntityManager<S: ObjectStore = SqliteObjectStore> {
    store: S,
    metadata: ClassMetadataFactory,
    unit_of_work: UnitOfWork,
    events: EventManager,
}

impl EntityManager<SqliteObjectStore> {
    /// Builds a SQLite-backed manager from configuration.
    ///
    /// # Side effects
    /// - Initializes file logging when `config.logging` is set.
    /// - Creates and migrates the database file for file storage.
    pub fn open(config: &ManagerConfig) -> ManagerResult<Self> {
        config.validate()?;
        if let Some(logging) = &config.logging {
            init_logging(logging)?;
        }

        let options = config.db_options();
        let store = match &config.storage {
            StorageLocation::Memory => SqliteObjectStore::open_in_memory_with(&options)?,
            StorageLocation::File(path) => SqliteObjectStore::open_with(path, &options)?,
        };
        Ok(Self::new(store))
    }

    pub fn open_in_memory() -> ManagerResult<Self> {
        Ok(Self::new(SqliteObjectStore::open_in_memory()?))
    }
}

impl<S: ObjectStore> EntityManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            metadata: ClassMetadataFactory::new(),
            unit_of_work: UnitOfWork::default(),
            events: EventManager::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers `T` with the metadata factory and returns its metadata.
    ///
    /// Operations taking a `Handle<T>` register `T` on first use; explicit
    /// registration is only needed before looking metadata up by name.
    pub fn register<T: Entity>(&self) -> ManagerResult<Rc<ClassMetadata>> {
        Ok(self.metadata.metadata_for_type::<T>()?)
    }

    pub fn event_manager(&self) -> &EventManager {
        &self.events
    }

    pub fn event_manager_mut(&mut self) -> &mut EventManager {
        &mut self.events
    }

    /// Number of objects in the identity map, proxies included.
    pub fn managed_count(&self) -> usize {
        self.unit_of_work.len()
    }

    /// Whether the next flush would write anything.
    pub fn has_pending_changes(&self) -> ManagerResult<bool> {
        self.unit_of_work.has_pending_changes()
    }

    /// Lifecycle state of `object` relative to this manager.
    ///
    /// Unmanaged objects are `Detached` when a row with their identifier is
    /// stored and `New` otherwise.
    pub fn entity_state<T: Entity>(&self, object: &Handle<T>) -> ManagerResult<EntityState> {
        if let Some(key) = self.managed_key(object) {
            return Ok(match self.status_of(&key) {
                Some(EntryStatus::ScheduledDelete) => EntityState::Removed,
                _ => EntityState::Managed,
            });
        }
        match self.object_identifier(object)? {
            Some(identifier) if self.store.exists(T::CLASS_NAME, &identifier)? => {
                Ok(EntityState::Detached)
            }
            _ => Ok(EntityState::New),
        }
    }

    /// Returns a managed handle for `id` without touching the store.
    ///
    /// When the identifier is not managed yet, the handle is an uninitialized
    /// proxy; `initialize_object` or `find` loads its state.
    pub fn get_reference<T: Entity>(&mut self, id: impl Into<Identifier>) -> ManagerResult<Handle<T>> {
        self.register::<T>()?;
        let key = EntityKey::new(T::CLASS_NAME, id.into());
        if let Some(existing) = self.managed_handle::<T>(&key)? {
            return Ok(existing);
        }

        let proxy = Handle::proxy(key.identifier.clone());
        self.unit_of_work.register_proxy(key, proxy.erased());
        Ok(proxy)
    }

    pub(crate) fn load_by_identifier<T: Entity>(
        &mut self,
        identifier: Identifier,
    ) -> ManagerResult<Option<Handle<T>>> {
        self.register::<T>()?;
        let key = EntityKey::new(T::CLASS_NAME, identifier);

        match self.status_of(&key) {
            Some(EntryStatus::ScheduledDelete) => return Ok(None),
            Some(_) => {
                let Some(handle) = self.managed_handle::<T>(&key)? else {
                    return Ok(None);
                };
                if handle.is_initialized() {
                    return Ok(Some(handle));
                }
                return match self.store.load(&key.class_name, &key.identifier)? {
                    Some(document) => {
                        self.fill_from_document(&handle, &key, document)?;
                        Ok(Some(handle))
                    }
                    None => {
                        self.unit_of_work.forget(&key);
                        Ok(None)
                    }
                };
            }
            None => {}
        }

        match self.store.load(&key.class_name, &key.identifier)? {
            Some(document) => Ok(Some(self.hydrate_document::<T>(document)?)),
            None => Ok(None),
        }
    }

    /// Loads rows matching `criteria`, reusing managed handles.
    ///
    /// Identifier fields are appended to the ordering as a tie-break. Objects
    /// scheduled for removal are skipped before paging is applied.
    pub(crate) fn load_matching<T: Entity>(
        &mut self,
        criteria: &Criteria,
    ) -> ManagerResult<Vec<Handle<T>>> {
        let metadata = self.register::<T>()?;
        criteria.validate(&metadata)?;

        let mut query = criteria.clone();
        for field in metadata.identifier_field_names() {
            if !query.ordering.iter().any(|(name, _)| name == field) {
                query.ordering.push((field.clone(), SortOrder::Asc));
            }
        }
        let page_in_memory = self.unit_of_work.has_scheduled_deletes(T::CLASS_NAME);
        if page_in_memory {
            query.limit = None;
            query.offset = 0;
        }

        let documents = self.store.query(T::CLASS_NAME, &query)?;
        let mut handles = Vec::with_capacity(documents.len());
        for document in documents {
            let key = EntityKey::new(T::CLASS_NAME, document.identifier.clone());
            if self.status_of(&key) == Some(EntryStatus::ScheduledDelete) {
                continue;
            }
            handles.push(self.hydrate_document::<T>(document)?);
        }

        if page_in_memory {
            let limit = criteria.limit.map_or(usize::MAX, |limit| limit as usize);
            handles = handles
                .into_iter()
                .skip(criteria.offset as usize)
                .take(limit)
                .collect();
        }
        Ok(handles)
    }

    pub(crate) fn count_matching<T: Entity>(&self, criteria: &Criteria) -> ManagerResult<u64> {
        let metadata = self.register::<T>()?;
        criteria.validate(&metadata)?;
        Ok(self.store.count(T::CLASS_NAME, criteria)?)
    }

    /// Turns a stored row into a managed handle.
    ///
    /// An initialized managed object wins over the row, so local changes
    /// survive repeated lookups.
    fn hydrate_document<T: Entity>(&mut self, document: Document) -> ManagerResult<Handle<T>> {
        let key = EntityKey::new(T::CLASS_NAME, document.identifier.clone());
        if let Some(existing) = self.managed_handle::<T>(&key)? {
            if !existing.is_initialized() {
                self.fill_from_document(&existing, &key, document)?;
            }
            return Ok(existing);
        }

        let value: T = serde_json::from_value(document.data)?;
        let handle = Handle::new(value);
        let loaded = LoadedState {
            data: current_state(&handle)?,
            version: document.version,
        };
        self.unit_of_work
            .register_loaded(key.clone(), handle.erased(), loaded);
        self.dispatch_object(LifecycleEvent::PostLoad, &key);
        Ok(handle)
    }

    /// Overwrites a managed handle with a stored row.
    fn fill_from_document<T: Entity>(
        &mut self,
        handle: &Handle<T>,
        key: &EntityKey,
        document: Document,
    ) -> ManagerResult<()> {
        let value: T = serde_json::from_value(document.data)?;
        handle.replace(value)?;
        let loaded = LoadedState {
            data: current_state(handle)?,
            version: document.version,
        };
        self.unit_of_work.set_loaded(key, loaded);
        self.dispatch_object(LifecycleEvent::PostLoad, key);
        Ok(())
    }

    fn managed_key<T: Entity>(&self, object: &Handle<T>) -> Option<EntityKey> {
        self.unit_of_work.key_of(object.address()).cloned()
    }

    fn status_of(&self, key: &EntityKey) -> Option<EntryStatus> {
        self.unit_of_work.get(key).map(|entry| entry.status)
    }

    fn managed_handle<T: Entity>(&self, key: &EntityKey) -> ManagerResult<Option<Handle<T>>> {
        match self.unit_of_work.get(key) {
            None => Ok(None),
            Some(entry) => Handle::from_erased(Rc::clone(&entry.object))
                .map(Some)
                .ok_or_else(|| ManagerError::ClassMismatch {
                    class_name: key.class_name.clone(),
                }),
        }
    }

    /// Best-effort identifier of a possibly unmanaged object.
    fn object_identifier<T: Entity>(&self, object: &Handle<T>) -> ManagerResult<Option<Identifier>> {
        if let Some(identifier) = object.proxy_identifier() {
            return Ok(Some(identifier.clone()));
        }
        let metadata = self.register::<T>()?;
        Ok(match object.snapshot()? {
            Some(data) => metadata.identifier_of(&data).ok(),
            None => None,
        })
    }

    fn not_managed<T: Entity>(&self, object: &Handle<T>) -> ManagerError {
        ManagerError::NotManaged {
            class_name: T::CLASS_NAME.to_string(),
            identifier: self.object_identifier(object).ok().flatten(),
        }
    }

    fn dispatch_object(&self, event: LifecycleEvent, key: &EntityKey) {
        self.events
            .dispatch(&EventArgs::object(event, &key.class_name, &key.identifier));
    }
}

impl<S: ObjectStore> ObjectManager for EntityManager<S> {
    type Repository<'a, T: Entity> = EntityRepository<'a, T, S> where Self: 'a;

    fn find<T: Entity>(&mut self, id: impl Into<Identifier>) -> ManagerResult<Option<Handle<T>>> {
        self.load_by_identifier::<T>(id.into())
    }

    fn persist<T: Entity>(&mut self, object: &Handle<T>) -> ManagerResult<()> {
        let metadata = self.register::<T>()?;
        if let Some(key) = self.managed_key(object) {
            if self.status_of(&key) == Some(EntryStatus::ScheduledDelete) {
                self.unit_of_work.set_status(&key, EntryStatus::Persisted);
                debug!(
                    "event=persist module=manager status=ok action=cancel_remove class={}",
                    key.class_name
                );
            }
            return Ok(());
        }

        let data = current_state(object)?;
        metadata.validate_document(&data)?;
        let key = EntityKey::new(T::CLASS_NAME, metadata.identifier_of(&data)?);
        if self.unit_of_work.get(&key).is_some() {
            return Err(ManagerError::IdentityConflict {
                class_name: key.class_name,
                identifier: key.identifier,
            });
        }

        self.dispatch_object(LifecycleEvent::PrePersist, &key);
        self.unit_of_work.schedule_insert(key, object.erased());
        debug!(
            "event=persist module=manager status=ok action=schedule_insert class={}",
            T::CLASS_NAME
        );
        Ok(())
    }

    fn remove<T: Entity>(&mut self, object: &Handle<T>) -> ManagerResult<()> {
        let Some(key) = self.managed_key(object) else {
            return Err(self.not_managed(object));
        };

        match self.status_of(&key) {
            Some(EntryStatus::ScheduledInsert) => {
                self.unit_of_work.forget(&key);
                debug!(
                    "event=remove module=manager status=ok action=cancel_insert class={}",
                    key.class_name
                );
            }
            Some(EntryStatus::Persisted) => {
                self.dispatch_object(LifecycleEvent::PreRemove, &key);
                self.unit_of_work
                    .set_status(&key, EntryStatus::ScheduledDelete);
                debug!(
                    "event=remove module=manager status=ok action=schedule_delete class={}",
                    key.class_name
                );
            }
            Some(EntryStatus::ScheduledDelete) | None => {}
        }
        Ok(())
    }

    fn merge<T: Entity>(&mut self, object: &Handle<T>) -> ManagerResult<Handle<T>> {
        let metadata = self.register::<T>()?;
        if let Some(key) = self.managed_key(object) {
            if self.status_of(&key) == Some(EntryStatus::ScheduledDelete) {
                return Err(ManagerError::RemovedEntity {
                    class_name: key.class_name,
                    identifier: key.identifier,
                });
            }
            return Ok(object.clone());
        }

        let data = current_state(object)?;
        metadata.validate_document(&data)?;
        let identifier = metadata.identifier_of(&data)?;
        let key = EntityKey::new(T::CLASS_NAME, identifier.clone());
        if self.status_of(&key) == Some(EntryStatus::ScheduledDelete) {
            return Err(ManagerError::RemovedEntity {
                class_name: key.class_name,
                identifier: key.identifier,
            });
        }

        let value: T = serde_json::from_value(data)?;
        match self.load_by_identifier::<T>(identifier)? {
            Some(managed) => {
                managed.replace(value)?;
                Ok(managed)
            }
            None => {
                let copy = Handle::new(value);
                self.persist(&copy)?;
                Ok(copy)
            }
        }
    }

    fn clear(&mut self, class_name: Option<&str>) {
        let detached = self.unit_of_work.clear(class_name);
        self.events.dispatch(&EventArgs {
            event: LifecycleEvent::OnClear,
            class_name,
            identifier: None,
            changed_fields: &[],
        });
        info!(
            "event=clear module=manager status=ok scope={} detached={detached}",
            class_name.unwrap_or("all")
        );
    }

    fn detach<T: Entity>(&mut self, object: &Handle<T>) {
        if let Some(key) = self.managed_key(object) {
            self.unit_of_work.forget(&key);
        }
    }

    fn refresh<T: Entity>(&mut self, object: &Handle<T>) -> ManagerResult<()> {
        let Some(key) = self.managed_key(object) else {
            return Err(self.not_managed(object));
        };

        let Some(document) = self.store.load(&key.class_name, &key.identifier)? else {
            warn!(
                "event=refresh module=manager status=error class={} error=not_found",
                key.class_name
            );
            return Err(ManagerError::EntityNotFound {
                class_name: key.class_name,
                identifier: key.identifier,
            });
        };
        self.fill_from_document(object, &key, document)?;
        if self.status_of(&key) == Some(EntryStatus::ScheduledInsert) {
            self.unit_of_work.set_status(&key, EntryStatus::Persisted);
        }
        debug!(
            "event=refresh module=manager status=ok class={}",
            key.class_name
        );
        Ok(())
    }

    fn flush(&mut self) -> ManagerResult<()> {
        let started_at = Instant::now();
        self.events
            .dispatch(&EventArgs::manager(LifecycleEvent::PreFlush));

        let plan = match self.unit_of_work.plan_commit(&self.metadata) {
            Ok(plan) => plan,
            Err(err) => {
                warn!("event=flush module=manager status=error stage=plan error={err}");
                return Err(err);
            }
        };

        if plan.is_empty() {
            self.events
                .dispatch(&EventArgs::manager(LifecycleEvent::OnFlush));
            self.events
                .dispatch(&EventArgs::manager(LifecycleEvent::PostFlush));
            debug!("event=flush module=manager status=ok changes=0");
            return Ok(());
        }

        for change in &plan.changes {
            if let PlannedChange::Update {
                key,
                changed_fields,
                ..
            } = change
            {
                self.events.dispatch(
                    &EventArgs::object(LifecycleEvent::PreUpdate, &key.class_name, &key.identifier)
                        .with_changed_fields(changed_fields),
                );
            }
        }
        self.events
            .dispatch(&EventArgs::manager(LifecycleEvent::OnFlush));

        if let Err(err) = self.store.commit(&plan.to_batch()) {
            error!(
                "event=flush module=manager status=error stage=commit duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            return Err(err.into());
        }
        self.unit_of_work.apply_commit(&plan);

        let no_fields: &[String] = &[];
        for change in &plan.changes {
            let (event, fields) = match change {
                PlannedChange::Insert { .. } => (LifecycleEvent::PostPersist, no_fields),
                PlannedChange::Update { changed_fields, .. } => {
                    (LifecycleEvent::PostUpdate, changed_fields.as_slice())
                }
                PlannedChange::Delete { .. } => (LifecycleEvent::PostRemove, no_fields),
            };
            let key = change.key();
            self.events.dispatch(
                &EventArgs::object(event, &key.class_name, &key.identifier)
                    .with_changed_fields(fields),
            );
        }
        self.events
            .dispatch(&EventArgs::manager(LifecycleEvent::PostFlush));

        let (inserts, updates, deletes) = plan.count();
        info!(
            "event=flush module=manager status=ok inserts={inserts} updates={updates} deletes={deletes} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn get_repository<T: Entity>(&mut self) -> ManagerResult<Self::Repository<'_, T>> {
        self.register::<T>()?;
        Ok(EntityRepository::new(self))
    }

    fn get_class_metadata(&self, class_name: &str) -> ManagerResult<Rc<ClassMetadata>> {
        Ok(self.metadata.metadata_for(class_name)?)
    }

    fn metadata_factory(&self) -> &ClassMetadataFactory {
        &self.metadata
    }

    fn initialize_object<T: Entity>(&mut self, object: &Handle<T>) -> ManagerResult<()> {
        if object.is_initialized() {
            return Ok(());
        }
        self.register::<T>()?;

        let managed = self.managed_key(object);
        let key = match (&managed, object.proxy_identifier()) {
            (Some(key), _) => key.clone(),
            (None, Some(identifier)) => EntityKey::new(T::CLASS_NAME, identifier.clone()),
            (None, None) => {
                return Err(ManagerError::UninitializedProxy {
                    class_name: T::CLASS_NAME.to_string(),
                    identifier: None,
                })
            }
        };

        let Some(document) = self.store.load(&key.class_name, &key.identifier)? else {
            return Err(ManagerError::EntityNotFound {
                class_name: key.class_name,
                identifier: key.identifier,
            });
        };
        if managed.is_some() {
            self.fill_from_document(object, &key, document)
        } else {
            let value: T = serde_json::from_value(document.data)?;
            object.replace(value)
        }
    }

    fn contains<T: Entity>(&self, object: &Handle<T>) -> bool {
        self.managed_key(object).is_some_and(|key| {
            matches!(
                self.status_of(&key),
                Some(EntryStatus::ScheduledInsert | EntryStatus::Persisted)
            )
        })
    }
}

/// Serialized state of an initialized handle.
fn current_state<T: Entity>(object: &Handle<T>) -> ManagerResult<Value> {
    object
        .snapshot()?
        .ok_or_else(|| ManagerError::UninitializedProxy {
            class_name: T::CLASS_NAME.to_string(),
            identifier: object.proxy_identifier().cloned(),
        })
}
