//! Persistence context of one manager.
//!
//! # Responsibility
//! - Keep the identity map of managed objects.
//! - Track scheduled inserts and deletes plus the last persisted state of
//!   every loaded object.
//! - Turn pending work into one ordered `ChangeBatch` and fold a successful
//!   commit back into the tracked state.
//!
//! # Invariants
//! - One `(class, identifier)` key maps to at most one object, and one object
//!   to at most one key.
//! - Planning never mutates tracked state; only `apply_commit` does.

pub(crate) mod changeset;
pub(crate) mod commit_order;

use crate::manager::error::{ManagerError, ManagerResult};
use crate::mapping::factory::ClassMetadataFactory;
use crate::mapping::metadata::ClassMetadata;
use crate::model::handle::ManagedObject;
use crate::model::identifier::Identifier;
use crate::store::{ChangeBatch, StoreOperation};
use changeset::changed_fields;
use commit_order::commit_order;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Identity map key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct EntityKey {
    pub class_name: String,
    pub identifier: Identifier,
}

impl EntityKey {
    pub(crate) fn new(class_name: impl Into<String>, identifier: Identifier) -> Self {
        Self {
            class_name: class_name.into(),
            identifier,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryStatus {
    ScheduledInsert,
    Persisted,
    ScheduledDelete,
}

/// State last read from or written to the store.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LoadedState {
    pub data: Value,
    pub version: i64,
}

pub(crate) struct ManagedEntry {
    pub object: Rc<dyn ManagedObject>,
    pub status: EntryStatus,
    /// `None` for scheduled inserts and for proxies that were never loaded.
    pub loaded: Option<LoadedState>,
    sequence: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PlannedChange {
    Insert {
        key: EntityKey,
        data: Value,
    },
    Update {
        key: EntityKey,
        data: Value,
        version: i64,
        changed_fields: Vec<String>,
    },
    Delete {
        key: EntityKey,
        version: Option<i64>,
    },
}

impl PlannedChange {
    pub(crate) fn key(&self) -> &EntityKey {
        match self {
            Self::Insert { key, .. } | Self::Update { key, .. } | Self::Delete { key, .. } => key,
        }
    }

    fn to_operation(&self) -> StoreOperation {
        match self {
            Self::Insert { key, data } => StoreOperation::Insert {
                class_name: key.class_name.clone(),
                identifier: key.identifier.clone(),
                data: data.clone(),
            },
            Self::Update {
                key, data, version, ..
            } => StoreOperation::Update {
                class_name: key.class_name.clone(),
                identifier: key.identifier.clone(),
                data: data.clone(),
                expected_version: *version,
            },
            Self::Delete { key, version } => StoreOperation::Delete {
                class_name: key.class_name.clone(),
                identifier: key.identifier.clone(),
                expected_version: *version,
            },
        }
    }
}

/// Ordered writes of one flush: inserts, then updates, then deletes.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CommitPlan {
    pub changes: Vec<PlannedChange>,
}

impl CommitPlan {
    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub(crate) fn to_batch(&self) -> ChangeBatch {
        ChangeBatch {
            operations: self
                .changes
                .iter()
                .map(PlannedChange::to_operation)
                .collect(),
        }
    }

    pub(crate) fn count(&self) -> (usize, usize, usize) {
        self.changes
            .iter()
            .fold((0, 0, 0), |(inserts, updates, deletes), change| match change {
                PlannedChange::Insert { .. } => (inserts + 1, updates, deletes),
                PlannedChange::Update { .. } => (inserts, updates + 1, deletes),
                PlannedChange::Delete { .. } => (inserts, updates, deletes + 1),
            })
    }
}

#[derive(Default)]
pub(crate) struct UnitOfWork {
    entries: BTreeMap<EntityKey, ManagedEntry>,
    addresses: HashMap<usize, EntityKey>,
    next_sequence: u64,
}

pub(crate) fn object_address(object: &Rc<dyn ManagedObject>) -> usize {
    Rc::as_ptr(object) as *const () as usize
}

impl UnitOfWork {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get(&self, key: &EntityKey) -> Option<&ManagedEntry> {
        self.entries.get(key)
    }

    pub(crate) fn key_of(&self, address: usize) -> Option<&EntityKey> {
        self.addresses.get(&address)
    }

    /// Tracks an object whose state was just read from the store.
    pub(crate) fn register_loaded(
        &mut self,
        key: EntityKey,
        object: Rc<dyn ManagedObject>,
        loaded: LoadedState,
    ) {
        self.register(key, object, EntryStatus::Persisted, Some(loaded));
    }

    /// Tracks an uninitialized proxy.
    pub(crate) fn register_proxy(&mut self, key: EntityKey, object: Rc<dyn ManagedObject>) {
        self.register(key, object, EntryStatus::Persisted, None);
    }

    pub(crate) fn schedule_insert(&mut self, key: EntityKey, object: Rc<dyn ManagedObject>) {
        self.register(key, object, EntryStatus::ScheduledInsert, None);
    }

    fn register(
        &mut self,
        key: EntityKey,
        object: Rc<dyn ManagedObject>,
        status: EntryStatus,
        loaded: Option<LoadedState>,
    ) {
        self.forget(&key);
        self.next_sequence += 1;
        self.addresses.insert(object_address(&object), key.clone());
        self.entries.insert(
            key,
            ManagedEntry {
                object,
                status,
                loaded,
                sequence: self.next_sequence,
            },
        );
    }

    pub(crate) fn set_status(&mut self, key: &EntityKey, status: EntryStatus) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.status = status;
        }
    }

    pub(crate) fn set_loaded(&mut self, key: &EntityKey, loaded: LoadedState) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.loaded = Some(loaded);
        }
    }

    /// Stops tracking `key`, dropping any pending work for it.
    pub(crate) fn forget(&mut self, key: &EntityKey) -> Option<ManagedEntry> {
        let entry = self.entries.remove(key)?;
        self.addresses.remove(&object_address(&entry.object));
        Some(entry)
    }

    /// Detaches every object, or only those of `class_name`. Returns how many
    /// objects were detached.
    pub(crate) fn clear(&mut self, class_name: Option<&str>) -> usize {
        match class_name {
            None => {
                let detached = self.entries.len();
                self.entries.clear();
                self.addresses.clear();
                detached
            }
            Some(class_name) => {
                let keys: Vec<EntityKey> = self
                    .entries
                    .keys()
                    .filter(|key| key.class_name == class_name)
                    .cloned()
                    .collect();
                for key in &keys {
                    self.forget(key);
                }
                keys.len()
            }
        }
    }

    pub(crate) fn has_scheduled_deletes(&self, class_name: &str) -> bool {
        self.entries.iter().any(|(key, entry)| {
            key.class_name == class_name && entry.status == EntryStatus::ScheduledDelete
        })
    }

    /// Whether a flush would write anything.
    pub(crate) fn has_pending_changes(&self) -> ManagerResult<bool> {
        for entry in self.entries.values() {
            match entry.status {
                EntryStatus::ScheduledInsert | EntryStatus::ScheduledDelete => return Ok(true),
                EntryStatus::Persisted => {
                    if let (Some(current), Some(loaded)) =
                        (entry.object.snapshot()?, entry.loaded.as_ref())
                    {
                        if current != loaded.data {
                            return Ok(true);
                        }
                    }
                }
            }
        }
        Ok(false)
    }

    /// Computes the writes of the next flush without changing tracked state.
    ///
    /// # Errors
    /// - `UninitializedProxy` when a proxy is scheduled for insertion.
    /// - `IdentifierChanged` when a pending object's identifier fields no
    ///   longer match its identity map key.
    /// - `Mapping` when a serialized object does not fit its metadata.
    pub(crate) fn plan_commit(&self, factory: &ClassMetadataFactory) -> ManagerResult<CommitPlan> {
        let mut metadata: BTreeMap<&str, Rc<ClassMetadata>> = BTreeMap::new();
        for key in self.entries.keys() {
            if !metadata.contains_key(key.class_name.as_str()) {
                metadata.insert(key.class_name.as_str(), factory.metadata_for(&key.class_name)?);
            }
        }
        let order = commit_order(metadata.values().map(|metadata| metadata.as_ref()));
        let rank: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(index, name)| (name.as_str(), index))
            .collect();
        let rank_of = |key: &EntityKey| rank.get(key.class_name.as_str()).copied().unwrap_or(0);

        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        let mut deletes = Vec::new();
        for (key, entry) in &self.entries {
            let class_metadata = &metadata[key.class_name.as_str()];
            let position = (rank_of(key), entry.sequence);
            match entry.status {
                EntryStatus::ScheduledInsert => {
                    let data = entry.object.snapshot()?.ok_or_else(|| {
                        ManagerError::UninitializedProxy {
                            class_name: key.class_name.clone(),
                            identifier: Some(key.identifier.clone()),
                        }
                    })?;
                    check_document(class_metadata, key, &data)?;
                    inserts.push((position, PlannedChange::Insert { key: key.clone(), data }));
                }
                EntryStatus::Persisted => {
                    let (Some(data), Some(loaded)) = (entry.object.snapshot()?, &entry.loaded)
                    else {
                        continue;
                    };
                    let changed = changed_fields(&loaded.data, &data);
                    if changed.is_empty() {
                        continue;
                    }
                    check_document(class_metadata, key, &data)?;
                    updates.push((
                        position,
                        PlannedChange::Update {
                            key: key.clone(),
                            data,
                            version: loaded.version,
                            changed_fields: changed,
                        },
                    ));
                }
                EntryStatus::ScheduledDelete => {
                    deletes.push((
                        position,
                        PlannedChange::Delete {
                            key: key.clone(),
                            version: entry.loaded.as_ref().map(|loaded| loaded.version),
                        },
                    ));
                }
            }
        }

        inserts.sort_by_key(|(position, _)| *position);
        updates.sort_by_key(|(position, _)| *position);
        deletes.sort_by_key(|(position, _)| *position);
        deletes.reverse();

        let changes = inserts
            .into_iter()
            .chain(updates)
            .chain(deletes)
            .map(|(_, change)| change)
            .collect();
        Ok(CommitPlan { changes })
    }

    /// Folds a committed plan into tracked state.
    pub(crate) fn apply_commit(&mut self, plan: &CommitPlan) {
        for change in &plan.changes {
            match change {
                PlannedChange::Insert { key, data } => {
                    if let Some(entry) = self.entries.get_mut(key) {
                        entry.status = EntryStatus::Persisted;
                        entry.loaded = Some(LoadedState {
                            data: data.clone(),
                            version: 1,
                        });
                    }
                }
                PlannedChange::Update {
                    key, data, version, ..
                } => {
                    if let Some(entry) = self.entries.get_mut(key) {
                        entry.loaded = Some(LoadedState {
                            data: data.clone(),
                            version: version + 1,
                        });
                    }
                }
                PlannedChange::Delete { key, .. } => {
                    self.forget(key);
                }
            }
        }
    }
}

fn check_document(metadata: &ClassMetadata, key: &EntityKey, data: &Value) -> ManagerResult<()> {
    metadata.validate_document(data)?;
    let current = metadata.identifier_of(data)?;
    if current != key.identifier {
        return Err(ManagerError::IdentifierChanged {
            class_name: key.class_name.clone(),
            original: key.identifier.clone(),
            current,
        });
    }
    Ok(())
}
