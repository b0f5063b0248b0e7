//! Lazily loading, caching class metadata factory.
//!
//! # Responsibility
//! - Track which Rust types are registered under which class names.
//! - Build each class's metadata on first request and cache it.
//!
//! # Invariants
//! - One class name maps to exactly one Rust type.
//! - Cached metadata is never rebuilt unless replaced via `set_metadata_for`.

use crate::mapping::metadata::{ClassMetadata, ClassMetadataBuilder, MappingError};
use crate::model::entity::Entity;
use log::{debug, warn};
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

type MappingLoader = fn() -> Result<ClassMetadata, MappingError>;

#[derive(Clone, Copy)]
struct Registration {
    type_id: TypeId,
    loader: MappingLoader,
}

/// Produces and caches `ClassMetadata` for registered entity types.
#[derive(Default)]
pub struct ClassMetadataFactory {
    registrations: RefCell<BTreeMap<String, Registration>>,
    loaded: RefCell<BTreeMap<String, Rc<ClassMetadata>>>,
}

impl ClassMetadataFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `T::CLASS_NAME`. Repeated registration is a no-op.
    ///
    /// # Errors
    /// - `ClassNameConflict` when another type already uses the class name.
    pub fn register<T: Entity>(&self) -> Result<(), MappingError> {
        let mut registrations = self.registrations.borrow_mut();
        match registrations.get(T::CLASS_NAME) {
            Some(existing) if existing.type_id != TypeId::of::<T>() => Err(
                MappingError::ClassNameConflict(T::CLASS_NAME.to_string()),
            ),
            Some(_) => Ok(()),
            None => {
                registrations.insert(
                    T::CLASS_NAME.to_string(),
                    Registration {
                        type_id: TypeId::of::<T>(),
                        loader: load_mapping::<T>,
                    },
                );
                Ok(())
            }
        }
    }

    /// Returns metadata for `class_name`, loading it on first use.
    pub fn metadata_for(&self, class_name: &str) -> Result<Rc<ClassMetadata>, MappingError> {
        if let Some(metadata) = self.loaded.borrow().get(class_name) {
            return Ok(Rc::clone(metadata));
        }

        let loader = self
            .registrations
            .borrow()
            .get(class_name)
            .map(|registration| registration.loader)
            .ok_or_else(|| MappingError::UnknownClass(class_name.to_string()))?;

        let metadata = match loader() {
            Ok(metadata) => Rc::new(metadata),
            Err(err) => {
                warn!(
                    "event=metadata_load module=mapping status=error class={class_name} error={err}"
                );
                return Err(err);
            }
        };
        debug!(
            "event=metadata_load module=mapping status=ok class={class_name} fields={} associations={}",
            metadata.fields().len(),
            metadata.associations().len()
        );

        self.loaded
            .borrow_mut()
            .insert(class_name.to_string(), Rc::clone(&metadata));
        Ok(metadata)
    }

    /// Registers `T` if needed and returns its metadata.
    pub fn metadata_for_type<T: Entity>(&self) -> Result<Rc<ClassMetadata>, MappingError> {
        self.register::<T>()?;
        self.metadata_for(T::CLASS_NAME)
    }

    /// Whether metadata for `class_name` is already loaded.
    pub fn has_metadata_for(&self, class_name: &str) -> bool {
        self.loaded.borrow().contains_key(class_name)
    }

    /// Installs `metadata` for `class_name`, replacing any cached entry.
    pub fn set_metadata_for(&self, class_name: impl Into<String>, metadata: ClassMetadata) {
        self.loaded
            .borrow_mut()
            .insert(class_name.into(), Rc::new(metadata));
    }

    /// Whether `class_name` is unknown to this factory.
    pub fn is_transient(&self, class_name: &str) -> bool {
        !self.registrations.borrow().contains_key(class_name)
            && !self.loaded.borrow().contains_key(class_name)
    }

    /// Loads every known class and checks association targets resolve.
    ///
    /// Results are ordered by class name.
    pub fn all_metadata(&self) -> Result<Vec<Rc<ClassMetadata>>, MappingError> {
        let names: BTreeSet<String> = self
            .registrations
            .borrow()
            .keys()
            .chain(self.loaded.borrow().keys())
            .cloned()
            .collect();

        let mut all = Vec::with_capacity(names.len());
        for name in &names {
            all.push(self.metadata_for(name)?);
        }

        for metadata in &all {
            for assoc in metadata.associations() {
                if self.is_transient(&assoc.target_class) {
                    return Err(MappingError::UnknownAssociationTarget {
                        class_name: metadata.name().to_string(),
                        association: assoc.name.clone(),
                        target_class: assoc.target_class.clone(),
                    });
                }
            }
        }

        Ok(all)
    }
}

fn load_mapping<T: Entity>() -> Result<ClassMetadata, MappingError> {
    T::map(ClassMetadataBuilder::new(T::CLASS_NAME)).build()
}
