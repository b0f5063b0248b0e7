//! Shared handles to managed objects.
//!
//! # Responsibility
//! - Give callers and the unit of work one shared, mutable view of an object.
//! - Represent lazy proxies whose state is loaded on demand.
//!
//! # Invariants
//! - Object identity is handle identity: clones of a handle are the same
//!   object, two `Handle::new` calls are never the same object.
//! - A proxy handle carries its identifier until its state is loaded.

use crate::manager::error::{ManagerError, ManagerResult};
use crate::model::entity::Entity;
use crate::model::identifier::Identifier;
use serde_json::Value;
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Lifecycle state of an object relative to one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Not tracked and no persisted row carries its identifier.
    New,
    /// Tracked by the identity map.
    Managed,
    /// Tracked and scheduled for deletion at the next flush.
    Removed,
    /// Not tracked, but a persisted row carries its identifier.
    Detached,
}

/// Shared reference to an entity value.
pub struct Handle<T: Entity> {
    cell: Rc<EntityCell<T>>,
}

pub(crate) struct EntityCell<T> {
    value: RefCell<Option<T>>,
    proxy_id: Option<Identifier>,
}

impl<T: Entity> Handle<T> {
    /// Wraps a fresh value. The handle is unmanaged until persisted.
    pub fn new(value: T) -> Self {
        Self {
            cell: Rc::new(EntityCell {
                value: RefCell::new(Some(value)),
                proxy_id: None,
            }),
        }
    }

    pub(crate) fn proxy(identifier: Identifier) -> Self {
        Self {
            cell: Rc::new(EntityCell {
                value: RefCell::new(None),
                proxy_id: Some(identifier),
            }),
        }
    }

    /// Returns `false` only for proxies whose state was never loaded.
    pub fn is_initialized(&self) -> bool {
        self.cell
            .value
            .try_borrow()
            .map(|value| value.is_some())
            .unwrap_or(true)
    }

    /// Borrows the current state.
    ///
    /// Returns `None` for an uninitialized proxy or while a `write` borrow
    /// is alive.
    pub fn read(&self) -> Option<Ref<'_, T>> {
        let guard = self.cell.value.try_borrow().ok()?;
        Ref::filter_map(guard, Option::as_ref).ok()
    }

    /// Mutably borrows the current state.
    ///
    /// Returns `None` for an uninitialized proxy or while any other borrow
    /// is alive.
    pub fn write(&self) -> Option<RefMut<'_, T>> {
        let guard = self.cell.value.try_borrow_mut().ok()?;
        RefMut::filter_map(guard, Option::as_mut).ok()
    }

    /// Clones the current state out of the handle.
    pub fn get(&self) -> Option<T> {
        self.read().map(|value| value.clone())
    }

    /// Applies `change` to the state. Returns whether the change ran.
    pub fn update<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        match self.write() {
            Some(mut value) => {
                change(&mut value);
                true
            }
            None => false,
        }
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.cell) as *const () as usize
    }

    pub(crate) fn proxy_identifier(&self) -> Option<&Identifier> {
        self.cell.proxy_id.as_ref()
    }

    /// Serialized state, `None` for uninitialized proxies.
    pub(crate) fn snapshot(&self) -> ManagerResult<Option<Value>> {
        self.cell.snapshot()
    }

    pub(crate) fn replace(&self, value: T) -> ManagerResult<()> {
        let mut guard = self
            .cell
            .value
            .try_borrow_mut()
            .map_err(|_| borrowed::<T>())?;
        *guard = Some(value);
        Ok(())
    }

    pub(crate) fn erased(&self) -> Rc<dyn ManagedObject> {
        self.cell.clone()
    }

    pub(crate) fn from_erased(object: Rc<dyn ManagedObject>) -> Option<Self> {
        object
            .into_any()
            .downcast::<EntityCell<T>>()
            .ok()
            .map(|cell| Self { cell })
    }
}

impl<T: Entity> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: Entity> Debug for Handle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("class", &T::CLASS_NAME)
            .field("initialized", &self.is_initialized())
            .field("proxy_id", &self.cell.proxy_id)
            .finish()
    }
}

/// Type-erased view the unit of work keeps for every managed object.
pub(crate) trait ManagedObject {
    fn snapshot(&self) -> ManagerResult<Option<Value>>;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<T: Entity> ManagedObject for EntityCell<T> {
    fn snapshot(&self) -> ManagerResult<Option<Value>> {
        let guard = self.value.try_borrow().map_err(|_| borrowed::<T>())?;
        match guard.as_ref() {
            Some(value) => Ok(Some(serde_json::to_value(value)?)),
            None => Ok(None),
        }
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

fn borrowed<T: Entity>() -> ManagerError {
    ManagerError::ObjectBorrowed {
        class_name: T::CLASS_NAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::Handle;
    use crate::mapping::metadata::{ClassMetadataBuilder, FieldType};
    use crate::model::entity::Entity;
    use crate::model::identifier::Identifier;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Gauge {
        id: u32,
        label: String,
    }

    impl Entity for Gauge {
        const CLASS_NAME: &'static str = "test::Gauge";

        fn map(mapping: ClassMetadataBuilder) -> ClassMetadataBuilder {
            mapping
                .id("id", FieldType::Integer)
                .field("label", FieldType::String)
        }
    }

    #[test]
    fn clones_share_identity_and_state() {
        let first = Handle::new(Gauge {
            id: 1,
            label: "a".to_string(),
        });
        let second = first.clone();
        assert!(first.ptr_eq(&second));

        assert!(second.update(|gauge| gauge.label = "b".to_string()));
        assert_eq!(first.get().unwrap().label, "b");

        let other = Handle::new(first.get().unwrap());
        assert!(!other.ptr_eq(&first));
        assert_ne!(other.address(), first.address());
    }

    #[test]
    fn proxy_has_no_state_until_replaced() {
        let proxy: Handle<Gauge> = Handle::proxy(Identifier::from(9_u32));
        assert!(!proxy.is_initialized());
        assert!(proxy.read().is_none());
        assert!(!proxy.update(|gauge| gauge.id = 2));
        assert_eq!(proxy.snapshot().unwrap(), None);

        proxy
            .replace(Gauge {
                id: 9,
                label: "loaded".to_string(),
            })
            .unwrap();
        assert!(proxy.is_initialized());
        assert_eq!(proxy.proxy_identifier(), Some(&Identifier::from(9_u32)));
    }

    #[test]
    fn snapshot_fails_while_mutably_borrowed() {
        let handle = Handle::new(Gauge {
            id: 3,
            label: "busy".to_string(),
        });
        let guard = handle.write().unwrap();
        assert!(handle.snapshot().is_err());
        assert!(handle.read().is_none());
        drop(guard);
        assert!(handle.snapshot().unwrap().is_some());
    }

    #[test]
    fn erased_round_trip_requires_matching_type() {
        let handle = Handle::new(Gauge {
            id: 4,
            label: "erased".to_string(),
        });
        let erased = handle.erased();
        let restored = Handle::<Gauge>::from_erased(erased).unwrap();
        assert!(restored.ptr_eq(&handle));
    }
}
