//! Default `ObjectRepository` bound to an `EntityManager`.

use crate::contract::{ObjectManager, ObjectRepository};
use crate::manager::error::ManagerResult;
use crate::manager::EntityManager;
use crate::model::entity::Entity;
use crate::model::handle::Handle;
use crate::model::identifier::Identifier;
use crate::repository::criteria::Criteria;
use crate::store::ObjectStore;
use std::marker::PhantomData;

/// Repository for `T` borrowing its manager for the lookup's duration.
pub struct EntityRepository<'m, T: Entity, S: ObjectStore> {
    manager: &'m mut EntityManager<S>,
    entity: PhantomData<fn() -> T>,
}

impl<'m, T: Entity, S: ObjectStore> EntityRepository<'m, T, S> {
    pub(crate) fn new(manager: &'m mut EntityManager<S>) -> Self {
        Self {
            manager,
            entity: PhantomData,
        }
    }
}

impl<T: Entity, S: ObjectStore> ObjectRepository<T> for EntityRepository<'_, T, S> {
    fn find(&mut self, id: impl Into<Identifier>) -> ManagerResult<Option<Handle<T>>> {
        self.manager.find::<T>(id)
    }

    fn find_all(&mut self) -> ManagerResult<Vec<Handle<T>>> {
        self.manager.load_matching::<T>(&Criteria::new())
    }

    /// Objects scheduled for removal are left out.
    fn find_by(&mut self, criteria: &Criteria) -> ManagerResult<Vec<Handle<T>>> {
        self.manager.load_matching::<T>(criteria)
    }

    fn find_one_by(&mut self, criteria: &Criteria) -> ManagerResult<Option<Handle<T>>> {
        let first = criteria.clone().with_limit(1);
        Ok(self.manager.load_matching::<T>(&first)?.into_iter().next())
    }

    fn count(&mut self, criteria: &Criteria) -> ManagerResult<u64> {
        self.manager.count_matching::<T>(criteria)
    }

    fn class_name(&self) -> &'static str {
        T::CLASS_NAME
    }
}
