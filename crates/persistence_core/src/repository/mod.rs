//! Class-scoped repositories.
//!
//! # Responsibility
//! - Expose identifier and criteria lookups for one entity class.
//! - Route every loaded row through the manager's identity map.

pub mod criteria;
pub mod entity_repo;
