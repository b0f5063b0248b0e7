//! Class metadata and the metadata factory.
//!
//! # Responsibility
//! - Describe how each entity class maps to a stored document.
//! - Cache metadata per class name for the lifetime of a manager.

pub mod factory;
pub mod metadata;
