//! Managed-object model shared by the manager, repositories and store.
//!
//! # Responsibility
//! - Define what a persistable type must provide (`Entity`).
//! - Define object identity (`Identifier`) and shared object handles.
//!
//! # Invariants
//! - Every managed object is reachable through exactly one `Handle` per
//!   (class, identifier) inside one manager.
//! - Identifiers are derived from persisted state, never generated here.

pub mod entity;
pub mod handle;
pub mod identifier;
