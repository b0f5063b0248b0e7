//! Persistable type contract.

use crate::mapping::metadata::ClassMetadataBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A type whose instances can be managed by an `ObjectManager`.
///
/// State is persisted as the serde JSON form of the value, so the serialized
/// form must be a JSON object whose keys match the mapped field names.
///
/// # Example
///
/// ```
/// use persistence_core::{ClassMetadataBuilder, Entity, FieldType};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Author {
///     id: String,
///     name: String,
/// }
///
/// impl Entity for Author {
///     const CLASS_NAME: &'static str = "blog::Author";
///
///     fn map(mapping: ClassMetadataBuilder) -> ClassMetadataBuilder {
///         mapping
///             .id("id", FieldType::String)
///             .field("name", FieldType::String)
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Clone + 'static {
    /// Fully-qualified class name; also the storage namespace.
    const CLASS_NAME: &'static str;

    /// Declares identifier, fields and associations on a builder that is
    /// already named `CLASS_NAME`.
    fn map(mapping: ClassMetadataBuilder) -> ClassMetadataBuilder;
}
