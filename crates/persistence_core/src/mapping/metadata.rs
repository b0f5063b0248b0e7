//! Class metadata: how one entity class maps to a stored document.
//!
//! # Responsibility
//! - Describe identifier fields, typed fields and associations of a class.
//! - Validate serialized entity state before it is written.
//!
//! # Invariants
//! - Every class has at least one identifier field; identifier fields are
//!   never nullable.
//! - Field and association names are unique within a class and are plain
//!   identifiers (`[A-Za-z_][A-Za-z0-9_]*`), so they are safe JSON paths.
//! - Owning single-valued associations store the target identifier;
//!   owning collection-valued associations store an array of identifiers;
//!   inverse sides store nothing.

use crate::model::identifier::{is_identifier_scalar, Identifier};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static CLASS_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*((::|\.)[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("valid class name regex")
});
static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid field name regex"));

/// Storage type of a mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    /// Hyphenated UUID text.
    Uuid,
    /// Any JSON value; never inspected.
    Json,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Uuid => "uuid",
            Self::Json => "json",
        }
    }

    /// Whether a non-null JSON value fits this type.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Uuid => value
                .as_str()
                .is_some_and(|text| Uuid::parse_str(text).is_ok()),
            Self::Json => true,
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mapped scalar field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

/// Cardinality of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl AssociationKind {
    pub fn is_single_valued(self) -> bool {
        matches!(self, Self::OneToOne | Self::ManyToOne)
    }

    pub fn is_collection_valued(self) -> bool {
        !self.is_single_valued()
    }
}

/// One association to another entity class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationMapping {
    pub name: String,
    pub target_class: String,
    pub kind: AssociationKind,
    /// Owning-side field on the target; set only on the inverse side.
    pub mapped_by: Option<String>,
}

impl AssociationMapping {
    pub fn is_owning_side(&self) -> bool {
        self.mapped_by.is_none()
    }
}

/// Mapping and document validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    EmptyClassName,
    InvalidClassName(String),
    InvalidName {
        class_name: String,
        name: String,
    },
    MissingIdentifier(String),
    DuplicateName {
        class_name: String,
        name: String,
    },
    InvalidAssociation {
        class_name: String,
        association: String,
        reason: &'static str,
    },
    UnknownClass(String),
    UnknownAssociationTarget {
        class_name: String,
        association: String,
        target_class: String,
    },
    /// Two distinct Rust types claim the same class name.
    ClassNameConflict(String),
    NotAnObject(String),
    MissingField {
        class_name: String,
        field: String,
    },
    TypeMismatch {
        class_name: String,
        field: String,
        expected: FieldType,
    },
    InvalidIdentifier {
        class_name: String,
        field: String,
    },
}

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyClassName => write!(f, "class name must not be empty"),
            Self::InvalidClassName(name) => write!(f, "invalid class name `{name}`"),
            Self::InvalidName { class_name, name } => {
                write!(f, "invalid field or association name `{name}` in {class_name}")
            }
            Self::MissingIdentifier(class_name) => {
                write!(f, "class {class_name} declares no identifier field")
            }
            Self::DuplicateName { class_name, name } => {
                write!(f, "name `{name}` is mapped twice in {class_name}")
            }
            Self::InvalidAssociation {
                class_name,
                association,
                reason,
            } => write!(f, "invalid association {class_name}.{association}: {reason}"),
            Self::UnknownClass(name) => write!(f, "class {name} is not a mapped entity"),
            Self::UnknownAssociationTarget {
                class_name,
                association,
                target_class,
            } => write!(
                f,
                "association {class_name}.{association} targets unmapped class {target_class}"
            ),
            Self::ClassNameConflict(name) => {
                write!(f, "class name {name} is already registered for another type")
            }
            Self::NotAnObject(class_name) => {
                write!(f, "{class_name} does not serialize to a JSON object")
            }
            Self::MissingField { class_name, field } => {
                write!(f, "non-nullable field {class_name}.{field} is missing or null")
            }
            Self::TypeMismatch {
                class_name,
                field,
                expected,
            } => write!(f, "field {class_name}.{field} is not a valid {expected}"),
            Self::InvalidIdentifier { class_name, field } => write!(
                f,
                "identifier field {class_name}.{field} must be a string or an integer"
            ),
        }
    }
}

impl Error for MappingError {}

/// Metadata descriptor of one entity class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMetadata {
    name: String,
    identifier: Vec<String>,
    fields: Vec<FieldMapping>,
    associations: Vec<AssociationMapping>,
}

impl ClassMetadata {
    pub fn builder(name: impl Into<String>) -> ClassMetadataBuilder {
        ClassMetadataBuilder::new(name)
    }

    /// Fully-qualified class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier field names in declared order.
    pub fn identifier_field_names(&self) -> &[String] {
        &self.identifier
    }

    pub fn is_identifier(&self, field: &str) -> bool {
        self.identifier.iter().any(|name| name == field)
    }

    /// Identifier fields count as fields.
    pub fn has_field(&self, field: &str) -> bool {
        self.field(field).is_some()
    }

    pub fn has_association(&self, name: &str) -> bool {
        self.association(name).is_some()
    }

    pub fn is_single_valued_association(&self, name: &str) -> bool {
        self.association(name)
            .is_some_and(|assoc| assoc.kind.is_single_valued())
    }

    pub fn is_collection_valued_association(&self, name: &str) -> bool {
        self.association(name)
            .is_some_and(|assoc| assoc.kind.is_collection_valued())
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }

    pub fn association_names(&self) -> Vec<&str> {
        self.associations
            .iter()
            .map(|assoc| assoc.name.as_str())
            .collect()
    }

    pub fn type_of_field(&self, field: &str) -> Option<FieldType> {
        self.field(field).map(|mapping| mapping.field_type)
    }

    pub fn association_target_class(&self, name: &str) -> Option<&str> {
        self.association(name)
            .map(|assoc| assoc.target_class.as_str())
    }

    pub fn is_association_inverse_side(&self, name: &str) -> bool {
        self.association(name)
            .is_some_and(|assoc| !assoc.is_owning_side())
    }

    pub fn association_mapped_by_target_field(&self, name: &str) -> Option<&str> {
        self.association(name)
            .and_then(|assoc| assoc.mapped_by.as_deref())
    }

    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn association(&self, name: &str) -> Option<&AssociationMapping> {
        self.associations.iter().find(|assoc| assoc.name == name)
    }

    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    pub fn associations(&self) -> &[AssociationMapping] {
        &self.associations
    }

    /// Whether `name` is stored as a scalar and can be filtered/sorted on.
    ///
    /// `Json` fields and collection-valued associations hold arrays or
    /// objects, which never compare equal to a scalar.
    pub fn is_queryable(&self, name: &str) -> bool {
        if let Some(field) = self.field(name) {
            return field.field_type != FieldType::Json;
        }
        self.association(name)
            .is_some_and(|assoc| assoc.is_owning_side() && assoc.kind.is_single_valued())
    }

    /// Target classes this class references through owning to-one
    /// associations.
    pub fn owning_single_valued_targets(&self) -> impl Iterator<Item = &str> {
        self.associations
            .iter()
            .filter(|assoc| assoc.is_owning_side() && assoc.kind.is_single_valued())
            .map(|assoc| assoc.target_class.as_str())
    }

    /// Extracts identifier values from a serialized entity, in declared order.
    pub fn identifier_values(&self, document: &Value) -> Result<Vec<(String, Value)>, MappingError> {
        let object = document
            .as_object()
            .ok_or_else(|| MappingError::NotAnObject(self.name.clone()))?;
        self.identifier
            .iter()
            .map(|field| {
                let value = object.get(field).cloned().unwrap_or(Value::Null);
                if is_identifier_scalar(&value) {
                    Ok((field.clone(), value))
                } else {
                    Err(MappingError::InvalidIdentifier {
                        class_name: self.name.clone(),
                        field: field.clone(),
                    })
                }
            })
            .collect()
    }

    /// Canonical identifier of a serialized entity.
    pub fn identifier_of(&self, document: &Value) -> Result<Identifier, MappingError> {
        let values = self.identifier_values(document)?;
        let invalid = || MappingError::InvalidIdentifier {
            class_name: self.name.clone(),
            field: self.identifier.join(","),
        };
        if let [(_, single)] = values.as_slice() {
            return Identifier::from_scalar(single).ok_or_else(invalid);
        }
        Identifier::composite(values.into_iter().map(|(_, value)| value)).ok_or_else(invalid)
    }

    /// Checks a serialized entity against field types and association shapes.
    pub fn validate_document(&self, document: &Value) -> Result<(), MappingError> {
        let object = document
            .as_object()
            .ok_or_else(|| MappingError::NotAnObject(self.name.clone()))?;

        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if !field.nullable {
                        return Err(MappingError::MissingField {
                            class_name: self.name.clone(),
                            field: field.name.clone(),
                        });
                    }
                }
                Some(value) => {
                    if !field.field_type.accepts(value) {
                        return Err(MappingError::TypeMismatch {
                            class_name: self.name.clone(),
                            field: field.name.clone(),
                            expected: field.field_type,
                        });
                    }
                }
            }
        }

        for assoc in self.associations.iter().filter(|a| a.is_owning_side()) {
            let valid = match object.get(&assoc.name) {
                None | Some(Value::Null) => true,
                Some(Value::Array(items)) if assoc.kind.is_collection_valued() => {
                    items.iter().all(is_identifier_scalar)
                }
                Some(value) if assoc.kind.is_single_valued() => is_identifier_scalar(value),
                Some(_) => false,
            };
            if !valid {
                return Err(MappingError::InvalidAssociation {
                    class_name: self.name.clone(),
                    association: assoc.name.clone(),
                    reason: "stored value must be a target identifier or a list of them",
                });
            }
        }

        self.identifier_of(document).map(|_| ())
    }
}

/// Incremental builder for `ClassMetadata`.
#[derive(Debug, Clone)]
pub struct ClassMetadataBuilder {
    name: String,
    identifier: Vec<String>,
    fields: Vec<FieldMapping>,
    associations: Vec<AssociationMapping>,
}

impl ClassMetadataBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: Vec::new(),
            fields: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Adds an identifier field. Call repeatedly for composite identifiers.
    pub fn id(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        self.identifier.push(name.clone());
        self.fields.push(FieldMapping {
            name,
            field_type,
            nullable: false,
        });
        self
    }

    pub fn field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.push_field(name.into(), field_type, false)
    }

    pub fn nullable_field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.push_field(name.into(), field_type, true)
    }

    pub fn one_to_one(self, name: impl Into<String>, target_class: impl Into<String>) -> Self {
        self.association(name, target_class, AssociationKind::OneToOne, None)
    }

    pub fn many_to_one(self, name: impl Into<String>, target_class: impl Into<String>) -> Self {
        self.association(name, target_class, AssociationKind::ManyToOne, None)
    }

    pub fn many_to_many(self, name: impl Into<String>, target_class: impl Into<String>) -> Self {
        self.association(name, target_class, AssociationKind::ManyToMany, None)
    }

    /// Inverse side of a many-to-one declared on `target_class.mapped_by`.
    pub fn one_to_many(
        self,
        name: impl Into<String>,
        target_class: impl Into<String>,
        mapped_by: impl Into<String>,
    ) -> Self {
        self.association(
            name,
            target_class,
            AssociationKind::OneToMany,
            Some(mapped_by.into()),
        )
    }

    pub fn association(
        mut self,
        name: impl Into<String>,
        target_class: impl Into<String>,
        kind: AssociationKind,
        mapped_by: Option<String>,
    ) -> Self {
        self.associations.push(AssociationMapping {
            name: name.into(),
            target_class: target_class.into(),
            kind,
            mapped_by,
        });
        self
    }

    fn push_field(mut self, name: String, field_type: FieldType, nullable: bool) -> Self {
        self.fields.push(FieldMapping {
            name,
            field_type,
            nullable,
        });
        self
    }

    /// Validates the declarations and produces immutable metadata.
    pub fn build(self) -> Result<ClassMetadata, MappingError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(MappingError::EmptyClassName);
        }
        if !CLASS_NAME_RE.is_match(&name) {
            return Err(MappingError::InvalidClassName(name));
        }
        if self.identifier.is_empty() {
            return Err(MappingError::MissingIdentifier(name));
        }

        let mut seen = HashSet::new();
        let all_names = self
            .fields
            .iter()
            .map(|field| field.name.as_str())
            .chain(self.associations.iter().map(|assoc| assoc.name.as_str()));
        for member in all_names {
            if !FIELD_NAME_RE.is_match(member) {
                return Err(MappingError::InvalidName {
                    class_name: name,
                    name: member.to_string(),
                });
            }
            if !seen.insert(member) {
                return Err(MappingError::DuplicateName {
                    class_name: name,
                    name: member.to_string(),
                });
            }
        }

        for assoc in &self.associations {
            let reason = match (assoc.kind, assoc.mapped_by.as_deref()) {
                (_, _) if assoc.target_class.trim().is_empty() => {
                    Some("target class must not be empty")
                }
                (AssociationKind::OneToMany, None) => {
                    Some("one-to-many associations must name the owning field with mapped_by")
                }
                (AssociationKind::ManyToOne, Some(_)) => {
                    Some("many-to-one associations are always the owning side")
                }
                (_, Some(owner)) if !FIELD_NAME_RE.is_match(owner) => {
                    Some("mapped_by must name a field of the target class")
                }
                _ => None,
            };
            if let Some(reason) = reason {
                return Err(MappingError::InvalidAssociation {
                    class_name: name,
                    association: assoc.name.clone(),
                    reason,
                });
            }
        }

        Ok(ClassMetadata {
            name,
            identifier: self.identifier,
            fields: self.fields,
            associations: self.associations,
        })
    }
}
