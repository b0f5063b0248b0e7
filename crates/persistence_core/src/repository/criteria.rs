//! Query criteria for repository lookups.

use crate::mapping::metadata::ClassMetadata;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Sort direction for one ordering term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Equality filters, ordering and pagination over one class.
///
/// A `null` filter value matches fields that are null or absent. Without
/// explicit ordering, results are ordered by identifier ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub filters: Vec<(String, Value)>,
    pub ordering: Vec<(String, SortOrder)>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn where_null(self, field: impl Into<String>) -> Self {
        self.where_eq(field, Value::Null)
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.ordering.push((field.into(), order));
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Checks that every referenced field is a scalar stored for the class
    /// and every filter value is comparable.
    pub fn validate(&self, metadata: &ClassMetadata) -> Result<(), CriteriaError> {
        let referenced = self
            .filters
            .iter()
            .map(|(field, _)| field)
            .chain(self.ordering.iter().map(|(field, _)| field));
        for field in referenced {
            if !metadata.is_queryable(field) {
                return Err(CriteriaError::UnknownField {
                    class_name: metadata.name().to_string(),
                    field: field.clone(),
                });
            }
        }

        for (field, value) in &self.filters {
            let reason = match value {
                Value::Array(_) | Value::Object(_) => Some("only scalar values can be compared"),
                Value::Number(number) if number.is_u64() && !number.is_i64() => {
                    Some("integers above i64::MAX cannot be compared")
                }
                _ => None,
            };
            if let Some(reason) = reason {
                return Err(CriteriaError::UnsupportedValue {
                    field: field.clone(),
                    reason,
                });
            }
        }

        Ok(())
    }
}

/// Invalid criteria for a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriteriaError {
    UnknownField { class_name: String, field: String },
    UnsupportedValue { field: String, reason: &'static str },
}

impl Display for CriteriaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField { class_name, field } => {
                write!(f, "{class_name} has no queryable field `{field}`")
            }
            Self::UnsupportedValue { field, reason } => {
                write!(f, "unsupported criteria value for `{field}`: {reason}")
            }
        }
    }
}

impl Error for CriteriaError {}

#[cfg(test)]
mod tests {
    use super::{Criteria, CriteriaError, SortOrder};
    use crate::mapping::metadata::{ClassMetadata, FieldType};
    use serde_json::json;

    fn metadata() -> ClassMetadata {
        ClassMetadata::builder("blog::Article")
            .id("id", FieldType::Integer)
            .field("title", FieldType::String)
            .field("extra", FieldType::Json)
            .many_to_one("author", "blog::Author")
            .many_to_many("tags", "blog::Tag")
            .one_to_many("comments", "blog::Comment", "article")
            .build()
            .unwrap()
    }

    #[test]
    fn accepts_fields_and_owning_associations() {
        let criteria = Criteria::new()
            .where_eq("title", "Hello")
            .where_eq("author", "ada")
            .where_null("title")
            .order_by("id", SortOrder::Desc)
            .with_limit(5)
            .with_offset(2);
        criteria.validate(&metadata()).unwrap();
        assert_eq!(criteria.limit, Some(5));
        assert_eq!(criteria.offset, 2);
    }

    #[test]
    fn rejects_unknown_and_inverse_side_fields() {
        let err = Criteria::new()
            .where_eq("comments", 1)
            .validate(&metadata())
            .unwrap_err();
        assert!(matches!(err, CriteriaError::UnknownField { field, .. } if field == "comments"));

        let err = Criteria::new()
            .order_by("missing", SortOrder::Asc)
            .validate(&metadata())
            .unwrap_err();
        assert!(matches!(err, CriteriaError::UnknownField { .. }));
    }

    #[test]
    fn rejects_fields_stored_as_arrays_or_objects() {
        for field in ["extra", "tags"] {
            let err = Criteria::new()
                .where_eq(field, "rust")
                .validate(&metadata())
                .unwrap_err();
            assert!(matches!(err, CriteriaError::UnknownField { field: f, .. } if f == field));
        }
        let err = Criteria::new()
            .order_by("tags", SortOrder::Asc)
            .validate(&metadata())
            .unwrap_err();
        assert!(matches!(err, CriteriaError::UnknownField { .. }));
    }

    #[test]
    fn rejects_non_scalar_values() {
        let err = Criteria::new()
            .where_eq("title", json!(["a"]))
            .validate(&metadata())
            .unwrap_err();
        assert!(matches!(err, CriteriaError::UnsupportedValue { .. }));

        let err = Criteria::new()
            .where_eq("id", u64::MAX)
            .validate(&metadata())
            .unwrap_err();
        assert!(matches!(err, CriteriaError::UnsupportedValue { .. }));
    }
}
