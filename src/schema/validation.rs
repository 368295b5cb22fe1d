//! Field-level validation errors and the context validators run in

use serde::Serialize;
use std::fmt;

use crate::core::identity::{OptionId, RowId, TenantId};
use crate::entities::row::Row;

/// Why a value was rejected
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationErrorKind {
    Required,
    Pattern { pattern: String },
    Min { min: f64 },
    Max { max: f64 },
    InvalidOption,
    InvalidRelation,
    TypeMismatch { expected: String },
    /// The property type stores no values
    Unsupported,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationErrorKind::Required => write!(f, "is required"),
            ValidationErrorKind::Pattern { pattern } => {
                write!(f, "does not match pattern {}", pattern)
            }
            ValidationErrorKind::Min { min } => write!(f, "must be at least {}", min),
            ValidationErrorKind::Max { max } => write!(f, "must be at most {}", max),
            ValidationErrorKind::InvalidOption => write!(f, "is not a valid option"),
            ValidationErrorKind::InvalidRelation => write!(f, "does not reference a valid row"),
            ValidationErrorKind::TypeMismatch { expected } => write!(f, "expected {}", expected),
            ValidationErrorKind::Unsupported => write!(f, "cannot hold values"),
        }
    }
}

/// A rejected value, keyed by property name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub property: String,
    /// Index of the detail row the value belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_index: Option<usize>,
    #[serde(flatten)]
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn new(property: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            property: property.into(),
            detail_index: None,
            kind,
        }
    }

    pub fn in_detail(mut self, index: usize) -> Self {
        self.detail_index = Some(index);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail_index {
            Some(i) => write!(f, "{}[{}] {}", self.property, i, self.kind),
            None => write!(f, "{} {}", self.property, self.kind),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Row lookups needed to validate and format ENTITY values
pub trait RelationLookup {
    fn row(&self, id: &RowId) -> Option<&Row>;
}

/// Everything a handler may consult besides the value and its property
#[derive(Clone, Copy)]
pub struct TypeContext<'a> {
    /// Tenant of the caller; relations outside it never validate
    pub tenant_id: Option<&'a TenantId>,
    /// Option currently selected on the parent property
    pub parent_option: Option<&'a OptionId>,
    pub lookup: &'a dyn RelationLookup,
}

impl<'a> TypeContext<'a> {
    pub fn new(tenant_id: Option<&'a TenantId>, lookup: &'a dyn RelationLookup) -> Self {
        Self {
            tenant_id,
            parent_option: None,
            lookup,
        }
    }

    pub fn with_parent_option(mut self, parent_option: Option<&'a OptionId>) -> Self {
        self.parent_option = parent_option;
        self
    }
}

/// Lookup that knows no rows
pub struct NoRows;

impl RelationLookup for NoRows {
    fn row(&self, _id: &RowId) -> Option<&Row> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ValidationError::new("amount", ValidationErrorKind::Min { min: 10.0 });
        assert_eq!(err.to_string(), "amount must be at least 10");

        let err = ValidationError::new("quantity", ValidationErrorKind::Required).in_detail(2);
        assert_eq!(err.to_string(), "quantity[2] is required");
    }

    #[test]
    fn test_error_json_shape() {
        let err = ValidationError::new(
            "code",
            ValidationErrorKind::Pattern {
                pattern: "^[A-Z]+$".to_string(),
            },
        );
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"property": "code", "kind": "pattern", "pattern": "^[A-Z]+$"})
        );
    }
}
