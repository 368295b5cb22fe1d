//! Property type system
//!
//! Entry points used by the row store and the API surface. Each call looks up
//! the [`PropertyTypeHandler`] for the property's type and wraps its verdict
//! into a [`ValidationError`] keyed by property name.

pub mod registry;
pub mod types;
pub mod validation;

pub use registry::handler_for;
pub use types::{compile_pattern, relation_target_matches, PropertyTypeHandler, UNRESOLVED};
pub use validation::{
    NoRows, RelationLookup, TypeContext, ValidationError, ValidationErrorKind,
};

use crate::entities::property::{attr, Property};
use crate::entities::row::Value;

/// Validate a (possibly unset) value against its property
///
/// Blank text and empty media lists count as unset. Hidden properties are
/// never required since no form renders them.
pub fn validate(
    property: &Property,
    value: Option<&Value>,
    ctx: &TypeContext<'_>,
) -> Result<(), ValidationError> {
    let fail = |kind| ValidationError::new(property.name.clone(), kind);

    let Some(value) = value.filter(|v| !v.is_blank()) else {
        if property.is_required && !property.is_hidden {
            return Err(fail(ValidationErrorKind::Required));
        }
        return Ok(());
    };

    let handler = handler_for(property.property_type);
    match handler.slot() {
        None => Err(fail(ValidationErrorKind::Unsupported)),
        Some(slot) if slot != value.slot() => Err(fail(ValidationErrorKind::TypeMismatch {
            expected: slot.to_string(),
        })),
        Some(_) => handler.validate(value, property, ctx).map_err(fail),
    }
}

/// Display text of a value ("" when unset)
pub fn format(property: &Property, value: Option<&Value>, ctx: &TypeContext<'_>) -> String {
    match value {
        Some(v) => handler_for(property.property_type).format(v, property, ctx),
        None => String::new(),
    }
}

/// Parse user text into a value for the property
pub fn parse(property: &Property, raw: &str) -> Result<Value, ValidationError> {
    handler_for(property.property_type)
        .parse(raw, property)
        .map_err(|kind| ValidationError::new(property.name.clone(), kind))
}

/// Parse an API payload value; JSON null means unset
pub fn from_json(
    property: &Property,
    json: &serde_json::Value,
) -> Result<Option<Value>, ValidationError> {
    if json.is_null() {
        return Ok(None);
    }
    handler_for(property.property_type)
        .from_json(json, property)
        .map(Some)
        .map_err(|kind| ValidationError::new(property.name.clone(), kind))
}

pub fn to_json(property: &Property, value: &Value) -> serde_json::Value {
    handler_for(property.property_type).to_json(value, property)
}

/// Parsed `defaultValue` attribute, if any
pub fn default_value(property: &Property) -> Option<Value> {
    let raw = property.attribute(attr::DEFAULT_VALUE)?;
    handler_for(property.property_type).parse(raw, property).ok()
}

/// A schema-level problem with one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeProblem {
    pub attribute: String,
    pub reason: String,
}

/// Check that a property's attributes are well-formed
///
/// Runs at definition time so row-level validation never meets a malformed
/// constraint.
pub fn check_attributes(property: &Property) -> Result<(), AttributeProblem> {
    let problem = |attribute: &str, reason: String| AttributeProblem {
        attribute: attribute.to_string(),
        reason,
    };

    if let Some(pattern) = property.attribute(attr::PATTERN) {
        compile_pattern(pattern).map_err(|e| problem(attr::PATTERN, e.to_string()))?;
    }

    let mut bounds = [None, None];
    for (slot, name) in [attr::MIN, attr::MAX].into_iter().enumerate() {
        if let Some(raw) = property.attribute(name) {
            let n: f64 = raw
                .trim()
                .parse()
                .map_err(|_| problem(name, format!("'{}' is not a number", raw)))?;
            bounds[slot] = Some(n);
        }
    }
    if let [Some(min), Some(max)] = bounds {
        if min > max {
            return Err(problem(attr::MIN, format!("min {} exceeds max {}", min, max)));
        }
    }

    if let Some(raw) = property.attribute(attr::DEFAULT_VALUE) {
        handler_for(property.property_type)
            .parse(raw, property)
            .map_err(|kind| problem(attr::DEFAULT_VALUE, kind.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::{EntityId, PropertyId};
    use crate::entities::property::{PropertyAttribute, PropertyType};

    fn property(ty: PropertyType, required: bool, attributes: &[(&str, &str)]) -> Property {
        Property {
            id: PropertyId::new(),
            entity_id: EntityId::new(),
            parent_id: None,
            related_entity_id: None,
            order: 1,
            name: "amount".to_string(),
            title: "Amount".to_string(),
            property_type: ty,
            is_default: false,
            is_dynamic: true,
            is_required: required,
            is_hidden: false,
            is_detail: false,
            attributes: attributes
                .iter()
                .map(|(k, v)| PropertyAttribute::new(*k, *v))
                .collect(),
            options: vec![],
        }
    }

    #[test]
    fn test_required_unset_and_blank() {
        let prop = property(PropertyType::Text, true, &[]);
        let ctx = TypeContext::new(None, &NoRows);
        let err = validate(&prop, None, &ctx).unwrap_err();
        assert_eq!(err.property, "amount");
        assert_eq!(err.kind, ValidationErrorKind::Required);

        let blank = Value::Text("  ".to_string());
        assert!(validate(&prop, Some(&blank), &ctx).is_err());
    }

    #[test]
    fn test_hidden_required_is_not_enforced() {
        let mut prop = property(PropertyType::Text, true, &[]);
        prop.is_hidden = true;
        let ctx = TypeContext::new(None, &NoRows);
        assert!(validate(&prop, None, &ctx).is_ok());
    }

    #[test]
    fn test_wrong_slot_is_type_mismatch() {
        let prop = property(PropertyType::Number, false, &[]);
        let ctx = TypeContext::new(None, &NoRows);
        let err = validate(&prop, Some(&Value::Text("12".into())), &ctx).unwrap_err();
        assert_eq!(
            err.kind,
            ValidationErrorKind::TypeMismatch {
                expected: "number".to_string()
            }
        );
    }

    #[test]
    fn test_check_attributes() {
        assert!(check_attributes(&property(PropertyType::Text, false, &[("pattern", "[a-z]+")])).is_ok());

        let bad_regex = property(PropertyType::Text, false, &[("pattern", "([a-z")]);
        assert_eq!(check_attributes(&bad_regex).unwrap_err().attribute, "pattern");

        let bad_min = property(PropertyType::Number, false, &[("min", "ten")]);
        assert_eq!(check_attributes(&bad_min).unwrap_err().attribute, "min");

        let inverted = property(PropertyType::Number, false, &[("min", "5"), ("max", "1")]);
        assert!(check_attributes(&inverted).is_err());

        let bad_default = property(PropertyType::Number, false, &[("defaultValue", "abc")]);
        assert_eq!(check_attributes(&bad_default).unwrap_err().attribute, "defaultValue");
    }

    #[test]
    fn test_default_value() {
        let prop = property(PropertyType::Boolean, false, &[("defaultValue", "true")]);
        assert_eq!(default_value(&prop), Some(Value::Boolean(true)));
        assert_eq!(default_value(&property(PropertyType::Text, false, &[])), None);
    }

    #[test]
    fn test_format_snapshot() {
        let prop = property(PropertyType::Number, false, &[("decimals", "2")]);
        let ctx = TypeContext::new(None, &NoRows);
        insta::assert_snapshot!(format(&prop, Some(&Value::Number(1234.5)), &ctx), @"1234.50");
    }

    #[test]
    fn test_json_null_is_unset() {
        let prop = property(PropertyType::Text, false, &[]);
        assert_eq!(from_json(&prop, &serde_json::Value::Null).unwrap(), None);
        assert_eq!(
            from_json(&prop, &serde_json::json!("hello")).unwrap(),
            Some(Value::Text("hello".to_string()))
        );
    }
}
