//! Property type handlers
//!
//! One [`PropertyTypeHandler`] per [`PropertyType`]. Handlers never see unset
//! values: required checks and blank normalization happen in
//! [`crate::schema::validate`] before dispatch.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::json;
use tracing::warn;

use crate::core::identity::{RowId, TenantId};
use crate::entities::property::{attr, Property, PropertyType};
use crate::entities::row::{MediaRef, Row, StorageSlot, Value};
use crate::schema::validation::{TypeContext, ValidationErrorKind};

/// Placeholder rendered for references that no longer resolve
pub const UNRESOLVED: &str = "—";

/// Storage, validation and display contract of one property type
pub trait PropertyTypeHandler: Send + Sync {
    fn property_type(&self) -> PropertyType;

    /// Slot the type stores into (None: stores nothing)
    fn slot(&self) -> Option<StorageSlot>;

    /// Check a non-blank value already known to sit in [`Self::slot`]
    fn validate(
        &self,
        value: &Value,
        property: &Property,
        ctx: &TypeContext<'_>,
    ) -> Result<(), ValidationErrorKind>;

    /// Display/search text for a value
    fn format(&self, value: &Value, property: &Property, ctx: &TypeContext<'_>) -> String;

    /// Parse user text (CLI input, `defaultValue` attributes)
    fn parse(&self, raw: &str, property: &Property) -> Result<Value, ValidationErrorKind>;

    /// Parse an API payload value
    fn from_json(
        &self,
        json: &serde_json::Value,
        property: &Property,
    ) -> Result<Value, ValidationErrorKind> {
        match json {
            serde_json::Value::String(s) => self.parse(s, property),
            serde_json::Value::Number(n) => self.parse(&n.to_string(), property),
            serde_json::Value::Bool(b) => self.parse(if *b { "true" } else { "false" }, property),
            _ => Err(self.mismatch()),
        }
    }

    /// Render a value for API payloads
    fn to_json(&self, value: &Value, property: &Property) -> serde_json::Value {
        match value {
            Value::Text(s) => json!(s),
            Value::Number(n) => json!(n),
            Value::Date(d) => json!(d.to_rfc3339()),
            Value::Boolean(b) => json!(b),
            Value::RelationRef(id) => json!(id.as_str()),
            Value::OptionRef(id) => property
                .option(id)
                .map(|o| json!(o.value))
                .unwrap_or(serde_json::Value::Null),
            Value::MediaRefs(files) => {
                serde_json::to_value(files).unwrap_or(serde_json::Value::Null)
            }
        }
    }

    fn mismatch(&self) -> ValidationErrorKind {
        ValidationErrorKind::TypeMismatch {
            expected: self.property_type().as_str().to_lowercase(),
        }
    }
}

/// Compile a `pattern` attribute; patterns must match the whole value
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}

fn check_bounds(measure: f64, property: &Property) -> Result<(), ValidationErrorKind> {
    if let Some(min) = property.numeric_attribute(attr::MIN) {
        if measure < min {
            return Err(ValidationErrorKind::Min { min });
        }
    }
    if let Some(max) = property.numeric_attribute(attr::MAX) {
        if measure > max {
            return Err(ValidationErrorKind::Max { max });
        }
    }
    Ok(())
}

/// Whether `row` is a valid target for an ENTITY property in `tenant`
pub fn relation_target_matches(row: &Row, property: &Property, tenant: Option<&TenantId>) -> bool {
    !row.is_detail()
        && property.related_entity_id.as_ref() == Some(&row.entity_id)
        && tenant == Some(&row.tenant_id)
}

// =========================================================================
// TEXT
// =========================================================================

pub struct TextHandler;

impl PropertyTypeHandler for TextHandler {
    fn property_type(&self) -> PropertyType {
        PropertyType::Text
    }

    fn slot(&self) -> Option<StorageSlot> {
        Some(StorageSlot::Text)
    }

    fn validate(
        &self,
        value: &Value,
        property: &Property,
        _ctx: &TypeContext<'_>,
    ) -> Result<(), ValidationErrorKind> {
        let Value::Text(text) = value else {
            return Err(self.mismatch());
        };

        check_bounds(text.chars().count() as f64, property)?;

        if let Some(pattern) = property.attribute(attr::PATTERN) {
            let matched = match compile_pattern(pattern) {
                Ok(re) => re.is_match(text),
                Err(e) => {
                    warn!(property = %property.name, error = %e, "malformed pattern attribute");
                    false
                }
            };
            if !matched {
                return Err(ValidationErrorKind::Pattern {
                    pattern: pattern.to_string(),
                });
            }
        }
        Ok(())
    }

    fn format(&self, value: &Value, _property: &Property, _ctx: &TypeContext<'_>) -> String {
        match value {
            Value::Text(s) => s.clone(),
            _ => String::new(),
        }
    }

    fn parse(&self, raw: &str, _property: &Property) -> Result<Value, ValidationErrorKind> {
        Ok(Value::Text(raw.to_string()))
    }
}

// =========================================================================
// NUMBER
// =========================================================================

pub struct NumberHandler;

impl PropertyTypeHandler for NumberHandler {
    fn property_type(&self) -> PropertyType {
        PropertyType::Number
    }

    fn slot(&self) -> Option<StorageSlot> {
        Some(StorageSlot::Number)
    }

    fn validate(
        &self,
        value: &Value,
        property: &Property,
        _ctx: &TypeContext<'_>,
    ) -> Result<(), ValidationErrorKind> {
        match value {
            Value::Number(n) if n.is_finite() => check_bounds(*n, property),
            _ => Err(self.mismatch()),
        }
    }

    fn format(&self, value: &Value, property: &Property, _ctx: &TypeContext<'_>) -> String {
        let Value::Number(n) = value else {
            return String::new();
        };
        match property
            .attribute(attr::DECIMALS)
            .and_then(|d| d.trim().parse::<usize>().ok())
        {
            Some(decimals) => format!("{:.*}", decimals, n),
            None if n.fract() == 0.0 && n.abs() < 1e15 => format!("{:.0}", n),
            None => n.to_string(),
        }
    }

    fn parse(&self, raw: &str, _property: &Property) -> Result<Value, ValidationErrorKind> {
        raw.trim()
            .replace(',', "")
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Value::Number)
            .ok_or_else(|| self.mismatch())
    }
}

// =========================================================================
// DATE
// =========================================================================

pub struct DateHandler;

impl PropertyTypeHandler for DateHandler {
    fn property_type(&self) -> PropertyType {
        PropertyType::Date
    }

    fn slot(&self) -> Option<StorageSlot> {
        Some(StorageSlot::Date)
    }

    fn validate(
        &self,
        value: &Value,
        _property: &Property,
        _ctx: &TypeContext<'_>,
    ) -> Result<(), ValidationErrorKind> {
        match value {
            Value::Date(_) => Ok(()),
            _ => Err(self.mismatch()),
        }
    }

    fn format(&self, value: &Value, _property: &Property, _ctx: &TypeContext<'_>) -> String {
        match value {
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            _ => String::new(),
        }
    }

    fn parse(&self, raw: &str, _property: &Property) -> Result<Value, ValidationErrorKind> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Value::Date(dt.with_timezone(&Utc)));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Value::Date(dt.and_utc()))
            .ok_or_else(|| self.mismatch())
    }
}

// =========================================================================
// BOOLEAN
// =========================================================================

pub struct BooleanHandler;

impl PropertyTypeHandler for BooleanHandler {
    fn property_type(&self) -> PropertyType {
        PropertyType::Boolean
    }

    fn slot(&self) -> Option<StorageSlot> {
        Some(StorageSlot::Boolean)
    }

    fn validate(
        &self,
        value: &Value,
        _property: &Property,
        _ctx: &TypeContext<'_>,
    ) -> Result<(), ValidationErrorKind> {
        match value {
            Value::Boolean(_) => Ok(()),
            _ => Err(self.mismatch()),
        }
    }

    fn format(&self, value: &Value, _property: &Property, _ctx: &TypeContext<'_>) -> String {
        match value {
            Value::Boolean(true) => "Yes".to_string(),
            Value::Boolean(false) => "No".to_string(),
            _ => String::new(),
        }
    }

    fn parse(&self, raw: &str, _property: &Property) -> Result<Value, ValidationErrorKind> {
        match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(Value::Boolean(true)),
            "false" | "no" | "0" | "off" => Ok(Value::Boolean(false)),
            _ => Err(self.mismatch()),
        }
    }
}

// =========================================================================
// SELECT
// =========================================================================

pub struct SelectHandler;

impl PropertyTypeHandler for SelectHandler {
    fn property_type(&self) -> PropertyType {
        PropertyType::Select
    }

    fn slot(&self) -> Option<StorageSlot> {
        Some(StorageSlot::Id)
    }

    fn validate(
        &self,
        value: &Value,
        property: &Property,
        ctx: &TypeContext<'_>,
    ) -> Result<(), ValidationErrorKind> {
        let Value::OptionRef(option_id) = value else {
            return Err(self.mismatch());
        };
        let option = property
            .option(option_id)
            .ok_or(ValidationErrorKind::InvalidOption)?;

        // Dependent selects only accept options scoped to the parent's choice
        if property.parent_id.is_some() {
            if let Some(scope) = &option.parent_id {
                if ctx.parent_option != Some(scope) {
                    return Err(ValidationErrorKind::InvalidOption);
                }
            }
        }
        Ok(())
    }

    fn format(&self, value: &Value, property: &Property, _ctx: &TypeContext<'_>) -> String {
        value
            .as_option()
            .and_then(|id| property.option(id))
            .map(|o| o.label().to_string())
            .unwrap_or_else(|| UNRESOLVED.to_string())
    }

    fn parse(&self, raw: &str, property: &Property) -> Result<Value, ValidationErrorKind> {
        property
            .find_option(raw)
            .map(|o| Value::OptionRef(o.id.clone()))
            .ok_or(ValidationErrorKind::InvalidOption)
    }
}

// =========================================================================
// ENTITY
// =========================================================================

pub struct EntityHandler;

impl PropertyTypeHandler for EntityHandler {
    fn property_type(&self) -> PropertyType {
        PropertyType::Entity
    }

    fn slot(&self) -> Option<StorageSlot> {
        Some(StorageSlot::Id)
    }

    fn validate(
        &self,
        value: &Value,
        property: &Property,
        ctx: &TypeContext<'_>,
    ) -> Result<(), ValidationErrorKind> {
        let Value::RelationRef(row_id) = value else {
            return Err(self.mismatch());
        };
        match ctx.lookup.row(row_id) {
            Some(row) if relation_target_matches(row, property, ctx.tenant_id) => Ok(()),
            _ => Err(ValidationErrorKind::InvalidRelation),
        }
    }

    fn format(&self, value: &Value, property: &Property, ctx: &TypeContext<'_>) -> String {
        value
            .as_relation()
            .and_then(|id| ctx.lookup.row(id))
            .filter(|row| relation_target_matches(row, property, ctx.tenant_id))
            .map(|row| row.display_folio())
            .unwrap_or_else(|| UNRESOLVED.to_string())
    }

    fn parse(&self, raw: &str, _property: &Property) -> Result<Value, ValidationErrorKind> {
        raw.parse::<RowId>()
            .map(Value::RelationRef)
            .map_err(|_| ValidationErrorKind::InvalidRelation)
    }
}

// =========================================================================
// MEDIA
// =========================================================================

pub struct MediaHandler;

impl PropertyTypeHandler for MediaHandler {
    fn property_type(&self) -> PropertyType {
        PropertyType::Media
    }

    fn slot(&self) -> Option<StorageSlot> {
        Some(StorageSlot::Media)
    }

    fn validate(
        &self,
        value: &Value,
        property: &Property,
        _ctx: &TypeContext<'_>,
    ) -> Result<(), ValidationErrorKind> {
        let Value::MediaRefs(files) = value else {
            return Err(self.mismatch());
        };
        if files.iter().any(|f| f.file.trim().is_empty()) {
            return Err(self.mismatch());
        }
        // min/max bound the number of files
        check_bounds(files.len() as f64, property)
    }

    fn format(&self, value: &Value, _property: &Property, _ctx: &TypeContext<'_>) -> String {
        match value {
            Value::MediaRefs(files) => files
                .iter()
                .map(|f| f.title.as_deref().unwrap_or(&f.name))
                .collect::<Vec<_>>()
                .join(", "),
            _ => String::new(),
        }
    }

    fn parse(&self, raw: &str, _property: &Property) -> Result<Value, ValidationErrorKind> {
        let raw = raw.trim();
        if raw.starts_with('[') {
            return serde_json::from_str::<Vec<MediaRef>>(raw)
                .map(Value::MediaRefs)
                .map_err(|_| self.mismatch());
        }
        let files = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|file| {
                let name = file.rsplit('/').next().unwrap_or(file);
                MediaRef::new(name, file)
            })
            .collect();
        Ok(Value::MediaRefs(files))
    }

    fn from_json(
        &self,
        json: &serde_json::Value,
        property: &Property,
    ) -> Result<Value, ValidationErrorKind> {
        match json {
            serde_json::Value::Array(_) => serde_json::from_value::<Vec<MediaRef>>(json.clone())
                .map(Value::MediaRefs)
                .map_err(|_| self.mismatch()),
            serde_json::Value::String(s) => self.parse(s, property),
            _ => Err(self.mismatch()),
        }
    }
}

// =========================================================================
// USER / ROLE / FORMULA
// =========================================================================

/// Declared types that hold no stored values
pub struct UnsupportedHandler(pub PropertyType);

impl PropertyTypeHandler for UnsupportedHandler {
    fn property_type(&self) -> PropertyType {
        self.0
    }

    fn slot(&self) -> Option<StorageSlot> {
        None
    }

    fn validate(
        &self,
        _value: &Value,
        _property: &Property,
        _ctx: &TypeContext<'_>,
    ) -> Result<(), ValidationErrorKind> {
        Err(ValidationErrorKind::Unsupported)
    }

    fn format(&self, _value: &Value, _property: &Property, _ctx: &TypeContext<'_>) -> String {
        String::new()
    }

    fn parse(&self, _raw: &str, _property: &Property) -> Result<Value, ValidationErrorKind> {
        Err(ValidationErrorKind::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::{EntityId, OptionId, PropertyId};
    use crate::entities::property::{PropertyAttribute, PropertyOption};
    use crate::schema::validation::NoRows;

    fn property(ty: PropertyType, attributes: &[(&str, &str)]) -> Property {
        Property {
            id: PropertyId::new(),
            entity_id: EntityId::new(),
            parent_id: None,
            related_entity_id: None,
            order: 1,
            name: "field".to_string(),
            title: "Field".to_string(),
            property_type: ty,
            is_default: false,
            is_dynamic: true,
            is_required: false,
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
    fn test_text_length_bounds() {
        let prop = property(PropertyType::Text, &[("min", "2"), ("max", "4")]);
        let ctx = TypeContext::new(None, &NoRows);
        let h = TextHandler;
        assert_eq!(
            h.validate(&Value::Text("a".into()), &prop, &ctx),
            Err(ValidationErrorKind::Min { min: 2.0 })
        );
        assert!(h.validate(&Value::Text("abc".into()), &prop, &ctx).is_ok());
        assert_eq!(
            h.validate(&Value::Text("abcde".into()), &prop, &ctx),
            Err(ValidationErrorKind::Max { max: 4.0 })
        );
    }

    #[test]
    fn test_text_pattern_is_anchored() {
        let prop = property(PropertyType::Text, &[("pattern", "[A-Z]{3}")]);
        let ctx = TypeContext::new(None, &NoRows);
        assert!(TextHandler
            .validate(&Value::Text("ABC".into()), &prop, &ctx)
            .is_ok());
        assert!(matches!(
            TextHandler.validate(&Value::Text("xABCx".into()), &prop, &ctx),
            Err(ValidationErrorKind::Pattern { .. })
        ));
    }

    #[test]
    fn test_number_parse_and_format() {
        let prop = property(PropertyType::Number, &[]);
        let ctx = TypeContext::new(None, &NoRows);
        let h = NumberHandler;
        assert_eq!(h.parse("1,250", &prop).unwrap(), Value::Number(1250.0));
        assert!(h.parse("abc", &prop).is_err());
        assert!(h.parse("NaN", &prop).is_err());
        assert_eq!(h.format(&Value::Number(1250.0), &prop, &ctx), "1250");
        assert_eq!(h.format(&Value::Number(2.5), &prop, &ctx), "2.5");

        let money = property(PropertyType::Number, &[("decimals", "2")]);
        assert_eq!(h.format(&Value::Number(3.0), &money, &ctx), "3.00");
    }

    #[test]
    fn test_number_bounds() {
        let prop = property(PropertyType::Number, &[("min", "0")]);
        let ctx = TypeContext::new(None, &NoRows);
        assert_eq!(
            NumberHandler.validate(&Value::Number(-1.0), &prop, &ctx),
            Err(ValidationErrorKind::Min { min: 0.0 })
        );
        assert!(NumberHandler
            .validate(&Value::Number(f64::INFINITY), &prop, &ctx)
            .is_err());
    }

    #[test]
    fn test_date_parse_formats() {
        let prop = property(PropertyType::Date, &[]);
        let ctx = TypeContext::new(None, &NoRows);
        let d = DateHandler.parse("2024-03-01", &prop).unwrap();
        assert_eq!(DateHandler.format(&d, &prop, &ctx), "2024-03-01");
        let d = DateHandler.parse("2024-03-01T10:30:00Z", &prop).unwrap();
        assert_eq!(DateHandler.format(&d, &prop, &ctx), "2024-03-01");
        assert!(DateHandler.parse("March 1st", &prop).is_err());
    }

    #[test]
    fn test_boolean_parse() {
        let prop = property(PropertyType::Boolean, &[]);
        assert_eq!(BooleanHandler.parse("yes", &prop).unwrap(), Value::Boolean(true));
        assert_eq!(BooleanHandler.parse("OFF", &prop).unwrap(), Value::Boolean(false));
        assert!(BooleanHandler.parse("maybe", &prop).is_err());
    }

    #[test]
    fn test_select_requires_known_option() {
        let mut prop = property(PropertyType::Select, &[]);
        let draft = OptionId::new();
        prop.options.push(PropertyOption {
            id: draft.clone(),
            parent_id: None,
            order: 1,
            value: "draft".to_string(),
            name: Some("Draft".to_string()),
            color: None,
        });
        let ctx = TypeContext::new(None, &NoRows);
        assert!(SelectHandler
            .validate(&Value::OptionRef(draft.clone()), &prop, &ctx)
            .is_ok());
        assert_eq!(
            SelectHandler.validate(&Value::OptionRef(OptionId::new()), &prop, &ctx),
            Err(ValidationErrorKind::InvalidOption)
        );
        assert_eq!(
            SelectHandler.format(&Value::OptionRef(draft), &prop, &ctx),
            "Draft"
        );
        assert_eq!(
            SelectHandler.format(&Value::OptionRef(OptionId::new()), &prop, &ctx),
            UNRESOLVED
        );
    }

    #[test]
    fn test_select_dependent_scope() {
        let mut prop = property(PropertyType::Select, &[]);
        prop.parent_id = Some(PropertyId::new());
        let mexico = OptionId::new();
        let city = OptionId::new();
        prop.options.push(PropertyOption {
            id: city.clone(),
            parent_id: Some(mexico.clone()),
            order: 1,
            value: "monterrey".to_string(),
            name: None,
            color: None,
        });
        let other = OptionId::new();

        let in_scope = TypeContext::new(None, &NoRows).with_parent_option(Some(&mexico));
        let out_of_scope = TypeContext::new(None, &NoRows).with_parent_option(Some(&other));
        let value = Value::OptionRef(city);
        assert!(SelectHandler.validate(&value, &prop, &in_scope).is_ok());
        assert_eq!(
            SelectHandler.validate(&value, &prop, &out_of_scope),
            Err(ValidationErrorKind::InvalidOption)
        );
    }

    #[test]
    fn test_entity_reference_without_rows_is_invalid() {
        let mut prop = property(PropertyType::Entity, &[]);
        prop.related_entity_id = Some(EntityId::new());
        let tenant = TenantId::from("acme");
        let ctx = TypeContext::new(Some(&tenant), &NoRows);
        let value = Value::RelationRef(RowId::new());
        assert_eq!(
            EntityHandler.validate(&value, &prop, &ctx),
            Err(ValidationErrorKind::InvalidRelation)
        );
        assert_eq!(EntityHandler.format(&value, &prop, &ctx), UNRESOLVED);
    }

    #[test]
    fn test_media_parse_and_count_bounds() {
        let prop = property(PropertyType::Media, &[("max", "1")]);
        let ctx = TypeContext::new(None, &NoRows);
        let value = MediaHandler
            .parse("files/contract.pdf, files/annex.pdf", &prop)
            .unwrap();
        assert_eq!(MediaHandler.format(&value, &prop, &ctx), "contract.pdf, annex.pdf");
        assert_eq!(
            MediaHandler.validate(&value, &prop, &ctx),
            Err(ValidationErrorKind::Max { max: 1.0 })
        );
    }

    #[test]
    fn test_unsupported_types_reject_values() {
        let prop = property(PropertyType::Formula, &[]);
        let ctx = TypeContext::new(None, &NoRows);
        let h = UnsupportedHandler(PropertyType::Formula);
        assert_eq!(h.slot(), None);
        assert_eq!(h.parse("1+1", &prop), Err(ValidationErrorKind::Unsupported));
        assert_eq!(
            h.validate(&Value::Text("x".into()), &prop, &ctx),
            Err(ValidationErrorKind::Unsupported)
        );
    }

    #[test]
    fn test_json_conversion() {
        let prop = property(PropertyType::Number, &[]);
        let v = NumberHandler.from_json(&json!(12.5), &prop).unwrap();
        assert_eq!(v, Value::Number(12.5));
        assert_eq!(NumberHandler.to_json(&v, &prop), json!(12.5));
        assert!(NumberHandler.from_json(&json!([1]), &prop).is_err());
    }
}
