//! Field-level type conversions between the internal and external shapes.
//!
//! The external store keeps foreign-key-style references as decimal strings
//! while the application works with native integers; boolean flags arrive in
//! assorted truthy/falsy spellings. Each conversion is a pure bidirectional
//! pair, total on its declared domain: null maps to null in both directions
//! and an empty external string parses to null rather than erroring.

use std::collections::HashMap;

use serde_json::Value;

use super::schema::EntityKind;

/// A field value that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field `{field}`: cannot convert {value}: {reason}")]
pub struct ConversionError {
    pub field: String,
    pub value: String,
    pub reason: String,
}

impl ConversionError {
    fn new(field: &str, value: &Value, reason: &str) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// The conversion kinds the external schema requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Integer internally, decimal string externally.
    IntString,
    /// Boolean internally, normalized from 0/1/"true"/"false" spellings.
    Boolean,
}

impl Conversion {
    /// Convert an internal value to its external representation.
    pub fn to_external(&self, field: &str, value: &Value) -> Result<Value, ConversionError> {
        match self {
            Conversion::IntString => match value {
                Value::Null => Ok(Value::Null),
                Value::Number(n) => n
                    .as_i64()
                    .map(|i| Value::String(i.to_string()))
                    .ok_or_else(|| ConversionError::new(field, value, "expected an integer")),
                // Already in external form; leave untouched.
                Value::String(s) => Ok(Value::String(s.clone())),
                other => Err(ConversionError::new(
                    field,
                    other,
                    "expected an integer or null",
                )),
            },
            Conversion::Boolean => normalize_bool(field, value),
        }
    }

    /// Convert an external value back to its internal representation.
    pub fn from_external(&self, field: &str, value: &Value) -> Result<Value, ConversionError> {
        match self {
            Conversion::IntString => match value {
                Value::Null => Ok(Value::Null),
                Value::String(s) if s.is_empty() => Ok(Value::Null),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| ConversionError::new(field, value, "expected an integer-like string")),
                // The hand-managed schema holds some of these columns as
                // numerics; accept them as-is.
                Value::Number(n) => n
                    .as_i64()
                    .map(Value::from)
                    .ok_or_else(|| ConversionError::new(field, value, "expected an integer")),
                other => Err(ConversionError::new(
                    field,
                    other,
                    "expected an integer-like string or null",
                )),
            },
            Conversion::Boolean => normalize_bool(field, value),
        }
    }
}

fn normalize_bool(field: &str, value: &Value) -> Result<Value, ConversionError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "" | "0" | "false" | "f" | "no" => Ok(Value::Bool(false)),
            "1" | "true" | "t" | "yes" => Ok(Value::Bool(true)),
            _ => Err(ConversionError::new(
                field,
                value,
                "unrecognized boolean spelling",
            )),
        },
        other => Err(ConversionError::new(field, other, "expected a boolean")),
    }
}

/// Per-entity and global field conversion rules.
///
/// Entity-specific rules take precedence over global rules; a field with no
/// rule converts by identity.
#[derive(Debug, Clone, Default)]
pub struct FieldMapper {
    entity_rules: HashMap<(EntityKind, String), Conversion>,
    global_rules: HashMap<String, Conversion>,
}

impl FieldMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// The conversion registry for the Mobilize external schema.
    pub fn standard() -> Self {
        Self::new()
            .with_entity_rule(EntityKind::Person, "user_id", Conversion::IntString)
            .with_entity_rule(EntityKind::Church, "user_id", Conversion::IntString)
            .with_entity_rule(EntityKind::Communication, "user_id", Conversion::IntString)
            .with_global_rule("office_id", Conversion::IntString)
            .with_global_rule("person_id", Conversion::IntString)
            .with_global_rule("church_id", Conversion::IntString)
            .with_global_rule("assigned_to_id", Conversion::IntString)
            .with_global_rule("created_by_id", Conversion::IntString)
            .with_global_rule("completed", Conversion::Boolean)
    }

    pub fn with_entity_rule(mut self, kind: EntityKind, field: &str, conversion: Conversion) -> Self {
        self.entity_rules.insert((kind, field.to_string()), conversion);
        self
    }

    pub fn with_global_rule(mut self, field: &str, conversion: Conversion) -> Self {
        self.global_rules.insert(field.to_string(), conversion);
        self
    }

    fn rule_for(&self, kind: EntityKind, field: &str) -> Option<Conversion> {
        self.entity_rules
            .get(&(kind, field.to_string()))
            .or_else(|| self.global_rules.get(field))
            .copied()
    }

    /// Convert an internal field value to the external shape.
    pub fn to_external(
        &self,
        kind: EntityKind,
        field: &str,
        value: &Value,
    ) -> Result<Value, ConversionError> {
        match self.rule_for(kind, field) {
            Some(rule) => rule.to_external(field, value),
            None => Ok(value.clone()),
        }
    }

    /// Convert an external field value to the internal shape.
    pub fn from_external(
        &self,
        kind: EntityKind,
        field: &str,
        value: &Value,
    ) -> Result<Value, ConversionError> {
        match self.rule_for(kind, field) {
            Some(rule) => rule.from_external(field, value),
            None => Ok(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_id_round_trip() {
        let mapper = FieldMapper::standard();

        let external = mapper
            .to_external(EntityKind::Person, "user_id", &json!(5))
            .unwrap();
        assert_eq!(external, json!("5"));

        let internal = mapper
            .from_external(EntityKind::Person, "user_id", &json!("5"))
            .unwrap();
        assert_eq!(internal, json!(5));
    }

    #[test]
    fn test_empty_string_parses_to_null() {
        let mapper = FieldMapper::standard();
        let internal = mapper
            .from_external(EntityKind::Person, "user_id", &json!(""))
            .unwrap();
        assert_eq!(internal, Value::Null);
    }

    #[test]
    fn test_null_maps_to_null_both_directions() {
        let mapper = FieldMapper::standard();
        assert_eq!(
            mapper
                .to_external(EntityKind::Person, "user_id", &Value::Null)
                .unwrap(),
            Value::Null
        );
        assert_eq!(
            mapper
                .from_external(EntityKind::Person, "user_id", &Value::Null)
                .unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_non_numeric_string_reports_typed_error() {
        let mapper = FieldMapper::standard();
        let err = mapper
            .from_external(EntityKind::Person, "user_id", &json!("abc"))
            .unwrap_err();
        assert_eq!(err.field, "user_id");
        assert!(err.value.contains("abc"));
    }

    #[test]
    fn test_unmapped_field_is_identity() {
        let mapper = FieldMapper::standard();
        let value = json!("Nairobi");
        assert_eq!(
            mapper
                .to_external(EntityKind::Person, "city", &value)
                .unwrap(),
            value
        );
        assert_eq!(
            mapper
                .from_external(EntityKind::Person, "city", &value)
                .unwrap(),
            value
        );
    }

    #[test]
    fn test_entity_rule_takes_precedence_over_global() {
        let mapper = FieldMapper::new()
            .with_global_rule("flagged", Conversion::IntString)
            .with_entity_rule(EntityKind::Person, "flagged", Conversion::Boolean);

        // Entity-specific rule wins for Person.
        assert_eq!(
            mapper
                .from_external(EntityKind::Person, "flagged", &json!("1"))
                .unwrap(),
            json!(true)
        );
        // Other kinds fall back to the global rule.
        assert_eq!(
            mapper
                .from_external(EntityKind::Task, "flagged", &json!("1"))
                .unwrap(),
            json!(1)
        );
    }

    #[test]
    fn test_every_reference_field_serializes_as_string() {
        use super::super::schema::descriptor;

        let mapper = FieldMapper::standard();
        for kind in [
            EntityKind::Person,
            EntityKind::Church,
            EntityKind::Task,
            EntityKind::Communication,
        ] {
            let desc = descriptor(kind);
            for field in desc.reference_fields {
                assert_eq!(
                    mapper.to_external(kind, field, &json!(5)).unwrap(),
                    json!("5"),
                    "reference field {}.{} must have a string rule",
                    desc.name,
                    field
                );
            }
        }
    }

    #[test]
    fn test_boolean_normalization() {
        let mapper = FieldMapper::standard();
        for truthy in [json!(true), json!(1), json!("true"), json!("t"), json!("1")] {
            assert_eq!(
                mapper
                    .from_external(EntityKind::Task, "completed", &truthy)
                    .unwrap(),
                json!(true),
                "expected {truthy} to normalize to true"
            );
        }
        for falsy in [json!(false), json!(0), json!("false"), json!("f"), json!("")] {
            assert_eq!(
                mapper
                    .from_external(EntityKind::Task, "completed", &falsy)
                    .unwrap(),
                json!(false),
                "expected {falsy} to normalize to false"
            );
        }
        assert!(mapper
            .from_external(EntityKind::Task, "completed", &json!("maybe"))
            .is_err());
    }
}
