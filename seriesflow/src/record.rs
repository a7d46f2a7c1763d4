//! Loosely-typed attribute records.
//!
//! A record is the storage form of one pipeline node: an ordered mapping of
//! field name to JSON value, with two reserved keys identifying the node.
//! Records are schema-free at this layer; shape is enforced only when a
//! stage kind consumes a field through one of the validating accessors.
//!
//! The mutators exist for the serializer: records obtained from a parsed
//! document are read-only by convention.

use crate::duration::{format_duration, parse_duration};
use crate::errors::AssemblyError;
use crate::expr::Expression;
use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Reserved key holding the discriminator tag.
pub const TYPE_OF_KEY: &str = "typeOf";
/// Reserved key holding the string-encoded node id.
pub const ID_KEY: &str = "id";

/// Describes a JSON value's runtime shape for diagnostics.
#[must_use]
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// An ordered, type-tagged mapping of field name to loosely-typed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeRecord(Map<String, Value>);

impl AttributeRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the field exists.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Returns the raw field value.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::MissingField`] if the field is absent.
    pub fn field(&self, field: &str) -> Result<&Value, AssemblyError> {
        self.0
            .get(field)
            .ok_or_else(|| AssemblyError::missing_field(field))
    }

    /// Reads the field as a string.
    ///
    /// # Errors
    ///
    /// Fails if the field is absent or not a string.
    pub fn string(&self, field: &str) -> Result<&str, AssemblyError> {
        let value = self.field(field)?;
        value
            .as_str()
            .ok_or_else(|| AssemblyError::type_mismatch(field, "string", value_kind(value)))
    }

    /// Reads the field as an integer.
    ///
    /// A numeric value carrying a fractional component is rejected rather
    /// than truncated.
    ///
    /// # Errors
    ///
    /// Fails if the field is absent, non-numeric, or fractional.
    pub fn integer(&self, field: &str) -> Result<i64, AssemblyError> {
        let value = self.field(field)?;
        value
            .as_i64()
            .ok_or_else(|| AssemblyError::type_mismatch(field, "integer", value_kind(value)))
    }

    /// Reads the field as a floating point number; integral values are
    /// accepted.
    ///
    /// # Errors
    ///
    /// Fails if the field is absent or non-numeric.
    pub fn float(&self, field: &str) -> Result<f64, AssemblyError> {
        let value = self.field(field)?;
        value
            .as_f64()
            .ok_or_else(|| AssemblyError::type_mismatch(field, "floating point", value_kind(value)))
    }

    /// Reads the field as a boolean.
    ///
    /// # Errors
    ///
    /// Fails if the field is absent or not a boolean.
    pub fn boolean(&self, field: &str) -> Result<bool, AssemblyError> {
        let value = self.field(field)?;
        value
            .as_bool()
            .ok_or_else(|| AssemblyError::type_mismatch(field, "boolean", value_kind(value)))
    }

    /// Reads the field as an array of strings.
    ///
    /// # Errors
    ///
    /// Fails if the field is absent, not an array, or holds a non-string
    /// element.
    pub fn string_list(&self, field: &str) -> Result<Vec<String>, AssemblyError> {
        let value = self.field(field)?;
        let items = value
            .as_array()
            .ok_or_else(|| AssemblyError::type_mismatch(field, "string array", value_kind(value)))?;
        items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    AssemblyError::type_mismatch(field, "string array", value_kind(item))
                })
            })
            .collect()
    }

    /// Reads the field as a duration literal.
    ///
    /// # Errors
    ///
    /// Fails if the field is absent, not a string, or does not match the
    /// duration grammar.
    pub fn duration(&self, field: &str) -> Result<Duration, AssemblyError> {
        let literal = self.string(field)?;
        parse_duration(literal)
            .map_err(|err| AssemblyError::type_mismatch(field, "duration string", err.literal))
    }

    /// Reads the field as an expression tree.
    ///
    /// An absent or null field yields `Ok(None)` so optional predicates are
    /// distinguishable from malformed ones.
    ///
    /// # Errors
    ///
    /// Fails if a present field is not an expression object.
    pub fn expression(&self, field: &str) -> Result<Option<Expression>, AssemblyError> {
        let Some(value) = self.0.get(field) else {
            return Ok(None);
        };
        if value.is_null() {
            return Ok(None);
        }
        Expression::from_value(value.clone())
            .map(Some)
            .ok_or_else(|| {
                AssemblyError::type_mismatch(field, "expression object", value_kind(value))
            })
    }

    /// Returns the discriminator tag.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::MissingField`] if the record is untagged.
    pub fn type_of(&self) -> Result<&str, AssemblyError> {
        self.string(TYPE_OF_KEY)
    }

    /// Returns the node id.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::MalformedId`] if the stored id string does
    /// not parse as a non-negative integer, or [`AssemblyError::MissingField`]
    /// if absent.
    pub fn id(&self) -> Result<NodeId, AssemblyError> {
        self.string(ID_KEY)?.parse()
    }

    /// Sets the discriminator tag.
    pub fn set_type(&mut self, type_of: impl Into<String>) -> &mut Self {
        self.0.insert(TYPE_OF_KEY.to_string(), Value::String(type_of.into()));
        self
    }

    /// Sets the node id in its string wire form.
    pub fn set_id(&mut self, id: NodeId) -> &mut Self {
        self.0.insert(ID_KEY.to_string(), Value::String(id.to_string()));
        self
    }

    /// Sets an arbitrary field.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Sets a duration field in its literal wire form.
    pub fn set_duration(&mut self, field: impl Into<String>, value: Duration) -> &mut Self {
        self.set(field, format_duration(value))
    }
}

impl FromIterator<(String, Value)> for AttributeRecord {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> AttributeRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_field() {
        let rec = record(json!({}));
        assert!(matches!(
            rec.field("period"),
            Err(AssemblyError::MissingField { .. })
        ));
    }

    #[test]
    fn test_string_accessor() {
        let rec = record(json!({"endpoint": "out", "count": 3}));
        assert_eq!(rec.string("endpoint").unwrap(), "out");
        assert!(matches!(
            rec.string("count"),
            Err(AssemblyError::FieldTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_integer_rejects_fractional() {
        let rec = record(json!({"count": 3, "ratio": 3.5}));
        assert_eq!(rec.integer("count").unwrap(), 3);
        assert!(matches!(
            rec.integer("ratio"),
            Err(AssemblyError::FieldTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_float_accepts_integral() {
        let rec = record(json!({"count": 3, "ratio": 3.5}));
        assert!((rec.float("ratio").unwrap() - 3.5).abs() < f64::EPSILON);
        assert!((rec.float("count").unwrap() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_boolean_rejects_string() {
        let rec = record(json!({"align": true, "other": "true"}));
        assert!(rec.boolean("align").unwrap());
        assert!(matches!(
            rec.boolean("other"),
            Err(AssemblyError::FieldTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_string_list() {
        let rec = record(json!({"dimensions": ["host", "region"], "mixed": ["host", 3]}));
        assert_eq!(rec.string_list("dimensions").unwrap(), vec!["host", "region"]);
        assert!(rec.string_list("mixed").is_err());
    }

    #[test]
    fn test_duration_parse_failure_is_type_mismatch() {
        let rec = record(json!({"period": "10s", "bad": "soon"}));
        assert_eq!(rec.duration("period").unwrap(), Duration::from_secs(10));
        match rec.duration("bad") {
            Err(AssemblyError::FieldTypeMismatch {
                field,
                expected,
                actual,
            }) => {
                assert_eq!(field, "bad");
                assert_eq!(expected, "duration string");
                assert_eq!(actual, "soon");
            }
            other => panic!("expected FieldTypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_expression_absent_is_none() {
        let rec = record(json!({"lambda": {"op": ">"}, "nulled": null, "bad": "x > 1"}));
        assert!(rec.expression("lambda").unwrap().is_some());
        assert!(rec.expression("nulled").unwrap().is_none());
        assert!(rec.expression("missing").unwrap().is_none());
        assert!(rec.expression("bad").is_err());
    }

    #[test]
    fn test_reserved_accessors() {
        let rec = record(json!({"typeOf": "window", "id": "2"}));
        assert_eq!(rec.type_of().unwrap(), "window");
        assert_eq!(rec.id().unwrap(), NodeId::new(2));

        let untagged = record(json!({"id": "2"}));
        assert!(matches!(
            untagged.type_of(),
            Err(AssemblyError::MissingField { .. })
        ));

        let bad_id = record(json!({"typeOf": "window", "id": "2.5"}));
        assert!(matches!(
            bad_id.id(),
            Err(AssemblyError::MalformedId { .. })
        ));
    }

    #[test]
    fn test_mutators_write_wire_forms() {
        let mut rec = AttributeRecord::new();
        rec.set_type("window")
            .set_id(NodeId::new(7))
            .set("align", true)
            .set_duration("period", Duration::from_secs(600));

        assert_eq!(
            serde_json::to_value(&rec).unwrap(),
            json!({"typeOf": "window", "id": "7", "align": true, "period": "10m"})
        );
    }
}
