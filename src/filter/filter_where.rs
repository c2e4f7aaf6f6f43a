use bson::{Bson, Document};
use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::FilterOp;
use crate::dynamic::convert::{json_to_bson, number_to_bson, parse_date, parse_number, parse_object_id};
use crate::dynamic::{DynamicSchema, FieldType, RESTRICTED_FIELDS};

const REGEX_OPTIONS: &str = "imsx";

/// Builds a MongoDB filter document from client JSON. Only allowlisted
/// operators pass; operands on typed fields are cast to the field's type.
pub struct FilterWhere<'a> {
    schema: &'a DynamicSchema,
    max_depth: u32,
}

impl<'a> FilterWhere<'a> {
    pub fn new(schema: &'a DynamicSchema, max_depth: u32) -> Self {
        Self { schema, max_depth }
    }

    /// Parse the raw `filter` query parameter
    pub fn generate(raw: &str, schema: &'a DynamicSchema, max_depth: u32) -> Result<Document, FilterError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Document::new());
        }
        let parsed: Value = serde_json::from_str(raw).map_err(|_| FilterError::InvalidFormat)?;
        Self::new(schema, max_depth).build(&parsed)
    }

    pub fn build(&self, filter: &Value) -> Result<Document, FilterError> {
        match filter {
            Value::Null => Ok(Document::new()),
            Value::Object(map) => self.parse_where_data(map, 1),
            _ => Err(FilterError::InvalidFormat),
        }
    }

    fn check_depth(&self, depth: u32) -> Result<(), FilterError> {
        if depth > self.max_depth {
            return Err(FilterError::TooDeep(self.max_depth));
        }
        Ok(())
    }

    fn parse_where_data(&self, map: &Map<String, Value>, depth: u32) -> Result<Document, FilterError> {
        self.check_depth(depth)?;
        let mut out = Document::new();
        for (key, value) in map {
            if key.starts_with('$') {
                let op = FilterOp::parse(key).ok_or_else(|| FilterError::UnsupportedOperator(key.clone()))?;
                if !op.is_logical() {
                    return Err(FilterError::InvalidOperatorData(format!("{} must be applied to a field", key)));
                }
                out.insert(key.clone(), self.parse_logical_operator(key, value, depth)?);
            } else {
                out.insert(key.clone(), self.parse_field_condition(key, value, depth)?);
            }
        }
        Ok(out)
    }

    fn parse_logical_operator(&self, op: &str, value: &Value, depth: u32) -> Result<Bson, FilterError> {
        let branches = value
            .as_array()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires a non-empty array", op)))?;

        let mut parsed = Vec::with_capacity(branches.len());
        for branch in branches {
            let branch = branch
                .as_object()
                .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} entries must be objects", op)))?;
            parsed.push(Bson::Document(self.parse_where_data(branch, depth + 1)?));
        }
        Ok(Bson::Array(parsed))
    }

    fn parse_field_condition(&self, field: &str, value: &Value, depth: u32) -> Result<Bson, FilterError> {
        let root = field.split('.').next().unwrap_or(field);
        if RESTRICTED_FIELDS.contains(&root) {
            return Err(FilterError::SensitiveFilter(field.to_string()));
        }
        if field.is_empty() || field.split('.').any(|part| part.is_empty() || part.starts_with('$')) {
            return Err(FilterError::InvalidOperatorData(format!("invalid field path '{}'", field)));
        }

        let field_type = self.schema.type_of(field);
        match value {
            Value::Object(obj) if obj.keys().any(|k| k.starts_with('$')) => {
                self.parse_operators(field, field_type, obj, depth + 1).map(Bson::Document)
            }
            // Implicit equality: { field: value }
            _ => cast(field, field_type, value),
        }
    }

    fn parse_operators(
        &self,
        field: &str,
        field_type: Option<FieldType>,
        obj: &Map<String, Value>,
        depth: u32,
    ) -> Result<Document, FilterError> {
        self.check_depth(depth)?;
        let mut out = Document::new();
        for (key, operand) in obj {
            let op = FilterOp::parse(key).ok_or_else(|| FilterError::UnsupportedOperator(key.clone()))?;
            let value = match op {
                FilterOp::And | FilterOp::Or | FilterOp::NOr => {
                    return Err(FilterError::InvalidOperatorData(format!("{} cannot be applied to field '{}'", key, field)));
                }
                FilterOp::Eq | FilterOp::Ne | FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                    cast(field, field_type, operand)?
                }
                FilterOp::In | FilterOp::NIn => {
                    let items = operand
                        .as_array()
                        .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires an array", key)))?;
                    Bson::Array(items.iter().map(|v| cast(field, field_type, v)).collect::<Result<_, _>>()?)
                }
                FilterOp::Regex => match operand {
                    Value::String(pattern) => Bson::String(pattern.clone()),
                    _ => return Err(FilterError::InvalidOperatorData("$regex requires a string".to_string())),
                },
                FilterOp::Options => match operand {
                    Value::String(flags) if flags.chars().all(|c| REGEX_OPTIONS.contains(c)) => Bson::String(flags.clone()),
                    _ => return Err(FilterError::InvalidOperatorData("$options accepts the flags i, m, s and x".to_string())),
                },
                FilterOp::Exists => Bson::Boolean(truthy(operand)),
                FilterOp::Not => match operand {
                    Value::Object(inner) => Bson::Document(self.parse_operators(field, field_type, inner, depth + 1)?),
                    _ => return Err(FilterError::InvalidOperatorData("$not requires an operator object".to_string())),
                },
            };
            out.insert(op.as_str(), value);
        }
        Ok(out)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !matches!(s.trim().to_ascii_lowercase().as_str(), "" | "false" | "0" | "no"),
        Value::Null => false,
        _ => true,
    }
}

/// Cast an operand to the type declared for `field`. Untyped paths and
/// container types pass through structurally.
fn cast(field: &str, field_type: Option<FieldType>, value: &Value) -> Result<Bson, FilterError> {
    if value.is_null() {
        return Ok(Bson::Null);
    }
    let invalid = |expected| FilterError::InvalidValue {
        field: field.to_string(),
        expected,
    };
    match field_type {
        Some(FieldType::ObjectId) => parse_object_id(value)
            .map(Bson::ObjectId)
            .ok_or_else(|| invalid("an ObjectId")),
        Some(FieldType::Date) => parse_date(value)
            .map(Bson::DateTime)
            .ok_or_else(|| invalid("a date")),
        Some(FieldType::Number) => match value {
            Value::Number(n) => Ok(number_to_bson(n)),
            Value::String(s) => parse_number(s).ok_or_else(|| invalid("a number")),
            _ => Err(invalid("a number")),
        },
        Some(FieldType::Boolean) => match value {
            Value::Bool(b) => Ok(Bson::Boolean(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Bson::Boolean(true)),
                "false" | "0" | "no" => Ok(Bson::Boolean(false)),
                _ => Err(invalid("a boolean")),
            },
            _ => Err(invalid("a boolean")),
        },
        Some(FieldType::String) => match value {
            Value::Number(n) => Ok(Bson::String(n.to_string())),
            Value::Bool(b) => Ok(Bson::String(b.to_string())),
            _ => Ok(json_to_bson(value)),
        },
        _ => Ok(json_to_bson(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::FieldDefinition;
    use bson::{doc, oid::ObjectId};
    use serde_json::json;

    fn schema() -> DynamicSchema {
        let defs: Vec<FieldDefinition> = serde_json::from_value(json!([
            {"name": "name", "type": "string"},
            {"name": "age", "type": "number"},
            {"name": "active", "type": "boolean"},
            {"name": "born", "type": "date"},
            {"name": "owner", "type": "objectid", "ref": "users"},
            {"name": "tags", "type": "array"}
        ]))
        .unwrap();
        DynamicSchema::from_definitions("people", &defs).unwrap()
    }

    fn build(filter: &str) -> Result<Document, FilterError> {
        let schema = schema();
        FilterWhere::generate(filter, &schema, 5)
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(build("").unwrap(), Document::new());
        assert_eq!(build("{}").unwrap(), Document::new());
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert_eq!(build("{name:").unwrap_err(), FilterError::InvalidFormat);
        assert_eq!(build("[1,2]").unwrap_err(), FilterError::InvalidFormat);
        assert_eq!(
            FilterError::InvalidFormat.to_string(),
            "Invalid filter format. Must be a valid JSON string."
        );
    }

    #[test]
    fn implicit_equality_and_comparisons() {
        let filter = build(r#"{"name": "Ada", "age": {"$gte": "18", "$lt": 65}}"#).unwrap();
        assert_eq!(filter, doc! { "name": "Ada", "age": { "$gte": 18, "$lt": 65 } });
    }

    #[test]
    fn unsupported_operators() {
        let err = build(r#"{"$where": "this.a == 1"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported query operator in filter.");
        assert!(matches!(build(r#"{"name": {"$expr": 1}}"#), Err(FilterError::UnsupportedOperator(_))));
    }

    #[test]
    fn sensitive_fields_cannot_be_filtered() {
        let err = build(r#"{"password": "x"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Filtering on sensitive fields is not allowed.");
        assert!(matches!(
            build(r#"{"$or": [{"ssn": "1"}, {"name": "a"}]}"#),
            Err(FilterError::SensitiveFilter(_))
        ));
    }

    #[test]
    fn logical_operators_nest() {
        let filter = build(r#"{"$or": [{"name": "a"}, {"active": "true"}]}"#).unwrap();
        assert_eq!(filter, doc! { "$or": [{ "name": "a" }, { "active": true }] });
    }

    #[test]
    fn nesting_is_bounded() {
        let schema = schema();
        let deep = r#"{"$and": [{"$or": [{"$and": [{"name": "a"}]}]}]}"#;
        assert!(FilterWhere::generate(deep, &schema, 5).is_ok());
        assert_eq!(FilterWhere::generate(deep, &schema, 2).unwrap_err(), FilterError::TooDeep(2));
    }

    #[test]
    fn ids_and_dates_are_cast() {
        let id = ObjectId::new();
        let raw = format!(
            r#"{{"_id": {{"$in": ["{}"]}}, "owner": "{}", "born": {{"$gt": "2000-01-01"}}}}"#,
            id, id
        );
        let filter = build(&raw).unwrap();

        assert_eq!(filter.get_document("_id").unwrap().get_array("$in").unwrap()[0], Bson::ObjectId(id));
        assert_eq!(filter.get_object_id("owner").unwrap(), id);
        assert!(matches!(filter.get_document("born").unwrap().get("$gt"), Some(Bson::DateTime(_))));

        assert!(matches!(build(r#"{"owner": "nope"}"#), Err(FilterError::InvalidValue { .. })));
    }

    #[test]
    fn regex_and_exists() {
        let filter = build(r#"{"name": {"$regex": "^a", "$options": "i"}, "tags": {"$exists": true}}"#).unwrap();
        assert_eq!(
            filter,
            doc! { "name": { "$regex": "^a", "$options": "i" }, "tags": { "$exists": true } }
        );
        assert!(build(r#"{"name": {"$regex": "^a", "$options": "g"}}"#).is_err());
    }

    #[test]
    fn not_wraps_operators() {
        let filter = build(r#"{"age": {"$not": {"$gt": 5}}}"#).unwrap();
        assert_eq!(filter, doc! { "age": { "$not": { "$gt": 5 } } });
    }
}
