use bson::{oid::ObjectId, Bson, Document};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use super::convert::{bson_to_json, json_to_bson, map_to_document, number_to_bson, parse_date, parse_number};
use super::definition::{DynamicSchema, FieldSpec, FieldType};
use crate::crypto::{CryptoError, Sealer};
use crate::types::Operation;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Request body must be a JSON object")]
    NotAnObject,

    #[error("Invalid fields: {}. Allowed fields: {}", invalid.join(", "), allowed.join(", "))]
    UnknownFields { invalid: Vec<String>, allowed: Vec<String> },

    #[error("Validation Error")]
    Invalid(BTreeMap<String, String>),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Coerced values ready to write, plus the schema fields a full replacement
/// clears because the payload omitted them
#[derive(Debug, Default)]
pub struct ValidatedPayload {
    pub set: Document,
    pub unset: Vec<String>,
}

/// Validate and coerce a request body against the schema.
///
/// Create and Replace require every required field; Patch only validates the
/// fields present but refuses to clear a required one. Secure fields are
/// sealed after they pass validation.
pub fn validate_payload(
    schema: &DynamicSchema,
    payload: &Value,
    operation: Operation,
    server_sealer: &Sealer,
) -> Result<ValidatedPayload, PayloadError> {
    let body = check_known_fields(schema, payload)?;

    let full_document = matches!(operation, Operation::Create | Operation::Replace);
    let mut out = ValidatedPayload::default();
    let mut errors = BTreeMap::new();

    for field in schema.fields() {
        let value = body.get(&field.name);

        if is_blank(value) {
            let present = value.is_some();
            if field.required && (full_document || present) {
                errors.insert(field.name.clone(), format!("{} is required", field.name));
                continue;
            }
            match value {
                Some(_) => {
                    out.set.insert(field.name.clone(), Bson::Null);
                }
                None if operation == Operation::Replace => out.unset.push(field.name.clone()),
                None => {}
            }
            continue;
        }

        // Not blank, so present
        let Some(value) = value else { continue };
        match check_field(field, value) {
            Ok(coerced) => {
                out.set.insert(field.name.clone(), coerced);
            }
            Err(message) => {
                errors.insert(field.name.clone(), message);
            }
        }
    }

    if !errors.is_empty() {
        return Err(PayloadError::Invalid(errors));
    }

    seal_secure_fields(schema, &mut out.set, server_sealer)?;
    Ok(out)
}

/// The body as an object whose keys are all declared by the schema
pub fn check_known_fields<'a>(schema: &DynamicSchema, payload: &'a Value) -> Result<&'a Map<String, Value>, PayloadError> {
    let body = payload.as_object().ok_or(PayloadError::NotAnObject)?;

    let mut invalid: Vec<String> = body
        .keys()
        .filter(|key| schema.field(key).is_none())
        .cloned()
        .collect();
    invalid.sort();
    if !invalid.is_empty() {
        return Err(PayloadError::UnknownFields {
            invalid,
            allowed: schema.field_names().into_iter().map(String::from).collect(),
        });
    }
    Ok(body)
}

/// Missing, null and the empty string all count as "no value".
/// Whitespace is a value.
fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

fn check_field(field: &FieldSpec, value: &Value) -> Result<Bson, String> {
    let coerced = coerce(field, value)?;

    if !field.enum_values.is_empty() && !field.enum_values.contains(&bson_to_json(&coerced)) {
        let allowed: Vec<String> = field
            .enum_values
            .iter()
            .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
            .collect();
        return Err(format!("{} must be one of: {}", field.name, allowed.join(", ")));
    }

    if let (Some(pattern), Bson::String(s)) = (&field.pattern, &coerced) {
        if !pattern.is_match(s) {
            return Err(field
                .message
                .clone()
                .unwrap_or_else(|| format!("{} does not match the required format", field.name)));
        }
    }

    Ok(coerced)
}

fn coerce(field: &FieldSpec, value: &Value) -> Result<Bson, String> {
    let name = &field.name;
    match field.field_type {
        FieldType::String => match value {
            Value::String(s) => Ok(Bson::String(s.clone())),
            Value::Number(n) => Ok(Bson::String(n.to_string())),
            Value::Bool(b) => Ok(Bson::String(b.to_string())),
            _ => Err(format!("{} must be a string", name)),
        },
        FieldType::Number => match value {
            Value::Number(n) => Ok(number_to_bson(n)),
            Value::String(s) => parse_number(s).ok_or_else(|| format!("{} must be a number", name)),
            _ => Err(format!("{} must be a number", name)),
        },
        FieldType::Boolean => match value {
            Value::Bool(b) => Ok(Bson::Boolean(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Bson::Boolean(true)),
                "false" | "0" | "no" => Ok(Bson::Boolean(false)),
                _ => Err(format!("{} must be a boolean", name)),
            },
            Value::Number(n) => match n.as_i64() {
                Some(1) => Ok(Bson::Boolean(true)),
                Some(0) => Ok(Bson::Boolean(false)),
                _ => Err(format!("{} must be a boolean", name)),
            },
            _ => Err(format!("{} must be a boolean", name)),
        },
        FieldType::Date => parse_date(value)
            .map(Bson::DateTime)
            .ok_or_else(|| format!("{} must be a valid date", name)),
        FieldType::ObjectId => value
            .as_str()
            .and_then(|s| ObjectId::parse_str(s.trim()).ok())
            .map(Bson::ObjectId)
            .ok_or_else(|| format!("{} must be a valid ObjectId", name)),
        FieldType::Array => match value {
            Value::Array(_) => Ok(json_to_bson(value)),
            _ => Err(format!("{} must be an array", name)),
        },
        FieldType::Object => match value {
            Value::Object(map) => Ok(Bson::Document(map_to_document(map))),
            _ => Err(format!("{} must be an object", name)),
        },
        FieldType::Mixed => Ok(json_to_bson(value)),
    }
}

fn seal_secure_fields(schema: &DynamicSchema, set: &mut Document, server_sealer: &Sealer) -> Result<(), CryptoError> {
    for field in schema.fields().iter().filter(|f| f.secure) {
        let Some(Bson::String(plain)) = set.get(&field.name) else {
            continue;
        };
        let sealed = match &field.secret_key {
            Some(key) => Sealer::new(key)?.seal(plain)?,
            None => server_sealer.seal(plain)?,
        };
        set.insert(field.name.clone(), Bson::String(sealed));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::FieldDefinition;
    use serde_json::json;

    fn schema() -> DynamicSchema {
        let defs: Vec<FieldDefinition> = serde_json::from_value(json!([
            {"name": "email", "type": "string", "required": true, "match": "^[^@]+@[^@]+$", "message": "Please provide a valid email"},
            {"name": "age", "type": "number"},
            {"name": "active", "type": "boolean"},
            {"name": "joined", "type": "date"},
            {"name": "tier", "type": "string", "enum": ["free", "pro"]},
            {"name": "card", "type": "string", "secure": true, "secretKey": "card-key"},
            {"name": "pin", "type": "string", "secure": true},
            {"name": "manager", "type": "objectid", "ref": "staff"},
            {"name": "tags", "type": "array"},
            {"name": "extra", "type": "mixed"}
        ]))
        .unwrap();
        DynamicSchema::from_definitions("members", &defs).unwrap()
    }

    fn sealer() -> Sealer {
        Sealer::new("server-key").unwrap()
    }

    fn field_errors(result: Result<ValidatedPayload, PayloadError>) -> BTreeMap<String, String> {
        match result {
            Err(PayloadError::Invalid(errors)) => errors,
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn rejects_non_objects_and_unknown_fields() {
        let s = schema();
        assert!(matches!(
            validate_payload(&s, &json!([1, 2]), Operation::Create, &sealer()),
            Err(PayloadError::NotAnObject)
        ));

        let err = validate_payload(&s, &json!({"email": "a@b", "nickname": "x", "_id": "1"}), Operation::Create, &sealer())
            .unwrap_err();
        match err {
            PayloadError::UnknownFields { invalid, allowed } => {
                assert_eq!(invalid, vec!["_id".to_string(), "nickname".to_string()]);
                assert!(allowed.contains(&"email".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn create_requires_required_fields() {
        let errors = field_errors(validate_payload(&schema(), &json!({"age": 3}), Operation::Create, &sealer()));
        assert_eq!(errors["email"], "email is required");

        let errors = field_errors(validate_payload(&schema(), &json!({"email": ""}), Operation::Create, &sealer()));
        assert_eq!(errors["email"], "email is required");
    }

    #[test]
    fn whitespace_is_kept_as_a_value() {
        let defs: Vec<FieldDefinition> = serde_json::from_value(json!([
            {"name": "title", "type": "string", "required": true},
            {"name": "note", "type": "string"}
        ]))
        .unwrap();
        let notes = DynamicSchema::from_definitions("notes", &defs).unwrap();
        let out = validate_payload(&notes, &json!({"title": "  ", "note": "   "}), Operation::Create, &sealer()).unwrap();
        assert_eq!(out.set.get("title"), Some(&Bson::String("  ".to_string())));
        assert_eq!(out.set.get("note"), Some(&Bson::String("   ".to_string())));
    }

    #[test]
    fn patch_validates_only_present_fields() {
        let out = validate_payload(&schema(), &json!({"age": "41"}), Operation::Patch, &sealer()).unwrap();
        assert_eq!(out.set.get("age"), Some(&Bson::Int32(41)));
        assert!(out.set.get("email").is_none());

        let errors = field_errors(validate_payload(&schema(), &json!({"email": null}), Operation::Patch, &sealer()));
        assert_eq!(errors["email"], "email is required");
    }

    #[test]
    fn replace_unsets_omitted_optional_fields() {
        let out = validate_payload(&schema(), &json!({"email": "a@b", "age": null}), Operation::Replace, &sealer()).unwrap();
        assert_eq!(out.set.get("age"), Some(&Bson::Null));
        assert!(out.unset.contains(&"active".to_string()));
        assert!(!out.unset.contains(&"age".to_string()));
        assert!(!out.unset.contains(&"email".to_string()));
    }

    #[test]
    fn coerces_like_mongoose() {
        let out = validate_payload(
            &schema(),
            &json!({
                "email": "a@b",
                "age": "12.5",
                "active": "yes",
                "joined": "2024-02-29",
                "manager": "65a1f0c2e4b0a1b2c3d4e5f6",
                "tags": ["x"],
                "extra": {"any": [1, "thing"]}
            }),
            Operation::Create,
            &sealer(),
        )
        .unwrap();

        assert_eq!(out.set.get("age"), Some(&Bson::Double(12.5)));
        assert_eq!(out.set.get("active"), Some(&Bson::Boolean(true)));
        assert!(matches!(out.set.get("joined"), Some(Bson::DateTime(_))));
        assert!(matches!(out.set.get("manager"), Some(Bson::ObjectId(_))));
        assert!(matches!(out.set.get("extra"), Some(Bson::Document(_))));
    }

    #[test]
    fn collects_every_type_error() {
        let errors = field_errors(validate_payload(
            &schema(),
            &json!({
                "email": "a@b",
                "age": "old",
                "active": "maybe",
                "joined": "someday",
                "manager": "not-an-id",
                "tags": "x"
            }),
            Operation::Create,
            &sealer(),
        ));

        assert_eq!(errors["age"], "age must be a number");
        assert_eq!(errors["active"], "active must be a boolean");
        assert_eq!(errors["joined"], "joined must be a valid date");
        assert_eq!(errors["manager"], "manager must be a valid ObjectId");
        assert_eq!(errors["tags"], "tags must be an array");
    }

    #[test]
    fn enum_and_pattern_checks() {
        let errors = field_errors(validate_payload(
            &schema(),
            &json!({"email": "nope", "tier": "gold"}),
            Operation::Create,
            &sealer(),
        ));
        assert_eq!(errors["email"], "Please provide a valid email");
        assert_eq!(errors["tier"], "tier must be one of: free, pro");
    }

    #[test]
    fn secure_fields_are_sealed_after_validation() {
        let server = sealer();
        let out = validate_payload(
            &schema(),
            &json!({"email": "a@b", "card": "4111", "pin": "1234"}),
            Operation::Create,
            &server,
        )
        .unwrap();

        let card = out.set.get_str("card").unwrap();
        let pin = out.set.get_str("pin").unwrap();
        assert_eq!(Sealer::new("card-key").unwrap().open(card).unwrap(), "4111");
        assert_eq!(server.open(pin).unwrap(), "1234");
        assert!(server.open(card).is_err());
    }
}
