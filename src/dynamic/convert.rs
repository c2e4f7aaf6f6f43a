use bson::{oid::ObjectId, Bson, Document};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Number, Value};

use super::RESTRICTED_FIELDS;

/// Render a stored document as client JSON: ObjectIds as hex strings,
/// dates as RFC 3339 strings
pub fn document_to_json(doc: &Document) -> Value {
    let mut out = Map::with_capacity(doc.len());
    for (key, value) in doc {
        out.insert(key.clone(), bson_to_json(value));
    }
    Value::Object(out)
}

pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .map(Value::String)
            .unwrap_or_else(|_| Value::from(dt.timestamp_millis())),
        Bson::Document(doc) => document_to_json(doc),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Int32(i) => Value::from(*i),
        Bson::Int64(i) => Value::from(*i),
        Bson::Double(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Decimal128(d) => Value::String(d.to_string()),
        other => other.clone().into_relaxed_extjson(),
    }
}

/// Plain structural conversion; no schema-driven coercion
pub fn json_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => number_to_bson(n),
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(map_to_document(map)),
    }
}

pub fn map_to_document(map: &Map<String, Value>) -> Document {
    let mut doc = Document::new();
    for (key, value) in map {
        doc.insert(key.clone(), json_to_bson(value));
    }
    doc
}

pub fn number_to_bson(n: &Number) -> Bson {
    if let Some(i) = n.as_i64() {
        match i32::try_from(i) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(i),
        }
    } else {
        Bson::Double(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// Numeric string to the narrowest matching BSON number
pub fn parse_number(s: &str) -> Option<Bson> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(match i32::try_from(i) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(i),
        });
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite()).map(Bson::Double)
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DD` dates and epoch milliseconds
pub fn parse_date(value: &Value) -> Option<bson::DateTime> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(bson::DateTime::from_chrono(dt.with_timezone(&Utc)));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| bson::DateTime::from_chrono(naive.and_utc()))
        }
        Value::Number(n) => n.as_i64().map(bson::DateTime::from_millis),
        _ => None,
    }
}

pub fn parse_object_id(value: &Value) -> Option<ObjectId> {
    value.as_str().and_then(|s| ObjectId::parse_str(s.trim()).ok())
}

/// Remove fields that must never leave the server through a dynamic endpoint
pub fn strip_restricted(doc: &mut Document) {
    for field in RESTRICTED_FIELDS {
        doc.remove(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    #[test]
    fn renders_ids_and_dates_as_strings() {
        let oid = ObjectId::new();
        let when = bson::DateTime::from_millis(1_700_000_000_000);
        let rendered = document_to_json(&doc! {
            "_id": oid,
            "createdAt": when,
            "nested": { "count": 3_i64, "tags": ["a", "b"] },
            "price": 9.5,
        });

        assert_eq!(rendered["_id"], json!(oid.to_hex()));
        assert!(rendered["createdAt"].as_str().unwrap().starts_with("2023-11-14T22:13:20"));
        assert_eq!(rendered["nested"]["count"], json!(3));
        assert_eq!(rendered["nested"]["tags"], json!(["a", "b"]));
        assert_eq!(rendered["price"], json!(9.5));
    }

    #[test]
    fn numbers_keep_integer_width() {
        assert_eq!(json_to_bson(&json!(7)), Bson::Int32(7));
        assert_eq!(json_to_bson(&json!(10_000_000_000_i64)), Bson::Int64(10_000_000_000));
        assert_eq!(json_to_bson(&json!(1.25)), Bson::Double(1.25));
    }

    #[test]
    fn date_formats() {
        let expected = bson::DateTime::from_millis(1_704_067_200_000);
        assert_eq!(parse_date(&json!("2024-01-01")), Some(expected));
        assert_eq!(parse_date(&json!("2024-01-01T00:00:00Z")), Some(expected));
        assert_eq!(parse_date(&json!("2024-01-01T02:00:00+02:00")), Some(expected));
        assert_eq!(parse_date(&json!(1_704_067_200_000_i64)), Some(expected));
        assert_eq!(parse_date(&json!("yesterday")), None);
        assert_eq!(parse_date(&json!(true)), None);
    }

    #[test]
    fn restricted_fields_are_stripped() {
        let mut d = doc! { "name": "a", "password": "x", "ssn": "y", "creditCardNumber": "z" };
        strip_restricted(&mut d);
        assert_eq!(d, doc! { "name": "a" });
    }
}
