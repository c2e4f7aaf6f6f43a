use serde_json::{json, Value};
use std::io::Read;

use crate::cli::OutputFormat;

/// Output a success message, merging `data` into the JSON form
pub fn output_success(output_format: OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({ "success": true, "message": message });
            if let (Some(Value::Object(extra)), Some(target)) = (data, response.as_object_mut()) {
                target.extend(extra);
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => println!("✓ {}", message),
    }
    Ok(())
}

/// Print the `data` member of an API envelope
pub fn output_data(output_format: OutputFormat, body: &Value) -> anyhow::Result<()> {
    let data = body.get("data").unwrap_or(body);
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(body)?),
        OutputFormat::Text => match data {
            Value::Array(items) if items.is_empty() => println!("(none)"),
            Value::Array(items) => {
                for item in items {
                    println!("{}", summarize(item));
                }
                if let Some(p) = body.get("pagination") {
                    println!(
                        "-- page {} of {} ({} total)",
                        p["current_page"], p["total_pages"], p["total_records"]
                    );
                }
            }
            Value::Object(_) => println!("{}", serde_json::to_string_pretty(data)?),
            other => println!("{}", other),
        },
    }
    Ok(())
}

/// One-line rendering of a list item
pub fn summarize(item: &Value) -> String {
    let Some(map) = item.as_object() else {
        return item.to_string();
    };
    let id = map
        .get("_id")
        .or_else(|| map.get("id"))
        .map(plain)
        .unwrap_or_default();
    let rest: Vec<String> = map
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), "_id" | "id"))
        .take(4)
        .map(|(k, v)| format!("{}={}", k, plain(v)))
        .collect();
    format!("{}  {}", id, rest.join("  ")).trim().to_string()
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JSON from a file, or from stdin when no path is given
pub fn read_json_input(path: Option<&str>) -> anyhow::Result<Value> {
    let content = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Invalid JSON input: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_lead_with_the_id() {
        let line = summarize(&json!({"_id": "65a1", "name": "Ada"}));
        assert_eq!(line, "65a1  name=Ada");
        assert_eq!(summarize(&json!("plain")), "\"plain\"");
    }
}
