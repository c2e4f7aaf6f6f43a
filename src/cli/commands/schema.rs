use clap::Subcommand;
use serde_json::{json, Value};

use crate::cli::client::ApiClient;
use crate::cli::utils::{output_data, output_success, read_json_input};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum SchemaCommands {
    #[command(about = "Define a schema; field definitions are read from --file or stdin")]
    Create {
        #[arg(long, help = "Project name")]
        project: String,
        #[arg(long, help = "Schema (collection) name")]
        name: String,
        #[arg(long, help = "JSON file with the field definition array")]
        file: Option<String>,
    },

    #[command(about = "List schemas")]
    List {
        #[arg(long, help = "Only schemas of this project")]
        project: Option<String>,
    },

    #[command(about = "Show one schema")]
    Show {
        #[arg(help = "Schema id")]
        id: String,
    },

    #[command(about = "Delete a schema; stored documents are kept")]
    Delete {
        #[arg(help = "Schema id")]
        id: String,
    },
}

/// Accept either a bare field array or `{"fields": [...]}`
fn field_definitions(input: Value) -> anyhow::Result<Value> {
    match input {
        Value::Array(_) => Ok(input),
        Value::Object(mut map) => match map.remove("fields") {
            Some(fields @ Value::Array(_)) => Ok(fields),
            _ => anyhow::bail!("Expected a JSON array of field definitions"),
        },
        _ => anyhow::bail!("Expected a JSON array of field definitions"),
    }
}

pub async fn handle(cmd: SchemaCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = ApiClient::authenticated()?;
    match cmd {
        SchemaCommands::Create { project, name, file } => {
            let fields = field_definitions(read_json_input(file.as_deref())?)?;
            let body = client
                .post(
                    "/api/v1/schemas",
                    &json!({ "project": project, "name": name, "fields": fields }),
                )
                .await?;
            let url = body["data"]["url"].as_str().unwrap_or_default().to_string();
            if output_format == OutputFormat::Text {
                println!("✓ Created schema {} in project {}", name, project);
                println!("Endpoint: {}", url);
                return Ok(());
            }
            output_success(output_format, "Schema created", Some(body["data"].clone()))
        }
        SchemaCommands::List { project } => {
            let query: Vec<(&str, String)> = project.map(|p| ("project", p)).into_iter().collect();
            output_data(output_format, &client.get("/api/v1/schemas", &query).await?)
        }
        SchemaCommands::Show { id } => {
            output_data(output_format, &client.get(&format!("/api/v1/schemas/{}", id), &[]).await?)
        }
        SchemaCommands::Delete { id } => {
            client.delete(&format!("/api/v1/schemas/{}", id)).await?;
            output_success(output_format, &format!("Deleted schema {}", id), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_wrapped_and_bare_definitions() {
        let bare = json!([{"name": "title", "type": "string"}]);
        assert_eq!(field_definitions(bare.clone()).unwrap(), bare);
        assert_eq!(field_definitions(json!({"fields": bare.clone()})).unwrap(), bare);
        assert!(field_definitions(json!({"name": "x"})).is_err());
    }
}
