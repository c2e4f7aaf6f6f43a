use clap::Subcommand;
use serde_json::json;

use crate::cli::client::ApiClient;
use crate::cli::utils::{output_data, output_success, read_json_input};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum DataCommands {
    #[command(about = "List documents")]
    List {
        #[arg(help = "Endpoint URL printed by `schema create`")]
        endpoint: String,
        #[arg(long, help = "JSON filter, e.g. '{\"age\":{\"$gte\":18}}'")]
        filter: Option<String>,
        #[arg(long, help = "Comma separated fields to return")]
        select: Option<String>,
        #[arg(long, help = "Sort, e.g. -createdAt,name")]
        sort: Option<String>,
        #[arg(long)]
        page: Option<u64>,
        #[arg(long)]
        limit: Option<u64>,
    },

    #[command(about = "Fetch one document")]
    Get {
        endpoint: String,
        #[arg(help = "Document id")]
        id: String,
    },

    #[command(about = "Create a document from --file or stdin")]
    Create {
        endpoint: String,
        #[arg(long)]
        file: Option<String>,
    },

    #[command(about = "Replace a document (or --patch it) from --file or stdin")]
    Update {
        endpoint: String,
        id: String,
        #[arg(long, help = "Only change the fields given")]
        patch: bool,
        #[arg(long)]
        file: Option<String>,
    },

    #[command(about = "Delete a document")]
    Delete { endpoint: String, id: String },
}

fn document_url(endpoint: &str, id: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), id)
}

fn list_query(
    filter: Option<String>,
    select: Option<String>,
    sort: Option<String>,
    page: Option<u64>,
    limit: Option<u64>,
) -> Vec<(&'static str, String)> {
    [
        ("filter", filter),
        ("select", select),
        ("sort", sort),
        ("page", page.map(|p| p.to_string())),
        ("limit", limit.map(|l| l.to_string())),
    ]
    .into_iter()
    .filter_map(|(k, v)| v.map(|v| (k, v)))
    .collect()
}

pub async fn handle(cmd: DataCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    // The access token in the endpoint URL is the credential
    let client = ApiClient::anonymous()?;
    match cmd {
        DataCommands::List {
            endpoint,
            filter,
            select,
            sort,
            page,
            limit,
        } => {
            let query = list_query(filter, select, sort, page, limit);
            output_data(output_format, &client.get(&endpoint, &query).await?)
        }
        DataCommands::Get { endpoint, id } => {
            output_data(output_format, &client.get(&document_url(&endpoint, &id), &[]).await?)
        }
        DataCommands::Create { endpoint, file } => {
            let body = client.post(&endpoint, &read_json_input(file.as_deref())?).await?;
            output_data(output_format, &body)
        }
        DataCommands::Update {
            endpoint,
            id,
            patch,
            file,
        } => {
            let input = read_json_input(file.as_deref())?;
            let url = document_url(&endpoint, &id);
            let body = if patch {
                client.patch(&url, &input).await?
            } else {
                client.put(&url, &input).await?
            };
            output_data(output_format, &body)
        }
        DataCommands::Delete { endpoint, id } => {
            client.delete(&document_url(&endpoint, &id)).await?;
            output_success(output_format, &format!("Deleted {}", id), Some(json!({ "deleted_id": id })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_urls_append_the_id() {
        assert_eq!(
            document_url("http://h/api/v1/dynamic/o/p/t/", "65a1"),
            "http://h/api/v1/dynamic/o/p/t/65a1"
        );
    }

    #[test]
    fn list_query_skips_missing_parameters() {
        let query = list_query(None, Some("name".to_string()), None, Some(2), None);
        assert_eq!(query, vec![("select", "name".to_string()), ("page", "2".to_string())]);
    }
}
