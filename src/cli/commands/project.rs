use clap::Subcommand;
use serde_json::json;

use crate::cli::client::ApiClient;
use crate::cli::utils::{output_data, output_success};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ProjectCommands {
    #[command(about = "Register a MongoDB deployment as a project")]
    Create {
        #[arg(help = "Project name")]
        name: String,
        #[arg(long, help = "mongodb:// or mongodb+srv:// connection string")]
        uri: String,
    },

    #[command(about = "List projects")]
    List,

    #[command(about = "Show one project")]
    Show {
        #[arg(help = "Project name")]
        name: String,
    },

    #[command(about = "Delete a project with its schemas and permissions")]
    Delete {
        #[arg(help = "Project name")]
        name: String,
    },
}

pub async fn handle(cmd: ProjectCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = ApiClient::authenticated()?;
    match cmd {
        ProjectCommands::Create { name, uri } => {
            let body = client
                .post("/api/v1/projects", &json!({ "name": name, "connection_uri": uri }))
                .await?;
            output_success(
                output_format,
                &format!("Created project {}", name),
                Some(json!({ "project": body["data"] })),
            )
        }
        ProjectCommands::List => output_data(output_format, &client.get("/api/v1/projects", &[]).await?),
        ProjectCommands::Show { name } => {
            output_data(output_format, &client.get(&format!("/api/v1/projects/{}", name), &[]).await?)
        }
        ProjectCommands::Delete { name } => {
            client.delete(&format!("/api/v1/projects/{}", name)).await?;
            output_success(output_format, &format!("Deleted project {}", name), None)
        }
    }
}
