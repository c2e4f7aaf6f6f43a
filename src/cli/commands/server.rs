use clap::Subcommand;
use serde_json::json;

use crate::cli::client::ApiClient;
use crate::cli::config::{load_session, save_session};
use crate::cli::utils::{output_data, output_success};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ServerCommands {
    #[command(about = "Point the CLI at an API server")]
    Set {
        #[arg(help = "Server URL, e.g. http://localhost:8000")]
        url: String,
    },

    #[command(about = "Show the configured server")]
    Show,

    #[command(about = "Check server health status from the /health endpoint")]
    Health,
}

pub async fn handle(cmd: ServerCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ServerCommands::Set { url } => {
            let parsed = url::Url::parse(&url).map_err(|e| anyhow::anyhow!("Invalid server URL: {}", e))?;
            let mut session = load_session()?;
            session.server_url = parsed.as_str().trim_end_matches('/').to_string();
            // A token from another server is useless here
            session.logout();
            save_session(&session)?;
            output_success(
                output_format,
                &format!("Server set to {}", session.server_url),
                Some(json!({ "server_url": session.server_url })),
            )
        }
        ServerCommands::Show => {
            let session = load_session()?;
            let logged_in = session.active_token().is_some();
            match output_format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "server_url": session.server_url,
                        "email": session.email,
                        "logged_in": logged_in
                    }))?
                ),
                OutputFormat::Text => {
                    println!("Server: {}", session.server_url);
                    match (&session.email, logged_in) {
                        (Some(email), true) => println!("Logged in as {}", email),
                        _ => println!("Not logged in"),
                    }
                }
            }
            Ok(())
        }
        ServerCommands::Health => {
            let body = ApiClient::anonymous()?.get("/health", &[]).await?;
            output_data(output_format, &body)
        }
    }
}
