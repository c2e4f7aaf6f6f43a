use clap::Subcommand;

use crate::cli::client::ApiClient;
use crate::cli::utils::output_data;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum LogsCommands {
    #[command(about = "List request logs of your dynamic endpoints")]
    List {
        #[arg(long)]
        page: Option<i64>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long, help = "Substring of the endpoint path")]
        search: Option<String>,
        #[arg(long, help = "HTTP method")]
        method: Option<String>,
        #[arg(long, help = "Response status code")]
        status: Option<i32>,
    },

    #[command(about = "Request counts per method, endpoint and status")]
    Stats,
}

pub async fn handle(cmd: LogsCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = ApiClient::authenticated()?;
    match cmd {
        LogsCommands::List {
            page,
            limit,
            search,
            method,
            status,
        } => {
            let query: Vec<(&str, String)> = [
                ("page", page.map(|v| v.to_string())),
                ("limit", limit.map(|v| v.to_string())),
                ("search", search),
                ("method", method),
                ("status", status.map(|v| v.to_string())),
            ]
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect();
            output_data(output_format, &client.get("/api/v1/logs", &query).await?)
        }
        LogsCommands::Stats => output_data(output_format, &client.get("/api/v1/logs/stats", &[]).await?),
    }
}
