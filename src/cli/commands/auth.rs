use clap::Subcommand;
use serde_json::{json, Value};

use crate::cli::client::ApiClient;
use crate::cli::config::{load_session, save_session};
use crate::cli::utils::{output_data, output_success};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Create an account")]
    Register {
        #[arg(help = "Email")]
        email: String,
        #[arg(help = "Username")]
        username: String,
        #[arg(long, env = "DYNAVO_PASSWORD", hide_env_values = true, help = "Password")]
        password: String,
    },

    #[command(about = "Log in and store the session token")]
    Login {
        #[arg(help = "Email")]
        email: String,
        #[arg(long, env = "DYNAVO_PASSWORD", hide_env_values = true, help = "Password")]
        password: String,
    },

    #[command(about = "Show the logged in account")]
    Whoami,

    #[command(about = "Forget the stored session token")]
    Logout,

    #[command(about = "Show recent account activity")]
    Activity {
        #[arg(long, default_value_t = 20, help = "Number of entries")]
        limit: i64,
    },
}

pub async fn handle(cmd: AuthCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AuthCommands::Register {
            email,
            username,
            password,
        } => {
            let body = ApiClient::anonymous()?
                .post(
                    "/api/v1/users/register",
                    &json!({ "email": email, "username": username, "password": password }),
                )
                .await?;
            output_success(
                output_format,
                &format!("Registered {}. Run `dynavo auth login {}` next", email, email),
                Some(json!({ "user": body["data"] })),
            )
        }
        AuthCommands::Login { email, password } => {
            let body = ApiClient::anonymous()?
                .post("/api/v1/users/login", &json!({ "email": email, "password": password }))
                .await?;
            let data = &body["data"];
            let token = data["token"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Login response did not include a token"))?;

            let mut session = load_session()?;
            session.login(
                token.to_string(),
                data["user"]["email"].as_str().unwrap_or(email.as_str()).to_string(),
                data["expires_in"].as_i64().unwrap_or(0),
            );
            save_session(&session)?;
            output_success(
                output_format,
                &format!("Logged in as {}", email),
                Some(json!({ "user": data["user"], "expires_in": data["expires_in"] })),
            )
        }
        AuthCommands::Whoami => {
            let body = ApiClient::authenticated()?.get("/api/v1/users/me", &[]).await?;
            output_data(output_format, &body)
        }
        AuthCommands::Logout => {
            let mut session = load_session()?;
            session.logout();
            save_session(&session)?;
            output_success(output_format, "Logged out", None::<Value>)
        }
        AuthCommands::Activity { limit } => {
            let body = ApiClient::authenticated()?
                .get("/api/v1/users/me/activity", &[("limit", limit.to_string())])
                .await?;
            output_data(output_format, &body)
        }
    }
}
