//! CLI command definitions and dispatch.

pub mod auth;
pub mod dashboard;
pub mod issues;
pub mod users;
pub mod watch;

use clap::{Parser, Subcommand};

use issuetrack_client::Client;
use issuetrack_core::config::AppConfig;
use issuetrack_core::error::AppError;

use crate::output::OutputFormat;

/// IssueTrack command-line client
#[derive(Debug, Parser)]
#[command(name = "issuetrack", version, about, long_about = None)]
pub struct Cli {
    /// Base configuration file (extension optional)
    #[arg(short, long, default_value = "config/default")]
    pub config: String,

    /// Configuration environment overlay, `config/{env}.toml`
    #[arg(short, long, default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Log in and save the session
    Login(auth::LoginArgs),
    /// Log out and forget the saved session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Issue management
    Issues(issues::IssuesArgs),
    /// User management
    Users(users::UsersArgs),
    /// Issue statistics
    Dashboard(dashboard::DashboardArgs),
    /// Follow push events until interrupted
    Watch,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let client = self.client()?;
        match &self.command {
            Commands::Login(args) => auth::login(&client, args).await,
            Commands::Logout => auth::logout(&client).await,
            Commands::Whoami => auth::whoami(&client, self.format).await,
            Commands::Issues(args) => issues::execute(&client, args, self.format).await,
            Commands::Users(args) => users::execute(&client, args, self.format).await,
            Commands::Dashboard(args) => dashboard::execute(&client, args, self.format).await,
            Commands::Watch => watch::execute(&client).await,
        }
    }

    fn client(&self) -> Result<Client, AppError> {
        let config = AppConfig::load_from(&self.config, &self.env)?;
        Client::from_config(config)
    }
}

/// Helper: restore the saved session or fail with a hint to log in
pub async fn require_session(client: &Client) -> Result<(), AppError> {
    match client.restore().await? {
        Some(_) => Ok(()),
        None => Err(AppError::unauthenticated(
            "Not logged in. Run `issuetrack login` first.",
        )),
    }
}
