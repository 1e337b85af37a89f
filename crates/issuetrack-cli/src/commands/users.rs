//! User management CLI commands.

use clap::{Args, Subcommand};
use dialoguer::Password;
use serde::Serialize;
use tabled::Tabled;

use issuetrack_auth::UserProfile;
use issuetrack_client::Client;
use issuetrack_client::api::NewUser;
use issuetrack_core::error::AppError;

use crate::output::{self, OutputFormat};

/// Arguments for user commands
#[derive(Debug, Args)]
pub struct UsersArgs {
    /// User subcommand
    #[command(subcommand)]
    pub command: UserCommand,
}

/// User subcommands
#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// List all users
    List {
        /// Filter by role
        #[arg(short, long)]
        role: Option<String>,
    },
    /// Create a user; the password is prompted for
    Create {
        /// Email
        #[arg(short, long)]
        email: String,
        /// Username
        #[arg(short, long)]
        username: String,
        /// Role (admin, maintainer, reporter)
        #[arg(short, long, default_value = "reporter")]
        role: String,
    },
    /// Delete a user
    Delete {
        /// User ID
        id: u64,
    },
}

/// User display row for table output
#[derive(Debug, Serialize, Tabled)]
struct UserRow {
    id: u64,
    username: String,
    email: String,
    role: String,
}

impl From<&UserProfile> for UserRow {
    fn from(user: &UserProfile) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Execute user commands
pub async fn execute(
    client: &Client,
    args: &UsersArgs,
    format: OutputFormat,
) -> Result<(), AppError> {
    super::require_session(client).await?;
    let users = client.users();

    match &args.command {
        UserCommand::List { role } => {
            let rows: Vec<UserRow> = users
                .list()
                .await?
                .iter()
                .filter(|u| role.is_none() || u.role.as_deref() == role.as_deref())
                .map(UserRow::from)
                .collect();
            output::print_list(&rows, format);
        }
        UserCommand::Create {
            email,
            username,
            role,
        } => {
            let password = Password::new()
                .with_prompt("Password")
                .with_confirmation("Repeat password", "Passwords do not match")
                .interact()
                .map_err(|e| AppError::client(format!("Failed to read password: {}", e)))?;
            let user = users
                .create(&NewUser {
                    email: email.clone(),
                    username: username.clone(),
                    password,
                    role: role.clone(),
                })
                .await?;
            output::print_success(&format!("User '{}' created (ID {})", user.username, user.id));
        }
        UserCommand::Delete { id } => {
            users.delete(*id).await?;
            output::print_success(&format!("User {} deleted", id));
        }
    }

    Ok(())
}
