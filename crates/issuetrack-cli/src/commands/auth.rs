//! Login, logout and whoami.

use clap::Args;
use dialoguer::{Input, Password};

use issuetrack_client::Client;
use issuetrack_core::error::AppError;

use crate::output::{self, OutputFormat};

/// Arguments for `login`
#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Account email; prompted for when omitted
    #[arg(short, long)]
    pub username: Option<String>,
}

/// Log in interactively and persist the session
pub async fn login(client: &Client, args: &LoginArgs) -> Result<(), AppError> {
    let username = match &args.username {
        Some(username) => username.clone(),
        None => Input::<String>::new()
            .with_prompt("Email")
            .interact_text()
            .map_err(|e| AppError::client(format!("Failed to read email: {}", e)))?,
    };
    let password = Password::new()
        .with_prompt("Password")
        .interact()
        .map_err(|e| AppError::client(format!("Failed to read password: {}", e)))?;

    let session = client.login(&username, &password).await?;
    let who = session
        .user
        .as_ref()
        .map(|u| u.username.clone())
        .unwrap_or(username);
    output::print_success(&format!("Logged in as {}", who));
    Ok(())
}

/// Forget the saved session
pub async fn logout(client: &Client) -> Result<(), AppError> {
    client.restore().await?;
    if client.logout().await {
        output::print_success("Logged out");
    } else {
        output::print_warning("Not logged in");
    }
    Ok(())
}

/// Show the signed-in user
pub async fn whoami(client: &Client, format: OutputFormat) -> Result<(), AppError> {
    super::require_session(client).await?;
    let user = client.users().me().await?;
    output::print_item(
        &user,
        &[
            ("ID", user.id.to_string()),
            ("Username", user.username.clone()),
            ("Email", user.email.clone()),
            ("Role", user.role.clone().unwrap_or_else(|| "-".to_string())),
        ],
        format,
    );
    Ok(())
}
