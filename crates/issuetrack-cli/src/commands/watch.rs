//! Tail push events.

use serde_json::Value;
use tokio::sync::watch;

use issuetrack_client::Client;
use issuetrack_core::error::AppError;
use issuetrack_core::events::{RESOURCE_CHANGED, ResourceChanged};
use issuetrack_core::result::AppResult;
use issuetrack_realtime::ConnectionState;

use crate::output;

/// Print `resource-changed` events and connection changes until Ctrl+C
pub async fn execute(client: &Client) -> Result<(), AppError> {
    super::require_session(client).await?;

    let print_change = |payload: &Value| -> AppResult<()> {
        let event = ResourceChanged::from_payload(payload)?;
        let id = event
            .resource_id
            .as_ref()
            .map(|id| format!(" #{}", id))
            .unwrap_or_default();
        let title = event.title().map(|t| format!(" {}", t)).unwrap_or_default();
        println!("{} {}{}{}", event.action, event.resource_kind, id, title);
        Ok(())
    };
    let _events = client.dispatcher().subscribe(RESOURCE_CHANGED, print_change);

    client.start();
    output::print_success("Watching for changes, press Ctrl+C to stop");

    let mut states = client.realtime().state_changes();
    let result = tokio::select! {
        result = tokio::signal::ctrl_c() => result
            .map_err(|e| AppError::internal(format!("Failed to listen for Ctrl+C: {}", e))),
        () = report_states(&mut states) => Ok(()),
    };

    client.shutdown().await;
    result
}

async fn report_states(states: &mut watch::Receiver<ConnectionState>) {
    while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        match state {
            ConnectionState::Connected => output::print_success("Connected"),
            ConnectionState::Reconnecting => {
                output::print_warning("Connection lost, reconnecting")
            }
            ConnectionState::Disconnected => output::print_warning("Disconnected"),
            ConnectionState::Connecting => {}
        }
    }
}
