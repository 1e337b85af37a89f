//! The `{type, data}` envelope.

use serde::Deserialize;
use serde_json::Value;

use issuetrack_core::error::{AppError, ErrorKind};
use issuetrack_core::events::{RESOURCE_CHANGED, ResourceChanged};
use issuetrack_core::result::AppResult;

use super::legacy;

/// A parsed push frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Frame {
    /// Frame type; becomes the dispatch topic.
    #[serde(rename = "type")]
    pub kind: String,
    /// Frame payload.
    #[serde(default)]
    pub data: Value,
}

/// A frame ready for the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Topic to publish on.
    pub topic: String,
    /// Payload handed to subscribers.
    pub payload: Value,
}

impl Frame {
    /// Parse raw frame text.
    pub fn parse(text: &str) -> AppResult<Self> {
        serde_json::from_str(text).map_err(|e| {
            AppError::with_source(
                ErrorKind::MalformedFrame,
                "Push frame is not a {type, data} envelope",
                e,
            )
        })
    }

    /// Turn the frame into a dispatch.
    ///
    /// `resource-changed` payloads are validated; legacy `issue_update`
    /// frames are rewritten into `resource-changed`. Frames of any other
    /// type are passed through under their own topic.
    pub fn into_dispatch(self) -> AppResult<Dispatch> {
        match self.kind.as_str() {
            RESOURCE_CHANGED => {
                ResourceChanged::from_payload(&self.data).map_err(|e| {
                    AppError::with_source(
                        ErrorKind::MalformedFrame,
                        "resource-changed frame carries an invalid payload",
                        e,
                    )
                })?;
                Ok(Dispatch {
                    topic: self.kind,
                    payload: self.data,
                })
            }
            legacy::ISSUE_UPDATE => {
                let event = legacy::normalise_issue_update(&self.data)?;
                Ok(Dispatch {
                    topic: RESOURCE_CHANGED.to_string(),
                    payload: serde_json::to_value(event)?,
                })
            }
            _ => Ok(Dispatch {
                topic: self.kind,
                payload: self.data,
            }),
        }
    }
}
