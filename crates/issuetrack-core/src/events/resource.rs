//! `resource-changed` event payload.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// What happened to the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// The resource was created.
    Created,
    /// The resource was modified.
    Updated,
    /// The resource was removed.
    Deleted,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Identifier of a server resource.
///
/// The server sends numeric primary keys, other producers may send
/// strings; both normalise to the same textual form so they can be
/// compared with cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl ResourceId {
    /// Create an identifier from its textual form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.parse::<u64>() {
            Ok(n) => serializer.serialize_u64(n),
            Err(_) => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n.to_string())),
            Raw::Text(s) if !s.is_empty() => Ok(Self(s)),
            Raw::Text(_) => Err(serde::de::Error::custom("empty resource id")),
        }
    }
}

/// Payload of a `resource-changed` push event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChanged {
    /// What happened.
    pub action: ChangeAction,
    /// Resource kind, e.g. `"issue"`.
    pub resource_kind: String,
    /// Affected resource, when the producer names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceId>,
    /// Any additional fields (for example the serialized resource).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ResourceChanged {
    /// Create an event without extra fields.
    pub fn new(
        action: ChangeAction,
        resource_kind: impl Into<String>,
        resource_id: Option<ResourceId>,
    ) -> Self {
        Self {
            action,
            resource_kind: resource_kind.into(),
            resource_id,
            fields: Map::new(),
        }
    }

    /// Attach an extra field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Parse from a dispatched payload.
    pub fn from_payload(payload: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(payload)
    }

    /// Best-effort human title of the affected resource, looked up in the
    /// extra fields (`title`, or `title` inside a nested object named after
    /// the kind).
    pub fn title(&self) -> Option<&str> {
        if let Some(Value::String(title)) = self.fields.get("title") {
            return Some(title);
        }
        self.fields
            .get(&self.resource_kind)
            .and_then(|nested| nested.get("title"))
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_numeric_id_and_extra_fields() {
        let payload = json!({
            "action": "updated",
            "resourceKind": "issue",
            "resourceId": 7,
            "title": "Login page broken",
            "status": "open"
        });
        let event = ResourceChanged::from_payload(&payload).unwrap();
        assert_eq!(event.action, ChangeAction::Updated);
        assert_eq!(event.resource_kind, "issue");
        assert_eq!(event.resource_id, Some(ResourceId::from(7)));
        assert_eq!(event.title(), Some("Login page broken"));
        assert_eq!(event.fields.get("status"), Some(&json!("open")));
    }

    #[test]
    fn test_string_and_numeric_ids_compare_equal() {
        let a: ResourceId = serde_json::from_value(json!(42)).unwrap();
        let b: ResourceId = serde_json::from_value(json!("42")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_id_is_allowed() {
        let payload = json!({"action": "created", "resourceKind": "user"});
        let event = ResourceChanged::from_payload(&payload).unwrap();
        assert!(event.resource_id.is_none());
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let payload = json!({"action": "archived", "resourceKind": "issue"});
        assert!(ResourceChanged::from_payload(&payload).is_err());
    }
}
