//! Notification text for resource changes.

use issuetrack_core::events::{ChangeAction, ResourceChanged};
use issuetrack_core::traits::notifier::Notification;

/// Formats notifications for pushed events.
pub struct NotificationFormatter;

impl NotificationFormatter {
    /// The notification for a `resource-changed` event, if it warrants one.
    ///
    /// Events without a resource id and without a title carry nothing a
    /// user could act on and produce no notification.
    pub fn resource_changed(event: &ResourceChanged) -> Option<Notification> {
        let label = label_for(&event.resource_kind);
        let subject = match (event.title(), &event.resource_id) {
            (Some(title), _) => title.to_string(),
            (None, Some(id)) => format!("#{id}"),
            (None, None) => return None,
        };

        let notification = match event.action {
            ChangeAction::Created => {
                Notification::success(format!("New {} created: {subject}", label.to_lowercase()))
            }
            ChangeAction::Updated => Notification::info(format!("{label} updated: {subject}")),
            ChangeAction::Deleted => {
                // A deleted resource is referred to by id; its title may be gone.
                let subject = event
                    .resource_id
                    .as_ref()
                    .map(|id| format!("#{id}"))
                    .unwrap_or(subject);
                Notification::info(format!("{label} deleted: {subject}"))
            }
        };
        Some(notification)
    }
}

/// `"issue"` → `"Issue"`.
fn label_for(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Resource".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use issuetrack_core::traits::notifier::NotificationLevel;
    use serde_json::json;

    #[test]
    fn test_issue_messages() {
        let created = ResourceChanged::new(ChangeAction::Created, "issue", Some(3u64.into()))
            .with_field("issue", json!({"id": 3, "title": "Login page broken"}));
        let n = NotificationFormatter::resource_changed(&created).unwrap();
        assert_eq!(n.level, NotificationLevel::Success);
        assert_eq!(n.message, "New issue created: Login page broken");

        let updated = ResourceChanged::new(ChangeAction::Updated, "issue", Some(3u64.into()))
            .with_field("title", json!("Login page broken"));
        let n = NotificationFormatter::resource_changed(&updated).unwrap();
        assert_eq!(n.level, NotificationLevel::Info);
        assert_eq!(n.message, "Issue updated: Login page broken");

        let deleted = ResourceChanged::new(ChangeAction::Deleted, "issue", Some(3u64.into()))
            .with_field("title", json!("Login page broken"));
        let n = NotificationFormatter::resource_changed(&deleted).unwrap();
        assert_eq!(n.message, "Issue deleted: #3");
    }

    #[test]
    fn test_untitled_and_other_kinds() {
        let event = ResourceChanged::new(ChangeAction::Updated, "user", Some(9u64.into()));
        let n = NotificationFormatter::resource_changed(&event).unwrap();
        assert_eq!(n.message, "User updated: #9");

        let anonymous = ResourceChanged::new(ChangeAction::Created, "issue", None);
        assert!(NotificationFormatter::resource_changed(&anonymous).is_none());
    }
}
