//! User notifications for pushed resource changes.

pub mod formatter;

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use issuetrack_core::error::{AppError, ErrorKind};
use issuetrack_core::events::{RESOURCE_CHANGED, ResourceChanged};
use issuetrack_core::result::AppResult;
use issuetrack_core::traits::notifier::Notifier;

use crate::dispatcher::{EventDispatcher, Subscription};

pub use formatter::NotificationFormatter;

/// Forwards `resource-changed` events to a [`Notifier`] while alive.
#[derive(Debug)]
pub struct ChangeNotifications {
    _subscription: Subscription,
}

impl ChangeNotifications {
    /// Subscribe to `resource-changed` on `dispatcher`.
    pub fn attach(dispatcher: &EventDispatcher, notifier: Arc<dyn Notifier>) -> Self {
        let forward = move |payload: &Value| -> AppResult<()> {
            let event = ResourceChanged::from_payload(payload).map_err(|e| {
                AppError::with_source(
                    ErrorKind::MalformedFrame,
                    "resource-changed payload does not match the event shape",
                    e,
                )
            })?;
            match NotificationFormatter::resource_changed(&event) {
                Some(notification) => notifier.notify(notification),
                None => debug!(kind = %event.resource_kind, "No notification for change"),
            }
            Ok(())
        };
        let subscription = dispatcher.subscribe(RESOURCE_CHANGED, forward);
        Self {
            _subscription: subscription,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use issuetrack_core::traits::notifier::{Notification, NotificationLevel};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Collect(Mutex<Vec<Notification>>);

    impl Notifier for Collect {
        fn notify(&self, notification: Notification) {
            self.0.lock().unwrap().push(notification);
        }
    }

    #[test]
    fn test_forwards_while_attached() {
        let dispatcher = EventDispatcher::new();
        let notifier = Arc::new(Collect::default());
        let attached = ChangeNotifications::attach(&dispatcher, notifier.clone());

        let payload = json!({
            "action": "created",
            "resourceKind": "issue",
            "resourceId": 4,
            "title": "Crash on save"
        });
        assert_eq!(dispatcher.publish(RESOURCE_CHANGED, &payload), 1);
        {
            let seen = notifier.0.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].level, NotificationLevel::Success);
            assert_eq!(seen[0].message, "New issue created: Crash on save");
        }

        drop(attached);
        assert_eq!(dispatcher.publish(RESOURCE_CHANGED, &payload), 0);
        assert_eq!(notifier.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_bad_payload_is_reported_to_dispatcher() {
        let dispatcher = EventDispatcher::new();
        let notifier = Arc::new(Collect::default());
        let _attached = ChangeNotifications::attach(&dispatcher, notifier.clone());

        assert_eq!(dispatcher.publish(RESOURCE_CHANGED, &json!({"nope": true})), 0);
        assert!(notifier.0.lock().unwrap().is_empty());
    }
}
