//! Topic-based fan-out of push events.
//!
//! The dispatcher holds handlers weakly. The [`Subscription`] returned by
//! [`EventDispatcher::subscribe`] owns the handler; dropping it (or calling
//! [`Subscription::unsubscribe`]) removes the registration, so a
//! subscriber's resources are never kept alive by the dispatcher.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, warn};

use issuetrack_core::result::AppResult;

/// Receives payloads published on a topic.
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one payload. Errors are logged and do not affect other
    /// handlers.
    fn handle(&self, payload: &Value) -> AppResult<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&Value) -> AppResult<()> + Send + Sync + 'static,
{
    fn handle(&self, payload: &Value) -> AppResult<()> {
        self(payload)
    }
}

struct Registration {
    id: u64,
    handler: Weak<dyn EventHandler>,
}

#[derive(Default)]
struct DispatcherInner {
    /// Topic → registrations in subscription order.
    topics: DashMap<String, Vec<Registration>>,
    next_id: AtomicU64,
}

impl DispatcherInner {
    fn remove(&self, topic: &str, id: u64) {
        let emptied = match self.topics.get_mut(topic) {
            Some(mut registrations) => {
                registrations.retain(|r| r.id != id);
                registrations.is_empty()
            }
            None => false,
        };
        if emptied {
            self.topics.remove_if(topic, |_, registrations| registrations.is_empty());
        }
    }
}

/// Fans published payloads out to the handlers of a topic.
///
/// Cheap to clone; clones share registrations.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("topics", &self.inner.topics.len())
            .finish()
    }
}

impl EventDispatcher {
    /// Create a dispatcher with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`. The handler stays registered while
    /// the returned [`Subscription`] is alive.
    pub fn subscribe(&self, topic: impl Into<String>, handler: impl EventHandler) -> Subscription {
        let topic = topic.into();
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .topics
            .entry(topic.clone())
            .or_default()
            .push(Registration {
                id,
                handler: Arc::downgrade(&handler),
            });
        debug!(topic = %topic, id, "Subscribed");

        Subscription {
            topic,
            id,
            handler: Some(handler),
            dispatcher: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every handler currently registered for `topic`, in
    /// registration order, on the calling task. A handler that fails or
    /// panics is logged and skipped. Returns the number of handlers that
    /// completed successfully.
    pub fn publish(&self, topic: &str, payload: &Value) -> usize {
        // Snapshot first so handlers may subscribe or unsubscribe freely.
        let handlers: Vec<Arc<dyn EventHandler>> = match self.inner.topics.get_mut(topic) {
            Some(mut registrations) => {
                registrations.retain(|r| r.handler.strong_count() > 0);
                registrations
                    .iter()
                    .filter_map(|r| r.handler.upgrade())
                    .collect()
            }
            None => Vec::new(),
        };

        let mut delivered = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(payload))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!(topic, error = %e, "Event handler failed"),
                Err(_) => warn!(topic, "Event handler panicked"),
            }
        }
        delivered
    }

    /// Number of live handlers for `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map(|registrations| {
                registrations
                    .iter()
                    .filter(|r| r.handler.strong_count() > 0)
                    .count()
            })
            .unwrap_or(0)
    }
}

/// A live registration. Dropping it unsubscribes.
pub struct Subscription {
    topic: String,
    id: u64,
    handler: Option<Arc<dyn EventHandler>>,
    dispatcher: Weak<DispatcherInner>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish()
    }
}

impl Subscription {
    /// The subscribed topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove the registration now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.handler.take().is_none() {
            return;
        }
        if let Some(inner) = self.dispatcher.upgrade() {
            inner.remove(&self.topic, self.id);
            debug!(topic = %self.topic, id = self.id, "Unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use issuetrack_core::error::AppError;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> impl EventHandler {
        let log = log.clone();
        move |payload: &Value| -> AppResult<()> {
            log.lock().unwrap().push(format!("{name}:{payload}"));
            Ok(())
        }
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = dispatcher.subscribe("resource-changed", recorder(&log, "a"));
        let _b = dispatcher.subscribe("resource-changed", recorder(&log, "b"));
        let _other = dispatcher.subscribe("presence", recorder(&log, "other"));

        assert_eq!(dispatcher.publish("resource-changed", &json!(1)), 2);
        assert_eq!(*log.lock().unwrap(), vec!["a:1", "b:1"]);
    }

    #[test]
    fn test_failing_and_panicking_handlers_do_not_block_others() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _fails = dispatcher.subscribe("t", |_: &Value| -> AppResult<()> {
            Err(AppError::internal("boom"))
        });
        let _panics = dispatcher.subscribe("t", |_: &Value| -> AppResult<()> {
            panic!("handler bug")
        });
        let _ok = dispatcher.subscribe("t", recorder(&log, "ok"));

        assert_eq!(dispatcher.publish("t", &json!("x")), 1);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sub = dispatcher.subscribe("t", recorder(&log, "a"));
        let explicit = dispatcher.subscribe("t", recorder(&log, "b"));
        assert_eq!(dispatcher.subscriber_count("t"), 2);

        drop(sub);
        explicit.unsubscribe();
        assert_eq!(dispatcher.subscriber_count("t"), 0);
        assert_eq!(dispatcher.publish("t", &json!(null)), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dispatcher_does_not_keep_handler_state_alive() {
        let dispatcher = EventDispatcher::new();
        let state = Arc::new(());
        let captured = state.clone();
        let sub = dispatcher.subscribe("t", move |_: &Value| -> AppResult<()> {
            let _ = &captured;
            Ok(())
        });
        assert_eq!(Arc::strong_count(&state), 2);

        drop(sub);
        assert_eq!(Arc::strong_count(&state), 1);
    }

    #[test]
    fn test_handler_may_subscribe_during_publish() {
        let dispatcher = EventDispatcher::new();
        let late = Arc::new(Mutex::new(None));
        let d = dispatcher.clone();
        let slot = late.clone();
        let _sub = dispatcher.subscribe("t", move |_: &Value| -> AppResult<()> {
            *slot.lock().unwrap() = Some(d.subscribe("t", |_: &Value| -> AppResult<()> { Ok(()) }));
            Ok(())
        });

        assert_eq!(dispatcher.publish("t", &json!(null)), 1);
        assert_eq!(dispatcher.subscriber_count("t"), 2);
    }

    #[test]
    fn test_subscription_outliving_dispatcher_is_harmless() {
        let dispatcher = EventDispatcher::new();
        let sub = dispatcher.subscribe("t", |_: &Value| -> AppResult<()> { Ok(()) });
        drop(dispatcher);
        sub.unsubscribe();
    }
}
