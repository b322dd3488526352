//! Synchronous application events. Listeners register with the context and receive every
//! published event on the publishing thread, ordered by priority (higher first, registration
//! order for ties). There is no durability, filtering, or asynchronous delivery.

use std::any::Any;
use std::cmp::Reverse;
use std::fmt::Debug;
use std::sync::Arc;
use wellspring_beans::error::ErrorPtr;

/// Marker for payloads published through the context. The `as_any` accessor lets listeners
/// downcast to concrete event types.
pub trait ApplicationEvent: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

/// Published once a context finishes a successful refresh.
#[derive(Debug)]
pub struct ContextRefreshedEvent {
    pub context_id: String,
}

impl ApplicationEvent for ContextRefreshedEvent {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Published when an active context is closed.
#[derive(Debug)]
pub struct ContextClosedEvent {
    pub context_id: String,
}

impl ApplicationEvent for ContextClosedEvent {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub type ApplicationListenerPtr = Arc<dyn ApplicationListener + Send + Sync>;

/// Receives all events published through the owning context.
pub trait ApplicationListener: Send + Sync {
    fn on_event(&self, event: &dyn ApplicationEvent) -> Result<(), ErrorPtr>;

    /// Listeners with higher priorities are notified first. Default 0.
    fn priority(&self) -> i8 {
        0
    }
}

/// Delivers events to registered listeners in priority order.
#[derive(Default)]
pub struct EventMulticaster {
    listeners: Vec<ApplicationListenerPtr>,
}

impl EventMulticaster {
    pub fn add_listener(&mut self, listener: ApplicationListenerPtr) {
        self.listeners.push(listener);
        self.listeners
            .sort_by_key(|listener| Reverse(listener.priority()));
    }

    /// Notifies all listeners synchronously. The first failing listener aborts delivery and its
    /// error is returned.
    pub fn multicast(&self, event: &dyn ApplicationEvent) -> Result<(), ErrorPtr> {
        for listener in &self.listeners {
            listener.on_event(event)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::event::{
        ApplicationEvent, ApplicationListener, ContextRefreshedEvent, EventMulticaster,
    };
    use std::sync::{Arc, Mutex};
    use wellspring_beans::error::ErrorPtr;

    struct Recorder {
        label: &'static str,
        priority: i8,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ApplicationListener for Recorder {
        fn on_event(&self, _event: &dyn ApplicationEvent) -> Result<(), ErrorPtr> {
            self.seen.lock().unwrap().push(self.label);
            Ok(())
        }

        fn priority(&self) -> i8 {
            self.priority
        }
    }

    #[test]
    fn should_notify_higher_priorities_first() {
        let seen = Arc::new(Mutex::new(vec![]));
        let mut multicaster = EventMulticaster::default();

        for (label, priority) in [("first-zero", 0), ("high", 100), ("second-zero", 0)] {
            multicaster.add_listener(Arc::new(Recorder {
                label,
                priority,
                seen: seen.clone(),
            }));
        }

        multicaster
            .multicast(&ContextRefreshedEvent {
                context_id: "test".to_string(),
            })
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["high", "first-zero", "second-zero"]
        );
    }

    #[test]
    fn should_downcast_events_through_as_any() {
        let event = ContextRefreshedEvent {
            context_id: "test".to_string(),
        };
        let erased: &dyn ApplicationEvent = &event;

        let concrete = erased
            .as_any()
            .downcast_ref::<ContextRefreshedEvent>()
            .unwrap();
        assert_eq!(concrete.context_id, "test");
    }
}
