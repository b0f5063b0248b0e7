//! Lifecycle events raised by the object manager.
//!
//! # Responsibility
//! - Register listeners by stable id.
//! - Dispatch lifecycle notifications to subscribed listeners.
//!
//! # Invariants
//! - Listener ids are unique within one `EventManager`.
//! - Dispatch order is listener id order.

use crate::model::identifier::Identifier;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// Points in an object's lifecycle where listeners are notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleEvent {
    PrePersist,
    PostPersist,
    PreUpdate,
    PostUpdate,
    PreRemove,
    PostRemove,
    PostLoad,
    PreFlush,
    OnFlush,
    PostFlush,
    OnClear,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrePersist => "pre_persist",
            Self::PostPersist => "post_persist",
            Self::PreUpdate => "pre_update",
            Self::PostUpdate => "post_update",
            Self::PreRemove => "pre_remove",
            Self::PostRemove => "post_remove",
            Self::PostLoad => "post_load",
            Self::PreFlush => "pre_flush",
            Self::OnFlush => "on_flush",
            Self::PostFlush => "post_flush",
            Self::OnClear => "on_clear",
        }
    }
}

impl Display for LifecycleEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload passed to listeners.
///
/// Object events carry `class_name` and `identifier`. Flush events carry
/// neither; `OnClear` carries the class name when the clear was scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventArgs<'a> {
    pub event: LifecycleEvent,
    pub class_name: Option<&'a str>,
    pub identifier: Option<&'a Identifier>,
    /// Top-level fields that differ from the last flushed state (`PreUpdate`
    /// and `PostUpdate` only).
    pub changed_fields: &'a [String],
}

impl<'a> EventArgs<'a> {
    pub fn manager(event: LifecycleEvent) -> Self {
        Self {
            event,
            class_name: None,
            identifier: None,
            changed_fields: &[],
        }
    }

    pub fn object(event: LifecycleEvent, class_name: &'a str, identifier: &'a Identifier) -> Self {
        Self {
            event,
            class_name: Some(class_name),
            identifier: Some(identifier),
            changed_fields: &[],
        }
    }

    pub fn with_changed_fields(mut self, changed_fields: &'a [String]) -> Self {
        self.changed_fields = changed_fields;
        self
    }
}

/// Observer of manager lifecycle events.
pub trait LifecycleListener {
    /// Stable id used for registration and removal.
    fn listener_id(&self) -> &str;

    fn subscribed_events(&self) -> &[LifecycleEvent];

    fn on_event(&self, args: &EventArgs<'_>);
}

/// Listener registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    InvalidListenerId(String),
    DuplicateListenerId(String),
}

impl Display for EventError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidListenerId(value) => write!(f, "listener id is invalid: {value}"),
            Self::DuplicateListenerId(value) => {
                write!(f, "listener id already registered: {value}")
            }
        }
    }
}

impl Error for EventError {}

/// Listener registry owned by one manager.
#[derive(Default)]
pub struct EventManager {
    listeners: BTreeMap<String, Rc<dyn LifecycleListener>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one listener.
    pub fn add_listener(&mut self, listener: Rc<dyn LifecycleListener>) -> Result<(), EventError> {
        let listener_id = listener.listener_id().trim().to_string();
        if listener_id.is_empty() || listener_id.chars().any(char::is_whitespace) {
            return Err(EventError::InvalidListenerId(listener_id));
        }
        if self.listeners.contains_key(&listener_id) {
            return Err(EventError::DuplicateListenerId(listener_id));
        }
        self.listeners.insert(listener_id, listener);
        Ok(())
    }

    /// Unregisters a listener, returning it when it was present.
    pub fn remove_listener(&mut self, listener_id: &str) -> Option<Rc<dyn LifecycleListener>> {
        self.listeners.remove(listener_id.trim())
    }

    /// Sorted listener ids.
    pub fn listener_ids(&self) -> Vec<String> {
        self.listeners.keys().cloned().collect()
    }

    pub fn has_listeners(&self, event: LifecycleEvent) -> bool {
        self.listeners
            .values()
            .any(|listener| listener.subscribed_events().contains(&event))
    }

    pub fn dispatch(&self, args: &EventArgs<'_>) {
        for listener in self.listeners.values() {
            if listener.subscribed_events().contains(&args.event) {
                listener.on_event(args);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EventArgs, EventError, EventManager, LifecycleEvent, LifecycleListener};
    use crate::model::identifier::Identifier;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        id: &'static str,
        events: Vec<LifecycleEvent>,
        seen: RefCell<Vec<String>>,
    }

    impl LifecycleListener for Recorder {
        fn listener_id(&self) -> &str {
            self.id
        }

        fn subscribed_events(&self) -> &[LifecycleEvent] {
            &self.events
        }

        fn on_event(&self, args: &EventArgs<'_>) {
            let target = args
                .identifier
                .map(|id| id.to_string())
                .unwrap_or_default();
            self.seen
                .borrow_mut()
                .push(format!("{}:{}:{target}", self.id, args.event));
        }
    }

    fn recorder(id: &'static str, events: Vec<LifecycleEvent>) -> Rc<Recorder> {
        Rc::new(Recorder {
            id,
            events,
            seen: RefCell::new(Vec::new()),
        })
    }

    #[test]
    fn dispatch_reaches_only_subscribed_listeners() {
        let mut events = EventManager::new();
        let persist = recorder("persist", vec![LifecycleEvent::PrePersist]);
        let flush = recorder("flush", vec![LifecycleEvent::PostFlush]);
        events.add_listener(persist.clone()).unwrap();
        events.add_listener(flush.clone()).unwrap();

        let id = Identifier::new("7");
        events.dispatch(&EventArgs::object(
            LifecycleEvent::PrePersist,
            "blog::Author",
            &id,
        ));
        events.dispatch(&EventArgs::manager(LifecycleEvent::PostFlush));

        assert_eq!(*persist.seen.borrow(), vec!["persist:pre_persist:7"]);
        assert_eq!(*flush.seen.borrow(), vec!["flush:post_flush:"]);
        assert!(events.has_listeners(LifecycleEvent::PrePersist));
        assert!(!events.has_listeners(LifecycleEvent::OnClear));
    }

    #[test]
    fn listener_ids_must_be_valid_and_unique() {
        let mut events = EventManager::new();
        events
            .add_listener(recorder("audit", vec![LifecycleEvent::OnClear]))
            .unwrap();
        assert_eq!(
            events
                .add_listener(recorder("audit", vec![]))
                .unwrap_err(),
            EventError::DuplicateListenerId("audit".to_string())
        );
        assert!(matches!(
            events.add_listener(recorder(" ", vec![])),
            Err(EventError::InvalidListenerId(_))
        ));

        assert!(events.remove_listener("audit").is_some());
        assert!(events.listener_ids().is_empty());
    }
}
