//! Entities and helpers shared by integration tests.

#![allow(dead_code)]

use persistence_core::{
    ClassMetadataBuilder, Entity, EntityManager, EventArgs, Identifier, LifecycleEvent,
    LifecycleListener,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

impl Entity for Author {
    const CLASS_NAME: &'static str = "blog::Author";

    fn map(mapping: ClassMetadataBuilder) -> ClassMetadataBuilder {
        mapping
            .id("id", persistence_core::FieldType::String)
            .field("name", persistence_core::FieldType::String)
            .nullable_field("email", persistence_core::FieldType::String)
            .one_to_many("articles", Article::CLASS_NAME, "author")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub views: i64,
    pub published: bool,
    pub tags: Vec<String>,
}

impl Entity for Article {
    const CLASS_NAME: &'static str = "blog::Article";

    fn map(mapping: ClassMetadataBuilder) -> ClassMetadataBuilder {
        mapping
            .id("id", persistence_core::FieldType::Integer)
            .field("title", persistence_core::FieldType::String)
            .field("views", persistence_core::FieldType::Integer)
            .field("published", persistence_core::FieldType::Boolean)
            .field("tags", persistence_core::FieldType::Json)
            .many_to_one("author", Author::CLASS_NAME)
    }
}

/// Composite identifier: `(article_id, tag)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tagging {
    pub article_id: i64,
    pub tag: String,
    pub weight: f64,
}

impl Entity for Tagging {
    const CLASS_NAME: &'static str = "blog::Tagging";

    fn map(mapping: ClassMetadataBuilder) -> ClassMetadataBuilder {
        mapping
            .id("article_id", persistence_core::FieldType::Integer)
            .id("tag", persistence_core::FieldType::String)
            .field("weight", persistence_core::FieldType::Float)
    }
}

pub fn author(id: &str, name: &str) -> Author {
    Author {
        id: id.to_string(),
        name: name.to_string(),
        email: None,
    }
}

pub fn article(id: i64, title: &str, author: Option<&str>) -> Article {
    Article {
        id,
        title: title.to_string(),
        author: author.map(str::to_string),
        views: 0,
        published: false,
        tags: Vec::new(),
    }
}

pub fn manager() -> EntityManager {
    EntityManager::open_in_memory().unwrap()
}

/// Records `<event>` or `<event>:<class>#<id>` for every dispatched event.
pub struct EventLog {
    events: Vec<LifecycleEvent>,
    pub seen: RefCell<Vec<String>>,
}

impl EventLog {
    pub fn new(events: &[LifecycleEvent]) -> Self {
        Self {
            events: events.to_vec(),
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn all() -> Self {
        Self::new(&[
            LifecycleEvent::PrePersist,
            LifecycleEvent::PostPersist,
            LifecycleEvent::PreUpdate,
            LifecycleEvent::PostUpdate,
            LifecycleEvent::PreRemove,
            LifecycleEvent::PostRemove,
            LifecycleEvent::PostLoad,
            LifecycleEvent::PreFlush,
            LifecycleEvent::OnFlush,
            LifecycleEvent::PostFlush,
            LifecycleEvent::OnClear,
        ])
    }

    pub fn take(&self) -> Vec<String> {
        self.seen.borrow_mut().drain(..).collect()
    }
}

impl LifecycleListener for EventLog {
    fn listener_id(&self) -> &str {
        "test_event_log"
    }

    fn subscribed_events(&self) -> &[LifecycleEvent] {
        &self.events
    }

    fn on_event(&self, args: &EventArgs<'_>) {
        let mut line = args.event.to_string();
        if let (Some(class_name), Some(identifier)) = (args.class_name, args.identifier) {
            line.push_str(&format!(":{class_name}#{identifier}"));
        }
        if !args.changed_fields.is_empty() {
            line.push_str(&format!("[{}]", args.changed_fields.join(",")));
        }
        self.seen.borrow_mut().push(line);
    }
}

pub fn id(value: impl Into<Identifier>) -> Identifier {
    value.into()
}
