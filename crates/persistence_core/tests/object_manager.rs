#![allow(deprecated)]

mod support;

use persistence_core::{
    Entity, EntityState, Handle, Identifier, ManagerError, MappingError, ObjectManager,
    ObjectRepository,
};
use serde_json::json;
use support::{article, author, manager, Article, Author, Tagging};

#[test]
fn persisted_object_is_found_after_flush_and_clear() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada Lovelace"));
    em.persist(&ada).unwrap();
    em.flush().unwrap();

    em.clear(None);
    let found = em.find::<Author>("ada").unwrap().unwrap();
    assert!(!found.ptr_eq(&ada));
    assert_eq!(found.get().unwrap(), ada.get().unwrap());
}

#[test]
fn find_returns_the_managed_handle() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada"));
    em.persist(&ada).unwrap();

    let pending = em.find::<Author>("ada").unwrap().unwrap();
    assert!(pending.ptr_eq(&ada));

    em.flush().unwrap();
    let first = em.find::<Author>("ada").unwrap().unwrap();
    let second = em
        .get_repository::<Author>()
        .unwrap()
        .find("ada")
        .unwrap()
        .unwrap();
    assert!(first.ptr_eq(&ada));
    assert!(second.ptr_eq(&ada));
}

#[test]
fn find_unknown_identifier_returns_none() {
    let mut em = manager();
    assert!(em.find::<Author>("nobody").unwrap().is_none());
    assert_eq!(em.managed_count(), 0);
}

#[test]
fn removed_object_is_gone_after_flush() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada"));
    em.persist(&ada).unwrap();
    em.flush().unwrap();

    em.remove(&ada).unwrap();
    assert!(em.find::<Author>("ada").unwrap().is_none());
    em.flush().unwrap();

    assert!(!em.contains(&ada));
    assert!(em.find::<Author>("ada").unwrap().is_none());
    em.clear(None);
    assert!(em.find::<Author>("ada").unwrap().is_none());
}

#[test]
fn contains_tracks_persist_remove_detach_and_clear() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada"));
    assert!(!em.contains(&ada));

    em.persist(&ada).unwrap();
    assert!(em.contains(&ada));

    em.detach(&ada);
    assert!(!em.contains(&ada));
    assert!(!em.has_pending_changes().unwrap());

    em.persist(&ada).unwrap();
    em.flush().unwrap();
    em.remove(&ada).unwrap();
    assert!(!em.contains(&ada));

    em.persist(&ada).unwrap();
    assert!(em.contains(&ada));

    em.clear(None);
    assert!(!em.contains(&ada));
}

#[test]
fn clear_by_class_keeps_other_classes_managed() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada"));
    let post = Handle::new(article(1, "Notes", Some("ada")));
    em.persist(&ada).unwrap();
    em.persist(&post).unwrap();
    em.flush().unwrap();

    em.clear(Some(Article::CLASS_NAME));
    assert!(em.contains(&ada));
    assert!(!em.contains(&post));

    let reloaded = em.find::<Article>(1).unwrap().unwrap();
    assert!(!reloaded.ptr_eq(&post));
}

#[test]
fn clear_discards_pending_work() {
    let mut em = manager();
    em.persist(&Handle::new(author("ada", "Ada"))).unwrap();
    assert!(em.has_pending_changes().unwrap());

    em.clear(Some(Author::CLASS_NAME));
    assert!(!em.has_pending_changes().unwrap());
    em.flush().unwrap();
    assert!(em.find::<Author>("ada").unwrap().is_none());
}

#[test]
fn refresh_discards_local_changes() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada"));
    em.persist(&ada).unwrap();
    em.flush().unwrap();

    ada.update(|author| author.name = "Countess".to_string());
    assert!(em.has_pending_changes().unwrap());

    em.refresh(&ada).unwrap();
    assert_eq!(ada.get().unwrap().name, "Ada");
    assert!(!em.has_pending_changes().unwrap());
}

#[test]
fn refresh_requires_a_managed_object_with_a_stored_row() {
    let mut em = manager();
    let loose = Handle::new(author("ada", "Ada"));
    assert!(matches!(
        em.refresh(&loose),
        Err(ManagerError::NotManaged { identifier: Some(id), .. }) if id.as_str() == "ada"
    ));

    em.persist(&loose).unwrap();
    assert!(matches!(
        em.refresh(&loose),
        Err(ManagerError::EntityNotFound { .. })
    ));
}

#[test]
fn persist_is_idempotent_and_cancels_pending_removal() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada"));
    em.persist(&ada).unwrap();
    em.persist(&ada).unwrap();
    em.flush().unwrap();

    em.remove(&ada).unwrap();
    em.persist(&ada).unwrap();
    em.flush().unwrap();

    em.clear(None);
    assert!(em.find::<Author>("ada").unwrap().is_some());
}

#[test]
fn removing_a_new_object_only_unschedules_it() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada"));
    em.persist(&ada).unwrap();
    em.remove(&ada).unwrap();

    assert!(!em.contains(&ada));
    assert_eq!(em.managed_count(), 0);
    em.flush().unwrap();
    assert_eq!(em.entity_state(&ada).unwrap(), EntityState::New);
}

#[test]
fn removing_an_unmanaged_object_fails() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada"));
    assert!(matches!(
        em.remove(&ada),
        Err(ManagerError::NotManaged { class_name, .. }) if class_name == Author::CLASS_NAME
    ));
}

#[test]
fn two_handles_cannot_share_an_identifier() {
    let mut em = manager();
    em.persist(&Handle::new(author("ada", "Ada"))).unwrap();

    let twin = Handle::new(author("ada", "Other Ada"));
    assert!(matches!(
        em.persist(&twin),
        Err(ManagerError::IdentityConflict { identifier, .. }) if identifier.as_str() == "ada"
    ));
}

#[test]
fn merge_copies_state_onto_the_managed_object() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada"));
    em.persist(&ada).unwrap();
    em.flush().unwrap();

    let detached = Handle::new(author("ada", "Ada King"));
    let merged = em.merge(&detached).unwrap();
    assert!(merged.ptr_eq(&ada));
    assert!(!em.contains(&detached));
    assert_eq!(ada.get().unwrap().name, "Ada King");

    em.flush().unwrap();
    em.clear(None);
    assert_eq!(
        em.find::<Author>("ada").unwrap().unwrap().get().unwrap().name,
        "Ada King"
    );
}

#[test]
fn merge_persists_a_copy_of_unknown_objects() {
    let mut em = manager();
    let fresh = Handle::new(author("grace", "Grace"));
    let merged = em.merge(&fresh).unwrap();

    assert!(!merged.ptr_eq(&fresh));
    assert!(em.contains(&merged));
    assert!(!em.contains(&fresh));
    em.flush().unwrap();
    assert_eq!(em.entity_state(&fresh).unwrap(), EntityState::Detached);
}

#[test]
fn merge_into_an_object_scheduled_for_removal_fails() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada"));
    em.persist(&ada).unwrap();
    em.flush().unwrap();
    em.remove(&ada).unwrap();

    let copy = Handle::new(author("ada", "Ada"));
    assert!(matches!(
        em.merge(&copy),
        Err(ManagerError::RemovedEntity { .. })
    ));
    assert!(matches!(
        em.merge(&ada),
        Err(ManagerError::RemovedEntity { .. })
    ));
}

#[test]
fn detach_of_unmanaged_object_is_a_no_op() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada"));
    em.detach(&ada);
    assert_eq!(em.managed_count(), 0);
}

#[test]
fn detached_changes_are_not_flushed() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada"));
    em.persist(&ada).unwrap();
    em.flush().unwrap();

    em.detach(&ada);
    ada.update(|author| author.name = "Changed".to_string());
    em.flush().unwrap();

    let reloaded = em.find::<Author>("ada").unwrap().unwrap();
    assert_eq!(reloaded.get().unwrap().name, "Ada");
}

#[test]
fn references_are_lazy_until_initialized() {
    let mut em = manager();
    em.persist(&Handle::new(author("ada", "Ada"))).unwrap();
    em.flush().unwrap();
    em.clear(None);

    let reference = em.get_reference::<Author>("ada").unwrap();
    assert!(!reference.is_initialized());
    assert!(em.contains(&reference));

    em.initialize_object(&reference).unwrap();
    assert!(reference.is_initialized());
    assert_eq!(reference.get().unwrap().name, "Ada");

    let found = em.find::<Author>("ada").unwrap().unwrap();
    assert!(found.ptr_eq(&reference));
    em.initialize_object(&found).unwrap();
}

#[test]
fn find_initializes_a_pending_reference() {
    let mut em = manager();
    em.persist(&Handle::new(author("ada", "Ada"))).unwrap();
    em.flush().unwrap();
    em.clear(None);

    let reference = em.get_reference::<Author>("ada").unwrap();
    let found = em.find::<Author>("ada").unwrap().unwrap();
    assert!(found.ptr_eq(&reference));
    assert!(reference.is_initialized());
}

#[test]
fn initializing_a_reference_without_a_row_fails() {
    let mut em = manager();
    let reference = em.get_reference::<Author>("ghost").unwrap();
    assert!(matches!(
        em.initialize_object(&reference),
        Err(ManagerError::EntityNotFound { .. })
    ));

    em.remove(&reference).unwrap();
    em.flush().unwrap();
    assert!(!em.contains(&reference));
}

#[test]
fn entity_state_follows_the_lifecycle() {
    let mut em = manager();
    let ada = Handle::new(author("ada", "Ada"));
    assert_eq!(em.entity_state(&ada).unwrap(), EntityState::New);

    em.persist(&ada).unwrap();
    assert_eq!(em.entity_state(&ada).unwrap(), EntityState::Managed);
    em.flush().unwrap();

    em.remove(&ada).unwrap();
    assert_eq!(em.entity_state(&ada).unwrap(), EntityState::Removed);

    em.persist(&ada).unwrap();
    em.clear(None);
    assert_eq!(em.entity_state(&ada).unwrap(), EntityState::Detached);
}

#[test]
fn composite_identifiers_round_trip() {
    let mut em = manager();
    let tagging = Handle::new(Tagging {
        article_id: 3,
        tag: "rust".to_string(),
        weight: 0.5,
    });
    em.persist(&tagging).unwrap();
    em.flush().unwrap();
    em.clear(None);

    let id = Identifier::composite([json!(3), json!("rust")]).unwrap();
    assert_eq!(id.as_str(), r#"[3,"rust"]"#);
    let found = em.find::<Tagging>(id).unwrap().unwrap();
    assert_eq!(found.get().unwrap().weight, 0.5);
}

#[test]
fn class_metadata_is_available_by_name_once_registered() {
    let em = manager();
    assert!(matches!(
        em.get_class_metadata(Article::CLASS_NAME),
        Err(ManagerError::Mapping(MappingError::UnknownClass(_)))
    ));

    em.register::<Article>().unwrap();
    let metadata = em.get_class_metadata(Article::CLASS_NAME).unwrap();
    assert_eq!(metadata.identifier_field_names(), ["id".to_string()]);
    assert_eq!(metadata.association_target_class("author"), Some(Author::CLASS_NAME));
    assert!(em.metadata_factory().has_metadata_for(Article::CLASS_NAME));
}
