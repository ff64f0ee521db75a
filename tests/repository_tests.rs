//! Integration tests for `ResourceRepository` over the in-memory store.
//!
//! These exercise the repository directly, without hooks, to pin down the
//! change tracking rules: relationships are replaced rather than appended,
//! tracked identities are reused, and many-to-many joins are rebuilt.

mod hooks_harness;

use hooks_harness::*;
use jsonapi::prelude::*;

fn repository(store: &InMemoryStore) -> (ResourceRepository, InMemorySession) {
    let session = store.session();
    (ResourceRepository::new(Arc::new(session.clone())), session)
}

fn relationship(store: &InMemoryStore, resource_type: &str, name: &str) -> RelationshipAttribute {
    store.registry().relationship(resource_type, name).unwrap().clone()
}

#[test]
fn test_attach_or_get_tracked_is_idempotent() {
    let store = seeded_store(registry());
    let (repository, session) = repository(&store);
    let pointer = Resource::pointer(&key("people", "1"));

    let (_, was_tracked) = repository.attach_or_get_tracked(&pointer).unwrap();
    assert!(!was_tracked);

    let (tracked, was_tracked) = repository.attach_or_get_tracked(&pointer).unwrap();
    assert!(was_tracked);
    assert_eq!(tracked.key(), key("people", "1"));
    assert_eq!(session.tracked_count(), 1);
}

#[test]
fn test_tracked_relationship_value_deduplicates() {
    let store = seeded_store(registry());
    let (repository, session) = repository(&store);
    let tags = relationship(&store, "articles", "tags");

    let article = Resource::new("articles", "a9").with_to_many(
        "tags",
        vec![key("tags", "t1"), key("tags", "t1"), key("tags", "t2")],
    );
    let tracked = repository
        .get_tracked_relationship_value(&tags, &article)
        .unwrap()
        .unwrap();

    assert_eq!(tracked.value, Relation::ToMany(vec![key("tags", "t1"), key("tags", "t2")]));
    assert!(!tracked.was_already_tracked);
    assert_eq!(session.tracked_count(), 2);
}

#[test]
fn test_tracked_relationship_value_of_null_and_unpopulated() {
    let store = seeded_store(registry());
    let (repository, _) = repository(&store);
    let author = relationship(&store, "articles", "author");

    let cleared = Resource::new("articles", "a1").with_to_one("author", None);
    let tracked = repository
        .get_tracked_relationship_value(&author, &cleared)
        .unwrap()
        .unwrap();
    assert_eq!(tracked.value, Relation::ToOne(None));
    assert!(!tracked.was_already_tracked);

    let untouched = Resource::new("articles", "a1");
    assert!(repository
        .get_tracked_relationship_value(&author, &untouched)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_update_replaces_to_many_instead_of_appending() {
    let store = seeded_store(registry());
    let (repository, _) = repository(&store);

    let person = Resource::new("people", "1").with_to_many("articles", vec![key("articles", "a3")]);
    let targeted = TargetedFields::from_resource(&person);
    let updated = repository
        .update(&person, &targeted, &CancellationSignal::none())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.relation("articles"), Some(&Relation::ToMany(vec![key("articles", "a3")])));
    assert_eq!(
        ids(store.relation(&key("people", "1"), "articles").unwrap()),
        vec!["a3"]
    );
    assert_eq!(
        store.relation(&key("articles", "a1"), "author").unwrap(),
        Some(Relation::ToOne(None))
    );
}

#[tokio::test]
async fn test_update_replaces_to_one_and_moves_inverse() {
    let store = seeded_store(registry());
    let (repository, _) = repository(&store);

    // Alice takes over Bob's passport
    let person = Resource::new("people", "1").with_to_one("passport", Some(key("passports", "p2")));
    let targeted = TargetedFields::from_resource(&person);
    repository
        .update(&person, &targeted, &CancellationSignal::none())
        .await
        .unwrap();

    assert_eq!(
        store.relation(&key("passports", "p2"), "owner").unwrap(),
        Some(Relation::ToOne(Some(key("people", "1"))))
    );
    assert_eq!(
        store.relation(&key("people", "2"), "passport").unwrap(),
        Some(Relation::ToOne(None))
    );
    assert_eq!(
        store.relation(&key("passports", "p1"), "owner").unwrap(),
        Some(Relation::ToOne(None))
    );
}

#[tokio::test]
async fn test_update_reuses_tracked_instances() {
    let store = seeded_store(registry());
    let (repository, session) = repository(&store);

    // a2 is already tracked by an earlier read in the same unit of work
    session.find(&key("articles", "a2"), &[]).await.unwrap();

    let person = Resource::new("people", "3").with_to_many("articles", vec![key("articles", "a2")]);
    let targeted = TargetedFields::from_resource(&person);
    repository
        .update(&person, &targeted, &CancellationSignal::none())
        .await
        .unwrap();

    assert_eq!(
        store.relation(&key("articles", "a2"), "author").unwrap(),
        Some(Relation::ToOne(Some(key("people", "3"))))
    );
    assert!(ids(store.relation(&key("people", "2"), "articles").unwrap()).is_empty());
}

#[tokio::test]
async fn test_update_ignores_untargeted_relationships() {
    let store = seeded_store(registry());
    let (repository, _) = repository(&store);

    let person = Resource::new("people", "1")
        .with_attribute("name", "Alicia")
        .with_to_many("articles", Vec::new());
    let targeted = TargetedFields::new().with_attribute("name");
    repository
        .update(&person, &targeted, &CancellationSignal::none())
        .await
        .unwrap();

    assert_eq!(
        ids(store.relation(&key("people", "1"), "articles").unwrap()),
        vec!["a1"]
    );
}

#[tokio::test]
async fn test_update_detaches_related_resources() {
    let store = seeded_store(registry());
    let (repository, session) = repository(&store);

    let article = Resource::new("articles", "a1").with_to_one("author", Some(key("people", "2")));
    let targeted = TargetedFields::from_resource(&article);
    repository
        .update(&article, &targeted, &CancellationSignal::none())
        .await
        .unwrap();

    assert_eq!(session.entry_state(&key("people", "2")), EntryState::Detached);
    assert_eq!(session.entry_state(&key("articles", "a1")), EntryState::Unchanged);

    let bob = session.find(&key("people", "2"), &[]).await.unwrap().unwrap();
    assert_eq!(bob.attribute("name"), Some(&serde_json::json!("Bob")));
}

#[tokio::test]
async fn test_update_of_missing_resource_returns_none() {
    let store = seeded_store(registry());
    let (repository, _) = repository(&store);

    let ghost = Resource::new("people", "99").with_attribute("name", "Ghost");
    let targeted = TargetedFields::from_resource(&ghost);
    let updated = repository
        .update(&ghost, &targeted, &CancellationSignal::none())
        .await
        .unwrap();

    assert!(updated.is_none());
}

#[tokio::test]
async fn test_create_with_many_to_many() {
    let store = seeded_store(registry());
    let (repository, _) = repository(&store);

    let article = Resource::new("articles", "a9")
        .with_attribute("title", "Ninth")
        .with_to_many("tags", vec![key("tags", "t1"), key("tags", "t3")]);
    let targeted = TargetedFields::from_resource(&article);
    let created = repository
        .create(article, &targeted, &CancellationSignal::none())
        .await
        .unwrap();

    assert!(created.relation("article-tags").is_none());
    assert_eq!(
        ids(store.relation(&key("articles", "a9"), "tags").unwrap()),
        vec!["t1", "t3"]
    );
    // the join rows of a1 are untouched
    assert_eq!(
        ids(store.relation(&key("articles", "a1"), "tags").unwrap()),
        vec!["t1", "t2"]
    );
}

#[tokio::test]
async fn test_create_detaches_related_resources() {
    let store = seeded_store(registry());
    let (repository, session) = repository(&store);

    let article = Resource::new("articles", "a9").with_to_one("author", Some(key("people", "2")));
    let targeted = TargetedFields::from_resource(&article);
    repository
        .create(article, &targeted, &CancellationSignal::none())
        .await
        .unwrap();

    assert_eq!(session.entry_state(&key("people", "2")), EntryState::Detached);
    assert_eq!(session.entry_state(&key("articles", "a9")), EntryState::Unchanged);
    assert_eq!(
        ids(store.relation(&key("people", "2"), "articles").unwrap()),
        vec!["a2", "a9"]
    );
}

#[tokio::test]
async fn test_delete() {
    let store = seeded_store(registry());
    let (repository, _) = repository(&store);

    assert!(repository
        .delete(&key("passports", "p1"), &CancellationSignal::none())
        .await
        .unwrap());
    assert!(!repository
        .delete(&key("passports", "p1"), &CancellationSignal::none())
        .await
        .unwrap());
    assert_eq!(
        store.relation(&key("people", "1"), "passport").unwrap(),
        Some(Relation::ToOne(None))
    );
}

#[tokio::test]
async fn test_update_relationships_rolls_back_on_error() {
    let store = seeded_store(registry());
    let (repository, session) = repository(&store);
    let articles = relationship(&store, "people", "articles");

    // unknown right side: the save fails and nothing is written
    let err = repository
        .update_relationships(
            &key("people", "1"),
            &articles,
            vec![key("articles", "a2"), key("articles", "missing")],
            &CancellationSignal::none(),
        )
        .await
        .unwrap_err();

    assert!(err.downcast_ref::<StorageError>().is_some());
    assert_eq!(session.tracked_count(), 0);
    assert_eq!(
        ids(store.relation(&key("people", "1"), "articles").unwrap()),
        vec!["a1"]
    );
}

#[tokio::test]
async fn test_get_and_list_with_includes() {
    let store = seeded_store(registry());
    let (repository, _) = repository(&store);
    let includes = store
        .registry()
        .parse_includes("articles", "author.passport")
        .unwrap();

    let graph = repository
        .get(&key("articles", "a1"), &includes)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        graph.relation_value(&key("articles", "a1"), "author"),
        Some(&Relation::ToOne(Some(key("people", "1"))))
    );
    assert_eq!(
        graph.relation_value(&key("people", "1"), "passport"),
        Some(&Relation::ToOne(Some(key("passports", "p1"))))
    );
    assert!(graph.contains(&key("passports", "p1")));

    let graph = repository.list("articles", &[], 2, -1).await.unwrap();
    let roots: Vec<String> = graph.root_keys().iter().map(|k| k.id.clone()).collect();
    assert_eq!(roots, vec!["a2", "a3"]);
    assert_eq!(repository.count("articles").await.unwrap(), 3);
}
