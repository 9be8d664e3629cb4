//! Record lifecycle through the untyped collection API.
//!
//! Covers:
//! - create/merge semantics of `set`, with null handling on both paths
//! - counted pagination
//! - directives forwarded through `update`
//! - store-generated identities round-tripping through `add`/`get`
//! - no-op deletes and updates, duplicate creates, conflicting changes
//! - index passthrough and the connection lifecycle

use recordlayer::{
    bson::{Bson, doc},
    memory::InMemoryStore,
    prelude::*,
};

async fn connect() -> RecordStore<InMemoryStore> {
    RecordStore::connect(InMemoryStore::builder())
        .await
        .unwrap()
}

#[tokio::test]
async fn unknown_ids_are_absent() {
    let store = connect().await;
    let users = store.collection("users");

    assert_eq!(users.get("nobody").await.unwrap(), None);
    assert!(!users.id_exists("nobody").await.unwrap());
    assert_eq!(users.find_one(Query::filtered(Filter::eq("name", "x"))).await.unwrap(), None);
}

#[tokio::test]
async fn find_part_returns_the_identifier_and_requested_fields() {
    let store = connect().await;
    let users = store.collection("users");

    users
        .create("u1", doc! { "name": "Alice", "age": 30, "city": "Oslo" })
        .await
        .unwrap();

    let parts = users
        .find_part(Query::new(), ["name"])
        .await
        .unwrap();

    assert_eq!(parts, vec![doc! { "id": "u1", "name": "Alice" }]);
}

#[tokio::test]
async fn find_sorts_on_several_keys() {
    let store = connect().await;
    let users = store.collection("users");

    for (id, team, age) in [("a", "red", 30), ("b", "blue", 25), ("c", "red", 41), ("d", "blue", 25)] {
        users
            .create(id, doc! { "team": team, "age": age })
            .await
            .unwrap();
    }

    let query = Query::builder()
        .filter(Filter::ne("id", "d"))
        .sort("team", SortDirection::Asc)
        .sort("age", SortDirection::Desc)
        .build();
    let ids = users
        .find(query)
        .await
        .unwrap()
        .into_iter()
        .map(|document| document.get_str("id").unwrap().to_string())
        .collect::<Vec<_>>();

    assert_eq!(ids, vec!["b", "c", "a"]);

    let oldest = users
        .find_one(Query::builder().sort("age", SortDirection::Desc).build())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(oldest.get_str("id").unwrap(), "c");
}

#[tokio::test]
async fn set_creates_then_merges() {
    let store = connect().await;
    let users = store.collection("users");

    let outcome = users
        .set("u1", doc! { "a": 1, "keep": "x" })
        .await
        .unwrap();
    let created = users.get("u1").await.unwrap().unwrap();
    let create_time = created.get_i64("createTime").unwrap();

    assert_eq!(outcome, UpsertOutcome::Inserted);
    assert_eq!(created.keys().next().map(String::as_str), Some("id"));
    assert_eq!(created.get_str("id").unwrap(), "u1");
    assert_eq!(created.get_i32("a").unwrap(), 1);
    assert!(!created.contains_key("updateTime"));

    let outcome = users
        .set("u1", doc! { "a": 2 })
        .await
        .unwrap();
    let merged = users.get("u1").await.unwrap().unwrap();

    assert_eq!(outcome, UpsertOutcome::Merged);
    assert_eq!(merged.get_i32("a").unwrap(), 2);
    assert_eq!(merged.get_str("keep").unwrap(), "x");
    assert_eq!(merged.get_i64("createTime").unwrap(), create_time);
    assert!(merged.get_i64("updateTime").unwrap() >= create_time);
}

#[tokio::test]
async fn set_null_removes_existing_fields_and_never_creates_them() {
    let store = connect().await;
    let users = store.collection("users");

    users.set("u1", doc! { "a": 1, "b": "x" }).await.unwrap();
    users.set("u1", doc! { "b": Bson::Null }).await.unwrap();
    users.set("u2", doc! { "a": 1, "b": Bson::Null }).await.unwrap();

    let existing = users.get("u1").await.unwrap().unwrap();
    let fresh = users.get("u2").await.unwrap().unwrap();

    assert!(!existing.contains_key("b"));
    assert_eq!(existing.get_i32("a").unwrap(), 1);
    assert!(!fresh.contains_key("b"));
}

#[tokio::test]
async fn reserved_fields_cannot_be_written() {
    let store = connect().await;
    let users = store.collection("users");

    users
        .set("u1", doc! { "id": "forged", "_id": "forged", "createTime": 5_i64, "a": 1 })
        .await
        .unwrap();
    users
        .set("u1", doc! { "createTime": 6_i64, "updateTime": 7_i64 })
        .await
        .unwrap();

    let record = users.get("u1").await.unwrap().unwrap();

    assert_eq!(record.get_str("id").unwrap(), "u1");
    assert_ne!(record.get_i64("createTime").unwrap(), 5);
    assert_ne!(record.get_i64("updateTime").unwrap(), 7);
    assert!(!users.id_exists("forged").await.unwrap());
}

#[tokio::test]
async fn concurrent_sets_of_a_new_id_both_succeed() {
    let store = connect().await;
    let users = store.collection("users");

    let (first, second) = tokio::join!(
        users.set("u1", doc! { "a": 1 }),
        users.set("u1", doc! { "b": 2 }),
    );
    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|outcome| *outcome == UpsertOutcome::Merged);

    let record = users.get("u1").await.unwrap().unwrap();

    assert_eq!(outcomes, vec![UpsertOutcome::Inserted, UpsertOutcome::Merged]);
    assert_eq!(record.get_i32("a").unwrap(), 1);
    assert_eq!(record.get_i32("b").unwrap(), 2);
    assert_eq!(users.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn rejects_a_replace_and_a_directive_on_one_field() {
    let store = connect().await;
    let counters = store.collection("counters");

    let result = counters
        .set("c1", doc! { "count": 3, "$inc": { "count": 1 } })
        .await;

    assert!(matches!(result, Err(RecordStoreError::ConflictingChange(field)) if field == "count"));
    assert!(!counters.id_exists("c1").await.unwrap());
}

#[tokio::test]
async fn duplicate_creates_fail() {
    let store = connect().await;
    let users = store.collection("users");

    users.create("u1", doc! { "a": 1 }).await.unwrap();
    let result = users.create("u1", doc! { "a": 2 }).await;

    assert!(matches!(
        result,
        Err(RecordStoreError::DuplicateIdentity(id, collection)) if id == "u1" && collection == "users"
    ));
    assert_eq!(users.get("u1").await.unwrap().unwrap().get_i32("a").unwrap(), 1);
}

#[tokio::test]
async fn set_merges_every_element_directives_into_existing_records() {
    let store = connect().await;
    let carts = store.collection("carts");

    carts
        .create("x", doc! { "items": [ { "qty": 1 }, { "qty": 2 } ] })
        .await
        .unwrap();

    let outcome = carts
        .set("x", doc! { "$inc": { "items.$[].qty": 1 } })
        .await
        .unwrap();
    let stored = carts.get("x").await.unwrap().unwrap();

    assert_eq!(outcome, UpsertOutcome::Merged);
    assert_eq!(stored.get_array("items").unwrap(), &vec![
        Bson::Document(doc! { "qty": 2 }),
        Bson::Document(doc! { "qty": 3 }),
    ]);

    let missing = carts
        .set("y", doc! { "$inc": { "items.$[].qty": 1 } })
        .await;

    assert!(matches!(missing, Err(RecordStoreError::InvalidDocument(_))));
    assert!(!carts.id_exists("y").await.unwrap());
}

#[tokio::test]
async fn neighbouring_large_numeric_ids_stay_distinct() {
    let store = connect().await;
    let events = store.collection("events");
    let first = 1_234_567_890_123_456_789_i64;
    let second = first - 1;

    events.create(first, doc! { "who": "a" }).await.unwrap();

    assert!(!events.id_exists(second).await.unwrap());

    events.create(second, doc! { "who": "b" }).await.unwrap();
    let outcome = events.set(second, doc! { "who": "b2" }).await.unwrap();

    assert_eq!(outcome, UpsertOutcome::Merged);
    assert_eq!(events.count(None).await.unwrap(), 2);

    let untouched = events.get(first).await.unwrap().unwrap();

    assert_eq!(untouched.get_str("who").unwrap(), "a");
    assert!(!untouched.contains_key("updateTime"));
    assert_eq!(untouched.get_i64("id").unwrap(), first);
}

#[tokio::test]
async fn increment_directives_leave_other_fields_alone() {
    let store = connect().await;
    let counters = store.collection("counters");

    counters
        .set("c1", doc! { "count": 1, "name": "visits" })
        .await
        .unwrap();

    let outcome = counters
        .update("c1", doc! { "$inc": { "count": 1 } }, None)
        .await
        .unwrap();
    let record = counters.get("c1").await.unwrap().unwrap();

    assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 1 });
    assert_eq!(record.get_i32("count").unwrap(), 2);
    assert_eq!(record.get_str("name").unwrap(), "visits");
    assert!(record.contains_key("updateTime"));
}

#[tokio::test]
async fn array_directives_through_the_builder() {
    let store = connect().await;
    let posts = store.collection("posts");

    posts
        .create("p1", doc! { "tags": ["rust"], "flags": ["new", "hot", "new"] })
        .await
        .unwrap();
    posts
        .update(
            "p1",
            ChangeSet::new()
                .add_each_to_set("tags", ["rust", "db"])
                .push("history", "edited")
                .pull("flags", "new")
                .unset("missing"),
            None,
        )
        .await
        .unwrap();

    let record = posts.get("p1").await.unwrap().unwrap();

    assert_eq!(record.get_array("tags").unwrap(), &vec![Bson::from("rust"), Bson::from("db")]);
    assert_eq!(record.get_array("history").unwrap(), &vec![Bson::from("edited")]);
    assert_eq!(record.get_array("flags").unwrap(), &vec![Bson::from("hot")]);
}

#[tokio::test]
async fn directives_on_creation_start_from_nothing() {
    let store = connect().await;
    let counters = store.collection("counters");

    counters
        .set("c1", ChangeSet::new().increment("count", 5).push("log", "first"))
        .await
        .unwrap();

    let record = counters.get("c1").await.unwrap().unwrap();

    assert_eq!(record.get_i32("count").unwrap(), 5);
    assert_eq!(record.get_array("log").unwrap(), &vec![Bson::from("first")]);
}

#[tokio::test]
async fn updating_a_missing_record_matches_nothing() {
    let store = connect().await;
    let users = store.collection("users");

    let outcome = users
        .update("ghost", ChangeSet::new().set("a", 1), None)
        .await
        .unwrap();

    assert_eq!(outcome, UpdateOutcome::default());
    assert_eq!(users.get("ghost").await.unwrap(), None);
}

#[tokio::test]
async fn added_records_round_trip_through_their_generated_id() {
    let store = connect().await;
    let items = store.collection("items");

    let id = items.add(doc! { "x": 1 }).await.unwrap();
    let record = items.get(id.clone()).await.unwrap().unwrap();

    assert!(matches!(&id, RecordId::String(hex) if hex.len() == 24));
    assert_eq!(record.get_str("id").unwrap(), id.to_string());
    assert_eq!(record.get_i32("x").unwrap(), 1);
    assert!(record.contains_key("createTime"));
    assert!(items.id_exists(id).await.unwrap());
}

#[tokio::test]
async fn deleting_a_missing_record_is_a_no_op() {
    let store = connect().await;
    let users = store.collection("users");

    users.create("u1", doc! { "a": 1 }).await.unwrap();

    assert_eq!(users.delete("missing").await.unwrap(), 0);
    assert_eq!(users.count(None).await.unwrap(), 1);
    assert_eq!(users.delete("u1").await.unwrap(), 1);
    assert_eq!(users.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn lists_counted_pages() {
    let store = connect().await;
    let rows = store.collection("rows");

    for n in 0..25 {
        rows.create(format!("r{n:02}"), doc! { "n": n, "kind": "row" })
            .await
            .unwrap();
    }
    rows.create("other", doc! { "n": 100, "kind": "other" })
        .await
        .unwrap();

    let query = Query::builder()
        .filter(Filter::eq("kind", "row"))
        .sort("n", SortDirection::Asc)
        .build();

    let first = rows.list(query.clone(), PageRequest::new(0, 10)).await.unwrap();
    let last = rows.list(query.clone(), PageRequest::new(2, 10)).await.unwrap();
    let beyond = rows.list(query.clone(), PageRequest::new(3, 10)).await.unwrap();

    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total_count, 25);
    assert_eq!(first.total_page, 3);
    assert_eq!(first.items[0].get_str("id").unwrap(), "r00");
    assert!(first.has_next());

    assert_eq!(last.items.len(), 5);
    assert_eq!(last.items[0].get_i32("n").unwrap(), 20);
    assert!(!last.has_next());

    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total_page, 3);

    assert!(matches!(
        rows.list(query, PageRequest::new(0, 0)).await,
        Err(RecordStoreError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn index_passthrough() {
    let store = connect().await;
    let users = store.collection("users");
    let by_email = IndexSpec::new().asc("email").unique();

    users.create_index(by_email.clone()).await.unwrap();
    users
        .create_index(IndexSpec::new().asc("team").desc("createTime"))
        .await
        .unwrap();

    assert_eq!(
        users.get_indexes().await.unwrap(),
        vec![
            IndexSpec::new().asc("id"),
            by_email.clone(),
            IndexSpec::new().asc("team").desc("createTime"),
        ]
    );

    users.create("u1", doc! { "email": "a@x" }).await.unwrap();
    assert!(users.create("u2", doc! { "email": "a@x" }).await.is_err());

    users.delete_index(by_email).await.unwrap();
    assert_eq!(users.get_indexes().await.unwrap().len(), 2);
    assert!(users.delete_index(IndexSpec::new().asc("id")).await.is_err());
}

#[tokio::test]
async fn operations_fail_after_shutdown() {
    let backend = InMemoryStore::new();
    let store = RecordStore::new(backend.clone());

    store.collection("users").create("u1", doc! {}).await.unwrap();
    store.shutdown().await.unwrap();

    let reopened = RecordStore::new(backend);

    assert!(matches!(
        reopened.collection("users").get("u1").await,
        Err(RecordStoreError::NotConnected)
    ));
    assert!(matches!(
        reopened.collection("users").set("u2", doc! { "a": 1 }).await,
        Err(RecordStoreError::NotConnected)
    ));
}
