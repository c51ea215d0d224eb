//! Integration tests for the sync engine.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use treesync::{
    collection_descriptor, document_descriptor, DocumentChange, Entity, EntityStore, MemoryStore,
    MissingDocumentPolicy, MockSource, Patch, QueryFilter, Replace, Subquery, SyncConfig,
    SyncContext, SyncEngine, SyncEvent,
};

fn setup_with(config: SyncConfig) -> (Arc<MockSource>, Arc<MemoryStore>, SyncEngine) {
    let source = Arc::new(MockSource::new());
    let store = Arc::new(MemoryStore::new());
    let engine =
        SyncEngine::new(SyncContext::new(source.clone(), store.clone()).with_config(config));
    (source, store, engine)
}

fn setup() -> (Arc<MockSource>, Arc<MemoryStore>, SyncEngine) {
    setup_with(SyncConfig::default())
}

fn obj(value: Value) -> Entity {
    value.as_object().unwrap().clone()
}

fn record(store: &MemoryStore, id: &str) -> Value {
    Value::Object(store.entity(id).unwrap_or_default())
}

fn str_field(entity: &Entity, key: &str) -> String {
    entity.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

// --- Sync Scenarios ---

#[test]
fn test_document_with_collection_child() {
    let (source, store, engine) = setup();

    let _handle = engine
        .sync(
            document_descriptor("users/u1")
                .child("todos", collection_descriptor("users/u1/todos", None)),
        )
        .unwrap();

    // Children wait for the parent's first emission
    assert!(source.is_watching("users/u1"));
    assert!(!source.is_watching("users/u1/todos"));

    source.emit_document("users/u1", json!({"name": "Ann"}));
    assert!(source.is_watching("users/u1/todos"));
    assert_eq!(record(&store, "u1"), json!({"id": "u1", "name": "Ann", "todos": []}));

    source.emit_batch(
        "users/u1/todos",
        vec![DocumentChange::added("t1", obj(json!({"done": false})))],
    );

    assert_eq!(
        record(&store, "u1"),
        json!({"id": "u1", "name": "Ann", "todos": [{"id": "t1", "done": false}]})
    );
}

#[test]
fn test_function_valued_child_resolved_once_per_lifetime() {
    let (source, store, engine) = setup();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let query = collection_descriptor("users", None).child(
        "team",
        Subquery::lazy(move |user| {
            counter.fetch_add(1, Ordering::SeqCst);
            document_descriptor(format!("teams/{}", str_field(user, "teamId"))).into()
        }),
    );
    let _handle = engine.sync(query).unwrap();

    source.emit_batch(
        "users",
        vec![DocumentChange::added("u1", obj(json!({"teamId": "red"})))],
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(source.is_watching("teams/red"));

    // Updates never re-resolve
    source.emit_batch(
        "users",
        vec![DocumentChange::modified("u1", obj(json!({"teamId": "blue"})))],
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(source.is_watching("teams/red"));
    assert!(!source.is_watching("teams/blue"));

    source.emit_document("teams/red", json!({"name": "Red"}));
    assert_eq!(
        record(&store, "u1"),
        json!({"id": "u1", "teamId": "blue", "team": {"id": "red", "name": "Red"}})
    );

    // A new lifetime resolves again
    source.emit_batch("users", vec![DocumentChange::removed("u1")]);
    assert!(!source.is_watching("teams/red"));
    source.emit_batch(
        "users",
        vec![DocumentChange::added("u1", obj(json!({"teamId": "blue"})))],
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(source.is_watching("teams/blue"));
}

#[test]
fn test_cascading_removal() {
    let (source, store, engine) = setup();

    let query = collection_descriptor("teams", None).child(
        "members",
        Subquery::lazy(|team| {
            let members = format!("teams/{}/members", str_field(team, "id"));
            collection_descriptor(members, None)
                .child(
                    "profile",
                    Subquery::lazy(|member| {
                        document_descriptor(format!("profiles/{}", str_field(member, "id"))).into()
                    }),
                )
                .into()
        }),
    );
    let handle = engine.sync(query).unwrap();

    source.emit_batch(
        "teams",
        vec![DocumentChange::added("team1", obj(json!({"name": "A"})))],
    );
    source.emit_batch(
        "teams/team1/members",
        vec![DocumentChange::added("m1", obj(json!({"role": "lead"})))],
    );
    source.emit_document("profiles/m1", json!({"bio": "hi"}));

    assert_eq!(
        record(&store, "team1"),
        json!({
            "id": "team1",
            "name": "A",
            "members": [{"id": "m1", "role": "lead", "profile": {"id": "m1", "bio": "hi"}}]
        })
    );
    assert_eq!(source.active(), 3);

    source.emit_batch("teams", vec![DocumentChange::removed("team1")]);

    assert!(!store.contains("team1"));
    assert_eq!(source.active(), 1);
    assert_eq!(source.closed(), source.opened() - 1);

    // Late emissions reach nobody and resurrect nothing
    assert_eq!(source.emit_document("profiles/m1", json!({"bio": "late"})), 0);
    assert!(store.is_empty());

    handle.cancel();
    assert_eq!(source.active(), 0);
    assert_eq!(source.closed(), source.opened());
}

#[test]
fn test_array_fan_out() {
    let (source, store, engine) = setup();

    let _handle = engine
        .sync(document_descriptor("users/u1").child(
            "friends",
            vec![document_descriptor("users/u2"), document_descriptor("users/u3")],
        ))
        .unwrap();

    source.emit_document("users/u1", json!({"name": "Ann"}));
    assert!(source.is_watching("users/u2"));
    assert!(source.is_watching("users/u3"));
    assert_eq!(record(&store, "u1")["friends"], json!([]));

    source.emit_document("users/u2", json!({"name": "Bo"}));
    source.emit_document("users/u3", json!({"name": "Cy"}));
    source.emit_document("users/u2", json!({"name": "Bob"}));

    assert_eq!(
        record(&store, "u1")["friends"],
        json!([{"id": "u2", "name": "Bob"}, {"id": "u3", "name": "Cy"}])
    );
    // Fan-out members never become records of their own
    assert_eq!(store.ids(), vec!["u1".to_string()]);

    source.remove_document("users/u3");
    assert_eq!(record(&store, "u1")["friends"], json!([{"id": "u2", "name": "Bob"}]));
}

#[test]
fn test_mixed_fan_out_with_collection() {
    let (source, store, engine) = setup();

    let _handle = engine
        .sync(document_descriptor("boards/b1").child(
            "items",
            Subquery::Array(vec![
                Subquery::value(json!({"id": "pinned"})),
                collection_descriptor("boards/b1/cards", None).into(),
                document_descriptor("notes/n1").into(),
            ]),
        ))
        .unwrap();

    source.emit_document("boards/b1", json!({}));
    source.emit_batch(
        "boards/b1/cards",
        vec![DocumentChange::added("c1", obj(json!({"x": 1})))],
    );
    source.emit_document("notes/n1", json!({"text": "hi"}));
    source.emit_batch(
        "boards/b1/cards",
        vec![DocumentChange::modified("c1", obj(json!({"x": 2})))],
    );

    assert_eq!(
        record(&store, "b1")["items"],
        json!([{"id": "pinned"}, {"id": "c1", "x": 2}, {"id": "n1", "text": "hi"}])
    );
}

#[test]
fn test_static_child_opens_no_listener() {
    let (source, store, engine) = setup();

    let _handle = engine
        .sync(collection_descriptor("users", None).child("kind", Subquery::value("member")))
        .unwrap();

    source.emit_batch(
        "users",
        vec![DocumentChange::added("u1", obj(json!({"name": "Ann"})))],
    );

    assert_eq!(record(&store, "u1"), json!({"id": "u1", "name": "Ann", "kind": "member"}));
    assert_eq!(source.opened(), 1);
}

#[test]
fn test_modified_is_idempotent() {
    let (source, store, engine) = setup();
    let _handle = engine.sync("users").unwrap();

    source.emit_batch(
        "users",
        vec![DocumentChange::added("u1", obj(json!({"n": 1, "a": true})))],
    );
    let change = DocumentChange::modified("u1", obj(json!({"n": 2})));

    source.emit_batch("users", vec![change.clone()]);
    let once = record(&store, "u1");
    source.emit_batch("users", vec![change]);

    assert_eq!(record(&store, "u1"), once);
    assert_eq!(once, json!({"id": "u1", "n": 2, "a": true}));
}

// --- Document Lifecycle ---

#[test]
fn test_document_full_replace_keeps_child_fields() {
    let (source, store, engine) = setup();

    let _handle = engine
        .sync(
            document_descriptor("users/u1")
                .child("todos", collection_descriptor("users/u1/todos", None)),
        )
        .unwrap();

    source.emit_document("users/u1", json!({"name": "Ann", "age": 30}));
    source.emit_batch(
        "users/u1/todos",
        vec![DocumentChange::added("t1", Entity::new())],
    );
    source.emit_document("users/u1", json!({"name": "Bo"}));

    assert_eq!(
        record(&store, "u1"),
        json!({"id": "u1", "name": "Bo", "todos": [{"id": "t1"}]})
    );
    // Still one children listener
    assert_eq!(source.watchers("users/u1/todos"), 1);
}

/// Store that runs a hook, once, on its first access to `id`.
struct InterleavingStore {
    inner: MemoryStore,
    id: String,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl InterleavingStore {
    fn new(id: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            id: id.to_string(),
            hook: Mutex::new(None),
        }
    }

    fn arm(&self, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    fn interleave(&self, id: &str) {
        if id != self.id {
            return;
        }
        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl EntityStore for InterleavingStore {
    fn get(&self, id: &str) -> treesync::Result<Option<Entity>> {
        self.interleave(id);
        self.inner.get(id)
    }

    fn upsert(&self, id: &str, entity: Entity) -> treesync::Result<()> {
        self.interleave(id);
        self.inner.upsert(id, entity)
    }

    fn upsert_with(&self, id: &str, replace: Replace) -> treesync::Result<()> {
        self.interleave(id);
        self.inner.upsert_with(id, replace)
    }

    fn update(&self, id: &str, patch: Patch) -> treesync::Result<bool> {
        self.interleave(id);
        self.inner.update(id, patch)
    }

    fn remove(&self, id: &str) -> treesync::Result<bool> {
        self.interleave(id);
        self.inner.remove(id)
    }
}

#[test]
fn test_document_replace_keeps_concurrent_child_write() {
    let source = Arc::new(MockSource::new());
    let store = Arc::new(InterleavingStore::new("u1"));
    let engine = SyncEngine::new(SyncContext::new(source.clone(), store.clone()));

    let _handle = engine
        .sync(
            document_descriptor("users/u1")
                .child("todos", collection_descriptor("users/u1/todos", None)),
        )
        .unwrap();
    source.emit_document("users/u1", json!({"name": "Ann"}));
    source.emit_batch(
        "users/u1/todos",
        vec![DocumentChange::added("t1", Entity::new())],
    );

    // A todo lands while the parent document is being replaced
    let remote = MockSource::clone(&source);
    store.arm(move || {
        remote.emit_batch(
            "users/u1/todos",
            vec![DocumentChange::added("t2", Entity::new())],
        );
    });
    source.emit_document("users/u1", json!({"name": "Bo"}));

    assert_eq!(
        Value::Object(store.inner.entity("u1").unwrap()),
        json!({"id": "u1", "name": "Bo", "todos": [{"id": "t1"}, {"id": "t2"}]})
    );

    // The registered todo stays writable
    source.emit_batch(
        "users/u1/todos",
        vec![DocumentChange::modified("t2", obj(json!({"done": true})))],
    );
    assert_eq!(
        store.inner.entity("u1").unwrap()["todos"][1],
        json!({"id": "t2", "done": true})
    );
}

#[test]
fn test_document_gone_and_back() {
    let (source, store, engine) = setup();

    let _handle = engine
        .sync(
            document_descriptor("users/u1")
                .child("todos", collection_descriptor("users/u1/todos", None)),
        )
        .unwrap();

    source.emit_document("users/u1", json!({"name": "Ann"}));
    source.remove_document("users/u1");

    assert!(!store.contains("u1"));
    assert!(!source.is_watching("users/u1/todos"));
    assert!(source.is_watching("users/u1"));

    source.emit_document("users/u1", json!({"name": "Ann"}));
    assert!(store.contains("u1"));
    assert_eq!(source.watchers("users/u1/todos"), 1);
    assert_eq!(source.opened(), 3);
}

#[test]
fn test_keep_policy_leaves_record() {
    let (source, store, engine) =
        setup_with(SyncConfig::default().with_missing_document(MissingDocumentPolicy::Keep));

    let handle = engine
        .sync(
            document_descriptor("users/u1")
                .child("todos", collection_descriptor("users/u1/todos", None)),
        )
        .unwrap();

    source.emit_document("users/u1", json!({"name": "Ann"}));
    source.complete("users/u1");

    assert_eq!(record(&store, "u1")["name"], "Ann");
    assert_eq!(source.active(), 0);
    assert!(!handle.is_active());
    assert_eq!(
        handle.try_recv().unwrap(),
        SyncEvent::Completed { path: "users/u1".to_string() }
    );
}

#[test]
fn test_nested_document_children() {
    let (source, store, engine) = setup();

    let query = collection_descriptor("users", None).child(
        "profile",
        Subquery::lazy(|user| {
            document_descriptor(format!("profiles/{}", str_field(user, "id")))
                .child("badge", Subquery::value("gold"))
                .child("posts", collection_descriptor("posts", None))
                .into()
        }),
    );
    let _handle = engine.sync(query).unwrap();

    source.emit_batch("users", vec![DocumentChange::added("u1", Entity::new())]);
    source.emit_document("profiles/u1", json!({"bio": "hi"}));
    source.emit_batch(
        "posts",
        vec![DocumentChange::added("p1", obj(json!({"title": "T"})))],
    );

    assert_eq!(
        record(&store, "u1"),
        json!({
            "id": "u1",
            "profile": {
                "id": "u1",
                "bio": "hi",
                "badge": "gold",
                "posts": [{"id": "p1", "title": "T"}]
            }
        })
    );

    // Profile disappears: its subtree closes, the field is cleared
    source.remove_document("profiles/u1");
    assert!(!source.is_watching("posts"));
    assert_eq!(record(&store, "u1")["profile"], Value::Null);
}

// --- Entry Points ---

#[test]
fn test_many_targets_combined() {
    let (source, store, engine) = setup();

    let handle = engine
        .sync(vec![collection_descriptor("users", None), document_descriptor("config/app")])
        .unwrap();
    assert!(handle.is_active());

    source.emit_document("config/app", json!({"theme": "dark"}));
    assert_eq!(record(&store, "app")["theme"], "dark");

    source.complete("users");
    assert!(handle.is_active());
    source.complete("config/app");
    assert!(!handle.is_active());

    let paths: Vec<String> = handle.drain_events().iter().map(|e| e.path().to_string()).collect();
    assert_eq!(paths, vec!["users".to_string(), "config/app".to_string()]);
}

#[test]
fn test_sync_json() {
    let (source, store, engine) = setup();

    let _handle = engine
        .sync_json(&json!({
            "path": "users",
            "queryFn": {"orderBy": "name"},
            "children": {"role": "guest"}
        }))
        .unwrap();

    assert_eq!(source.filter_for("users"), Some(QueryFilter(json!({"orderBy": "name"}))));

    source.emit_batch("users", vec![DocumentChange::added("u1", Entity::new())]);
    assert_eq!(record(&store, "u1"), json!({"id": "u1", "role": "guest"}));
}

#[test]
fn test_custom_id_key() {
    let (source, store, engine) = setup_with(SyncConfig::default().with_id_key("uid"));

    let _handle = engine
        .sync(
            document_descriptor("users/u1")
                .child("todos", collection_descriptor("users/u1/todos", None)),
        )
        .unwrap();

    source.emit_document("users/u1", json!({"name": "Ann"}));
    source.emit_batch(
        "users/u1/todos",
        vec![DocumentChange::added("t1", Entity::new())],
    );
    source.emit_batch(
        "users/u1/todos",
        vec![DocumentChange::modified("t1", obj(json!({"done": true})))],
    );

    assert_eq!(
        record(&store, "u1"),
        json!({"uid": "u1", "name": "Ann", "todos": [{"uid": "t1", "done": true}]})
    );
}

#[test]
fn test_cancel_stops_everything() {
    let (source, store, engine) = setup();

    let handle = engine
        .sync(collection_descriptor("teams", None).child(
            "members",
            Subquery::lazy(|team| {
                let path = format!("teams/{}/members", str_field(team, "id"));
                collection_descriptor(path, None).into()
            }),
        ))
        .unwrap();

    source.emit_batch(
        "teams",
        vec![
            DocumentChange::added("a", Entity::new()),
            DocumentChange::added("b", Entity::new()),
        ],
    );
    assert_eq!(source.active(), 3);

    handle.cancel();
    assert_eq!(source.active(), 0);
    assert!(!handle.is_active());

    let before = store.snapshot();
    assert_eq!(source.emit_batch("teams", vec![DocumentChange::removed("a")]), 0);
    assert_eq!(store.snapshot(), before);
}

#[test]
fn test_drop_handle_closes_listeners() {
    let (source, _store, engine) = setup();
    {
        let _handle = engine
            .sync(vec![document_descriptor("a/1"), document_descriptor("b/2")])
            .unwrap();
        assert_eq!(source.active(), 2);
    }
    assert_eq!(source.active(), 0);
}
