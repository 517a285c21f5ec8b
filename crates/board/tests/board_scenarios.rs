use boost_board::{Board, BoardContext, BoardError, ColumnPhase, Notice};
use boost_core::analytics::EventRecord;
use boost_core::paths::CollectionPath;
use boost_core::{
    CollectionKey, NodeDocument, Position, RenderedBody, Transform, TransformSet, UserId,
};
use boost_storage::{CollectionQuery, DocumentStore, LocalAuth, MemoryStore, MonotonicClock, Operation};
use serde_json::Value;
use std::rc::Rc;

fn user() -> UserId {
    UserId::try_new("u1").expect("user id")
}

fn store() -> Rc<MemoryStore> {
    Rc::new(MemoryStore::with_clock(MonotonicClock::starting_at(1_000)))
}

fn context(store: &Rc<MemoryStore>, auth: &Rc<LocalAuth>) -> BoardContext {
    BoardContext::new(store.clone(), store.clone(), auth.clone())
        .with_viewport_width(1000.0)
        .without_events()
}

fn messages(board: &Board, key: &CollectionKey) -> Vec<String> {
    board
        .submitted_nodes(key)
        .expect("active type")
        .iter()
        .map(|node| node.payload.message().to_string())
        .collect()
}

/// Messages of persisted documents, oldest first.
fn stored_messages(store: &MemoryStore, key: &CollectionKey) -> Vec<String> {
    store
        .fetch_collection(&CollectionQuery::oldest_first(CollectionPath::nodes(
            &user(),
            key,
        )))
        .expect("fetch")
        .into_iter()
        .map(|doc| {
            let document: NodeDocument =
                serde_json::from_value(Value::Object(doc.fields)).expect("node document");
            document.data.message
        })
        .collect()
}

fn text_node_doc(message: &str) -> boost_storage::Fields {
    let document = NodeDocument::new("Goal", &boost_core::NodePayload::Text(message.to_string()));
    match serde_json::to_value(document).expect("encode") {
        Value::Object(fields) => fields,
        other => panic!("expected object, got {other:?}"),
    }
}

#[test]
fn anonymous_submit_then_login_persists_staged_node() {
    let store = store();
    let auth = Rc::new(LocalAuth::new());
    let mut board = Board::new(context(&store, &auth));
    let goals = CollectionKey::goals();
    let first_entry = board.entry_node(&goals).expect("entry").id.clone();

    let staged_id = board.submit(&goals, "  Run 5k ").expect("staged submit");
    assert_eq!(board.take_notices(), vec![Notice::LoginToSave]);
    assert_eq!(Notice::LoginToSave.message(), "Log in to save your goals");
    assert_eq!(messages(&board, &goals), vec!["Run 5k"]);

    let entry = board.entry_node(&goals).expect("entry");
    assert!(!entry.submitted);
    assert_ne!(entry.id, first_entry, "a fresh entry node spawns after submit");
    assert_ne!(entry.id, staged_id);
    assert_eq!(board.staging().len(), 1);
    assert!(stored_messages(&store, &goals).is_empty());

    auth.sign_in(user());
    board.pump();

    assert!(board.staging().is_empty());
    assert_eq!(stored_messages(&store, &goals), vec!["Run 5k"]);
    let shown = board.submitted_nodes(&goals).expect("goals");
    assert_eq!(shown.len(), 1);
    assert_ne!(shown[0].id, staged_id, "node is now sourced from the store");
    let persisted = store.documents(&CollectionPath::nodes(&user(), &goals));
    assert_eq!(shown[0].id.as_str(), persisted[0].id);
    assert_eq!(board.column_phase(&goals), Some(ColumnPhase::Live));
    assert_eq!(board.take_notices(), vec![Notice::StagedSaved { count: 1 }]);
}

#[test]
fn type_delete_is_refused_while_nodes_exist() {
    let store = store();
    let auth = Rc::new(LocalAuth::signed_in(user()));
    let mut board = Board::new(context(&store, &auth));
    board.pump();

    let workouts = board.define_type("Workout").expect("define type");
    assert_eq!(workouts.as_str(), "workouts");
    board.pump();
    let bench = board.submit(&workouts, "Bench press").expect("submit");
    board.pump();

    match board.delete_type("Workout") {
        Err(BoardError::NonEmptyCollection { key }) => assert_eq!(key, workouts),
        other => panic!("expected NonEmptyCollection, got {other:?}"),
    }
    let registered: Vec<CollectionKey> = board
        .registered_types()
        .expect("types")
        .into_iter()
        .map(|t| t.key)
        .collect();
    assert_eq!(registered, vec![CollectionKey::goals(), workouts.clone()]);

    board.delete_node(&bench).expect("delete node");
    board.pump();
    board.delete_type("Workout").expect("empty type deletes");

    let registered = board.registered_types().expect("types");
    assert_eq!(registered.len(), 1);
    assert!(board.submitted_nodes(&workouts).is_none());
}

#[test]
fn default_type_is_protected() {
    let store = store();
    let auth = Rc::new(LocalAuth::signed_in(user()));
    let mut board = Board::new(context(&store, &auth));
    match board.delete_type("Goal") {
        Err(BoardError::ProtectedType) => {}
        other => panic!("expected ProtectedType, got {other:?}"),
    }

    auth.sign_out();
    board.pump();
    match board.delete_type("goals") {
        Err(BoardError::ProtectedType) => {}
        other => panic!("expected ProtectedType, got {other:?}"),
    }
}

#[test]
fn interleaved_snapshots_keep_every_type() {
    let store = store();
    let auth = Rc::new(LocalAuth::signed_in(user()));
    let mut board = Board::new(context(&store, &auth));
    let goals = CollectionKey::goals();
    let workouts = board.define_type("Workout").expect("define");
    let goals_path = CollectionPath::nodes(&user(), &goals);
    let workouts_path = CollectionPath::nodes(&user(), &workouts);

    let a = store.create_document(&goals_path, text_node_doc("a")).expect("a");
    store.create_document(&workouts_path, text_node_doc("w1")).expect("w1");
    store.create_document(&goals_path, text_node_doc("b")).expect("b");
    board.pump();
    assert_eq!(messages(&board, &goals), vec!["b", "a"]);
    assert_eq!(messages(&board, &workouts), vec!["w1"]);

    store.create_document(&workouts_path, text_node_doc("w2")).expect("w2");
    store.delete_document(&goals_path, &a).expect("delete a");
    store.create_document(&workouts_path, text_node_doc("w3")).expect("w3");
    board.pump();
    assert_eq!(messages(&board, &goals), vec!["b"]);
    assert_eq!(messages(&board, &workouts), vec!["w3", "w2", "w1"]);
}

#[test]
fn snapshots_from_released_subscriptions_are_ignored() {
    let store = store();
    let auth = Rc::new(LocalAuth::signed_in(user()));
    let mut board = Board::new(context(&store, &auth));
    let workouts = board.define_type("Workout").expect("define");
    let workouts_path = CollectionPath::nodes(&user(), &workouts);

    store.create_document(&workouts_path, text_node_doc("queued")).expect("write");
    assert!(board.deactivate_type(&workouts));
    board.pump();
    assert!(board.submitted_nodes(&workouts).is_none());
    assert_eq!(store.live_subscriptions(), 1);

    board.activate_type("Workout").expect("reactivate");
    board.pump();
    assert_eq!(messages(&board, &workouts), vec!["queued"]);
}

#[test]
fn optimistic_writes_never_duplicate_or_resurrect() {
    let store = store();
    let auth = Rc::new(LocalAuth::signed_in(user()));
    let mut board = Board::new(context(&store, &auth));
    let goals = CollectionKey::goals();

    let first = board.submit(&goals, "first").expect("submit");
    assert_eq!(messages(&board, &goals), vec!["first"], "visible before any snapshot");
    board.pump();
    assert_eq!(messages(&board, &goals), vec!["first"]);

    board.submit(&goals, "second").expect("submit");
    board.delete_node(&first).expect("delete");
    assert_eq!(messages(&board, &goals), vec!["second"]);
    board.pump();
    assert_eq!(messages(&board, &goals), vec!["second"]);
    assert_eq!(stored_messages(&store, &goals), vec!["second"]);
}

#[test]
fn drain_keeps_order_and_retries_failures_on_next_login() {
    let store = store();
    let auth = Rc::new(LocalAuth::new());
    let mut board = Board::new(context(&store, &auth));
    let goals = CollectionKey::goals();
    for text in ["a", "b", "c"] {
        board.submit(&goals, text).expect("stage");
    }
    assert_eq!(messages(&board, &goals), vec!["c", "b", "a"]);

    store.fail_next(Operation::Create, 1);
    auth.sign_in(user());
    board.pump();
    assert_eq!(stored_messages(&store, &goals), vec!["b", "c"]);
    assert_eq!(board.staging().len(), 1);
    assert_eq!(board.staging().entries()[0].payload.message(), "a");
    let notices = board.take_notices();
    assert!(notices.contains(&Notice::StagedKept { count: 1 }));

    auth.sign_out();
    board.pump();
    assert_eq!(messages(&board, &goals), vec!["a"]);
    auth.sign_in(user());
    board.pump();
    assert_eq!(stored_messages(&store, &goals), vec!["b", "c", "a"]);
    assert!(board.staging().is_empty());
    assert_eq!(messages(&board, &goals), vec!["a", "c", "b"]);
}

#[test]
fn staged_custom_types_are_registered_on_login() {
    let store = store();
    let auth = Rc::new(LocalAuth::new());
    let mut board = Board::new(context(&store, &auth));

    let runs = board.define_type("Run").expect("transient type");
    board.submit(&runs, "5k").expect("stage");
    assert!(store.documents(&CollectionPath::type_registry(&user())).is_empty());

    auth.sign_in(user());
    board.pump();
    let keys: Vec<String> = board
        .registered_types()
        .expect("types")
        .into_iter()
        .map(|t| t.key.into_string())
        .collect();
    assert_eq!(keys, vec!["goals", "runs"]);
    assert_eq!(messages(&board, &runs), vec!["5k"]);
}

#[test]
fn failed_subscriptions_yield_empty_columns() {
    let store = store();
    store.deny_prefix("users/u1/workouts");
    let auth = Rc::new(LocalAuth::signed_in(user()));
    let mut board = Board::new(context(&store, &auth));
    board.pump();

    let workouts = board.define_type("Workout").expect("registry write is allowed");
    board.pump();
    assert_eq!(board.column_phase(&workouts), Some(ColumnPhase::Unsubscribed));
    assert_eq!(board.submitted_nodes(&workouts).map(<[_]>::len), Some(0));

    let goals = CollectionKey::goals();
    board.submit(&goals, "kept").expect("submit");
    board.pump();
    let before = store.live_subscriptions();
    store.break_subscriptions(&CollectionPath::nodes(&user(), &goals), "revoked");
    board.pump();
    assert_eq!(board.column_phase(&goals), Some(ColumnPhase::Unsubscribed));
    assert!(messages(&board, &goals).is_empty());
    assert_eq!(store.live_subscriptions(), before - 1);
}

#[test]
fn write_failures_leave_the_board_unchanged() {
    let store = store();
    let auth = Rc::new(LocalAuth::signed_in(user()));
    let mut board = Board::new(context(&store, &auth));
    let goals = CollectionKey::goals();
    board.pump();

    store.fail_next(Operation::Create, 1);
    match board.submit(&goals, "lost") {
        Err(BoardError::Write(_)) => {}
        other => panic!("expected Write, got {other:?}"),
    }
    assert!(messages(&board, &goals).is_empty());
}

#[test]
fn layout_centers_columns_and_respects_moves() {
    let store = store();
    let auth = Rc::new(LocalAuth::signed_in(user()));
    let mut board = Board::new(context(&store, &auth));
    let goals = CollectionKey::goals();
    let goal = board.submit(&goals, "g").expect("submit");
    board.pump();

    let placed = board.nodes();
    assert_eq!(placed.len(), 2);
    assert_eq!(placed[0].position, Position::new(400.0, 100.0));
    assert!(!placed[0].node.submitted);
    assert_eq!(placed[1].position, Position::new(400.0, 300.0));

    let workouts = board.define_type("Workout").expect("define");
    board.pump();
    let xs: Vec<f64> = board.nodes().iter().map(|p| p.position.x).collect();
    assert_eq!(xs, vec![275.0, 275.0, 525.0]);

    board.set_filter(Some("Workout")).expect("filter");
    let focused = board.nodes();
    assert_eq!(focused.len(), 1);
    assert_eq!(focused[0].node.type_key, workouts);
    assert_eq!(focused[0].position.x, 400.0);
    board.set_filter(None).expect("clear filter");

    board
        .move_node(&goal, Position::new(10.0, 20.0))
        .expect("move");
    board.resize(2000.0);
    let moved = board
        .nodes()
        .into_iter()
        .find(|p| p.node.id == goal)
        .expect("goal placed");
    assert!(moved.moved);
    assert_eq!(moved.position, Position::new(10.0, 20.0));
}

#[test]
fn focused_type_gets_a_fresh_entry_on_snapshot() {
    let store = store();
    let auth = Rc::new(LocalAuth::signed_in(user()));
    let mut board = Board::new(context(&store, &auth));
    let goals = CollectionKey::goals();
    let workouts = board.define_type("Workout").expect("define");
    board.pump();

    board.set_draft(&goals, "half typed goal").expect("draft");
    board.set_draft(&workouts, "half typed workout").expect("draft");
    board.set_filter(Some("Goal")).expect("filter");

    store
        .create_document(&CollectionPath::nodes(&user(), &goals), text_node_doc("x"))
        .expect("write goal");
    store
        .create_document(&CollectionPath::nodes(&user(), &workouts), text_node_doc("y"))
        .expect("write workout");
    board.pump();

    assert_eq!(board.entry_node(&goals).expect("entry").draft, "");
    assert_eq!(
        board.entry_node(&workouts).expect("entry").draft,
        "half typed workout"
    );
}

#[test]
fn edit_rewrites_text_and_file_nodes_release_blobs() {
    let store = store();
    let auth = Rc::new(LocalAuth::signed_in(user()));
    let mut board = Board::new(context(&store, &auth));
    let goals = CollectionKey::goals();

    let id = board.submit(&goals, "draft").expect("submit");
    board.edit_node(&id, "final").expect("edit");
    assert_eq!(messages(&board, &goals), vec!["final"]);
    board.pump();
    assert_eq!(stored_messages(&store, &goals), vec!["final"]);

    let entry_id = board.entry_node(&goals).expect("entry").id.clone();
    let file = board
        .submit_file(&goals, "plan.pdf", b"%PDF")
        .expect("upload");
    board.pump();
    let blob = format!("users/u1/goals/{entry_id}/plan.pdf");
    assert_eq!(store.blob(&blob), Some(b"%PDF".to_vec()));
    let node = board.node(&file).expect("file node");
    match node.render().body {
        RenderedBody::Link { file_name, .. } => assert_eq!(file_name, "plan.pdf"),
        other => panic!("expected link, got {other:?}"),
    }
    match board.edit_node(&file, "text") {
        Err(BoardError::ReadOnlyNode { .. }) => {}
        other => panic!("expected ReadOnlyNode, got {other:?}"),
    }

    board.delete_node(&file).expect("delete file node");
    assert_eq!(store.blob(&blob), None);
}

#[test]
fn uploads_require_sign_in_and_report_transport_errors() {
    let store = store();
    let auth = Rc::new(LocalAuth::new());
    let mut board = Board::new(context(&store, &auth));
    let goals = CollectionKey::goals();
    match board.submit_file(&goals, "a.txt", b"a") {
        Err(BoardError::Unauthenticated) => {}
        other => panic!("expected Unauthenticated, got {other:?}"),
    }

    auth.sign_in(user());
    board.pump();
    store.fail_next(Operation::Upload, 1);
    match board.submit_file(&goals, "a.txt", b"a") {
        Err(BoardError::Upload(_)) => {}
        other => panic!("expected Upload, got {other:?}"),
    }
    assert!(messages(&board, &goals).is_empty());
}

#[test]
fn anonymous_delete_is_local_and_unknown_ids_are_not_found() {
    let store = store();
    let auth = Rc::new(LocalAuth::new());
    let mut board = Board::new(context(&store, &auth));
    let goals = CollectionKey::goals();

    let id = board.submit(&goals, "temp").expect("stage");
    board.delete_node(&id).expect("local delete");
    assert!(board.staging().is_empty());
    assert!(messages(&board, &goals).is_empty());
    assert_eq!(store.write_count(), 0);

    match board.delete_node(&id) {
        Err(BoardError::NotFound { node_id }) => assert_eq!(node_id, id),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn configured_transform_runs_before_store() {
    let store = store();
    let auth = Rc::new(LocalAuth::signed_in(user()));
    let mut transforms = TransformSet::default();
    transforms.insert(
        CollectionKey::goals(),
        Transform::TemplateSubstitution {
            template: "{type}: {value}".to_string(),
        },
    );
    let mut board = Board::new(context(&store, &auth).with_transforms(transforms));
    let goals = CollectionKey::goals();

    board.submit(&goals, " run ").expect("submit");
    board.pump();
    assert_eq!(stored_messages(&store, &goals), vec!["Goal: run"]);
}

#[test]
fn dropping_the_board_releases_subscriptions_and_ends_the_session() {
    let store = store();
    let auth = Rc::new(LocalAuth::signed_in(user()));
    {
        let mut board = Board::new(
            BoardContext::new(store.clone(), store.clone(), auth.clone()).with_viewport_width(1000.0),
        );
        board.define_type("Workout").expect("define");
        board.submit(&CollectionKey::goals(), "g").expect("submit");
        assert_eq!(store.live_subscriptions(), 2);
    }
    assert_eq!(store.live_subscriptions(), 0);

    let kinds: Vec<String> = store
        .fetch_collection(&CollectionQuery::oldest_first(CollectionPath::events()))
        .expect("events")
        .into_iter()
        .map(|doc| {
            let record: EventRecord =
                serde_json::from_value(Value::Object(doc.fields)).expect("event");
            serde_json::to_value(record.kind)
                .expect("kind")
                .as_str()
                .unwrap_or_default()
                .to_string()
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["session_start", "type_created", "node_submitted", "session_end"]
    );
}
