//! Integration tests for the modelrpc-cli commands.
//!
//! These tests exercise the same code paths as the binary against the
//! bundled demo services.

use modelrpc_cli::commands::{call, schema, schema::SchemaFormat};
use modelrpc_cli::demo::{self, UPDATE_COUNT};
use modelrpc_core::rpc::RpcRouter;
use modelrpc_core::AppState;
use serde_json::{json, Value};

fn test_state() -> AppState {
    demo::demo_state(None).expect("demo services should compile")
}

#[tokio::test]
async fn test_say_hello() {
    let state = test_state();
    let response = call::request(&state, "Greeter.SayHello", r#"{"name": "Ada"}"#)
        .await
        .expect("request should dispatch");
    assert_eq!(response["result"]["message"], "Hello, Ada!");
}

#[tokio::test]
async fn test_say_hello_rejects_empty_name() {
    let state = test_state();
    let response = call::request(&state, "Greeter.SayHello", r#"{"name": ""}"#)
        .await
        .expect("request should dispatch");
    let error = response.get("error").expect("Expected error field");
    assert_eq!(error["code"], -32602);
    assert_eq!(error["data"]["status"], "invalid_argument");
}

#[tokio::test]
async fn test_invalid_params_json() {
    let state = test_state();
    let err = call::request(&state, "Greeter.SayHello", "{not json")
        .await
        .unwrap_err();
    assert!(err.starts_with("Invalid JSON params"));
}

#[tokio::test]
async fn test_chat_streaming_shapes() {
    let state = test_state();
    let router = RpcRouter::new(state);

    let response = router
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "ChatService.StreamUpdates",
            "params": { "user": "ada", "text": "build" }
        }))
        .await;
    let updates = response["result"].as_array().expect("Expected array result");
    assert_eq!(updates.len(), UPDATE_COUNT);
    assert_eq!(updates[0]["message"], "Update 1 for ada: Processing 'build'");
    assert!(updates[0]["timestamp"].is_string());

    let response = router
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "ChatService.BatchSend",
            "params": [
                { "user": "ada", "text": "one" },
                { "user": "grace", "text": "two" },
                { "user": "ada", "text": "three" }
            ]
        }))
        .await;
    assert_eq!(
        response["result"]["message"],
        "Received 3 messages from 2 users"
    );

    let response = router
        .handle_value(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "ChatService.ChatSession",
            "params": [{ "user": "ada", "text": "hi" }]
        }))
        .await;
    let messages: Vec<&Value> = response["result"]
        .as_array()
        .expect("Expected array result")
        .iter()
        .map(|reply| &reply["message"])
        .collect();
    assert_eq!(
        messages,
        vec![
            &json!("Echo from server: ada said 'hi'"),
            &json!("Server acknowledges message from ada")
        ]
    );
}

#[tokio::test]
async fn test_library_lookup_and_not_found() {
    let state = test_state();

    let response = call::request(&state, "Library.FindBook", r#"{"key": {"string": "SPQR"}}"#)
        .await
        .expect("request should dispatch");
    let book = &response["result"];
    assert_eq!(book["id"], 3);
    assert_eq!(book["genre"], "HISTORY");
    assert_eq!(book["ratings"]["grace"], 4);

    let response = call::request(&state, "library.v1.Library.FindBook", r#"{"key": {"int64": 99}}"#)
        .await
        .expect("request should dispatch");
    let error = response.get("error").expect("Expected error field");
    assert_eq!(error["code"], -32001);
    assert_eq!(error["data"]["status"], "not_found");
}

#[tokio::test]
async fn test_list_books_by_genre() {
    let state = test_state();
    let response = call::request(
        &state,
        "Library.ListBooks",
        r#"{"genre": "FICTION", "limit": 10}"#,
    )
    .await
    .expect("request should dispatch");
    let titles: Vec<&str> = response["result"]
        .as_array()
        .expect("Expected array result")
        .iter()
        .filter_map(|book| book["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["The Dispossessed", "A Wizard of Earthsea"]);

    let response = call::request(&state, "Library.ListBooks", r#"{"genre": "FICTION", "limit": 0}"#)
        .await
        .expect("request should dispatch");
    assert_eq!(response["error"]["data"]["status"], "invalid_argument");
}

#[tokio::test]
async fn test_list_books_rejects_unknown_genre_at_field() {
    let state = test_state();
    for genre in [r#"2"#, r#""GENRE_UNSPECIFIED""#, r#""POETRY""#] {
        let params = format!(r#"{{"genre": {}, "limit": 5}}"#, genre);
        let response = call::request(&state, "Library.ListBooks", &params)
            .await
            .expect("request should dispatch");
        let error = response.get("error").expect("Expected error field");
        assert_eq!(error["code"], -32602);
        let violations = error["data"]["details"]["violations"]
            .as_array()
            .expect("Expected violations");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0]["field"], "genre");
        assert_eq!(
            violations[0]["reason"],
            "expected a member of enum Genre (FICTION, HISTORY, SCIENCE)"
        );
    }
}

#[tokio::test]
async fn test_count_categories() {
    let state = test_state();
    let response = call::request(
        &state,
        "Library.CountCategories",
        r#"{"name": "all", "children": [{"name": "sf", "children": []}, {"name": "rome", "children": []}]}"#,
    )
    .await
    .expect("request should dispatch");
    assert_eq!(response["result"], 3);
}

#[test]
fn test_schema_proto_output() {
    let state = test_state();
    let text = schema::render(&state, SchemaFormat::Proto, Some("library.v1"))
        .expect("library package should render");
    assert!(text.contains("package library.v1;"));
    assert!(text.contains("import \"google/protobuf/timestamp.proto\";"));
    assert!(text.contains("import \"google/api/annotations.proto\";"));
    assert!(text.contains("rpc ListBooks (GenreFilter) returns (stream Book) {"));
    assert!(text.contains("      get: \"/v1/books\"\n      additional_bindings {"));
    assert!(text.contains("      post: \"/v1/books:find\"\n      body: \"*\"\n"));
    assert!(text.contains("    option idempotency_level = NO_SIDE_EFFECTS;"));
    assert!(text.contains("  reserved 3;"));
    assert!(text.contains("  map<string, int32> ratings = "));
    assert!(text.contains("  oneof key {"));
    assert!(text.contains("    string key_string = 2;"));

    let err = schema::render(&state, SchemaFormat::Proto, Some("nope.v1")).unwrap_err();
    assert_eq!(err, "Unknown package: nope.v1");
}

#[test]
fn test_schema_tools_output() {
    let state = test_state();
    let text = schema::render(&state, SchemaFormat::Tools, None).expect("tools should render");
    let tools: Value = serde_json::from_str(&text).expect("tools should be JSON");
    let names: Vec<&str> = tools
        .as_array()
        .expect("Expected tool array")
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    assert!(names.contains(&"Greeter.SayHello"));
    assert!(names.contains(&"ChatService.ChatSession"));
    assert!(names.contains(&"Library.FindBook"));
}

#[test]
fn test_schema_write_files() {
    let state = test_state();
    let dir = tempfile::tempdir().expect("tempdir");

    let written = schema::write(&state, SchemaFormat::Proto, dir.path()).expect("proto files");
    assert_eq!(written.len(), 2);
    assert!(dir.path().join("greeter.v1.proto").exists());
    assert!(dir.path().join("library.v1.proto").exists());

    let written = schema::write(&state, SchemaFormat::Json, dir.path()).expect("schema.json");
    let text = std::fs::read_to_string(&written[0]).expect("schema.json readable");
    let doc: Value = serde_json::from_str(&text).expect("schema.json is JSON");
    assert_eq!(doc["package"], "greeter.v1");
}
