//! Integration tests for the HTTP adapter.
//!
//! Requests are sent straight into the axum router with `oneshot`, so no
//! socket is bound.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use modelrpc_core::{
    AppState, AppStateInner, Describe, HandlerError, Message, MessageDecl, ServiceBuilder,
    Streaming, TypeDecl,
};
use modelrpc_server::ServerConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tower::ServiceExt;

#[derive(Debug, Serialize, Deserialize)]
struct Range {
    start: i32,
    end: i32,
}

impl Describe for Range {
    fn describe() -> TypeDecl {
        TypeDecl::message::<Self>("Range", || {
            MessageDecl::new().field::<i32>("start").field::<i32>("end")
        })
    }
}

impl Message for Range {}

fn test_state() -> AppState {
    let service = ServiceBuilder::new("Numbers")
        .doc("Small arithmetic helpers.")
        .unary("echo", |text: String, _ctx| Ok::<_, HandlerError>(text))
        .server_streaming("range", |range: Range, _ctx| {
            (range.start..=range.end).map(|n| {
                if n > 3 {
                    Err(HandlerError::invalid_input("too far"))
                } else {
                    Ok(n)
                }
            })
        })
        .client_streaming_async("sum", |mut numbers: Streaming<i64>, _ctx| async move {
            let mut total = 0;
            while let Some(n) = numbers.next().await {
                total += n;
            }
            Ok::<_, HandlerError>(total)
        })
        .build();
    AppStateInner::builder()
        .package("numbers.v1")
        .mount(service)
        .build()
        .expect("test service should compile")
}

fn app() -> Router {
    modelrpc_server::app(test_state())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.expect("request should complete");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    (status, String::from_utf8(bytes.to_vec()).expect("UTF-8 body"))
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .expect("valid request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(app(), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).expect("JSON body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["server"], "modelrpc-server");
}

#[tokio::test]
async fn test_connect_unary() {
    let (status, body) = send(app(), post("/numbers.v1.Numbers/Echo", r#""hello""#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#""hello""#);
}

#[tokio::test]
async fn test_connect_unary_validation_error() {
    let (status, body) = send(app(), post("/numbers.v1.Numbers/Echo", "42")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body).expect("JSON body");
    assert_eq!(body["code"], "invalid_argument");
}

#[tokio::test]
async fn test_connect_unknown_method() {
    let (status, body) = send(app(), post("/numbers.v1.Numbers/Nope", "{}")).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    let body: Value = serde_json::from_str(&body).expect("JSON body");
    assert_eq!(body["code"], "unimplemented");
}

#[tokio::test]
async fn test_connect_server_stream_ends_with_error_line() {
    let (status, body) = send(
        app(),
        post("/numbers.v1.Numbers/Range", r#"{"start": 2, "end": 5}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let lines: Vec<Value> = body
        .lines()
        .map(|line| serde_json::from_str(line).expect("JSON line"))
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], json!(2));
    assert_eq!(lines[1], json!(3));
    assert_eq!(lines[2]["error"]["code"], "invalid_argument");
    assert_eq!(lines[2]["error"]["message"], "too far");
}

#[tokio::test]
async fn test_connect_client_stream() {
    let (status, body) = send(app(), post("/numbers.v1.Numbers/Sum", "1\n2\n\n3\n")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "6");
}

#[tokio::test]
async fn test_json_rpc_endpoint() {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "Numbers.Range",
        "params": { "start": 1, "end": 3 }
    });
    let (status, body) = send(app(), post("/api/rpc", request.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).expect("JSON body");
    assert_eq!(body["id"], 7);
    assert_eq!(body["result"], json!([1, 2, 3]));

    let (_, body) = send(app(), get("/api/rpc/methods")).await;
    let body: Value = serde_json::from_str(&body).expect("JSON body");
    assert_eq!(
        body["methods"],
        json!(["Numbers.Echo", "Numbers.Range", "Numbers.Sum"])
    );
    assert_eq!(body["paths"][0], "/numbers.v1.Numbers/Echo");
}

#[tokio::test]
async fn test_schema_endpoints() {
    let (status, body) = send(app(), get("/api/schema?package=numbers.v1")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("// Small arithmetic helpers.\nservice Numbers {"));
    assert!(body.contains("rpc Range (Range) returns (stream google.protobuf.Int32Value);"));
    assert!(body.contains("rpc Sum (stream google.protobuf.Int64Value) returns (google.protobuf.Int64Value);"));

    let (status, _) = send(app(), get("/api/schema?package=missing.v1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(app(), get("/api/schema.json")).await;
    let body: Value = serde_json::from_str(&body).expect("JSON body");
    assert_eq!(body["package"], "numbers.v1");
    assert_eq!(body["services"][0]["methods"][1]["cardinality"], "unary_stream");

    let (_, body) = send(app(), get("/api/tools")).await;
    let body: Value = serde_json::from_str(&body).expect("JSON body");
    assert_eq!(body["tools"][1]["name"], "Numbers.Range");
    assert_eq!(body["tools"][1]["is_streaming"], true);
}

#[tokio::test]
async fn test_startup_writes_proto_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = ServerConfig {
        port: 0,
        proto_dir: Some(dir.path().to_string_lossy().to_string()),
        ..ServerConfig::default()
    };
    let addr = modelrpc_server::start_server(config, test_state())
        .await
        .expect("server should start");
    assert_ne!(addr.port(), 0);

    let text = std::fs::read_to_string(dir.path().join("numbers.v1.proto"))
        .expect("proto file should exist");
    assert!(text.contains("package numbers.v1;"));
}
