//! Connect-style JSON calls: `POST /{package.Service}/{Method}`.
//!
//! Unary requests carry one JSON message in the body and receive one JSON
//! message back; failures come back as a `Status` body with the matching
//! HTTP status. Client-streaming requests send newline-delimited JSON.
//! Server-streaming responses are newline-delimited JSON, ending with an
//! `{"error": ...}` line when the call fails part way.
//!
//! Dropping the response (client disconnect) cancels the call.

use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use modelrpc_core::dispatch::InboundStream;
use modelrpc_core::{AppState, CallContext, Status};
use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

const NDJSON: &str = "application/x-ndjson";

pub fn router() -> Router<AppState> {
    Router::new().route("/{service}/{method}", post(call_handler))
}

async fn call_handler(
    State(state): State<AppState>,
    Path((service, method)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let name = format!("{}/{}", service, method);
    let Some(entry) = state.method(&name) else {
        return Status::unimplemented(format!("method {} is not implemented", name))
            .into_response();
    };
    let shape = entry.descriptor.cardinality;
    let path = entry.path.clone();

    let requests = if shape.client_streaming() {
        parse_lines(&body)
    } else {
        parse_single(&body).map(|request| vec![request])
    };
    let requests = match requests {
        Ok(requests) => requests,
        Err(status) => return status.into_response(),
    };

    let token = CancellationToken::new();
    let ctx = CallContext::new(path.clone())
        .with_metadata(metadata(&headers))
        .with_cancellation(token.clone());
    let inbound: InboundStream = Box::pin(tokio_stream::iter(requests));
    let mut responses = state.invoke(&path, inbound, ctx);

    if !shape.server_streaming() {
        // Held until the handler answers; dropping it cancels the call.
        let _guard = token.drop_guard();
        return match responses.next().await {
            Some(Ok(message)) => Json(message).into_response(),
            Some(Err(status)) => status.into_response(),
            None => Status::internal("call produced no response").into_response(),
        };
    }

    let lines = async_stream::stream! {
        let _guard = token.drop_guard();
        while let Some(item) = responses.next().await {
            match item {
                Ok(message) => yield Ok::<_, Infallible>(format!("{}\n", message)),
                Err(status) => {
                    let error = serde_json::json!({ "error": status });
                    yield Ok(format!("{}\n", error));
                    break;
                }
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, NDJSON)
        .body(Body::from_stream(lines))
        .unwrap_or_else(|_| Status::internal("failed to build response").into_response())
}

/// An empty body is the empty message `{}`.
fn parse_single(body: &Bytes) -> Result<Value, Status> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body)
        .map_err(|e| Status::invalid_argument(format!("request body is not valid JSON: {}", e)))
}

fn parse_lines(body: &Bytes) -> Result<Vec<Value>, Status> {
    let text = std::str::from_utf8(body)
        .map_err(|e| Status::invalid_argument(format!("request body is not UTF-8: {}", e)))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| {
                Status::invalid_argument(format!("line {} is not valid JSON: {}", index + 1, e))
            })
        })
        .collect()
}

/// Request headers visible to handlers through `CallContext::metadata`.
fn metadata(headers: &HeaderMap) -> std::collections::HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}
