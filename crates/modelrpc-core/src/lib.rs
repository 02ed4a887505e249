//! modelrpc Core: RPC schemas inferred from declared types, and a
//! transport-agnostic call dispatcher.
//!
//! Services are declared as plain Rust types and method signatures. At
//! startup the schema compiler turns them into a [`SchemaDocument`]
//! (messages, enums, oneofs, field numbers, streaming cardinality); at
//! request time the [`Dispatcher`] drives handlers over inbound value
//! streams in all four call shapes. The crate has **no HTTP framework
//! dependency** by default, so it serves:
//!
//! - HTTP adapters (via `modelrpc-server`)
//! - CLI tools (via `modelrpc-cli`)
//! - in-process callers through the JSON-RPC [`rpc::RpcRouter`]
//!
//! # Feature Flags
//!
//! - `axum`: Enables `IntoResponse` impl on [`Status`] for use in axum handlers.

pub mod compiler;
pub mod context;
pub mod decl;
pub mod dispatch;
pub mod error;
pub mod failure;
pub mod handler;
pub mod json_schema;
pub mod mapper;
pub mod options;
pub mod render;
mod resolver;
pub mod rpc;
pub mod service;
pub mod shape;
pub mod state;
pub mod status;
pub mod types;
pub mod validate;

// Convenience re-exports
pub use compiler::{CompileOptions, SchemaCompiler, SchemaDocument};
pub use context::CallContext;
pub use decl::{Bytes, Describe, EnumDecl, Message, MessageDecl, TypeDecl};
pub use dispatch::Dispatcher;
pub use error::{SchemaError, SignatureError};
pub use failure::{CallFailure, FailureKind, HandlerError};
pub use handler::{Handler, RequestIter, Streaming};
pub use mapper::{ErrorMapper, ErrorMapperBuilder};
pub use options::{HttpRule, HttpVerb, MethodOptions, OptionValue};
pub use service::{ServiceBuilder, ServiceDeclaration};
pub use shape::{CallShape, Execution, MethodSignature};
pub use state::{AppState, AppStateBuilder, AppStateInner};
pub use status::{Status, StatusCode};
pub use validate::ValidationFailure;
