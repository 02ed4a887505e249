//! Transport-agnostic JSON-RPC 2.0 layer over the dispatcher.
//!
//! Every compiled method is callable as `Service.Method`:
//!
//! ```ignore
//! use modelrpc_core::rpc::RpcRouter;
//!
//! let router = RpcRouter::new(app_state);
//! let response = router.handle_request(r#"{
//!     "jsonrpc": "2.0",
//!     "id": 1,
//!     "method": "Range.Count",
//!     "params": { "start": 1, "end": 3 }
//! }"#).await;
//! ```

pub mod error;
pub mod router;
pub mod types;

pub use error::RpcError;
pub use router::RpcRouter;
pub use types::{JsonRpcRequest, JsonRpcResponse};
