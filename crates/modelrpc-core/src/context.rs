//! Per-call context handed to every handler.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identity, metadata and cancellation for one call.
///
/// Async handlers are aborted by the dispatcher when the call is cancelled.
/// Sync handlers keep running on their blocking worker; long-running ones
/// should poll [`CallContext::is_cancelled`] and return early.
#[derive(Debug, Clone)]
pub struct CallContext {
    call_id: Uuid,
    method: String,
    metadata: Arc<HashMap<String, String>>,
    cancel: CancellationToken,
}

impl CallContext {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            method: method.into(),
            metadata: Arc::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = Arc::new(metadata);
        self
    }

    /// Tie this call to an externally owned token, e.g. a connection's.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
