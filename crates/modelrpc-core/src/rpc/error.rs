//! Bridges call statuses to JSON-RPC error objects.

use serde_json::{json, Value};

use super::types::{self, JsonRpcResponse};
use crate::status::{Status, StatusCode};

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("{}", .0.message)]
    Status(Status),
}

impl RpcError {
    pub fn code(&self) -> i64 {
        match self {
            RpcError::InvalidRequest(_) => types::INVALID_REQUEST,
            RpcError::MethodNotFound(_) => types::METHOD_NOT_FOUND,
            RpcError::InvalidParams(_) => types::INVALID_PARAMS,
            RpcError::Status(status) => status_code(status.code),
        }
    }

    pub fn to_response(&self, id: Option<Value>) -> JsonRpcResponse {
        match self {
            RpcError::Status(status) => JsonRpcResponse::error_with_data(
                id,
                self.code(),
                self.to_string(),
                json!({ "status": status.code, "details": status.details }),
            ),
            _ => JsonRpcResponse::error(id, self.code(), self.to_string()),
        }
    }
}

impl From<Status> for RpcError {
    fn from(status: Status) -> Self {
        RpcError::Status(status)
    }
}

fn status_code(code: StatusCode) -> i64 {
    match code {
        StatusCode::InvalidArgument => types::INVALID_PARAMS,
        StatusCode::Unimplemented => types::METHOD_NOT_FOUND,
        StatusCode::NotFound => types::NOT_FOUND,
        StatusCode::AlreadyExists | StatusCode::FailedPrecondition | StatusCode::OutOfRange => {
            types::BAD_REQUEST
        }
        StatusCode::Cancelled | StatusCode::DeadlineExceeded => types::CANCELLED,
        StatusCode::Unavailable | StatusCode::ResourceExhausted => types::UNAVAILABLE,
        StatusCode::PermissionDenied | StatusCode::Unauthenticated => types::PERMISSION_DENIED,
        StatusCode::Internal | StatusCode::DataLoss => types::INTERNAL_ERROR,
        StatusCode::Ok | StatusCode::Unknown | StatusCode::Aborted => types::CALL_FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_carries_code_and_details() {
        let status = Status::new(StatusCode::NotFound, "no book with id 7")
            .with_details(json!({ "id": 7 }));
        let response = RpcError::from(status).to_response(Some(json!(1)));
        let error = response.error.expect("should be an error");
        assert_eq!(error.code, types::NOT_FOUND);
        assert_eq!(error.message, "no book with id 7");
        assert_eq!(
            error.data,
            Some(json!({ "status": "not_found", "details": { "id": 7 } }))
        );
    }
}
