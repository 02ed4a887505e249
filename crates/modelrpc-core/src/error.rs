//! Startup error types.
//!
//! `SchemaError` aborts compilation; `SignatureError` rejects a single method
//! while the rest of its service still registers. Per-call failures live in
//! [`crate::failure`].

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Unsupported type {type_name} at {path}: {reason}")]
    UnsupportedType {
        type_name: String,
        path: String,
        reason: String,
    },

    #[error("Schema conflict on {name}: {first} and {second} compile to the same name")]
    SchemaConflict {
        name: String,
        first: String,
        second: String,
    },
}

impl SchemaError {
    pub(crate) fn unsupported(
        type_name: impl Into<String>,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SchemaError::UnsupportedType {
            type_name: type_name.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Invalid method signature for {method}: {reason}")]
    InvalidMethodSignature { method: String, reason: String },
}

impl SignatureError {
    pub(crate) fn invalid(method: impl Into<String>, reason: impl Into<String>) -> Self {
        SignatureError::InvalidMethodSignature {
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub fn method(&self) -> &str {
        match self {
            SignatureError::InvalidMethodSignature { method, .. } => method,
        }
    }
}
