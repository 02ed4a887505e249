//! Failure → status mapping.
//!
//! Resolution order for a failure of kind `K`:
//! 1. a mapping registered for `K` itself;
//! 2. the nearest registered ancestor of `K`, by breadth-first distance;
//!    among ancestors at the same distance the one registered last wins;
//! 3. `Internal` with a generic message (the full failure is logged).
//!
//! Validation failures always produce `InvalidArgument`; a formatter
//! registered for them may reword the message but never change the code.
//! Registering the same kind twice keeps the later mapping.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::failure::{self, CallFailure, FailureKind};
use crate::status::{Status, StatusCode};

/// Builds the message and details of a mapped status.
pub type Formatter = Arc<dyn Fn(&CallFailure) -> (String, Option<Value>) + Send + Sync>;

struct Mapping {
    code: StatusCode,
    formatter: Option<Formatter>,
    seq: usize,
}

pub struct ErrorMapperBuilder {
    mappings: HashMap<&'static str, Mapping>,
    seq: usize,
}

impl Default for ErrorMapperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorMapperBuilder {
    /// An empty registry: only validation failures map to anything but
    /// `Internal`.
    pub fn new() -> Self {
        Self {
            mappings: HashMap::new(),
            seq: 0,
        }
    }

    /// Mappings for the built-in failure kinds.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(&failure::CARDINALITY, StatusCode::InvalidArgument)
            .register(&failure::CANCELLED, StatusCode::Cancelled)
            .register(&failure::NOT_FOUND, StatusCode::NotFound)
            .register(&failure::ALREADY_EXISTS, StatusCode::AlreadyExists)
            .register(&failure::PERMISSION_DENIED, StatusCode::PermissionDenied)
            .register(&failure::UNAUTHENTICATED, StatusCode::Unauthenticated)
            .register(&failure::UNAVAILABLE, StatusCode::Unavailable)
            .register(&failure::INVALID_INPUT, StatusCode::InvalidArgument)
    }

    pub fn register(self, kind: &'static FailureKind, code: StatusCode) -> Self {
        self.insert(kind, code, None)
    }

    pub fn register_with<F>(self, kind: &'static FailureKind, code: StatusCode, formatter: F) -> Self
    where
        F: Fn(&CallFailure) -> (String, Option<Value>) + Send + Sync + 'static,
    {
        self.insert(kind, code, Some(Arc::new(formatter)))
    }

    fn insert(mut self, kind: &'static FailureKind, code: StatusCode, formatter: Option<Formatter>) -> Self {
        self.seq += 1;
        if self.mappings.contains_key(kind.name()) {
            tracing::debug!(kind = kind.name(), "replacing error mapping");
        }
        self.mappings.insert(
            kind.name(),
            Mapping {
                code,
                formatter,
                seq: self.seq,
            },
        );
        self
    }

    pub fn build(self) -> ErrorMapper {
        ErrorMapper {
            mappings: self.mappings,
        }
    }
}

/// Frozen failure → status registry.
pub struct ErrorMapper {
    mappings: HashMap<&'static str, Mapping>,
}

impl Default for ErrorMapper {
    fn default() -> Self {
        ErrorMapperBuilder::with_defaults().build()
    }
}

impl ErrorMapper {
    pub fn builder() -> ErrorMapperBuilder {
        ErrorMapperBuilder::with_defaults()
    }

    fn lookup(&self, kind: &FailureKind) -> Option<&Mapping> {
        if let Some(mapping) = self.mappings.get(kind.name()) {
            return Some(mapping);
        }
        for level in kind.ancestors_by_distance() {
            let best = level
                .iter()
                .filter_map(|ancestor| self.mappings.get(ancestor.name()))
                .max_by_key(|mapping| mapping.seq);
            if best.is_some() {
                return best;
            }
        }
        None
    }

    pub fn map(&self, failure: &CallFailure) -> Status {
        let mapping = self.lookup(failure.kind());

        if let CallFailure::Validation(validation) = failure {
            let (message, details) = match mapping.and_then(|m| m.formatter.as_ref()) {
                Some(formatter) => formatter(failure),
                None => (
                    validation.to_string(),
                    Some(json!({ "violations": validation.violations })),
                ),
            };
            return Status {
                code: StatusCode::InvalidArgument,
                message,
                details,
            };
        }

        let Some(mapping) = mapping else {
            tracing::error!(kind = failure.kind().name(), error = %failure, "unmapped call failure");
            return Status::internal("internal error");
        };

        let (message, details) = match &mapping.formatter {
            Some(formatter) => formatter(failure),
            None => default_format(failure),
        };

        if mapping.code == StatusCode::Internal {
            tracing::error!(kind = failure.kind().name(), error = %failure, "internal call failure");
        }

        Status {
            code: mapping.code,
            message,
            details,
        }
    }
}

fn default_format(failure: &CallFailure) -> (String, Option<Value>) {
    match failure {
        CallFailure::Handler(err) => (err.message.clone(), err.details.clone()),
        CallFailure::Internal(_) => ("internal error".to_string(), None),
        other => (other.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::{HandlerError, HANDLER, NOT_FOUND};
    use crate::validate::ValidationFailure;

    static LOOKUP: FailureKind = FailureKind::root("lookup");
    static STORAGE: FailureKind = FailureKind::root("storage");
    static BOOK_NOT_FOUND: FailureKind = FailureKind {
        name: "book_not_found",
        parents: &[&NOT_FOUND],
    };
    static MISSING_ROW: FailureKind = FailureKind {
        name: "missing_row",
        parents: &[&LOOKUP, &STORAGE],
    };

    fn handler_failure(kind: &'static FailureKind) -> CallFailure {
        CallFailure::Handler(HandlerError::new(kind, "boom"))
    }

    #[test]
    fn test_most_specific_mapping_wins() {
        let mapper = ErrorMapperBuilder::new()
            .register(&HANDLER, StatusCode::Unknown)
            .register(&NOT_FOUND, StatusCode::NotFound)
            .register(&BOOK_NOT_FOUND, StatusCode::FailedPrecondition)
            .build();
        assert_eq!(
            mapper.map(&handler_failure(&BOOK_NOT_FOUND)).code,
            StatusCode::FailedPrecondition
        );
        assert_eq!(mapper.map(&handler_failure(&NOT_FOUND)).code, StatusCode::NotFound);
    }

    #[test]
    fn test_ancestor_mapping_applies() {
        let mapper = ErrorMapper::default();
        let status = mapper.map(&handler_failure(&BOOK_NOT_FOUND));
        assert_eq!(status.code, StatusCode::NotFound);
        assert_eq!(status.message, "boom");
    }

    #[test]
    fn test_equal_distance_prefers_latest_registration() {
        let mapper = ErrorMapperBuilder::new()
            .register(&LOOKUP, StatusCode::NotFound)
            .register(&STORAGE, StatusCode::Unavailable)
            .build();
        assert_eq!(
            mapper.map(&handler_failure(&MISSING_ROW)).code,
            StatusCode::Unavailable
        );

        let mapper = ErrorMapperBuilder::new()
            .register(&STORAGE, StatusCode::Unavailable)
            .register(&LOOKUP, StatusCode::NotFound)
            .build();
        assert_eq!(
            mapper.map(&handler_failure(&MISSING_ROW)).code,
            StatusCode::NotFound
        );
    }

    #[test]
    fn test_reregistration_last_wins() {
        let mapper = ErrorMapperBuilder::new()
            .register(&NOT_FOUND, StatusCode::NotFound)
            .register(&NOT_FOUND, StatusCode::Unknown)
            .build();
        assert_eq!(mapper.map(&handler_failure(&NOT_FOUND)).code, StatusCode::Unknown);
    }

    #[test]
    fn test_unmapped_is_redacted_internal() {
        let mapper = ErrorMapperBuilder::new().build();
        let status = mapper.map(&CallFailure::Internal("db password leaked".into()));
        assert_eq!(status.code, StatusCode::Internal);
        assert_eq!(status.message, "internal error");

        let status = mapper.map(&handler_failure(&LOOKUP));
        assert_eq!(status.code, StatusCode::Internal);
        assert_eq!(status.message, "internal error");
    }

    #[test]
    fn test_validation_code_is_fixed() {
        let mapper = ErrorMapperBuilder::new()
            .register_with(&crate::failure::VALIDATION, StatusCode::Internal, |_| {
                ("request rejected".to_string(), None)
            })
            .build();
        let failure = CallFailure::Validation(ValidationFailure::single("start", "field required"));
        let status = mapper.map(&failure);
        assert_eq!(status.code, StatusCode::InvalidArgument);
        assert_eq!(status.message, "request rejected");

        let status = ErrorMapper::default().map(&failure);
        assert_eq!(
            status.details,
            Some(json!({ "violations": [{ "field": "start", "reason": "field required" }] }))
        );
    }
}
