//! Per-call failure taxonomy.
//!
//! Every failure carries a [`FailureKind`]. Kinds form a hierarchy (a kind
//! may have several parents) that the error mapper walks to find the most
//! specific registered status.
//!
//! Application kinds are declared as statics next to the built-in ones:
//!
//! ```ignore
//! static BOOK_NOT_FOUND: FailureKind = FailureKind {
//!     name: "book_not_found",
//!     parents: &[&NOT_FOUND],
//! };
//! ```

use std::collections::HashSet;

use crate::validate::ValidationFailure;

/// A node in the failure hierarchy. Kinds are identified by name.
#[derive(Debug)]
pub struct FailureKind {
    pub name: &'static str,
    pub parents: &'static [&'static FailureKind],
}

impl FailureKind {
    pub const fn root(name: &'static str) -> Self {
        Self { name, parents: &[] }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parents(&self) -> &'static [&'static FailureKind] {
        self.parents
    }

    /// Ancestors grouped by breadth-first distance: parents first, then
    /// grandparents, and so on. Each ancestor appears once, at its shortest
    /// distance.
    pub fn ancestors_by_distance(&self) -> Vec<Vec<&'static FailureKind>> {
        let mut seen: HashSet<&'static str> = HashSet::new();
        seen.insert(self.name);
        let mut levels = Vec::new();
        let mut frontier: Vec<&'static FailureKind> = self.parents.to_vec();

        while !frontier.is_empty() {
            let mut level = Vec::new();
            for kind in frontier {
                if seen.insert(kind.name) {
                    level.push(kind);
                }
            }
            if level.is_empty() {
                break;
            }
            frontier = level.iter().flat_map(|k| k.parents.iter().copied()).collect();
            levels.push(level);
        }
        levels
    }

    pub fn is_a(&self, other: &FailureKind) -> bool {
        self.name == other.name
            || self
                .ancestors_by_distance()
                .iter()
                .flatten()
                .any(|k| k.name == other.name)
    }
}

impl PartialEq for FailureKind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for FailureKind {}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

pub static VALIDATION: FailureKind = FailureKind::root("validation");
pub static CARDINALITY: FailureKind = FailureKind::root("cardinality");
pub static CANCELLED: FailureKind = FailureKind::root("cancelled");
pub static INTERNAL: FailureKind = FailureKind::root("internal");
/// Root of everything raised by handler code.
pub static HANDLER: FailureKind = FailureKind::root("handler");

pub static NOT_FOUND: FailureKind = FailureKind {
    name: "not_found",
    parents: &[&HANDLER],
};
pub static ALREADY_EXISTS: FailureKind = FailureKind {
    name: "already_exists",
    parents: &[&HANDLER],
};
pub static PERMISSION_DENIED: FailureKind = FailureKind {
    name: "permission_denied",
    parents: &[&HANDLER],
};
pub static UNAUTHENTICATED: FailureKind = FailureKind {
    name: "unauthenticated",
    parents: &[&HANDLER],
};
pub static UNAVAILABLE: FailureKind = FailureKind {
    name: "unavailable",
    parents: &[&HANDLER],
};
pub static INVALID_INPUT: FailureKind = FailureKind {
    name: "invalid_input",
    parents: &[&HANDLER],
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failure raised by handler code.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct HandlerError {
    pub kind: &'static FailureKind,
    pub message: String,
    pub details: Option<serde_json::Value>,
    #[source]
    pub source: Option<BoxError>,
}

impl HandlerError {
    pub fn new(kind: &'static FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(&NOT_FOUND, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(&ALREADY_EXISTS, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(&INVALID_INPUT, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(&UNAVAILABLE, message)
    }

    /// A handler failure with no more specific kind.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(&HANDLER, message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CardinalityViolation {
    #[error("expected exactly one request message, received none")]
    Missing,

    #[error("expected exactly one request message, received more")]
    Excess,
}

/// Everything that can end a call early.
#[derive(Debug, thiserror::Error)]
pub enum CallFailure {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error(transparent)]
    Cardinality(#[from] CardinalityViolation),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("call cancelled")]
    Cancelled,

    /// Encode failures, panics and anything else unexpected. The message is
    /// logged, never sent to the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CallFailure {
    pub fn kind(&self) -> &'static FailureKind {
        match self {
            CallFailure::Validation(_) => &VALIDATION,
            CallFailure::Cardinality(_) => &CARDINALITY,
            CallFailure::Handler(err) => err.kind,
            CallFailure::Cancelled => &CANCELLED,
            CallFailure::Internal(_) => &INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static LOOKUP: FailureKind = FailureKind::root("lookup");
    static BOOK_NOT_FOUND: FailureKind = FailureKind {
        name: "book_not_found",
        parents: &[&NOT_FOUND, &LOOKUP],
    };
    static SHELF_BOOK_NOT_FOUND: FailureKind = FailureKind {
        name: "shelf_book_not_found",
        parents: &[&BOOK_NOT_FOUND],
    };

    #[test]
    fn test_ancestors_by_distance() {
        let levels = SHELF_BOOK_NOT_FOUND.ancestors_by_distance();
        let names: Vec<Vec<&str>> = levels
            .iter()
            .map(|level| level.iter().map(|k| k.name()).collect())
            .collect();
        assert_eq!(
            names,
            vec![
                vec!["book_not_found"],
                vec!["not_found", "lookup"],
                vec!["handler"],
            ]
        );
    }

    #[test]
    fn test_is_a() {
        assert!(BOOK_NOT_FOUND.is_a(&HANDLER));
        assert!(BOOK_NOT_FOUND.is_a(&LOOKUP));
        assert!(!NOT_FOUND.is_a(&LOOKUP));
    }

    #[test]
    fn test_call_failure_kind() {
        let failure: CallFailure = HandlerError::not_found("book 7").into();
        assert_eq!(failure.kind(), &NOT_FOUND);
        assert_eq!(failure.to_string(), "not_found: book 7");
        assert_eq!(CallFailure::Cancelled.kind(), &CANCELLED);
        assert_eq!(
            CallFailure::from(CardinalityViolation::Missing).kind(),
            &CARDINALITY
        );
    }
}
