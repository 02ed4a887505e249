//! Structural validation of raw values against compiled descriptors.
//!
//! Runs before any typed decode. Every violation is collected with a path
//! such as `shelves[2].books.title` so callers see all problems at once.
//! Unknown object keys are ignored.

use serde::Serialize;
use serde_json::Value;

use crate::compiler::SchemaDocument;
use crate::types::{
    Collection, CollectionKind, CompositeType, Constraint, Field, ScalarKind, TypeDescriptor,
    UnionType, WellKnown,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, thiserror::Error)]
#[error("{}", summarize(.violations))]
pub struct ValidationFailure {
    pub violations: Vec<FieldViolation>,
}

fn summarize(violations: &[FieldViolation]) -> String {
    let parts: Vec<String> = violations
        .iter()
        .map(|v| {
            if v.field.is_empty() {
                v.reason.clone()
            } else {
                format!("{}: {}", v.field, v.reason)
            }
        })
        .collect();
    format!(
        "{} validation error(s): {}",
        violations.len(),
        parts.join("; ")
    )
}

impl ValidationFailure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut failure = Self::new();
        failure.push(field, reason);
        failure
    }

    pub fn push(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            reason: reason.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Translate a serde decode error into a violation at the path where
    /// decoding stopped. A missing field is reported at the field itself.
    pub fn from_serde(err: &serde_path_to_error::Error<serde_json::Error>) -> Self {
        let path = match err.path().to_string().as_str() {
            "." => String::new(),
            other => other.to_string(),
        };
        let message = err.inner().to_string();
        if let Some(field) = backticked(&message, "missing field `") {
            return Self::single(join(&path, &field), "field required");
        }
        Self::single(path, message)
    }

    pub(crate) fn into_result(self) -> Result<(), ValidationFailure> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn backticked(message: &str, prefix: &str) -> Option<String> {
    let start = message.find(prefix)? + prefix.len();
    let rest = &message[start..];
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}

/// Checks raw values against the descriptors of one compiled schema.
pub struct Validator<'a> {
    schema: &'a SchemaDocument,
}

impl<'a> Validator<'a> {
    pub fn new(schema: &'a SchemaDocument) -> Self {
        Self { schema }
    }

    pub fn check(&self, ty: &TypeDescriptor, value: &Value) -> Result<(), ValidationFailure> {
        let mut failure = ValidationFailure::new();
        self.check_value(ty, value, "", &mut failure);
        failure.into_result()
    }

    fn check_value(&self, ty: &TypeDescriptor, value: &Value, path: &str, out: &mut ValidationFailure) {
        match ty {
            TypeDescriptor::Scalar { kind } => check_scalar(*kind, value, path, out),
            TypeDescriptor::WellKnown { kind } => check_well_known(*kind, value, path, out),
            TypeDescriptor::Composite { id } | TypeDescriptor::Reference { to: id } => {
                match self.schema.message(*id) {
                    Some(composite) => self.check_composite(composite, value, path, out),
                    None => out.push(path, "unknown message type"),
                }
            }
            TypeDescriptor::Collection(collection) => {
                self.check_collection(collection, value, path, out)
            }
            TypeDescriptor::Enum { id } => {
                let Some(enumeration) = self.schema.enum_type(*id) else {
                    out.push(path, "unknown enum type");
                    return;
                };
                let known = value
                    .as_str()
                    .map(|name| enumeration.accepted().any(|m| m.name == name))
                    .unwrap_or(false);
                if !known {
                    let names: Vec<&str> =
                        enumeration.accepted().map(|m| m.name.as_str()).collect();
                    out.push(
                        path,
                        format!(
                            "expected a member of enum {} ({})",
                            enumeration.name,
                            names.join(", ")
                        ),
                    );
                }
            }
            TypeDescriptor::Union(union) => self.check_union(union, value, path, out),
        }
    }

    fn check_composite(
        &self,
        composite: &CompositeType,
        value: &Value,
        path: &str,
        out: &mut ValidationFailure,
    ) {
        let Value::Object(object) = value else {
            out.push(path, format!("expected an object for {}", composite.name));
            return;
        };
        for field in &composite.fields {
            let field_path = join(path, &field.name);
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if !field.optional {
                        out.push(field_path, "field required");
                    }
                }
                Some(field_value) => {
                    let before = out.violations.len();
                    self.check_value(&field.ty, field_value, &field_path, out);
                    if out.violations.len() == before {
                        check_constraints(field, field_value, &field_path, out);
                    }
                }
            }
        }
    }

    fn check_collection(
        &self,
        collection: &Collection,
        value: &Value,
        path: &str,
        out: &mut ValidationFailure,
    ) {
        match collection.kind {
            CollectionKind::List => {
                let Value::Array(items) = value else {
                    out.push(path, "expected a list");
                    return;
                };
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, index);
                    self.check_value(&collection.element, item, &item_path, out);
                }
            }
            CollectionKind::Map => {
                let Value::Object(entries) = value else {
                    out.push(path, "expected a map");
                    return;
                };
                let key_kind = collection.key.unwrap_or(ScalarKind::String);
                for (key, entry) in entries {
                    let entry_path = join(path, key);
                    if !valid_map_key(key_kind, key) {
                        out.push(
                            entry_path.clone(),
                            format!("map key is not a valid {}", key_kind.proto_name()),
                        );
                    }
                    self.check_value(&collection.element, entry, &entry_path, out);
                }
            }
        }
    }

    fn check_union(&self, union: &UnionType, value: &Value, path: &str, out: &mut ValidationFailure) {
        let expected = || format!("expected exactly one of: {}", union.labels().join(", "));
        let Value::Object(object) = value else {
            out.push(path, expected());
            return;
        };
        let mut set = object.iter().filter(|(_, v)| !v.is_null());
        let (Some((label, inner)), None) = (set.next(), set.next()) else {
            out.push(path, expected());
            return;
        };
        match union.variant(label) {
            Some(variant) => self.check_value(&variant.ty, inner, &join(path, label), out),
            None => out.push(path, expected()),
        }
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

fn check_scalar(kind: ScalarKind, value: &Value, path: &str, out: &mut ValidationFailure) {
    let ok = match kind {
        ScalarKind::String => value.is_string(),
        ScalarKind::Int32 => value
            .as_i64()
            .map(|v| i32::try_from(v).is_ok())
            .unwrap_or(false),
        ScalarKind::Int64 => value.is_i64() || value.as_u64().map(|v| v <= i64::MAX as u64).unwrap_or(false),
        ScalarKind::Float | ScalarKind::Double => value.is_number(),
        ScalarKind::Bool => value.is_boolean(),
        ScalarKind::Bytes => match value {
            Value::Array(items) => items
                .iter()
                .all(|b| b.as_u64().map(|v| v <= u8::MAX as u64).unwrap_or(false)),
            _ => false,
        },
    };
    if !ok {
        let reason = match kind {
            ScalarKind::String => "expected a string",
            ScalarKind::Int32 => "expected a 32-bit integer",
            ScalarKind::Int64 => "expected a 64-bit integer",
            ScalarKind::Float | ScalarKind::Double => "expected a number",
            ScalarKind::Bool => "expected a boolean",
            ScalarKind::Bytes => "expected a list of bytes",
        };
        out.push(path, reason);
    }
}

fn check_well_known(kind: WellKnown, value: &Value, path: &str, out: &mut ValidationFailure) {
    match kind {
        WellKnown::Timestamp => {
            let ok = value
                .as_str()
                .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false);
            if !ok {
                out.push(path, "expected an RFC 3339 timestamp");
            }
        }
        WellKnown::Duration => {
            let ok = match value {
                Value::Object(object) => {
                    object.get("secs").map(Value::is_u64).unwrap_or(false)
                        && object
                            .get("nanos")
                            .and_then(Value::as_u64)
                            .map(|n| n < 1_000_000_000)
                            .unwrap_or(false)
                }
                _ => false,
            };
            if !ok {
                out.push(path, "expected a duration with secs and nanos");
            }
        }
    }
}

fn valid_map_key(kind: ScalarKind, key: &str) -> bool {
    match kind {
        ScalarKind::Int32 => key.parse::<i32>().is_ok(),
        ScalarKind::Int64 => key.parse::<i64>().is_ok(),
        ScalarKind::Bool => key == "true" || key == "false",
        _ => true,
    }
}

fn check_constraints(field: &Field, value: &Value, path: &str, out: &mut ValidationFailure) {
    for constraint in &field.constraints {
        let ok = match constraint {
            Constraint::Ge(bound) => value.as_f64().map(|v| v >= *bound).unwrap_or(true),
            Constraint::Le(bound) => value.as_f64().map(|v| v <= *bound).unwrap_or(true),
            Constraint::Gt(bound) => value.as_f64().map(|v| v > *bound).unwrap_or(true),
            Constraint::Lt(bound) => value.as_f64().map(|v| v < *bound).unwrap_or(true),
            Constraint::MinLen(min) => length(value).map(|n| n >= *min).unwrap_or(true),
            Constraint::MaxLen(max) => length(value).map(|n| n <= *max).unwrap_or(true),
        };
        if !ok {
            out.push(path, format!("must be {}", constraint.describe()));
        }
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(entries) => Some(entries.len()),
        _ => None,
    }
}
