//! Declarative schema descriptions.
//!
//! Types that travel over the wire implement [`Describe`] to tell the
//! resolver what they look like, and [`Message`] to be decoded, validated
//! and encoded by the dispatcher.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct Range { start: i32, end: i32 }
//!
//! impl Describe for Range {
//!     fn describe() -> TypeDecl {
//!         TypeDecl::message::<Self>("Range", || {
//!             MessageDecl::new().field::<i32>("start").field::<i32>("end")
//!         })
//!     }
//! }
//!
//! impl Message for Range {}
//! ```

use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{Constraint, ScalarKind, WellKnown};
use crate::validate::ValidationFailure;

/// A type with a schema description.
pub trait Describe: 'static {
    fn describe() -> TypeDecl;
}

/// A type that can be a request or response.
///
/// `validate` runs after the structural check and serde decode; the default
/// accepts every decoded value.
pub trait Message: Describe + Serialize + DeserializeOwned + Send + 'static {
    fn validate(&self) -> Result<(), ValidationFailure> {
        Ok(())
    }
}

/// A declared type, before resolution.
#[derive(Clone)]
pub enum TypeDecl {
    Scalar(ScalarKind),
    WellKnown(WellKnown),
    Message(MessageRef),
    Enum(EnumRef),
    List(Box<TypeDecl>),
    Map(Box<TypeDecl>, Box<TypeDecl>),
    Optional(Box<TypeDecl>),
    Union(Vec<TypeDecl>),
    /// The "none" alternative of a union.
    Null,
    /// A stream marker; `None` when no element type was given.
    Stream(Option<Box<TypeDecl>>),
    /// Free-form JSON with no schema mapping.
    Dynamic,
    /// Anything else without a schema mapping (callables, file handles).
    Opaque(&'static str),
}

impl TypeDecl {
    /// Declare a message type. `declare` is only called the first time the
    /// resolver meets `T`, so recursive messages can refer to themselves.
    pub fn message<T: 'static>(name: impl Into<String>, declare: fn() -> MessageDecl) -> Self {
        TypeDecl::Message(MessageRef {
            id: TypeId::of::<T>(),
            name: name.into(),
            rust_type: type_name::<T>(),
            declare,
        })
    }

    pub fn enumeration<T: 'static>(decl: EnumDecl) -> Self {
        TypeDecl::Enum(EnumRef {
            id: TypeId::of::<T>(),
            rust_type: type_name::<T>(),
            decl,
        })
    }

    pub fn of<T: Describe>() -> Self {
        T::describe()
    }

    pub fn list_of<T: Describe>() -> Self {
        TypeDecl::List(Box::new(T::describe()))
    }

    pub fn optional_of<T: Describe>() -> Self {
        TypeDecl::Optional(Box::new(T::describe()))
    }

    pub fn stream_of<T: Describe>() -> Self {
        TypeDecl::Stream(Some(Box::new(T::describe())))
    }

    pub fn union(alternatives: Vec<TypeDecl>) -> Self {
        TypeDecl::Union(alternatives)
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, TypeDecl::Stream(_))
    }

    /// Whether both declarations name the same type. Messages and enums
    /// compare by Rust type; everything else compares structurally.
    pub fn same_type(&self, other: &TypeDecl) -> bool {
        match (self, other) {
            (TypeDecl::Scalar(a), TypeDecl::Scalar(b)) => a == b,
            (TypeDecl::WellKnown(a), TypeDecl::WellKnown(b)) => a == b,
            (TypeDecl::Message(a), TypeDecl::Message(b)) => a.id == b.id,
            (TypeDecl::Enum(a), TypeDecl::Enum(b)) => a.id == b.id,
            (TypeDecl::List(a), TypeDecl::List(b))
            | (TypeDecl::Optional(a), TypeDecl::Optional(b)) => a.same_type(b),
            (TypeDecl::Map(ak, av), TypeDecl::Map(bk, bv)) => ak.same_type(bk) && av.same_type(bv),
            (TypeDecl::Union(a), TypeDecl::Union(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_type(y))
            }
            (TypeDecl::Stream(Some(a)), TypeDecl::Stream(Some(b))) => a.same_type(b),
            (TypeDecl::Stream(None), TypeDecl::Stream(None))
            | (TypeDecl::Null, TypeDecl::Null)
            | (TypeDecl::Dynamic, TypeDecl::Dynamic) => true,
            (TypeDecl::Opaque(a), TypeDecl::Opaque(b)) => a == b,
            _ => false,
        }
    }

    /// Short human-readable name used in error messages.
    pub fn display_name(&self) -> String {
        match self {
            TypeDecl::Scalar(kind) => kind.proto_name().to_string(),
            TypeDecl::WellKnown(kind) => kind.proto_name().to_string(),
            TypeDecl::Message(m) => m.name.clone(),
            TypeDecl::Enum(e) => e.decl.name.clone(),
            TypeDecl::List(inner) => format!("list<{}>", inner.display_name()),
            TypeDecl::Map(k, v) => format!("map<{}, {}>", k.display_name(), v.display_name()),
            TypeDecl::Optional(inner) => format!("optional<{}>", inner.display_name()),
            TypeDecl::Union(alts) => {
                let names: Vec<String> = alts.iter().map(|a| a.display_name()).collect();
                format!("union<{}>", names.join(" | "))
            }
            TypeDecl::Null => "null".to_string(),
            TypeDecl::Stream(Some(inner)) => format!("stream<{}>", inner.display_name()),
            TypeDecl::Stream(None) => "stream".to_string(),
            TypeDecl::Dynamic => "dynamic".to_string(),
            TypeDecl::Opaque(what) => what.to_string(),
        }
    }
}

impl std::fmt::Debug for TypeDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Identity and lazy body of a declared message.
#[derive(Clone)]
pub struct MessageRef {
    pub(crate) id: TypeId,
    pub(crate) name: String,
    pub(crate) rust_type: &'static str,
    pub(crate) declare: fn() -> MessageDecl,
}

impl MessageRef {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone)]
pub struct EnumRef {
    pub(crate) id: TypeId,
    pub(crate) rust_type: &'static str,
    pub(crate) decl: EnumDecl,
}

/// Body of a message declaration: fields in declaration order.
#[derive(Clone, Default)]
pub struct MessageDecl {
    pub(crate) doc: Option<String>,
    pub(crate) fields: Vec<FieldDecl>,
    pub(crate) reserved: Vec<u32>,
}

#[derive(Clone)]
pub struct FieldDecl {
    pub(crate) name: String,
    pub(crate) ty: TypeDecl,
    pub(crate) description: Option<String>,
    pub(crate) constraints: Vec<Constraint>,
}

impl MessageDecl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn field<T: Describe>(self, name: impl Into<String>) -> Self {
        self.field_decl(name, T::describe())
    }

    pub fn field_decl(mut self, name: impl Into<String>, ty: TypeDecl) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            ty,
            description: None,
            constraints: Vec::new(),
        });
        self
    }

    /// Attach a description to the most recently declared field.
    pub fn described(mut self, description: impl Into<String>) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.description = Some(description.into());
        }
        self
    }

    /// Attach a constraint to the most recently declared field.
    pub fn constrained(mut self, constraint: Constraint) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.constraints.push(constraint);
        }
        self
    }

    /// Keep a field number out of allocation.
    pub fn reserved(mut self, number: u32) -> Self {
        self.reserved.push(number);
        self
    }
}

#[derive(Clone)]
pub struct EnumDecl {
    pub(crate) name: String,
    pub(crate) doc: Option<String>,
    pub(crate) members: Vec<(String, i32)>,
}

impl EnumDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: None,
            members: Vec::new(),
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn member(mut self, name: impl Into<String>, value: i32) -> Self {
        self.members.push((name.into(), value));
        self
    }
}

// ---------------------------------------------------------------------------
// Built-in descriptions
// ---------------------------------------------------------------------------

/// Raw bytes. Travels as an array of octets in JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bytes(pub Vec<u8>);

impl From<Vec<u8>> for Bytes {
    fn from(value: Vec<u8>) -> Self {
        Bytes(value)
    }
}

macro_rules! describe_scalar {
    ($($ty:ty => $kind:expr),* $(,)?) => {
        $(
            impl Describe for $ty {
                fn describe() -> TypeDecl {
                    TypeDecl::Scalar($kind)
                }
            }

            impl Message for $ty {}
        )*
    };
}

describe_scalar! {
    String => ScalarKind::String,
    i32 => ScalarKind::Int32,
    i64 => ScalarKind::Int64,
    f32 => ScalarKind::Float,
    f64 => ScalarKind::Double,
    bool => ScalarKind::Bool,
    Bytes => ScalarKind::Bytes,
}

impl Describe for chrono::DateTime<chrono::Utc> {
    fn describe() -> TypeDecl {
        TypeDecl::WellKnown(WellKnown::Timestamp)
    }
}

impl Message for chrono::DateTime<chrono::Utc> {}

impl Describe for std::time::Duration {
    fn describe() -> TypeDecl {
        TypeDecl::WellKnown(WellKnown::Duration)
    }
}

impl Message for std::time::Duration {}

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> TypeDecl {
        TypeDecl::List(Box::new(T::describe()))
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> TypeDecl {
        TypeDecl::Optional(Box::new(T::describe()))
    }
}

impl<K: Describe, V: Describe, S: 'static> Describe for HashMap<K, V, S> {
    fn describe() -> TypeDecl {
        TypeDecl::Map(Box::new(K::describe()), Box::new(V::describe()))
    }
}

impl<K: Describe, V: Describe> Describe for BTreeMap<K, V> {
    fn describe() -> TypeDecl {
        TypeDecl::Map(Box::new(K::describe()), Box::new(V::describe()))
    }
}

impl Describe for serde_json::Value {
    fn describe() -> TypeDecl {
        TypeDecl::Dynamic
    }
}

impl Describe for std::fs::File {
    fn describe() -> TypeDecl {
        TypeDecl::Opaque("file handle")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node;

    impl Describe for Node {
        fn describe() -> TypeDecl {
            TypeDecl::message::<Self>("Node", || {
                MessageDecl::new()
                    .field::<String>("label")
                    .described("display label")
                    .field::<Vec<Node>>("children")
            })
        }
    }

    #[test]
    fn test_message_decl_is_lazy() {
        let decl = Node::describe();
        let TypeDecl::Message(node) = decl else {
            panic!("expected a message declaration");
        };
        assert_eq!(node.name(), "Node");
        let body = (node.declare)();
        assert_eq!(body.fields.len(), 2);
        assert_eq!(body.fields[0].description.as_deref(), Some("display label"));
        assert!(matches!(body.fields[1].ty, TypeDecl::List(_)));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(<Option<i64>>::describe().display_name(), "optional<int64>");
        assert_eq!(
            <HashMap<String, Vec<bool>>>::describe().display_name(),
            "map<string, list<bool>>"
        );
        assert_eq!(TypeDecl::stream_of::<String>().display_name(), "stream<string>");
        assert_eq!(serde_json::Value::describe().display_name(), "dynamic");
    }

    #[test]
    fn test_same_type() {
        assert!(Node::describe().same_type(&Node::describe()));
        assert!(<Vec<Option<i32>>>::describe().same_type(&<Vec<Option<i32>>>::describe()));
        assert!(!<Vec<i32>>::describe().same_type(&<Vec<i64>>::describe()));
        assert!(!Node::describe().same_type(&String::describe()));

        struct Other;
        let other = TypeDecl::message::<Other>("Node", MessageDecl::new);
        assert!(!Node::describe().same_type(&other));
    }

    #[test]
    fn test_constraints_attach_to_last_field() {
        let body = MessageDecl::new()
            .field::<i32>("a")
            .field::<i32>("b")
            .constrained(Constraint::Ge(0.0))
            .reserved(3);
        assert!(body.fields[0].constraints.is_empty());
        assert_eq!(body.fields[1].constraints, vec![Constraint::Ge(0.0)]);
        assert_eq!(body.reserved, vec![3]);
    }
}
