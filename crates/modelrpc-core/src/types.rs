//! Normalized type descriptors.
//!
//! The resolver turns declarations into these descriptors. Composite and
//! enum definitions live in arenas owned by the compiled schema; descriptors
//! point into them by index, which is how recursive structures stay finite.

use std::any::TypeId;

use serde::Serialize;

/// Scalar wire kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    String,
    Int32,
    Int64,
    Float,
    Double,
    Bool,
    Bytes,
}

impl ScalarKind {
    /// The proto3 keyword for this scalar.
    pub fn proto_name(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Int32 => "int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
            ScalarKind::Bool => "bool",
            ScalarKind::Bytes => "bytes",
        }
    }

    /// The `google.protobuf` wrapper used when a scalar is a whole request or
    /// response.
    pub fn wrapper_name(&self) -> &'static str {
        match self {
            ScalarKind::String => "google.protobuf.StringValue",
            ScalarKind::Int32 => "google.protobuf.Int32Value",
            ScalarKind::Int64 => "google.protobuf.Int64Value",
            ScalarKind::Float => "google.protobuf.FloatValue",
            ScalarKind::Double => "google.protobuf.DoubleValue",
            ScalarKind::Bool => "google.protobuf.BoolValue",
            ScalarKind::Bytes => "google.protobuf.BytesValue",
        }
    }

    /// Whether proto3 accepts this kind as a map key.
    pub fn is_valid_map_key(&self) -> bool {
        matches!(
            self,
            ScalarKind::String | ScalarKind::Int32 | ScalarKind::Int64 | ScalarKind::Bool
        )
    }
}

/// Well-known message types from `google/protobuf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WellKnown {
    Timestamp,
    Duration,
}

impl WellKnown {
    pub fn proto_name(&self) -> &'static str {
        match self {
            WellKnown::Timestamp => "google.protobuf.Timestamp",
            WellKnown::Duration => "google.protobuf.Duration",
        }
    }

    pub fn import_path(&self) -> &'static str {
        match self {
            WellKnown::Timestamp => "google/protobuf/timestamp.proto",
            WellKnown::Duration => "google/protobuf/duration.proto",
        }
    }

    /// Label used when this type is a union alternative.
    pub fn label(&self) -> &'static str {
        match self {
            WellKnown::Timestamp => "timestamp",
            WellKnown::Duration => "duration",
        }
    }
}

/// Index of a composite in the schema's message arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CompositeId(pub(crate) usize);

impl CompositeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Index of an enum in the schema's enum arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EnumId(pub(crate) usize);

impl EnumId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    List,
    Map,
}

/// A repeated field or a map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    pub kind: CollectionKind,
    pub element: Box<TypeDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<ScalarKind>,
}

/// One alternative of a oneof.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnionVariant {
    pub label: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    pub number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnionType {
    pub variants: Vec<UnionVariant>,
}

impl UnionType {
    pub fn variant(&self, label: &str) -> Option<&UnionVariant> {
        self.variants.iter().find(|v| v.label == label)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.label.as_str()).collect()
    }
}

/// A resolved type.
///
/// `Composite` marks the occurrence that defined a message during resolution;
/// every later occurrence of the same declaration is a `Reference`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypeDescriptor {
    Scalar { kind: ScalarKind },
    WellKnown { kind: WellKnown },
    Composite { id: CompositeId },
    Reference { to: CompositeId },
    Collection(Collection),
    Enum { id: EnumId },
    Union(UnionType),
}

impl TypeDescriptor {
    pub fn scalar(kind: ScalarKind) -> Self {
        TypeDescriptor::Scalar { kind }
    }

    /// The composite this descriptor points at, whether as the defining
    /// occurrence or as a reference.
    pub fn composite_id(&self) -> Option<CompositeId> {
        match self {
            TypeDescriptor::Composite { id } => Some(*id),
            TypeDescriptor::Reference { to } => Some(*to),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, TypeDescriptor::Reference { .. })
    }

    /// Visit this descriptor and every descriptor nested in it.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a TypeDescriptor)) {
        visit(self);
        match self {
            TypeDescriptor::Collection(c) => c.element.walk(visit),
            TypeDescriptor::Union(u) => {
                for variant in &u.variants {
                    variant.ty.walk(visit);
                }
            }
            _ => {}
        }
    }
}

/// A declared field constraint. Checked during validation and documented in
/// rendered schemas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Ge(f64),
    Le(f64),
    Gt(f64),
    Lt(f64),
    MinLen(usize),
    MaxLen(usize),
}

impl Constraint {
    pub fn describe(&self) -> String {
        match self {
            Constraint::Ge(v) => format!("greater than or equal to {}", v),
            Constraint::Le(v) => format!("less than or equal to {}", v),
            Constraint::Gt(v) => format!("greater than {}", v),
            Constraint::Lt(v) => format!("less than {}", v),
            Constraint::MinLen(n) => format!("minimum length of {}", n),
            Constraint::MaxLen(n) => format!("maximum length of {}", n),
        }
    }
}

/// A field of a composite. For a union field, `number` is the number of its
/// first alternative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub number: u32,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    pub optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

/// A compiled message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeType {
    pub name: String,
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    pub fields: Vec<Field>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reserved: Vec<u32>,
    #[serde(skip)]
    pub(crate) origin: Option<TypeId>,
    #[serde(skip)]
    pub(crate) rust_type: &'static str,
}

impl CompositeType {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Every field number in use, including each union alternative.
    pub fn field_numbers(&self) -> Vec<u32> {
        let mut numbers = Vec::new();
        for field in &self.fields {
            match &field.ty {
                TypeDescriptor::Union(u) => numbers.extend(u.variants.iter().map(|v| v.number)),
                _ => numbers.push(field.number),
            }
        }
        numbers
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumMember {
    pub name: String,
    pub value: i32,
    /// Zero member added during resolution. Only the schema knows it, so
    /// decoding never accepts it.
    #[serde(skip)]
    pub(crate) synthesized: bool,
}

/// A compiled enum. Always contains a member with value 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumType {
    pub name: String,
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    pub members: Vec<EnumMember>,
    #[serde(skip)]
    pub(crate) origin: Option<TypeId>,
    #[serde(skip)]
    pub(crate) rust_type: &'static str,
}

impl EnumType {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }

    pub fn member(&self, name: &str) -> Option<&EnumMember> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Members a request may name: everything the enum declares.
    pub fn accepted(&self) -> impl Iterator<Item = &EnumMember> {
        self.members.iter().filter(|m| !m.synthesized)
    }
}
