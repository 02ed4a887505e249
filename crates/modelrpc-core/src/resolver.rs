//! Type resolution: declarations → normalized descriptors.
//!
//! One resolver lives for one compile pass. Composites are memoized by
//! `TypeId`; the slot is reserved before the fields are resolved, so a field
//! that leads back to a type still in progress resolves to a `Reference`
//! instead of recursing.

use std::any::TypeId;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::decl::{EnumRef, FieldDecl, MessageDecl, MessageRef, TypeDecl};
use crate::error::SchemaError;
use crate::types::{
    Collection, CollectionKind, CompositeId, CompositeType, Constraint, EnumId, EnumMember,
    EnumType, Field, ScalarKind, TypeDescriptor, UnionType, UnionVariant,
};

/// Field numbers reserved for the protobuf implementation.
const IMPLEMENTATION_RESERVED: std::ops::RangeInclusive<u32> = 19000..=19999;

#[derive(Debug, Clone, Copy)]
enum NameOwner {
    Composite(CompositeId),
    Enum(EnumId),
}

pub(crate) struct TypeResolver {
    composites: Vec<CompositeType>,
    enums: Vec<EnumType>,
    memo: HashMap<TypeId, CompositeId>,
    enum_memo: HashMap<TypeId, EnumId>,
    in_progress: HashSet<TypeId>,
    names: HashMap<String, NameOwner>,
    /// Slots whose declaration turned out identical to an earlier one.
    merged: HashMap<usize, usize>,
    package: String,
    path: Vec<String>,
}

/// Output of a finished resolver.
pub(crate) struct Resolved {
    pub messages: Vec<CompositeType>,
    pub enums: Vec<EnumType>,
    remap: Vec<usize>,
}

impl Resolved {
    /// Rewrite composite indices handed out during resolution to their final
    /// arena positions.
    pub fn remap(&self, ty: &mut TypeDescriptor) {
        match ty {
            TypeDescriptor::Composite { id } | TypeDescriptor::Reference { to: id } => {
                if let Some(&index) = self.remap.get(id.0) {
                    id.0 = index;
                }
            }
            TypeDescriptor::Collection(c) => self.remap(&mut c.element),
            TypeDescriptor::Union(u) => {
                for variant in &mut u.variants {
                    self.remap(&mut variant.ty);
                }
            }
            _ => {}
        }
    }
}

struct FieldNumbers {
    next: u32,
    reserved: BTreeSet<u32>,
}

impl FieldNumbers {
    fn new(reserved: &[u32]) -> Self {
        Self {
            next: 1,
            reserved: reserved.iter().copied().collect(),
        }
    }

    fn allocate(&mut self) -> u32 {
        loop {
            let number = self.next;
            self.next += 1;
            if !self.reserved.contains(&number) && !IMPLEMENTATION_RESERVED.contains(&number) {
                return number;
            }
        }
    }
}

impl TypeResolver {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            composites: Vec::new(),
            enums: Vec::new(),
            memo: HashMap::new(),
            enum_memo: HashMap::new(),
            in_progress: HashSet::new(),
            names: HashMap::new(),
            merged: HashMap::new(),
            package: package.into(),
            path: Vec::new(),
        }
    }

    /// Package that newly defined messages and enums land in.
    pub fn set_package(&mut self, package: impl Into<String>) {
        self.package = package.into();
    }

    /// Resolve the request or response type of a method. Only messages,
    /// scalars and well-known types can stand on their own.
    pub fn resolve_method_type(
        &mut self,
        decl: &TypeDecl,
        location: impl Into<String>,
    ) -> Result<TypeDescriptor, SchemaError> {
        self.path = vec![location.into()];
        let result = match decl {
            TypeDecl::Enum(_)
            | TypeDecl::List(_)
            | TypeDecl::Map(..)
            | TypeDecl::Optional(_)
            | TypeDecl::Union(_)
            | TypeDecl::Null => Err(self.unsupported(
                decl,
                "request and response types must be messages or scalars",
            )),
            other => self.resolve_value(other),
        };
        self.path.clear();
        result
    }

    pub fn finish(self) -> Resolved {
        let mut remap = Vec::with_capacity(self.composites.len());
        let mut next = 0;
        for index in 0..self.composites.len() {
            if self.merged.contains_key(&index) {
                remap.push(usize::MAX);
            } else {
                remap.push(next);
                next += 1;
            }
        }
        for (&dead, &target) in &self.merged {
            remap[dead] = remap[target];
        }

        let merged = self.merged;
        let messages: Vec<CompositeType> = self
            .composites
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !merged.contains_key(index))
            .map(|(_, composite)| composite)
            .collect();

        let mut resolved = Resolved {
            messages,
            enums: self.enums,
            remap,
        };
        if !merged.is_empty() {
            let mut messages = std::mem::take(&mut resolved.messages);
            for message in &mut messages {
                for field in &mut message.fields {
                    resolved.remap(&mut field.ty);
                }
            }
            resolved.messages = messages;
        }
        resolved
    }

    fn path(&self) -> String {
        let mut out = String::new();
        for segment in &self.path {
            if !out.is_empty() && !segment.starts_with('[') && !segment.starts_with('{') {
                out.push('.');
            }
            out.push_str(segment);
        }
        out
    }

    fn unsupported(&self, decl: &TypeDecl, reason: impl Into<String>) -> SchemaError {
        SchemaError::unsupported(decl.display_name(), self.path(), reason)
    }

    fn resolve_value(&mut self, decl: &TypeDecl) -> Result<TypeDescriptor, SchemaError> {
        match decl {
            TypeDecl::Scalar(kind) => Ok(TypeDescriptor::Scalar { kind: *kind }),
            TypeDecl::WellKnown(kind) => Ok(TypeDescriptor::WellKnown { kind: *kind }),
            TypeDecl::Message(message) => self.resolve_composite(message),
            TypeDecl::Enum(enumeration) => self.resolve_enum(enumeration),
            TypeDecl::List(element) => {
                if matches!(**element, TypeDecl::List(_) | TypeDecl::Map(..)) {
                    return Err(
                        self.unsupported(decl, "nested collections must be wrapped in a message")
                    );
                }
                self.path.push("[]".to_string());
                let element = self.resolve_value(element);
                self.path.pop();
                Ok(TypeDescriptor::Collection(Collection {
                    kind: CollectionKind::List,
                    element: Box::new(element?),
                    key: None,
                }))
            }
            TypeDecl::Map(key, value) => {
                let key_kind = match **key {
                    TypeDecl::Scalar(kind) if kind.is_valid_map_key() => kind,
                    _ => {
                        return Err(self.unsupported(
                            decl,
                            "map keys must be string, int32, int64 or bool",
                        ))
                    }
                };
                if matches!(**value, TypeDecl::List(_) | TypeDecl::Map(..)) {
                    return Err(
                        self.unsupported(decl, "nested collections must be wrapped in a message")
                    );
                }
                self.path.push("{}".to_string());
                let value = self.resolve_value(value);
                self.path.pop();
                Ok(TypeDescriptor::Collection(Collection {
                    kind: CollectionKind::Map,
                    element: Box::new(value?),
                    key: Some(key_kind),
                }))
            }
            TypeDecl::Optional(_) => {
                Err(self.unsupported(decl, "optional is only allowed on message fields"))
            }
            TypeDecl::Union(_) => {
                Err(self.unsupported(decl, "unions are only allowed on message fields"))
            }
            TypeDecl::Null => {
                Err(self.unsupported(decl, "null is only allowed as a union alternative"))
            }
            TypeDecl::Stream(_) => Err(self.unsupported(
                decl,
                "streams are only allowed as a method request or response",
            )),
            TypeDecl::Dynamic => {
                Err(self.unsupported(decl, "dynamic values have no schema mapping"))
            }
            TypeDecl::Opaque(what) => {
                Err(self.unsupported(decl, format!("{} has no schema mapping", what)))
            }
        }
    }

    /// Resolve a message field. Returns the descriptor and whether the field
    /// is optional.
    fn resolve_field(&mut self, decl: &TypeDecl) -> Result<(TypeDescriptor, bool), SchemaError> {
        match decl {
            TypeDecl::Optional(inner) => {
                let (ty, _) = self.resolve_field(inner)?;
                Ok((ty, true))
            }
            TypeDecl::Union(alternatives) => self.resolve_union(decl, alternatives),
            TypeDecl::Null => Err(self.unsupported(decl, "a field cannot only hold null")),
            other => Ok((self.resolve_value(other)?, false)),
        }
    }

    fn resolve_union(
        &mut self,
        decl: &TypeDecl,
        alternatives: &[TypeDecl],
    ) -> Result<(TypeDescriptor, bool), SchemaError> {
        let mut flat = Vec::new();
        let mut nullable = false;
        flatten_union(alternatives, &mut flat, &mut nullable);

        match flat.len() {
            0 => Err(self.unsupported(decl, "union has no alternatives besides null")),
            1 => Ok((self.resolve_value(&flat[0])?, nullable)),
            _ => {
                let mut variants: Vec<UnionVariant> = Vec::with_capacity(flat.len());
                for alternative in &flat {
                    if matches!(alternative, TypeDecl::List(_) | TypeDecl::Map(..)) {
                        return Err(self.unsupported(
                            alternative,
                            "collections cannot be union alternatives",
                        ));
                    }
                    let ty = self.resolve_value(alternative)?;
                    let label = self.label_of(&ty);
                    if variants.iter().any(|v| v.label == label) {
                        return Err(self.unsupported(
                            decl,
                            format!("union alternative '{}' appears more than once", label),
                        ));
                    }
                    variants.push(UnionVariant {
                        label,
                        ty,
                        number: 0,
                    });
                }
                Ok((TypeDescriptor::Union(UnionType { variants }), nullable))
            }
        }
    }

    fn label_of(&self, ty: &TypeDescriptor) -> String {
        match ty {
            TypeDescriptor::Scalar { kind } => kind.proto_name().to_string(),
            TypeDescriptor::WellKnown { kind } => kind.label().to_string(),
            TypeDescriptor::Composite { id } | TypeDescriptor::Reference { to: id } => self
                .composites
                .get(id.0)
                .map(|c| c.name.to_lowercase())
                .unwrap_or_default(),
            TypeDescriptor::Enum { id } => self
                .enums
                .get(id.0)
                .map(|e| e.name.to_lowercase())
                .unwrap_or_default(),
            TypeDescriptor::Collection(_) | TypeDescriptor::Union(_) => "value".to_string(),
        }
    }

    fn resolve_composite(&mut self, message: &MessageRef) -> Result<TypeDescriptor, SchemaError> {
        if let Some(&id) = self.memo.get(&message.id) {
            if self.in_progress.contains(&message.id) {
                tracing::trace!(name = %message.name, "closing cycle with a reference");
            }
            return Ok(TypeDescriptor::Reference { to: id });
        }

        let full_name = qualify(&self.package, &message.name);
        let existing = self.names.get(&full_name).copied();
        let id = CompositeId(self.composites.len());

        match existing {
            Some(NameOwner::Enum(first)) => {
                return Err(SchemaError::SchemaConflict {
                    name: full_name,
                    first: self.enums[first.0].rust_type.to_string(),
                    second: message.rust_type.to_string(),
                });
            }
            Some(NameOwner::Composite(_)) => {}
            None => {
                self.names.insert(full_name.clone(), NameOwner::Composite(id));
            }
        }

        self.composites.push(CompositeType {
            name: message.name.clone(),
            package: self.package.clone(),
            doc: None,
            fields: Vec::new(),
            reserved: Vec::new(),
            origin: Some(message.id),
            rust_type: message.rust_type,
        });
        self.memo.insert(message.id, id);
        self.in_progress.insert(message.id);

        let body = (message.declare)();
        let fields = self.resolve_fields(&body);
        self.in_progress.remove(&message.id);
        let fields = fields?;

        let mut reserved = body.reserved.clone();
        reserved.sort_unstable();
        reserved.dedup();
        let composite = &mut self.composites[id.0];
        composite.doc = body.doc;
        composite.fields = fields;
        composite.reserved = reserved;

        match existing {
            Some(NameOwner::Composite(first)) => {
                if self.same_shape(first, id) {
                    tracing::debug!(
                        name = %full_name,
                        first = self.composites[first.0].rust_type,
                        second = message.rust_type,
                        "merging structurally identical declarations"
                    );
                    self.merged.insert(id.0, first.0);
                    self.memo.insert(message.id, first);
                    Ok(TypeDescriptor::Reference { to: first })
                } else {
                    Err(SchemaError::SchemaConflict {
                        name: full_name,
                        first: self.composites[first.0].rust_type.to_string(),
                        second: message.rust_type.to_string(),
                    })
                }
            }
            _ => Ok(TypeDescriptor::Composite { id }),
        }
    }

    fn resolve_fields(&mut self, body: &MessageDecl) -> Result<Vec<Field>, SchemaError> {
        let mut numbers = FieldNumbers::new(&body.reserved);
        let mut fields: Vec<Field> = Vec::with_capacity(body.fields.len());
        for decl in &body.fields {
            self.path.push(decl.name.clone());
            let field = self.resolve_one_field(decl, &mut numbers, &fields);
            self.path.pop();
            fields.push(field?);
        }
        Ok(fields)
    }

    fn resolve_one_field(
        &mut self,
        decl: &FieldDecl,
        numbers: &mut FieldNumbers,
        previous: &[Field],
    ) -> Result<Field, SchemaError> {
        if previous.iter().any(|f| f.name == decl.name) {
            return Err(self.unsupported(&decl.ty, "field is declared more than once"));
        }

        let (mut ty, optional) = self.resolve_field(&decl.ty)?;
        self.check_constraints(decl, &ty)?;

        let number = match &mut ty {
            TypeDescriptor::Union(union) => {
                for variant in &mut union.variants {
                    variant.number = numbers.allocate();
                }
                union.variants.first().map(|v| v.number).unwrap_or_default()
            }
            _ => numbers.allocate(),
        };

        Ok(Field {
            name: decl.name.clone(),
            number,
            ty,
            optional,
            description: decl.description.clone(),
            constraints: decl.constraints.clone(),
        })
    }

    fn check_constraints(&self, decl: &FieldDecl, ty: &TypeDescriptor) -> Result<(), SchemaError> {
        for constraint in &decl.constraints {
            let applies = match constraint {
                Constraint::Ge(_) | Constraint::Le(_) | Constraint::Gt(_) | Constraint::Lt(_) => {
                    matches!(
                        ty,
                        TypeDescriptor::Scalar {
                            kind: ScalarKind::Int32
                                | ScalarKind::Int64
                                | ScalarKind::Float
                                | ScalarKind::Double
                        }
                    )
                }
                Constraint::MinLen(_) | Constraint::MaxLen(_) => matches!(
                    ty,
                    TypeDescriptor::Scalar {
                        kind: ScalarKind::String | ScalarKind::Bytes
                    } | TypeDescriptor::Collection(_)
                ),
            };
            if !applies {
                return Err(self.unsupported(
                    &decl.ty,
                    format!("constraint '{}' does not apply", constraint.describe()),
                ));
            }
        }
        Ok(())
    }

    fn resolve_enum(&mut self, enumeration: &EnumRef) -> Result<TypeDescriptor, SchemaError> {
        if let Some(&id) = self.enum_memo.get(&enumeration.id) {
            return Ok(TypeDescriptor::Enum { id });
        }

        let decl = &enumeration.decl;
        let full_name = qualify(&self.package, &decl.name);
        let members = self.enum_members(enumeration)?;

        match self.names.get(&full_name).copied() {
            Some(NameOwner::Enum(first)) if self.enums[first.0].members == members => {
                self.enum_memo.insert(enumeration.id, first);
                Ok(TypeDescriptor::Enum { id: first })
            }
            Some(owner) => {
                let first = match owner {
                    NameOwner::Enum(first) => self.enums[first.0].rust_type,
                    NameOwner::Composite(first) => self.composites[first.0].rust_type,
                };
                Err(SchemaError::SchemaConflict {
                    name: full_name,
                    first: first.to_string(),
                    second: enumeration.rust_type.to_string(),
                })
            }
            None => {
                let id = EnumId(self.enums.len());
                self.enums.push(EnumType {
                    name: decl.name.clone(),
                    package: self.package.clone(),
                    doc: decl.doc.clone(),
                    members,
                    origin: Some(enumeration.id),
                    rust_type: enumeration.rust_type,
                });
                self.names.insert(full_name, NameOwner::Enum(id));
                self.enum_memo.insert(enumeration.id, id);
                Ok(TypeDescriptor::Enum { id })
            }
        }
    }

    fn enum_members(&self, enumeration: &EnumRef) -> Result<Vec<EnumMember>, SchemaError> {
        let decl = &enumeration.decl;
        let mut members: Vec<EnumMember> = Vec::with_capacity(decl.members.len() + 1);
        for (name, value) in &decl.members {
            if members.iter().any(|m| m.name == *name) {
                return Err(self.unsupported(
                    &TypeDecl::Enum(enumeration.clone()),
                    format!("enum member {} is declared more than once", name),
                ));
            }
            if members.iter().any(|m| m.value == *value) {
                return Err(self.unsupported(
                    &TypeDecl::Enum(enumeration.clone()),
                    format!("enum value {} is used more than once", value),
                ));
            }
            members.push(EnumMember {
                name: name.clone(),
                value: *value,
                synthesized: false,
            });
        }
        if !members.iter().any(|m| m.value == 0) {
            members.insert(
                0,
                EnumMember {
                    name: format!("{}_UNSPECIFIED", to_upper_snake(&decl.name)),
                    value: 0,
                    synthesized: true,
                },
            );
        }
        Ok(members)
    }

    fn same_shape(&self, first: CompositeId, second: CompositeId) -> bool {
        let a = &self.composites[first.0];
        let b = &self.composites[second.0];
        a.reserved == b.reserved
            && a.fields.len() == b.fields.len()
            && a.fields.iter().zip(&b.fields).all(|(x, y)| {
                x.name == y.name
                    && x.number == y.number
                    && x.optional == y.optional
                    && x.constraints == y.constraints
                    && self.same_descriptor(&x.ty, &y.ty, first, second)
            })
    }

    fn same_descriptor(
        &self,
        a: &TypeDescriptor,
        b: &TypeDescriptor,
        first: CompositeId,
        second: CompositeId,
    ) -> bool {
        match (a, b) {
            (TypeDescriptor::Scalar { kind: x }, TypeDescriptor::Scalar { kind: y }) => x == y,
            (TypeDescriptor::WellKnown { kind: x }, TypeDescriptor::WellKnown { kind: y }) => {
                x == y
            }
            (TypeDescriptor::Enum { id: x }, TypeDescriptor::Enum { id: y }) => x == y,
            (TypeDescriptor::Collection(x), TypeDescriptor::Collection(y)) => {
                x.kind == y.kind
                    && x.key == y.key
                    && self.same_descriptor(&x.element, &y.element, first, second)
            }
            (TypeDescriptor::Union(x), TypeDescriptor::Union(y)) => {
                x.variants.len() == y.variants.len()
                    && x.variants.iter().zip(&y.variants).all(|(p, q)| {
                        p.label == q.label
                            && p.number == q.number
                            && self.same_descriptor(&p.ty, &q.ty, first, second)
                    })
            }
            _ => match (a.composite_id(), b.composite_id()) {
                (Some(x), Some(y)) => x == y || (x == first && y == second),
                _ => false,
            },
        }
    }
}

fn flatten_union(alternatives: &[TypeDecl], out: &mut Vec<TypeDecl>, nullable: &mut bool) {
    for alternative in alternatives {
        match alternative {
            TypeDecl::Union(inner) => flatten_union(inner, out, nullable),
            TypeDecl::Optional(inner) => {
                *nullable = true;
                flatten_union(std::slice::from_ref(inner.as_ref()), out, nullable);
            }
            TypeDecl::Null => *nullable = true,
            other => out.push(other.clone()),
        }
    }
}

pub(crate) fn qualify(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", package, name)
    }
}

/// `BookGenre` → `BOOK_GENRE`.
pub(crate) fn to_upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        out.extend(ch.to_uppercase());
    }
    out
}
