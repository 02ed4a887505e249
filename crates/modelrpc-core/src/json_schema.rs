//! JSON Schema export of compiled descriptors, and tool listings built on it.
//!
//! Schemas describe the JSON the dispatcher accepts: messages are objects,
//! unions are objects keyed by the alternative's label, bytes are arrays of
//! octets and durations are `{secs, nanos}`.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::compiler::SchemaDocument;
use crate::types::{
    CollectionKind, CompositeId, Constraint, Field, ScalarKind, TypeDescriptor, WellKnown,
};

/// JSON Schema for `ty`. Messages are collected under `$defs` and referred
/// to with `$ref`; a message at the root is inlined.
pub fn json_schema(doc: &SchemaDocument, ty: &TypeDescriptor) -> Value {
    let mut builder = SchemaBuilder {
        doc,
        defs: BTreeMap::new(),
    };
    let mut root = match ty.composite_id() {
        Some(id) => builder.object(id),
        None => builder.schema(ty),
    };
    builder.attach_defs(&mut root);
    root
}

/// A method described for tool-calling clients.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    /// `Service.Method`, the JSON-RPC method name.
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub response: Value,
    pub is_streaming: bool,
}

/// Every method of every service as a tool descriptor.
pub fn tool_descriptors(doc: &SchemaDocument) -> Vec<ToolDescriptor> {
    let mut tools = Vec::new();
    for service in &doc.services {
        for method in &service.methods {
            let mut parameters = json_schema(doc, &method.input);
            if method.cardinality.client_streaming() {
                parameters = json!({ "type": "array", "items": parameters });
            }
            let mut response = json_schema(doc, &method.output);
            let is_streaming = method.cardinality.server_streaming();
            if is_streaming {
                response = json!({
                    "type": "object",
                    "properties": {
                        "stream": { "type": "array", "items": response }
                    }
                });
            }
            tools.push(ToolDescriptor {
                name: format!("{}.{}", service.name, method.name),
                description: method.doc.clone().unwrap_or_default(),
                parameters,
                response,
                is_streaming,
            });
        }
    }
    tools
}

struct SchemaBuilder<'a> {
    doc: &'a SchemaDocument,
    defs: BTreeMap<String, Value>,
}

impl SchemaBuilder<'_> {
    fn attach_defs(&mut self, root: &mut Value) {
        if self.defs.is_empty() {
            return;
        }
        let defs: Map<String, Value> = std::mem::take(&mut self.defs).into_iter().collect();
        if let Value::Object(object) = root {
            object.insert("$defs".to_string(), Value::Object(defs));
        }
    }

    fn schema(&mut self, ty: &TypeDescriptor) -> Value {
        match ty {
            TypeDescriptor::Scalar { kind } => scalar_schema(*kind),
            TypeDescriptor::WellKnown { kind: WellKnown::Timestamp } => {
                json!({ "type": "string", "format": "date-time" })
            }
            TypeDescriptor::WellKnown { kind: WellKnown::Duration } => json!({
                "type": "object",
                "properties": {
                    "secs": { "type": "integer", "minimum": 0 },
                    "nanos": { "type": "integer", "minimum": 0, "maximum": 999_999_999 }
                },
                "required": ["secs", "nanos"]
            }),
            TypeDescriptor::Composite { id } | TypeDescriptor::Reference { to: id } => {
                self.reference(*id)
            }
            TypeDescriptor::Collection(collection) => {
                let element = self.schema(&collection.element);
                match collection.kind {
                    CollectionKind::List => json!({ "type": "array", "items": element }),
                    CollectionKind::Map => {
                        json!({ "type": "object", "additionalProperties": element })
                    }
                }
            }
            TypeDescriptor::Enum { id } => match self.doc.enum_type(*id) {
                Some(enum_type) => {
                    let names: Vec<&str> =
                        enum_type.accepted().map(|m| m.name.as_str()).collect();
                    json!({ "type": "string", "enum": names })
                }
                None => json!({ "type": "string" }),
            },
            TypeDescriptor::Union(union) => {
                let alternatives: Vec<Value> = union
                    .variants
                    .iter()
                    .map(|variant| {
                        json!({
                            "type": "object",
                            "properties": { variant.label.clone(): self.schema(&variant.ty) },
                            "required": [variant.label],
                            "additionalProperties": false
                        })
                    })
                    .collect();
                json!({ "oneOf": alternatives })
            }
        }
    }

    fn reference(&mut self, id: CompositeId) -> Value {
        let Some(message) = self.doc.message(id) else {
            return json!({ "type": "object" });
        };
        let key = message.full_name();
        if !self.defs.contains_key(&key) {
            // Placeholder first so recursive references terminate.
            self.defs.insert(key.clone(), Value::Null);
            let body = self.object(id);
            self.defs.insert(key.clone(), body);
        }
        json!({ "$ref": format!("#/$defs/{}", key) })
    }

    fn object(&mut self, id: CompositeId) -> Value {
        let Some(message) = self.doc.message(id) else {
            return json!({ "type": "object" });
        };
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &message.fields {
            properties.insert(field.name.clone(), self.field(field));
            if !field.optional {
                required.push(Value::String(field.name.clone()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("title".into(), json!(message.name));
        if let Some(doc) = &message.doc {
            schema.insert("description".into(), json!(doc));
        }
        schema.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".into(), Value::Array(required));
        }
        Value::Object(schema)
    }

    fn field(&mut self, field: &Field) -> Value {
        let mut schema = self.schema(&field.ty);
        let is_list = matches!(&field.ty, TypeDescriptor::Collection(c) if c.kind == CollectionKind::List);
        if let Value::Object(object) = &mut schema {
            if let Some(description) = &field.description {
                object.insert("description".into(), json!(description));
            }
            if field.optional {
                object.insert("nullable".into(), json!(true));
            }
            for constraint in &field.constraints {
                let (key, value) = constraint_keyword(*constraint, is_list);
                object.insert(key.into(), value);
            }
        }
        schema
    }
}

fn scalar_schema(kind: ScalarKind) -> Value {
    match kind {
        ScalarKind::String => json!({ "type": "string" }),
        ScalarKind::Int32 => json!({ "type": "integer", "format": "int32" }),
        ScalarKind::Int64 => json!({ "type": "integer", "format": "int64" }),
        ScalarKind::Float | ScalarKind::Double => json!({ "type": "number" }),
        ScalarKind::Bool => json!({ "type": "boolean" }),
        ScalarKind::Bytes => json!({
            "type": "array",
            "items": { "type": "integer", "minimum": 0, "maximum": 255 }
        }),
    }
}

fn constraint_keyword(constraint: Constraint, is_list: bool) -> (&'static str, Value) {
    match constraint {
        Constraint::Ge(v) => ("minimum", json!(v)),
        Constraint::Le(v) => ("maximum", json!(v)),
        Constraint::Gt(v) => ("exclusiveMinimum", json!(v)),
        Constraint::Lt(v) => ("exclusiveMaximum", json!(v)),
        Constraint::MinLen(n) if is_list => ("minItems", json!(n)),
        Constraint::MaxLen(n) if is_list => ("maxItems", json!(n)),
        Constraint::MinLen(n) => ("minLength", json!(n)),
        Constraint::MaxLen(n) => ("maxLength", json!(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, SchemaCompiler};
    use crate::decl::{Describe, Message, MessageDecl, TypeDecl};
    use crate::failure::HandlerError;
    use crate::service::ServiceBuilder;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Category {
        name: String,
        children: Vec<Category>,
        note: Option<String>,
    }

    impl Describe for Category {
        fn describe() -> TypeDecl {
            TypeDecl::message::<Self>("Category", || {
                MessageDecl::new()
                    .field::<String>("name")
                    .constrained(Constraint::MinLen(1))
                    .field::<Vec<Category>>("children")
                    .field::<Option<String>>("note")
            })
        }
    }

    impl Message for Category {}

    fn schema() -> SchemaDocument {
        let service = ServiceBuilder::new("Catalog")
            .unary("flatten", |category: Category, _ctx| {
                Ok::<_, HandlerError>(category.name)
            })
            .with_doc("Name of the root category.")
            .server_streaming("walk", |category: Category, _ctx| {
                vec![Ok::<_, HandlerError>(category.name)]
            })
            .build();
        SchemaCompiler::new(CompileOptions::default())
            .compile(&[service])
            .expect("schema should compile")
    }

    #[test]
    fn test_recursive_message_schema() {
        let doc = schema();
        let method = &doc.services[0].methods[0];
        let schema = json_schema(&doc, &method.input);

        assert_eq!(schema["title"], "Category");
        assert_eq!(schema["required"], json!(["name", "children"]));
        assert_eq!(schema["properties"]["name"]["minLength"], 1);
        assert_eq!(schema["properties"]["note"]["nullable"], true);
        assert_eq!(
            schema["properties"]["children"]["items"]["$ref"],
            "#/$defs/catalog.v1.Category"
        );
        assert_eq!(schema["$defs"]["catalog.v1.Category"]["title"], "Category");
    }

    #[test]
    fn test_tool_descriptors() {
        let doc = schema();
        let tools = tool_descriptors(&doc);
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "Catalog.Flatten");
        assert_eq!(tools[0].description, "Name of the root category.");
        assert!(!tools[0].is_streaming);
        assert_eq!(tools[0].response, json!({ "type": "string" }));

        assert!(tools[1].is_streaming);
        assert_eq!(
            tools[1].response["properties"]["stream"]["items"],
            json!({ "type": "string" })
        );
    }
}
