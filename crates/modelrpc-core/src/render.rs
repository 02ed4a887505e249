//! proto3 text rendering of a compiled schema, one file per package.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::compiler::{MethodDescriptor, SchemaDocument, ServiceDescriptor};
use crate::options::{escape, HttpRule, HTTP_ANNOTATIONS_IMPORT};
use crate::types::{CollectionKind, CompositeType, EnumType, Field, TypeDescriptor};

const WRAPPERS_IMPORT: &str = "google/protobuf/wrappers.proto";

/// Render every package of the schema. Keys are package names.
pub fn render_proto(doc: &SchemaDocument) -> BTreeMap<String, String> {
    doc.packages()
        .into_iter()
        .map(|package| {
            let text = render_package(doc, &package);
            (package, text)
        })
        .collect()
}

/// Render the services, messages and enums of one package.
pub fn render_package(doc: &SchemaDocument, package: &str) -> String {
    let renderer = Renderer { doc, package };
    renderer.render()
}

/// File name for a package's proto file.
pub fn proto_file_name(package: &str) -> String {
    format!("{}.proto", package)
}

/// Write `<package>.proto` for every package into `dir`, creating it if
/// needed. Returns the written paths.
pub fn write_proto_files(doc: &SchemaDocument, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for (package, text) in render_proto(doc) {
        let path = dir.join(proto_file_name(&package));
        std::fs::write(&path, text)?;
        tracing::info!(path = %path.display(), "wrote proto file");
        written.push(path);
    }
    Ok(written)
}

struct Renderer<'a> {
    doc: &'a SchemaDocument,
    package: &'a str,
}

impl Renderer<'_> {
    fn render(&self) -> String {
        let services: Vec<&ServiceDescriptor> = self
            .doc
            .services
            .iter()
            .filter(|s| s.package == self.package)
            .collect();
        let messages: Vec<&CompositeType> = self
            .doc
            .messages
            .iter()
            .filter(|m| m.package == self.package)
            .collect();
        let enums: Vec<&EnumType> = self
            .doc
            .enums
            .iter()
            .filter(|e| e.package == self.package)
            .collect();

        let mut out = String::new();
        out.push_str("syntax = \"proto3\";\n\n");
        let _ = writeln!(out, "package {};\n", self.package);

        let imports = self.imports(&services, &messages);
        if !imports.is_empty() {
            for import in &imports {
                let _ = writeln!(out, "import \"{}\";", import);
            }
            out.push('\n');
        }

        for service in services {
            self.render_service(&mut out, service);
            out.push('\n');
        }
        for message in messages {
            self.render_message(&mut out, message);
            out.push('\n');
        }
        for enum_type in enums {
            render_enum(&mut out, enum_type);
            out.push('\n');
        }

        while out.ends_with("\n\n") {
            out.pop();
        }
        out
    }

    fn imports(&self, services: &[&ServiceDescriptor], messages: &[&CompositeType]) -> BTreeSet<String> {
        let mut imports = BTreeSet::new();
        let mut visit = |ty: &TypeDescriptor| match ty {
            TypeDescriptor::WellKnown { kind } => {
                imports.insert(kind.import_path().to_string());
            }
            TypeDescriptor::Composite { id } | TypeDescriptor::Reference { to: id } => {
                if let Some(message) = self.doc.message(*id) {
                    if message.package != self.package {
                        imports.insert(proto_file_name(&message.package));
                    }
                }
            }
            TypeDescriptor::Enum { id } => {
                if let Some(enum_type) = self.doc.enum_type(*id) {
                    if enum_type.package != self.package {
                        imports.insert(proto_file_name(&enum_type.package));
                    }
                }
            }
            _ => {}
        };

        for message in messages {
            for field in &message.fields {
                field.ty.walk(&mut visit);
            }
        }
        let mut wrappers = false;
        let mut http = false;
        for service in services {
            for method in &service.methods {
                if method.options.http.is_some() {
                    http = true;
                }
                for ty in [&method.input, &method.output] {
                    if matches!(ty, TypeDescriptor::Scalar { .. }) {
                        wrappers = true;
                    }
                    ty.walk(&mut visit);
                }
            }
        }
        if http {
            imports.insert(HTTP_ANNOTATIONS_IMPORT.to_string());
        }
        if wrappers {
            imports.insert(WRAPPERS_IMPORT.to_string());
        }
        imports
    }

    fn render_service(&self, out: &mut String, service: &ServiceDescriptor) {
        if let Some(doc) = &service.doc {
            write_comment(out, doc, "");
        }
        let _ = writeln!(out, "service {} {{", service.name);
        for method in &service.methods {
            if let Some(doc) = &method.doc {
                write_comment(out, doc, "  ");
            }
            let input = self.method_type(&method.input);
            let output = self.method_type(&method.output);
            let client = if method.cardinality.client_streaming() { "stream " } else { "" };
            let server = if method.cardinality.server_streaming() { "stream " } else { "" };
            let _ = write!(
                out,
                "  rpc {} ({}{}) returns ({}{})",
                method.name, client, input, server, output
            );
            if method.options.is_empty() {
                out.push_str(";\n");
            } else {
                out.push_str(" {\n");
                render_method_options(out, method);
                out.push_str("  }\n");
            }
        }
        out.push_str("}\n");
    }

    fn render_message(&self, out: &mut String, message: &CompositeType) {
        if let Some(doc) = &message.doc {
            write_comment(out, doc, "");
        }
        let _ = writeln!(out, "message {} {{", message.name);
        if !message.reserved.is_empty() {
            let numbers: Vec<String> = message.reserved.iter().map(u32::to_string).collect();
            let _ = writeln!(out, "  reserved {};", numbers.join(", "));
        }
        for field in &message.fields {
            self.render_field(out, field);
        }
        out.push_str("}\n");
    }

    fn render_field(&self, out: &mut String, field: &Field) {
        if let Some(description) = &field.description {
            write_comment(out, description, "  ");
        }
        if !field.constraints.is_empty() {
            out.push_str("  // Constraint:\n");
            for constraint in &field.constraints {
                let _ = writeln!(out, "  //   {}", constraint.describe());
            }
        }

        match &field.ty {
            TypeDescriptor::Union(union) => {
                let _ = writeln!(out, "  oneof {} {{", field.name);
                for variant in &union.variants {
                    let _ = writeln!(
                        out,
                        "    {} {}_{} = {};",
                        self.type_name(&variant.ty),
                        field.name,
                        variant.label,
                        variant.number
                    );
                }
                out.push_str("  }\n");
            }
            TypeDescriptor::Collection(collection) => {
                let element = self.type_name(&collection.element);
                let ty = match (collection.kind, collection.key) {
                    (CollectionKind::Map, Some(key)) => {
                        format!("map<{}, {}>", key.proto_name(), element)
                    }
                    _ => format!("repeated {}", element),
                };
                let _ = writeln!(out, "  {} {} = {};", ty, field.name, field.number);
            }
            ty => {
                let label = if field.optional { "optional " } else { "" };
                let _ = writeln!(
                    out,
                    "  {}{} {} = {};",
                    label,
                    self.type_name(ty),
                    field.name,
                    field.number
                );
            }
        }
    }

    /// Scalars at the method boundary become `google.protobuf` wrappers.
    fn method_type(&self, ty: &TypeDescriptor) -> String {
        match ty {
            TypeDescriptor::Scalar { kind } => kind.wrapper_name().to_string(),
            other => self.type_name(other),
        }
    }

    fn type_name(&self, ty: &TypeDescriptor) -> String {
        match ty {
            TypeDescriptor::Scalar { kind } => kind.proto_name().to_string(),
            TypeDescriptor::WellKnown { kind } => kind.proto_name().to_string(),
            TypeDescriptor::Composite { id } | TypeDescriptor::Reference { to: id } => {
                match self.doc.message(*id) {
                    Some(m) if m.package == self.package => m.name.clone(),
                    Some(m) => m.full_name(),
                    None => format!("UnknownMessage{}", id.index()),
                }
            }
            TypeDescriptor::Enum { id } => match self.doc.enum_type(*id) {
                Some(e) if e.package == self.package => e.name.clone(),
                Some(e) => e.full_name(),
                None => format!("UnknownEnum{}", id.index()),
            },
            TypeDescriptor::Collection(collection) => self.type_name(&collection.element),
            TypeDescriptor::Union(_) => "oneof".to_string(),
        }
    }
}

fn render_method_options(out: &mut String, method: &MethodDescriptor) {
    if let Some(rule) = &method.options.http {
        out.push_str("    option (google.api.http) = {\n");
        render_http_rule(out, rule, "      ");
        out.push_str("    };\n");
    }
    for option in &method.options.proto {
        let _ = writeln!(out, "    option {} = {};", option.name, option.value);
    }
}

fn render_http_rule(out: &mut String, rule: &HttpRule, indent: &str) {
    let _ = writeln!(out, "{}{}: \"{}\"", indent, rule.verb.rule_field(), escape(&rule.path));
    if let Some(body) = &rule.body {
        let _ = writeln!(out, "{}body: \"{}\"", indent, escape(body));
    }
    if let Some(response_body) = &rule.response_body {
        let _ = writeln!(out, "{}response_body: \"{}\"", indent, escape(response_body));
    }
    for binding in &rule.additional_bindings {
        let _ = writeln!(out, "{}additional_bindings {{", indent);
        render_http_rule(out, binding, &format!("{}  ", indent));
        let _ = writeln!(out, "{}}}", indent);
    }
}

fn render_enum(out: &mut String, enum_type: &EnumType) {
    if let Some(doc) = &enum_type.doc {
        write_comment(out, doc, "");
    }
    let _ = writeln!(out, "enum {} {{", enum_type.name);
    for member in &enum_type.members {
        let _ = writeln!(out, "  {} = {};", member.name, member.value);
    }
    out.push_str("}\n");
}

fn write_comment(out: &mut String, text: &str, indent: &str) {
    for line in text.trim().lines() {
        let line = line.trim_end();
        if line.is_empty() {
            let _ = writeln!(out, "{}//", indent);
        } else {
            let _ = writeln!(out, "{}// {}", indent, line);
        }
    }
}
