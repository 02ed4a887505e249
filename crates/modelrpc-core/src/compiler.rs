//! Schema compilation: service declarations → [`SchemaDocument`].

use std::collections::HashMap;

use serde::Serialize;

use crate::error::SchemaError;
use crate::options::MethodOptions;
use crate::resolver::{qualify, TypeResolver};
use crate::service::ServiceDeclaration;
use crate::shape::{CallShape, Execution};
use crate::types::{CompositeId, CompositeType, EnumId, EnumType, TypeDescriptor};

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Package for services without a namespace. Derived from the first
    /// service name when unset.
    pub default_package: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    pub input: TypeDescriptor,
    pub output: TypeDescriptor,
    pub cardinality: CallShape,
    pub execution: Execution,
    #[serde(skip_serializing_if = "MethodOptions::is_empty")]
    pub options: MethodOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub name: String,
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    pub methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn full_name(&self) -> String {
        qualify(&self.package, &self.name)
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// The compiled schema. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDocument {
    pub package: String,
    pub services: Vec<ServiceDescriptor>,
    pub messages: Vec<CompositeType>,
    pub enums: Vec<EnumType>,
}

impl SchemaDocument {
    pub fn message(&self, id: CompositeId) -> Option<&CompositeType> {
        self.messages.get(id.index())
    }

    pub fn enum_type(&self, id: EnumId) -> Option<&EnumType> {
        self.enums.get(id.index())
    }

    /// Look up a message by `package.Name` or bare `Name`.
    pub fn message_by_name(&self, name: &str) -> Option<&CompositeType> {
        self.messages
            .iter()
            .find(|m| m.full_name() == name)
            .or_else(|| self.messages.iter().find(|m| m.name == name))
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services
            .iter()
            .find(|s| s.full_name() == name)
            .or_else(|| self.services.iter().find(|s| s.name == name))
    }

    /// Every package with at least one service, message or enum, sorted.
    pub fn packages(&self) -> Vec<String> {
        let mut packages: Vec<String> = self
            .services
            .iter()
            .map(|s| s.package.clone())
            .chain(self.messages.iter().map(|m| m.package.clone()))
            .chain(self.enums.iter().map(|e| e.package.clone()))
            .collect();
        packages.sort();
        packages.dedup();
        packages
    }
}

/// `LibraryService` → `library.v1`.
pub fn default_package_for(service_name: &str) -> String {
    let base = service_name
        .strip_suffix("Service")
        .filter(|s| !s.is_empty())
        .unwrap_or(service_name);
    format!("{}.v1", base.to_lowercase())
}

pub struct SchemaCompiler {
    options: CompileOptions,
}

impl SchemaCompiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn compile(&self, services: &[ServiceDeclaration]) -> Result<SchemaDocument, SchemaError> {
        let package = self
            .options
            .default_package
            .clone()
            .or_else(|| services.first().map(|s| default_package_for(&s.name)))
            .unwrap_or_else(|| "default.v1".to_string());

        let mut resolver = TypeResolver::new(package.clone());
        let mut seen_services: HashMap<String, &ServiceDeclaration> = HashMap::new();
        let mut descriptors = Vec::with_capacity(services.len());

        for service in services {
            let service_package = service.namespace.clone().unwrap_or_else(|| package.clone());
            let full_name = qualify(&service_package, &service.name);
            if seen_services.contains_key(&full_name) {
                return Err(SchemaError::SchemaConflict {
                    name: full_name.clone(),
                    first: format!("service {}", service.name),
                    second: format!("service {}", service.name),
                });
            }
            seen_services.insert(full_name, service);
            resolver.set_package(service_package.clone());

            let mut methods = Vec::with_capacity(service.methods.len());
            for method in &service.methods {
                let classification = &method.classification;
                let input = resolver.resolve_method_type(
                    &classification.request,
                    format!("{}.{}(request)", service.name, method.name),
                )?;
                let output = resolver.resolve_method_type(
                    &classification.response,
                    format!("{}.{}(response)", service.name, method.name),
                )?;
                methods.push(MethodDescriptor {
                    name: method.name.clone(),
                    doc: method.signature.doc.clone(),
                    input,
                    output,
                    cardinality: classification.shape,
                    execution: classification.execution,
                    options: method.signature.options.clone(),
                });
            }

            descriptors.push(ServiceDescriptor {
                name: service.name.clone(),
                package: service_package,
                doc: service.doc.clone(),
                methods,
            });
        }

        let resolved = resolver.finish();
        for service in &mut descriptors {
            for method in &mut service.methods {
                resolved.remap(&mut method.input);
                resolved.remap(&mut method.output);
            }
        }

        tracing::info!(
            package = %package,
            services = descriptors.len(),
            messages = resolved.messages.len(),
            enums = resolved.enums.len(),
            "compiled schema"
        );

        Ok(SchemaDocument {
            package,
            services: descriptors,
            messages: resolved.messages,
            enums: resolved.enums,
        })
    }
}
