//! Shared runtime state for every transport adapter.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_stream::StreamExt;

use crate::compiler::{CompileOptions, MethodDescriptor, SchemaCompiler, SchemaDocument};
use crate::context::CallContext;
use crate::dispatch::{Dispatcher, InboundStream, ResponseStream};
use crate::error::{SchemaError, SignatureError};
use crate::handler::Handler;
use crate::mapper::ErrorMapper;
use crate::service::ServiceDeclaration;
use crate::status::Status;

/// A routable method: compiled descriptor plus the handler that serves it.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    /// Fully qualified service name, e.g. `library.v1.LibraryService`.
    pub service: String,
    /// Routing path, e.g. `/library.v1.LibraryService/GetBook`.
    pub path: String,
    pub descriptor: MethodDescriptor,
    pub handler: Handler,
}

/// Compiled schema, method table and dispatcher, shared by all adapters.
pub struct AppStateInner {
    pub schema: Arc<SchemaDocument>,
    pub dispatcher: Dispatcher,
    pub errors: Arc<ErrorMapper>,
    methods: Vec<MethodEntry>,
    by_path: HashMap<String, usize>,
    /// Short `Service/Method` names. `None` marks a name shared by services
    /// in different packages.
    aliases: HashMap<String, Option<usize>>,
    declarations: Vec<ServiceDeclaration>,
    options: CompileOptions,
}

pub type AppState = Arc<AppStateInner>;

#[derive(Default)]
pub struct AppStateBuilder {
    services: Vec<ServiceDeclaration>,
    options: CompileOptions,
    errors: Option<ErrorMapper>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(mut self, service: ServiceDeclaration) -> Self {
        self.services.push(service);
        self
    }

    /// Default package for services without a namespace.
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.options.default_package = Some(package.into());
        self
    }

    pub fn errors(mut self, errors: ErrorMapper) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Compile the schema and freeze the method table.
    pub fn build(self) -> Result<AppState, SchemaError> {
        let schema = SchemaCompiler::new(self.options.clone()).compile(&self.services)?;
        let schema = Arc::new(schema);
        let errors = Arc::new(self.errors.unwrap_or_default());

        let mut methods = Vec::new();
        let mut by_path = HashMap::new();
        let mut aliases: HashMap<String, Option<usize>> = HashMap::new();

        for (declaration, service) in self.services.iter().zip(&schema.services) {
            let full_name = service.full_name();
            for (method, descriptor) in declaration.methods.iter().zip(&service.methods) {
                let index = methods.len();
                let path = format!("/{}/{}", full_name, descriptor.name);
                by_path.insert(path[1..].to_string(), index);
                aliases
                    .entry(format!("{}/{}", service.name, descriptor.name))
                    .and_modify(|slot| *slot = None)
                    .or_insert(Some(index));
                methods.push(MethodEntry {
                    service: full_name.clone(),
                    path,
                    descriptor: descriptor.clone(),
                    handler: method.handler.clone(),
                });
            }
        }

        tracing::info!(methods = methods.len(), "method table ready");

        Ok(Arc::new(AppStateInner {
            dispatcher: Dispatcher::new(schema.clone(), errors.clone()),
            schema,
            errors,
            methods,
            by_path,
            aliases,
            declarations: self.services,
            options: self.options,
        }))
    }
}

impl AppStateInner {
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Find a method by `/pkg.Service/Method`, `pkg.Service/Method`,
    /// `Service/Method`, `Service.Method` or `pkg.Service.Method`.
    pub fn method(&self, name: &str) -> Option<&MethodEntry> {
        let name = name.trim_start_matches('/');
        let key = match name.contains('/') {
            true => name.to_string(),
            false => {
                let (service, method) = name.rsplit_once('.')?;
                format!("{}/{}", service, method)
            }
        };
        let index = match self.by_path.get(&key) {
            Some(index) => Some(*index),
            None => self.aliases.get(&key).copied().flatten(),
        }?;
        self.methods.get(index)
    }

    pub fn methods(&self) -> &[MethodEntry] {
        &self.methods
    }

    /// Routing paths of every method, in declaration order.
    pub fn method_list(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.path.clone()).collect()
    }

    /// Methods rejected at registration, across all services.
    pub fn rejected(&self) -> Vec<&SignatureError> {
        self.declarations
            .iter()
            .flat_map(|service| service.rejected.iter())
            .collect()
    }

    /// Start a call. Unknown methods yield a single `Unimplemented` status.
    pub fn invoke(&self, name: &str, inbound: InboundStream, ctx: CallContext) -> ResponseStream {
        match self.method(name) {
            Some(entry) => self.dispatcher.invoke(entry, inbound, ctx),
            None => {
                tracing::debug!(method = %name, "unknown method");
                let status = Status::unimplemented(format!("method {} is not implemented", name));
                Box::pin(tokio_stream::once(Err(status)))
            }
        }
    }

    /// Run a call to completion and collect every response.
    pub async fn call(
        &self,
        name: &str,
        requests: Vec<Value>,
        ctx: CallContext,
    ) -> Result<Vec<Value>, Status> {
        let inbound: InboundStream = Box::pin(tokio_stream::iter(requests));
        let mut responses = self.invoke(name, inbound, ctx);
        let mut out = Vec::new();
        while let Some(item) = responses.next().await {
            out.push(item?);
        }
        Ok(out)
    }

    /// Compile the mounted services again from scratch.
    pub fn regenerate(&self) -> Result<SchemaDocument, SchemaError> {
        SchemaCompiler::new(self.options.clone()).compile(&self.declarations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::HandlerError;
    use crate::service::ServiceBuilder;

    fn state() -> AppState {
        let echo = ServiceBuilder::new("Echo")
            .unary("echo", |text: String, _ctx| Ok::<_, HandlerError>(text))
            .build();
        let other = ServiceBuilder::new("Echo")
            .namespace("other.v1")
            .unary("echo", |text: String, _ctx| Ok::<_, HandlerError>(text))
            .unary("shout", |text: String, _ctx| {
                Ok::<_, HandlerError>(text.to_uppercase())
            })
            .build();
        AppStateInner::builder()
            .package("echo.v1")
            .mount(echo)
            .mount(other)
            .build()
            .expect("services should compile")
    }

    #[test]
    fn test_method_lookup_forms() {
        let state = state();
        assert_eq!(
            state.method("/echo.v1.Echo/Echo").map(|m| m.path.as_str()),
            Some("/echo.v1.Echo/Echo")
        );
        assert!(state.method("other.v1.Echo.Echo").is_some());
        assert!(state.method("Echo/Shout").is_some());
        assert!(state.method("Echo.Shout").is_some());
        // Present in two packages, so the short form is ambiguous.
        assert!(state.method("Echo/Echo").is_none());
        assert!(state.method("Echo").is_none());
    }

    #[tokio::test]
    async fn test_unknown_method_is_unimplemented() {
        let state = state();
        let err = state
            .call("Nope/Nothing", vec![Value::Null], CallContext::new("Nope/Nothing"))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::status::StatusCode::Unimplemented);
    }

    #[test]
    fn test_regenerate_matches_schema() {
        let state = state();
        let again = state.regenerate().expect("regenerate should succeed");
        assert_eq!(&again, state.schema.as_ref());
    }
}
