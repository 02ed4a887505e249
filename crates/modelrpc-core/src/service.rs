//! Service declarations.
//!
//! ```ignore
//! let greeter = ServiceBuilder::new("Greeter")
//!     .unary("say_hello", |req: HelloRequest, _ctx| Ok(HelloReply::to(&req.name)))
//!     .with_doc("Greets the caller by name.")
//!     .with_http(HttpRule::post("/v1/greet").body("*"))
//!     .build();
//! ```
//!
//! A method whose signature cannot be classified is rejected on its own and
//! logged; the rest of the service still registers.

use std::future::Future;

use tokio_stream::Stream;

use crate::context::CallContext;
use crate::decl::{Describe, Message, TypeDecl};
use crate::error::SignatureError;
use crate::failure::HandlerError;
use crate::handler::{Handler, RequestIter, Streaming};
use crate::options::{HttpRule, OptionValue};
use crate::shape::{classify, Classification, Execution, MethodSignature};

#[derive(Debug, Clone)]
pub struct MethodDeclaration {
    /// Schema name, in PascalCase.
    pub name: String,
    pub signature: MethodSignature,
    pub classification: Classification,
    pub handler: Handler,
}

#[derive(Debug, Clone)]
pub struct ServiceDeclaration {
    pub name: String,
    pub namespace: Option<String>,
    pub doc: Option<String>,
    pub methods: Vec<MethodDeclaration>,
    pub rejected: Vec<SignatureError>,
}

pub struct ServiceBuilder {
    name: String,
    namespace: Option<String>,
    doc: Option<String>,
    methods: Vec<MethodDeclaration>,
    rejected: Vec<SignatureError>,
    /// Whether the most recent registration was accepted. Annotations
    /// only ever apply to that registration.
    last_accepted: bool,
}

impl ServiceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            doc: None,
            methods: Vec::new(),
            rejected: Vec::new(),
            last_accepted: false,
        }
    }

    /// Package for this service and every message first reached through it.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Register a method from an explicit signature and a raw handler.
    pub fn method(mut self, signature: MethodSignature, handler: Handler) -> Self {
        match self.check(signature, handler) {
            Ok(method) => {
                tracing::debug!(
                    service = %self.name,
                    method = %method.name,
                    shape = ?method.classification.shape,
                    execution = ?method.classification.execution,
                    "registered method"
                );
                self.methods.push(method);
                self.last_accepted = true;
            }
            Err(err) => {
                tracing::warn!(service = %self.name, error = %err, "rejected method");
                self.rejected.push(err);
                self.last_accepted = false;
            }
        }
        self
    }

    /// Attach documentation to the most recently registered method.
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        if let Some(method) = self.last_method() {
            method.signature.doc = Some(doc.into());
        }
        self
    }

    /// Bind the most recently registered method to an HTTP route in the
    /// rendered proto.
    pub fn with_http(mut self, rule: HttpRule) -> Self {
        if let Some(method) = self.last_method() {
            method.signature.options.http = Some(rule);
        }
        self
    }

    /// Set a plain proto option on the most recently registered method.
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        if let Some(method) = self.last_method() {
            method.signature.options.set(name, value);
        }
        self
    }

    fn last_method(&mut self) -> Option<&mut MethodDeclaration> {
        if !self.last_accepted {
            tracing::debug!(service = %self.name, "annotation skipped for rejected method");
            return None;
        }
        self.methods.last_mut()
    }

    fn check(
        &self,
        signature: MethodSignature,
        handler: Handler,
    ) -> Result<MethodDeclaration, SignatureError> {
        let classification = classify(&signature)?;
        if classification.shape != handler.shape()
            || classification.execution != handler.execution()
        {
            return Err(SignatureError::invalid(
                &classification.name,
                format!(
                    "signature declares {:?}/{:?} but the handler is {:?}/{:?}",
                    classification.shape,
                    classification.execution,
                    handler.shape(),
                    handler.execution()
                ),
            ));
        }
        if !classification.request.same_type(handler.request())
            || !classification.response.same_type(handler.response())
        {
            return Err(SignatureError::invalid(
                &classification.name,
                format!(
                    "signature declares {:?} -> {:?} but the handler takes {:?} -> {:?}",
                    classification.request,
                    classification.response,
                    handler.request(),
                    handler.response()
                ),
            ));
        }
        if self.methods.iter().any(|m| m.name == classification.name) {
            return Err(SignatureError::invalid(
                &classification.name,
                "method is declared more than once",
            ));
        }
        Ok(MethodDeclaration {
            name: classification.name.clone(),
            signature,
            classification,
            handler,
        })
    }

    pub fn unary<Req, Resp, F>(self, name: &str, f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(Req, CallContext) -> Result<Resp, HandlerError> + Send + Sync + 'static,
    {
        let signature = MethodSignature::of::<Req, Resp>(name, Execution::Sync);
        self.method(signature, Handler::unary(f))
    }

    pub fn unary_async<Req, Resp, F, Fut>(self, name: &str, f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    {
        let signature = MethodSignature::of::<Req, Resp>(name, Execution::Async);
        self.method(signature, Handler::unary_async(f))
    }

    pub fn server_streaming<Req, Resp, F, I>(self, name: &str, f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(Req, CallContext) -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Result<Resp, HandlerError>>,
        I::IntoIter: Send + 'static,
    {
        let signature = MethodSignature::new(name, TypeDecl::stream_of::<Resp>(), Execution::Sync)
            .param("request", Req::describe());
        self.method(signature, Handler::server_streaming(f))
    }

    pub fn server_streaming_async<Req, Resp, F, S>(self, name: &str, f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(Req, CallContext) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Resp, HandlerError>> + Send + 'static,
    {
        let signature =
            MethodSignature::new(name, TypeDecl::stream_of::<Resp>(), Execution::Async)
                .param("request", Req::describe());
        self.method(signature, Handler::server_streaming_async(f))
    }

    pub fn client_streaming<Req, Resp, F>(self, name: &str, f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(RequestIter<Req>, CallContext) -> Result<Resp, HandlerError> + Send + Sync + 'static,
    {
        let signature = MethodSignature::of::<RequestIter<Req>, Resp>(name, Execution::Sync);
        self.method(signature, Handler::client_streaming(f))
    }

    pub fn client_streaming_async<Req, Resp, F, Fut>(self, name: &str, f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(Streaming<Req>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    {
        let signature = MethodSignature::of::<Streaming<Req>, Resp>(name, Execution::Async);
        self.method(signature, Handler::client_streaming_async(f))
    }

    pub fn bidi_streaming<Req, Resp, F, I>(self, name: &str, f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(RequestIter<Req>, CallContext) -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Result<Resp, HandlerError>>,
        I::IntoIter: Send + 'static,
    {
        let signature = MethodSignature::new(name, TypeDecl::stream_of::<Resp>(), Execution::Sync)
            .param("requests", <RequestIter<Req>>::describe());
        self.method(signature, Handler::bidi_streaming(f))
    }

    pub fn bidi_streaming_async<Req, Resp, F, S>(self, name: &str, f: F) -> Self
    where
        Req: Message,
        Resp: Message,
        F: Fn(Streaming<Req>, CallContext) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Resp, HandlerError>> + Send + 'static,
    {
        let signature =
            MethodSignature::new(name, TypeDecl::stream_of::<Resp>(), Execution::Async)
                .param("requests", <Streaming<Req>>::describe());
        self.method(signature, Handler::bidi_streaming_async(f))
    }

    pub fn build(self) -> ServiceDeclaration {
        ServiceDeclaration {
            name: self.name,
            namespace: self.namespace,
            doc: self.doc,
            methods: self.methods,
            rejected: self.rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_method_does_not_block_others() {
        let service = ServiceBuilder::new("Greeter")
            .unary("say_hello", |name: String, _ctx| {
                Ok::<_, HandlerError>(format!("Hello, {}!", name))
            })
            .unary("check", |name: String, _ctx| Ok::<_, HandlerError>(name))
            .unary("say_hello", |name: String, _ctx| Ok::<_, HandlerError>(name))
            .build();

        assert_eq!(service.methods.len(), 1);
        assert_eq!(service.methods[0].name, "SayHello");
        assert_eq!(service.rejected.len(), 2);
        assert_eq!(service.rejected[0].method(), "Check");
    }

    #[test]
    fn test_handler_must_match_signature() {
        let signature = MethodSignature::new("Numbers", TypeDecl::stream_of::<i32>(), Execution::Sync)
            .param("request", i32::describe());
        let service = ServiceBuilder::new("Mismatch")
            .method(
                signature,
                Handler::unary(|n: i32, _ctx| Ok::<_, HandlerError>(n)),
            )
            .build();
        assert!(service.methods.is_empty());
        assert_eq!(service.rejected.len(), 1);
    }

    #[test]
    fn test_with_doc_applies_to_last_method() {
        let service = ServiceBuilder::new("Greeter")
            .unary("echo", |text: String, _ctx| Ok::<_, HandlerError>(text))
            .with_doc("Returns its input.")
            .build();
        assert_eq!(
            service.methods[0].signature.doc.as_deref(),
            Some("Returns its input.")
        );
    }

    #[test]
    fn test_annotations_skip_rejected_method() {
        let service = ServiceBuilder::new("Greeter")
            .unary("echo", |text: String, _ctx| Ok::<_, HandlerError>(text))
            .with_doc("Returns its input.")
            .unary("check", |text: String, _ctx| Ok::<_, HandlerError>(text))
            .with_doc("Health check.")
            .with_http(HttpRule::get("/v1/check"))
            .with_option("deprecated", true)
            .build();
        assert_eq!(service.methods.len(), 1);
        assert_eq!(service.rejected.len(), 1);
        let echo = &service.methods[0].signature;
        assert_eq!(echo.doc.as_deref(), Some("Returns its input."));
        assert!(echo.options.is_empty());

        let service = ServiceBuilder::new("Empty").with_doc("nothing here").build();
        assert!(service.methods.is_empty());
    }

    #[test]
    fn test_handler_types_must_match_signature() {
        let signature = MethodSignature::of::<i64, String>("lookup", Execution::Sync);
        let service = ServiceBuilder::new("Mismatch")
            .method(
                signature,
                Handler::unary(|text: String, _ctx| Ok::<_, HandlerError>(text)),
            )
            .build();
        assert!(service.methods.is_empty());
        let SignatureError::InvalidMethodSignature { reason, .. } = &service.rejected[0];
        assert!(reason.contains("handler takes string -> string"));

        let signature = MethodSignature::of::<String, String>("lookup", Execution::Sync);
        let service = ServiceBuilder::new("Match")
            .method(
                signature,
                Handler::unary(|text: String, _ctx| Ok::<_, HandlerError>(text)),
            )
            .build();
        assert_eq!(service.methods.len(), 1);
    }
}
