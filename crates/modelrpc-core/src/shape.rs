//! Call shape classification.
//!
//! A method takes exactly one request parameter (the call context is
//! implicit). Whether each side streams is read off the declared types; the
//! execution mode comes from the handler.

use serde::Serialize;

use crate::decl::{Describe, TypeDecl};
use crate::error::SignatureError;
use crate::options::{HttpRule, MethodOptions, OptionValue};

/// Method names owned by the health and reflection protocols.
pub const RESERVED_METHOD_NAMES: &[&str] = &["Check", "Watch", "ServerReflectionInfo"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallShape {
    UnaryUnary,
    UnaryStream,
    StreamUnary,
    StreamStream,
}

impl CallShape {
    pub fn from_sides(client_streaming: bool, server_streaming: bool) -> Self {
        match (client_streaming, server_streaming) {
            (false, false) => CallShape::UnaryUnary,
            (false, true) => CallShape::UnaryStream,
            (true, false) => CallShape::StreamUnary,
            (true, true) => CallShape::StreamStream,
        }
    }

    pub fn client_streaming(&self) -> bool {
        matches!(self, CallShape::StreamUnary | CallShape::StreamStream)
    }

    pub fn server_streaming(&self) -> bool {
        matches!(self, CallShape::UnaryStream | CallShape::StreamStream)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Execution {
    Sync,
    Async,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeDecl,
}

/// A declared method, before classification.
#[derive(Debug, Clone)]
pub struct MethodSignature {
    pub name: String,
    pub doc: Option<String>,
    pub params: Vec<ParamDecl>,
    pub returns: TypeDecl,
    pub execution: Execution,
    pub options: MethodOptions,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, returns: TypeDecl, execution: Execution) -> Self {
        Self {
            name: name.into(),
            doc: None,
            params: Vec::new(),
            returns,
            execution,
            options: MethodOptions::default(),
        }
    }

    /// Single `request` parameter of type `Req`, returning `Resp`.
    pub fn of<Req: Describe, Resp: Describe>(name: impl Into<String>, execution: Execution) -> Self {
        Self::new(name, Resp::describe(), execution).param("request", Req::describe())
    }

    pub fn param(mut self, name: impl Into<String>, ty: TypeDecl) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn http(mut self, rule: HttpRule) -> Self {
        self.options.http = Some(rule);
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.set(name, value);
        self
    }
}

/// The result of classifying a signature. `request` and `response` are the
/// element types with any stream marker stripped.
#[derive(Debug, Clone)]
pub struct Classification {
    pub name: String,
    pub shape: CallShape,
    pub execution: Execution,
    pub request: TypeDecl,
    pub response: TypeDecl,
}

pub fn classify(signature: &MethodSignature) -> Result<Classification, SignatureError> {
    let name = to_pascal_case(&signature.name);
    if name.is_empty() {
        return Err(SignatureError::invalid(
            &signature.name,
            "method name is empty",
        ));
    }
    if RESERVED_METHOD_NAMES.contains(&name.as_str()) {
        return Err(SignatureError::invalid(
            &name,
            "name is reserved by the health and reflection services",
        ));
    }

    let request = match signature.params.as_slice() {
        [param] => param,
        [] => {
            return Err(SignatureError::invalid(
                &name,
                "expected exactly one request parameter, found none",
            ))
        }
        params => {
            return Err(SignatureError::invalid(
                &name,
                format!(
                    "expected exactly one request parameter, found {}",
                    params.len()
                ),
            ))
        }
    };

    let (client_streaming, request) = stream_side(&name, &request.ty, "request")?;
    let (server_streaming, response) = stream_side(&name, &signature.returns, "response")?;

    Ok(Classification {
        name,
        shape: CallShape::from_sides(client_streaming, server_streaming),
        execution: signature.execution,
        request,
        response,
    })
}

fn stream_side(
    method: &str,
    ty: &TypeDecl,
    side: &str,
) -> Result<(bool, TypeDecl), SignatureError> {
    match ty {
        TypeDecl::Stream(None) => Err(SignatureError::invalid(
            method,
            format!("{} stream has no element type", side),
        )),
        TypeDecl::Stream(Some(inner)) if inner.is_stream() => Err(SignatureError::invalid(
            method,
            format!("{} is a stream of streams", side),
        )),
        TypeDecl::Stream(Some(inner)) => Ok((true, (**inner).clone())),
        other => Ok((false, other.clone())),
    }
}

/// `say_hello` → `SayHello`. Names already in PascalCase are unchanged.
pub fn to_pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(err: SignatureError) -> String {
        match err {
            SignatureError::InvalidMethodSignature { reason, .. } => reason,
        }
    }

    #[test]
    fn test_classify_four_shapes() {
        let cases = [
            (String::describe(), String::describe(), CallShape::UnaryUnary),
            (String::describe(), TypeDecl::stream_of::<i32>(), CallShape::UnaryStream),
            (TypeDecl::stream_of::<i32>(), String::describe(), CallShape::StreamUnary),
            (
                TypeDecl::stream_of::<i32>(),
                TypeDecl::stream_of::<i32>(),
                CallShape::StreamStream,
            ),
        ];
        for (request, response, expected) in cases {
            let signature =
                MethodSignature::new("do_it", response, Execution::Async).param("request", request);
            let classification = classify(&signature).expect("signature should classify");
            assert_eq!(classification.shape, expected);
            assert_eq!(classification.execution, Execution::Async);
            assert_eq!(classification.name, "DoIt");
            assert!(!classification.request.is_stream());
            assert!(!classification.response.is_stream());
        }
    }

    #[test]
    fn test_classify_rejects_bad_arity() {
        let none = MethodSignature::new("Empty", String::describe(), Execution::Sync);
        assert!(reason(classify(&none).unwrap_err()).contains("found none"));

        let two = MethodSignature::new("Two", String::describe(), Execution::Sync)
            .param("a", String::describe())
            .param("b", String::describe());
        assert!(reason(classify(&two).unwrap_err()).contains("found 2"));
    }

    #[test]
    fn test_classify_rejects_bad_streams() {
        let bare = MethodSignature::new("Bare", String::describe(), Execution::Sync)
            .param("request", TypeDecl::Stream(None));
        assert!(reason(classify(&bare).unwrap_err()).contains("no element type"));

        let nested = MethodSignature::new(
            "Nested",
            TypeDecl::Stream(Some(Box::new(TypeDecl::stream_of::<i32>()))),
            Execution::Sync,
        )
        .param("request", String::describe());
        assert!(reason(classify(&nested).unwrap_err()).contains("stream of streams"));
    }

    #[test]
    fn test_classify_rejects_reserved_and_empty_names() {
        let check = MethodSignature::of::<String, String>("check", Execution::Sync);
        assert!(reason(classify(&check).unwrap_err()).contains("reserved"));

        let empty = MethodSignature::of::<String, String>("_", Execution::Sync);
        assert!(reason(classify(&empty).unwrap_err()).contains("empty"));
    }

    #[test]
    fn test_signature_carries_options() {
        let signature = MethodSignature::of::<String, String>("get_title", Execution::Sync)
            .http(HttpRule::get("/v1/titles/{id}"))
            .option("deprecated", true);
        let classification = classify(&signature).expect("signature should classify");
        assert_eq!(classification.name, "GetTitle");
        let http = signature.options.http.as_ref().expect("http rule");
        assert_eq!(http.path, "/v1/titles/{id}");
        assert_eq!(signature.options.proto[0].name, "deprecated");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(to_pascal_case("say_hello"), "SayHello");
        assert_eq!(to_pascal_case("Echo"), "Echo");
        assert_eq!(to_pascal_case("get_book_by_id"), "GetBookById");
    }
}
