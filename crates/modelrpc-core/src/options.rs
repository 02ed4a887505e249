//! Method-level annotations carried into the rendered proto.
//!
//! An [`HttpRule`] becomes an `option (google.api.http) = { ... };` block
//! for gateway transcoders; a [`ProtoOption`] becomes a plain
//! `option name = value;` line. Neither changes how calls are dispatched.

use std::fmt;

use serde::Serialize;

/// Import that declares the `google.api.http` extension.
pub const HTTP_ANNOTATIONS_IMPORT: &str = "google/api/annotations.proto";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpVerb {
    /// Field name inside an `HttpRule`.
    pub fn rule_field(&self) -> &'static str {
        match self {
            HttpVerb::Get => "get",
            HttpVerb::Post => "post",
            HttpVerb::Put => "put",
            HttpVerb::Delete => "delete",
            HttpVerb::Patch => "patch",
        }
    }
}

/// An HTTP binding for one method, in the shape of `google.api.HttpRule`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRule {
    pub verb: HttpVerb,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_bindings: Vec<HttpRule>,
}

impl HttpRule {
    pub fn new(verb: HttpVerb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
            body: None,
            response_body: None,
            additional_bindings: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpVerb::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpVerb::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpVerb::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpVerb::Delete, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpVerb::Patch, path)
    }

    /// Request field mapped to the HTTP body; `"*"` for the whole message.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn response_body(mut self, field: impl Into<String>) -> Self {
        self.response_body = Some(field.into());
        self
    }

    pub fn additional_binding(mut self, rule: HttpRule) -> Self {
        self.additional_bindings.push(rule);
        self
    }
}

/// Value of a plain method option. Identifiers (enum values such as
/// `IDEMPOTENT`) render bare; text renders quoted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Ident(String),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(v) => write!(f, "{}", v),
            OptionValue::Int(v) => write!(f, "{}", v),
            OptionValue::Float(v) => write!(f, "{}", v),
            OptionValue::Ident(v) => f.write_str(v),
            OptionValue::Text(v) => write!(f, "\"{}\"", escape(v)),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Int(i64::from(value))
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Ident(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtoOption {
    pub name: String,
    pub value: OptionValue,
}

/// Every annotation attached to one method.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub proto: Vec<ProtoOption>,
}

impl MethodOptions {
    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.proto.is_empty()
    }

    /// Set a plain option, replacing an earlier value of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        let name = name.into();
        let value = value.into();
        match self.proto.iter_mut().find(|option| option.name == name) {
            Some(option) => option.value = value,
            None => self.proto.push(ProtoOption { name, value }),
        }
    }
}

pub(crate) fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
