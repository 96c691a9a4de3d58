//! Raw exception values as they arrive from a host's failure hook
//!
//! A raw exception has no guaranteed shape: a thrown string, an object
//! carrying arbitrary properties, or a bare primitive. Nothing here ever
//! fails; conversions degrade rather than reject.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::BTreeMap;

/// Standard error classifications that imply a `name` when none is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Value outside its allowed range
    Range,
    /// Reference to something that does not exist
    Reference,
    /// Malformed source or input
    Syntax,
    /// Value of the wrong type
    Type,
    /// Malformed URI
    Uri,
    /// Failure during dynamic evaluation
    Eval,
}

impl ErrorKind {
    /// The conventional label used as the record's `name`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Range => "RangeError",
            Self::Reference => "ReferenceError",
            Self::Syntax => "SyntaxError",
            Self::Type => "TypeError",
            Self::Uri => "URIError",
            Self::Eval => "EvalError",
        }
    }

    /// Every standard kind.
    pub fn all() -> &'static [ErrorKind] {
        &[
            Self::Range,
            Self::Reference,
            Self::Syntax,
            Self::Type,
            Self::Uri,
            Self::Eval,
        ]
    }

    /// Parse a label such as `"TypeError"` back into a kind.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.label() == label)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// JS-style truthiness: null, false, 0 and "" count as absent.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// An error-like object: an optional classification plus own properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExceptionObject {
    /// Classified error kind, if the thrower used a standard one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    /// Own enumerable properties (`name`, `message`, `stack`, `lineNumber`, ...)
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl ExceptionObject {
    /// Create an empty object with no classification
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty object of a standard kind
    pub fn of_kind(kind: ErrorKind) -> Self {
        Self {
            kind: Some(kind),
            properties: BTreeMap::new(),
        }
    }

    /// Set a property (builder style)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Look up a property
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Look up a string property
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Whether a property is present and truthy
    pub fn has(&self, key: &str) -> bool {
        self.properties.get(key).map(is_truthy).unwrap_or(false)
    }

    /// Alias a `stacktrace` property onto `stack` when `stack` is missing.
    ///
    /// Returns true when the alias was applied.
    pub fn resolve_stack(&mut self) -> bool {
        if self.has("stack") {
            return false;
        }
        match self.properties.get("stacktrace") {
            Some(trace) if is_truthy(trace) => {
                let trace = trace.clone();
                self.properties.insert("stack".to_string(), trace);
                true
            }
            _ => false,
        }
    }
}

/// Anything a host might hand to `Reporter::report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RawException {
    /// A thrown string; already final text
    Text(String),
    /// An error-like object
    Object(ExceptionObject),
    /// A thrown primitive other than a string (`null`, numbers, booleans)
    Primitive(Value),
}

impl RawException {
    /// An unclassified error with a message, the usual `Error(message)` shape.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Object(
            ExceptionObject::new()
                .with("name", "Error")
                .with("message", message.into()),
        )
    }

    /// A classified error with a message. `name` is left for normalization
    /// to infer from the kind.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Object(ExceptionObject::of_kind(kind).with("message", message.into()))
    }

    /// Capture a Rust error: type name, display message and source chain.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut object = ExceptionObject::new()
            .with("name", short_type_name::<E>())
            .with("message", err.to_string());

        let causes: Vec<Value> = std::iter::successors(err.source(), |e| e.source())
            .map(|e| Value::String(e.to_string()))
            .collect();
        if !causes.is_empty() {
            object = object.with("cause", causes);
        }

        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            object = object.with("stack", backtrace.to_string());
        }

        Self::Object(object)
    }

    /// Capture a panic payload as returned by `catch_unwind`.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Object(
            ExceptionObject::new()
                .with("name", "Panic")
                .with("message", message),
        )
    }

    /// Best-effort in-place stack alias. Primitives are left untouched.
    pub fn resolve_stack(&mut self) {
        if let Self::Object(object) = self {
            object.resolve_stack();
        }
    }

    /// Whether this is a bare string or primitive rather than an object.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Object(_))
    }

    /// One-line description for log fields.
    pub fn summary(&self) -> String {
        match self {
            Self::Text(text) => text.lines().next().unwrap_or_default().to_string(),
            Self::Primitive(value) => value.to_string(),
            Self::Object(object) => {
                let name = object
                    .get_str("name")
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .or_else(|| object.kind.map(|k| k.label().to_string()))
                    .unwrap_or_else(|| "Error".to_string());
                match object.get_str("message") {
                    Some(message) if !message.is_empty() => format!("{}: {}", name, message),
                    _ => name,
                }
            }
        }
    }
}

impl From<&str> for RawException {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for RawException {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<ExceptionObject> for RawException {
    fn from(object: ExceptionObject) -> Self {
        Self::Object(object)
    }
}

impl From<Value> for RawException {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            Value::Object(map) => {
                let properties: BTreeMap<String, Value> = map.into_iter().collect();
                let kind = properties
                    .get("name")
                    .and_then(Value::as_str)
                    .and_then(ErrorKind::from_label);
                Self::Object(ExceptionObject { kind, properties })
            }
            Value::Array(items) => {
                Self::Object(ExceptionObject::new().with("arguments", Value::Array(items)))
            }
            other => Self::Primitive(other),
        }
    }
}

impl From<anyhow::Error> for RawException {
    fn from(err: anyhow::Error) -> Self {
        let mut object = ExceptionObject::new()
            .with("name", "Error")
            .with("message", err.to_string());

        let causes: Vec<Value> = err
            .chain()
            .skip(1)
            .map(|e| Value::String(e.to_string()))
            .collect();
        if !causes.is_empty() {
            object = object.with("cause", causes);
        }

        let backtrace = err.backtrace();
        if backtrace.status() == BacktraceStatus::Captured {
            object = object.with("stack", backtrace.to_string());
        }

        Self::Object(object)
    }
}

/// Last path segment of a type name, generics stripped.
fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    if full.starts_with("dyn ") {
        return "Error".to_string();
    }
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
