//! Pluggable payload serialization.
//!
//! A [`Transformer`] is a pair of functions: `stringify` turns a JSON value into
//! the text carried in a frame, `parse` turns that text back into a value. Both
//! ends of a task must use the same pair. The default is plain JSON.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

type StringifyFn = dyn Fn(&Value) -> Result<String, TransformError> + Send + Sync;
type ParseFn = dyn Fn(&str) -> Result<Value, TransformError> + Send + Sync;

/// A transformer failed to convert a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Transform error: {message}")]
pub struct TransformError {
    message: String,
}

impl TransformError {
    /// Create a new transform error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The underlying failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for TransformError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Serialize/parse pair used for task inputs, results and error messages.
///
/// Cloning is cheap; all clones share the same functions.
///
/// # Examples
///
/// ```
/// use server_task::Transformer;
/// use serde_json::json;
///
/// let json = Transformer::json();
/// let text = json.stringify(&json!({"prompt": "a cat"})).unwrap();
/// assert_eq!(text, r#"{"prompt":"a cat"}"#);
/// assert_eq!(json.parse(&text).unwrap(), json!({"prompt": "a cat"}));
/// ```
#[derive(Clone)]
pub struct Transformer {
    name: &'static str,
    stringify: Arc<StringifyFn>,
    parse: Arc<ParseFn>,
}

impl Transformer {
    /// Build a transformer from a `stringify` and a `parse` function.
    pub fn new<S, P>(name: &'static str, stringify: S, parse: P) -> Self
    where
        S: Fn(&Value) -> Result<String, TransformError> + Send + Sync + 'static,
        P: Fn(&str) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        Self {
            name,
            stringify: Arc::new(stringify),
            parse: Arc::new(parse),
        }
    }

    /// The default transformer: compact JSON text.
    pub fn json() -> Self {
        Self::new(
            "json",
            |value| Ok(serde_json::to_string(value)?),
            |text| Ok(serde_json::from_str(text)?),
        )
    }

    /// Name given to this transformer, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Convert a value into frame text.
    pub fn stringify(&self, value: &Value) -> Result<String, TransformError> {
        (self.stringify)(value)
    }

    /// Convert frame text into a value.
    pub fn parse(&self, text: &str) -> Result<Value, TransformError> {
        (self.parse)(text)
    }

    /// Serialize a typed value through this transformer.
    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, TransformError> {
        let value = serde_json::to_value(value)?;
        self.stringify(&value)
    }

    /// Deserialize a typed value through this transformer.
    pub fn deserialize<T: DeserializeOwned>(&self, text: &str) -> Result<T, TransformError> {
        let value = self.parse(text)?;
        Ok(serde_json::from_value(value)?)
    }
}

impl Default for Transformer {
    fn default() -> Self {
        Self::json()
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("name", &self.name)
            .finish()
    }
}
