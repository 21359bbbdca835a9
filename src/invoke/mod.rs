
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Invoke is the single wire record: either a function call or its return.
///
/// The two variants are distinguished by field presence, not by an explicit
/// tag: a record carrying `listener` is a function call, a record carrying
/// `success` is a return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Invoke {
    Function(InvokeFunction),
    Return(InvokeReturn),
}

impl Invoke {
    /// Builds a function invoke. The uid is assigned later, when the
    /// communicator registers the pending call.
    pub fn function(listener: String, parameters: Vec<Parameter>) -> Self {
        Invoke::Function(InvokeFunction {
            uid: 0,
            listener,
            parameters,
        })
    }

    /// Builds a success return for the given call id.
    pub fn success(uid: u32, value: Value) -> Self {
        Invoke::Return(InvokeReturn {
            uid,
            success: true,
            value,
        })
    }

    /// Builds a failure return carrying the serialized error descriptor.
    pub fn failure(uid: u32, error: ErrorValue) -> Self {
        Invoke::Return(InvokeReturn {
            uid,
            success: false,
            value: serde_json::to_value(error).unwrap_or(Value::Null),
        })
    }

    pub fn uid(&self) -> u32 {
        match self {
            Invoke::Function(invoke) => invoke.uid,
            Invoke::Return(invoke) => invoke.uid,
        }
    }
}

/// A function call: which member of the remote provider to apply, with what
/// arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeFunction {
    pub uid: u32,

    /// Dot-separated member path on the remote provider, e.g. `"math.add"`.
    /// Never empty on the wire.
    pub listener: String,

    pub parameters: Vec<Parameter>,
}

/// The outcome of a function call, correlated by `uid`. On failure `value`
/// carries an [`ErrorValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeReturn {
    pub uid: u32,
    pub success: bool,
    #[serde(default)]
    pub value: Value,
}

/// A single call argument.
///
/// Plain values travel verbatim through the surrounding JSON encoder. Values
/// whose only wire form is a pre-encoded string travel as the tagged
/// `{"type": "serializable", "value": <string>}` sub-variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parameter {
    Encoded(EncodedParameter),
    Plain(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EncodedParameter {
    Serializable { value: String },
}

impl Parameter {
    /// Wraps a value that has already been serialized to a string.
    pub fn serializable(value: String) -> Self {
        Parameter::Encoded(EncodedParameter::Serializable { value })
    }

    /// The value handed to the provider function on the receiving side.
    pub fn into_value(self) -> Value {
        match self {
            Parameter::Plain(value) => value,
            Parameter::Encoded(EncodedParameter::Serializable { value }) => Value::String(value),
        }
    }
}

impl From<Value> for Parameter {
    fn from(value: Value) -> Self {
        Parameter::Plain(value)
    }
}

/// The error descriptor carried by failure returns. All three fields are
/// preserved across the wire so the caller can rebuild the original error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: String,
}

impl ErrorValue {
    pub fn new(name: &str, message: &str) -> Self {
        ErrorValue {
            name: name.to_owned(),
            message: message.to_owned(),
            stack: String::new(),
        }
    }

    pub fn with_stack(mut self, stack: &str) -> Self {
        self.stack = stack.to_owned();
        self
    }

    /// Rebuilds a descriptor from a failure-return payload. A payload that
    /// is not a descriptor at all surfaces as the generic remote kind with
    /// the raw payload as its message.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<ErrorValue>(value.clone()) {
            Ok(error) => error,
            Err(_) => ErrorValue::new("RemoteError", &value.to_string()),
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}
