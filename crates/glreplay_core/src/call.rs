//! Captured call records.
//!
//! A `Call` is produced by the call stream and is read-only during
//! replay. Typed accessors turn argument mismatches into `CoreError`s so
//! that handlers can propagate them with `?`.

use crate::error::{CoreError, CoreResult};
use crate::id::{ThreadId, TraceHandle};
use serde::{Deserialize, Serialize};

/// Recorded argument or return value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Null pointer or absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Floating point
    Float(f64),
    /// Opaque pointer-sized handle
    Handle(u64),
    /// String
    String(String),
    /// Byte blob
    Blob(Vec<u8>),
    /// Array of values
    Array(Vec<Value>),
}

impl Value {
    /// Name of the variant, used in mismatch errors
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::Handle(_) => "handle",
            Self::String(_) => "string",
            Self::Blob(_) => "blob",
            Self::Array(_) => "array",
        }
    }

    /// Interpret as a pointer-sized handle.
    ///
    /// Null maps to zero. Negative integers are rejected.
    #[must_use]
    pub fn as_handle(&self) -> Option<TraceHandle> {
        match self {
            Self::Null => Some(TraceHandle::NULL),
            Self::Handle(v) | Self::UInt(v) => Some(TraceHandle::from_raw(*v)),
            Self::Int(v) => u64::try_from(*v).ok().map(TraceHandle::from_raw),
            _ => None,
        }
    }

    /// Interpret as a signed integer
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Interpret as an unsigned integer
    #[must_use]
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            Self::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    /// Interpret as a boolean
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(v) => Some(*v != 0),
            Self::UInt(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Interpret as a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret as a byte blob
    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(b) => Some(b),
            Self::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

/// A single captured API call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Position of the call in the capture
    pub index: u64,
    /// Thread that issued the call at capture time
    #[serde(default)]
    pub thread: ThreadId,
    /// Function name, case-sensitive
    pub name: String,
    /// Ordered arguments
    #[serde(default)]
    pub args: Vec<Value>,
    /// Recorded return value
    #[serde(default)]
    pub ret: Option<Value>,
}

impl Call {
    /// Create a call with no arguments
    #[must_use]
    pub fn new(index: u64, name: impl Into<String>) -> Self {
        Self {
            index,
            thread: ThreadId::default(),
            name: name.into(),
            args: Vec::new(),
            ret: None,
        }
    }

    /// Set the originating thread
    #[must_use]
    pub fn on_thread(mut self, thread: ThreadId) -> Self {
        self.thread = thread;
        self
    }

    /// Append an argument
    #[must_use]
    pub fn with_arg(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    /// Set the recorded return value
    #[must_use]
    pub fn with_ret(mut self, value: Value) -> Self {
        self.ret = Some(value);
        self
    }

    /// Number of recorded arguments
    #[must_use]
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Get an argument by position
    ///
    /// # Errors
    ///
    /// Returns `MissingArgument` if the call has fewer arguments
    pub fn arg(&self, index: usize) -> CoreResult<&Value> {
        self.args.get(index).ok_or_else(|| CoreError::MissingArgument {
            call: self.name.clone(),
            index,
            arity: self.args.len(),
        })
    }

    /// Get an argument as a pointer-sized handle
    ///
    /// # Errors
    ///
    /// Returns error if the argument is missing or not handle-like
    pub fn arg_handle(&self, index: usize) -> CoreResult<TraceHandle> {
        let value = self.arg(index)?;
        value.as_handle().ok_or_else(|| self.mismatch(index, "handle", value))
    }

    /// Get an argument as a signed integer
    ///
    /// # Errors
    ///
    /// Returns error if the argument is missing or not an integer
    pub fn arg_int(&self, index: usize) -> CoreResult<i64> {
        let value = self.arg(index)?;
        value.as_int().ok_or_else(|| self.mismatch(index, "int", value))
    }

    /// Get an argument as an unsigned integer
    ///
    /// # Errors
    ///
    /// Returns error if the argument is missing or not a non-negative integer
    pub fn arg_uint(&self, index: usize) -> CoreResult<u64> {
        let value = self.arg(index)?;
        value.as_uint().ok_or_else(|| self.mismatch(index, "uint", value))
    }

    /// Get an argument as a string
    ///
    /// # Errors
    ///
    /// Returns error if the argument is missing or not a string
    pub fn arg_str(&self, index: usize) -> CoreResult<&str> {
        let value = self.arg(index)?;
        value.as_str().ok_or_else(|| self.mismatch(index, "string", value))
    }

    /// Get an argument as a byte blob
    ///
    /// # Errors
    ///
    /// Returns error if the argument is missing or not a blob
    pub fn arg_blob(&self, index: usize) -> CoreResult<&[u8]> {
        let value = self.arg(index)?;
        value.as_blob().ok_or_else(|| self.mismatch(index, "blob", value))
    }

    /// Get the recorded return value as a handle
    ///
    /// # Errors
    ///
    /// Returns error if there is no return value or it is not handle-like
    pub fn ret_handle(&self) -> CoreResult<TraceHandle> {
        let value = self.ret.as_ref().ok_or_else(|| CoreError::MissingReturn {
            call: self.name.clone(),
        })?;
        value.as_handle().ok_or_else(|| CoreError::TypeMismatch {
            call: self.name.clone(),
            index: self.args.len(),
            expected: "handle",
            actual: value.type_name(),
        })
    }

    fn mismatch(&self, index: usize, expected: &'static str, value: &Value) -> CoreError {
        CoreError::TypeMismatch {
            call: self.name.clone(),
            index,
            expected,
            actual: value.type_name(),
        }
    }
}

impl std::fmt::Display for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}(", self.index, self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match arg {
                Value::Null => write!(f, "NULL")?,
                Value::Bool(b) => write!(f, "{}", b)?,
                Value::Int(v) => write!(f, "{}", v)?,
                Value::UInt(v) => write!(f, "{}", v)?,
                Value::Float(v) => write!(f, "{}", v)?,
                Value::Handle(v) => write!(f, "0x{:x}", v)?,
                Value::String(s) => write!(f, "{:?}", s)?,
                Value::Blob(b) => write!(f, "<blob {} bytes>", b.len())?,
                Value::Array(a) => write!(f, "<array {}>", a.len())?,
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_builder() {
        let call = Call::new(3, "glViewport")
            .on_thread(ThreadId::from_raw(2))
            .with_arg(Value::Int(0))
            .with_arg(Value::Int(0))
            .with_arg(Value::Int(640))
            .with_arg(Value::Int(480));
        assert_eq!(call.index, 3);
        assert_eq!(call.arity(), 4);
        assert_eq!(call.thread, ThreadId::from_raw(2));
        assert_eq!(call.arg_int(2).unwrap(), 640);
    }

    #[test]
    fn test_arg_missing() {
        let call = Call::new(0, "CGLSetCurrentContext");
        let err = call.arg_handle(0).unwrap_err();
        assert!(matches!(err, CoreError::MissingArgument { index: 0, arity: 0, .. }));
    }

    #[test]
    fn test_arg_handle_accepts_pointer_like() {
        let call = Call::new(0, "glXMakeCurrent")
            .with_arg(Value::Null)
            .with_arg(Value::UInt(0x10))
            .with_arg(Value::Handle(0x20))
            .with_arg(Value::Int(-1));
        assert!(call.arg_handle(0).unwrap().is_null());
        assert_eq!(call.arg_handle(1).unwrap().as_u64(), 0x10);
        assert_eq!(call.arg_handle(2).unwrap().as_u64(), 0x20);
        assert!(call.arg_handle(3).is_err());
    }

    #[test]
    fn test_arg_type_mismatch() {
        let call = Call::new(0, "glUseProgram").with_arg(Value::String("x".into()));
        let err = call.arg_uint(0).unwrap_err();
        assert_eq!(
            err,
            CoreError::TypeMismatch {
                call: "glUseProgram".to_string(),
                index: 0,
                expected: "uint",
                actual: "string",
            }
        );
    }

    #[test]
    fn test_ret_handle() {
        let call = Call::new(1, "glXCreateContext").with_ret(Value::Handle(0xabc));
        assert_eq!(call.ret_handle().unwrap().as_u64(), 0xabc);

        let call = Call::new(1, "glXCreateContext");
        assert!(matches!(call.ret_handle(), Err(CoreError::MissingReturn { .. })));
    }

    #[test]
    fn test_call_json_defaults() {
        let call: Call = serde_json::from_str(r#"{"index": 5, "name": "glClear"}"#).unwrap();
        assert_eq!(call.index, 5);
        assert!(call.args.is_empty());
        assert!(call.ret.is_none());
        assert_eq!(call.thread, ThreadId::default());
    }

    #[test]
    fn test_value_json_shape() {
        let value: Value = serde_json::from_str(r#"{"type": "handle", "value": 16}"#).unwrap();
        assert_eq!(value, Value::Handle(16));
        let value: Value = serde_json::from_str(r#"{"type": "null"}"#).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_call_display() {
        let call = Call::new(7, "CGLSetCurrentContext").with_arg(Value::Handle(0x1));
        assert_eq!(call.to_string(), "7 CGLSetCurrentContext(0x1)");
    }
}
