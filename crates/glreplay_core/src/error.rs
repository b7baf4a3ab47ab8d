//! Core error types for glreplay.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Parse error
    ParseError { message: String },

    /// Argument index beyond the recorded arity of a call
    MissingArgument {
        /// Call name
        call: String,
        /// Requested argument position
        index: usize,
        /// Number of recorded arguments
        arity: usize,
    },

    /// Argument holds a value of a different type than requested
    TypeMismatch {
        /// Call name
        call: String,
        /// Argument position
        index: usize,
        /// Requested type
        expected: &'static str,
        /// Recorded type
        actual: &'static str,
    },

    /// Call has no recorded return value
    MissingReturn { call: String },

    /// Validation error
    Validation { field: String, reason: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseError { message } => write!(f, "Parse error: {}", message),
            Self::MissingArgument { call, index, arity } => write!(
                f,
                "{} has {} arguments, argument {} requested",
                call, arity, index
            ),
            Self::TypeMismatch {
                call,
                index,
                expected,
                actual,
            } => write!(
                f,
                "{} argument {}: expected {}, got {}",
                call, index, expected, actual
            ),
            Self::MissingReturn { call } => write!(f, "{} has no recorded return value", call),
            Self::Validation { field, reason } => {
                write!(f, "Validation failed for {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::ParseError {
            message: "line 3: EOF".to_string(),
        };
        assert_eq!(format!("{}", err), "Parse error: line 3: EOF");

        let err = CoreError::MissingReturn {
            call: "eglCreateContext".to_string(),
        };
        assert_eq!(err.to_string(), "eglCreateContext has no recorded return value");
    }

    #[test]
    fn test_missing_argument_error() {
        let err = CoreError::MissingArgument {
            call: "glXMakeCurrent".to_string(),
            index: 2,
            arity: 1,
        };
        let s = err.to_string();
        assert!(s.contains("glXMakeCurrent"));
        assert!(s.contains("argument 2"));
    }

    #[test]
    fn test_type_mismatch_error() {
        let err = CoreError::TypeMismatch {
            call: "glViewport".to_string(),
            index: 0,
            expected: "integer",
            actual: "string",
        };
        assert_eq!(
            err.to_string(),
            "glViewport argument 0: expected integer, got string"
        );
    }

    #[test]
    fn test_error_from_json() {
        let parse = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: CoreError = parse.into();
        assert!(matches!(err, CoreError::ParseError { .. }));
    }
}
