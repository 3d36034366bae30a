//! Runtime values of the reference engine

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a thrown engine error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Generic error
    Error,
    /// Unresolvable static binding
    SyntaxError,
    /// Undeclared or uninitialized binding
    ReferenceError,
    /// Limit exceeded
    RangeError,
    /// Operation on the wrong kind of graph
    TypeError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Error => "Error",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::TypeError => "TypeError",
        };
        f.write_str(name)
    }
}

/// Value held by bindings and thrown by failing modules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value
    Undefined,
    /// Boolean
    Bool(bool),
    /// IEEE-754 number
    Number(f64),
    /// String
    String(String),
    /// Error object
    Error {
        /// Error class
        kind: ErrorKind,
        /// Message
        message: String,
    },
}

impl Value {
    /// Build an error value
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Value::Error {
            kind,
            message: message.into(),
        }
    }

    /// Whether this is an error object
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error { .. })
    }

    /// Number payload, if any
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// String payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
            Value::Error { kind, message } => write!(f, "{}: {}", kind, message),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_integral_number() {
        assert_eq!(Value::from(42).to_string(), "42");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
    }

    #[test]
    fn test_display_error() {
        let err = Value::error(ErrorKind::ReferenceError, "x is not defined");
        assert_eq!(err.to_string(), "ReferenceError: x is not defined");
        assert!(err.is_error());
    }

    #[test]
    fn test_display_string_is_raw() {
        assert_eq!(Value::from("boom").to_string(), "boom");
    }
}
