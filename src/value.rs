use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{KvsError, Result};

/// A scalar value held by a key.
///
/// The store keeps the variant it was given, so reading a key back yields
/// exactly what was written. Conversions between variants are explicit.
///
/// Serialized untagged: `"foo"`, `[102, 111]`, `3`, `3.0`. The variant order
/// below is the order deserialization tries them in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// UTF-8 text
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Signed 64-bit integer
    Int(i64),
    /// Double precision float
    Float(f64),
}

impl Value {
    /// Converts the value into text.
    ///
    /// Bytes are decoded as UTF-8; numbers are rendered in decimal.
    ///
    /// # Errors
    ///
    /// It returns `KvsError::Utf8` if the bytes are not valid UTF-8.
    pub fn into_string(self) -> Result<String> {
        match self {
            Value::Str(s) => Ok(s),
            Value::Bytes(bytes) => Ok(String::from_utf8(bytes)?),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(format!("{:?}", f)),
        }
    }

    /// Converts the value into an integer.
    ///
    /// Text and bytes are parsed as a decimal integer.
    ///
    /// # Errors
    ///
    /// It returns `KvsError::ParseInt` for non-numeric text, `KvsError::Utf8`
    /// for bytes that are not text and `KvsError::NotAnInteger` for floats.
    pub fn into_int(self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(i),
            Value::Str(s) => Ok(s.parse()?),
            Value::Bytes(bytes) => Ok(String::from_utf8(bytes)?.parse()?),
            Value::Float(_) => Err(KvsError::NotAnInteger),
        }
    }

    /// Checks that the value survives the JSON encoding engines persist.
    ///
    /// # Errors
    ///
    /// It returns `KvsError::NonFiniteFloat` for NaN and infinities, which
    /// serde_json would write as `null`.
    pub(crate) fn check_storable(&self) -> Result<()> {
        match self {
            Value::Float(f) if !f.is_finite() => Err(KvsError::NonFiniteFloat(*f)),
            _ => Ok(()),
        }
    }

    /// Returns the integer this value holds for counter arithmetic.
    ///
    /// Unlike `into_int`, every failure maps to `KvsError::NotAnInteger`.
    pub(crate) fn as_counter(&self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Str(s) => s.parse().map_err(|_| KvsError::NotAnInteger),
            Value::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(KvsError::NotAnInteger),
            Value::Float(_) => Err(KvsError::NotAnInteger),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Bytes(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
