use failure::Fail;
use std::io;
use std::num::ParseIntError;
use std::string::FromUtf8Error;

/// Error type for kvs-cache
#[derive(Fail, Debug)]
pub enum KvsError {
    /// IO error
    #[fail(display = "IO error: {}", _0)]
    Io(#[cause] io::Error),
    /// Serialization or deserialization error
    #[fail(display = "serde_json error: {}", _0)]
    Serde(#[cause] serde_json::Error),
    /// Operation against a key holding the wrong kind of entry,
    /// e.g. `rpush` on a scalar or `get` on a list.
    #[fail(display = "WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    /// The value is not an integer or out of range
    #[fail(display = "value is not an integer or out of range")]
    NotAnInteger,
    /// NaN or an infinity, which has no JSON encoding
    #[fail(display = "float value {} cannot be stored", _0)]
    NonFiniteFloat(f64),
    /// Unexpected command type error.
    /// It indicated a corrupted log or a program bug.
    #[fail(display = "Unexpected command type")]
    UnexpectedCommandType,
    /// Value is invalid UTF-8 sequence
    #[fail(display = "UTF-8 error: {}", _0)]
    Utf8(#[cause] FromUtf8Error),
    /// Value text cannot be parsed as an integer
    #[fail(display = "parse error: {}", _0)]
    ParseInt(#[cause] ParseIntError),
    /// Sled error
    #[fail(display = "sled error: {}", _0)]
    Sled(#[cause] sled::Error),
    /// Error with a string message
    #[fail(display = "{}", _0)]
    StringError(String),
}

impl From<io::Error> for KvsError {
    fn from(err: io::Error) -> KvsError {
        KvsError::Io(err)
    }
}

impl From<serde_json::Error> for KvsError {
    fn from(err: serde_json::Error) -> KvsError {
        KvsError::Serde(err)
    }
}

impl From<FromUtf8Error> for KvsError {
    fn from(err: FromUtf8Error) -> KvsError {
        KvsError::Utf8(err)
    }
}

impl From<ParseIntError> for KvsError {
    fn from(err: ParseIntError) -> KvsError {
        KvsError::ParseInt(err)
    }
}

impl From<sled::Error> for KvsError {
    fn from(err: sled::Error) -> KvsError {
        KvsError::Sled(err)
    }
}

/// Result type for kvs-cache
pub type Result<T> = std::result::Result<T, KvsError>;
