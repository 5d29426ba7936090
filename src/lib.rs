#![deny(missing_docs)]
//! A key value cache facade whose calls are counted, logged and replayable.
//!
//! Values live in a pluggable [`KvsEngine`]; [`Cache`] stores them under
//! random keys and records each `store` through the wrappers in [`recorder`].
//! [`replay`] reads a recorded history back.

pub use cache::{Cache, STORE_QUALNAME};
pub use engines::{KvStore, KvsEngine, MemoryEngine, SledKvsEngine};
pub use error::{KvsError, Result};
pub use replay::{replay, RecordedCall, Trace};
pub use value::Value;

mod cache;
pub mod documents;
mod engines;
mod error;
pub mod recorder;
mod replay;
mod value;
