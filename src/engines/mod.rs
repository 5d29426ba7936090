//! This module provides various key value storage engines. All of them
//! implement the `KvsEngine` trait.

use serde::{Deserialize, Serialize};

pub use self::kvs::KvStore;
pub use self::memory::MemoryEngine;
pub use self::sled::SledKvsEngine;
use crate::{Result, Value};

mod kvs;
mod memory;
mod sled;

/// Trait for a key value storage engine.
///
/// Every method is atomic on its own. Nothing is atomic across calls.
pub trait KvsEngine: Clone + Send + 'static {
    /// Sets the value of a string key.
    ///
    /// If the key already exists, the previous entry will be overwritten.
    fn set(&self, key: String, value: Value) -> Result<()>;

    /// Gets the value of a given string key.
    ///
    /// Returns `None` if the given key does not exist.
    ///
    /// # Errors
    ///
    /// It returns `KvsError::WrongType` if the key holds a list.
    fn get(&self, key: String) -> Result<Option<Value>>;

    /// Increments the integer stored at key by one and returns the new value.
    ///
    /// A missing key counts as 0.
    ///
    /// # Errors
    ///
    /// It returns `KvsError::NotAnInteger` if the value cannot be read as an
    /// integer and `KvsError::WrongType` if the key holds a list.
    fn incr(&self, key: String) -> Result<i64>;

    /// Appends a value to the list stored at key, creating the list if needed.
    ///
    /// Returns the length of the list after the push.
    fn rpush(&self, key: String, value: Value) -> Result<u64>;

    /// Returns the elements of the list stored at key between `start` and
    /// `stop`, both inclusive.
    ///
    /// Negative indices count from the end of the list, `-1` being the last
    /// element. A missing key reads as an empty list.
    fn lrange(&self, key: String, start: i64, stop: i64) -> Result<Vec<Value>>;

    /// Removes every key.
    fn flushdb(&self) -> Result<()>;
}

/// What a key holds in engines that store whole entries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
enum Entry {
    Scalar(Value),
    List(Vec<Value>),
}

/// Normalizes an inclusive `[start, stop]` range against a list of `len`
/// elements. Returns `None` if the range selects nothing.
fn list_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

fn slice_range<T: Clone>(items: &[T], start: i64, stop: i64) -> Vec<T> {
    match list_range(items.len(), start, stop) {
        Some((from, to)) => items[from..=to].to_vec(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_range() {
        assert_eq!(list_range(3, 0, -1), Some((0, 2)));
    }

    #[test]
    fn clamped_range() {
        assert_eq!(list_range(3, -10, 10), Some((0, 2)));
        assert_eq!(list_range(3, 1, 1), Some((1, 1)));
    }

    #[test]
    fn empty_range() {
        assert_eq!(list_range(0, 0, -1), None);
        assert_eq!(list_range(3, 2, 1), None);
        assert_eq!(list_range(3, 5, 7), None);
        assert_eq!(list_range(3, 0, -4), None);
    }

    #[test]
    fn slice_with_negative_start() {
        assert_eq!(slice_range(&[1, 2, 3, 4], -2, -1), vec![3, 4]);
    }
}
