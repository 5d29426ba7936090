use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{slice_range, Entry, KvsEngine};
use crate::{KvsError, Result, Value};

/// An in-memory engine. Nothing is persisted.
///
/// Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    map: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryEngine {
    /// Creates an empty `MemoryEngine`.
    pub fn new() -> Self {
        MemoryEngine::default()
    }
}

impl KvsEngine for MemoryEngine {
    fn set(&self, key: String, value: Value) -> Result<()> {
        value.check_storable()?;
        self.map.lock().unwrap().insert(key, Entry::Scalar(value));
        Ok(())
    }

    fn get(&self, key: String) -> Result<Option<Value>> {
        match self.map.lock().unwrap().get(&key) {
            Some(Entry::Scalar(value)) => Ok(Some(value.clone())),
            Some(Entry::List(_)) => Err(KvsError::WrongType),
            None => Ok(None),
        }
    }

    fn incr(&self, key: String) -> Result<i64> {
        let mut map = self.map.lock().unwrap();
        let current = match map.get(&key) {
            Some(Entry::Scalar(value)) => value.as_counter()?,
            Some(Entry::List(_)) => return Err(KvsError::WrongType),
            None => 0,
        };
        let next = current.checked_add(1).ok_or(KvsError::NotAnInteger)?;
        map.insert(key, Entry::Scalar(Value::Int(next)));
        Ok(next)
    }

    fn rpush(&self, key: String, value: Value) -> Result<u64> {
        value.check_storable()?;
        let mut map = self.map.lock().unwrap();
        match map.entry(key).or_insert_with(|| Entry::List(Vec::new())) {
            Entry::List(items) => {
                items.push(value);
                Ok(items.len() as u64)
            }
            Entry::Scalar(_) => Err(KvsError::WrongType),
        }
    }

    fn lrange(&self, key: String, start: i64, stop: i64) -> Result<Vec<Value>> {
        match self.map.lock().unwrap().get(&key) {
            Some(Entry::List(items)) => Ok(slice_range(items, start, stop)),
            Some(Entry::Scalar(_)) => Err(KvsError::WrongType),
            None => Ok(Vec::new()),
        }
    }

    fn flushdb(&self) -> Result<()> {
        self.map.lock().unwrap().clear();
        Ok(())
    }
}
