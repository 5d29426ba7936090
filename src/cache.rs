use log::debug;
use uuid::Uuid;

use crate::recorder::{CallHistory, CountCalls, Operation, OperationExt};
use crate::{replay, KvsEngine, Result, Trace, Value};

/// Identity the `Cache::store` calls are recorded under.
pub const STORE_QUALNAME: &str = "Cache.store";

/// Writes values under freshly generated keys and reads them back.
///
/// Every `store` is recorded under the identity [`STORE_QUALNAME`]: it is counted
/// and its argument and generated key are logged, so it can be replayed later.
/// Nothing is cached in process; every call goes to the engine.
///
/// ```rust
/// # use kvs_cache::Result;
/// # fn try_main() -> Result<()> {
/// use kvs_cache::{Cache, MemoryEngine, STORE_QUALNAME};
/// let cache = Cache::new(MemoryEngine::new())?;
/// let key = cache.store("hello")?;
/// assert_eq!(cache.get_str(&key)?, Some("hello".to_owned()));
/// println!("{}", cache.replay(STORE_QUALNAME)?);
/// # Ok(())
/// # }
/// ```
pub struct Cache<E: KvsEngine> {
    engine: E,
    store_op: CountCalls<CallHistory<Store<E>, E>, E>,
}

impl<E: KvsEngine> Cache<E> {
    /// Creates a `Cache` on an emptied store.
    ///
    /// # Errors
    ///
    /// It propagates errors from flushing the engine.
    pub fn new(engine: E) -> Result<Self> {
        engine.flushdb()?;
        Ok(Cache::attach(engine))
    }

    /// Creates a `Cache` over whatever the store already holds.
    pub fn attach(engine: E) -> Self {
        let store_op = Store {
            engine: engine.clone(),
        }
        .call_history(engine.clone())
        .count_calls(engine.clone());
        Cache { engine, store_op }
    }

    /// Stores `value` under a new random key and returns the key.
    ///
    /// # Errors
    ///
    /// It returns `KvsError::NonFiniteFloat` for NaN and infinities. Such a
    /// call is neither counted nor logged.
    pub fn store(&self, value: impl Into<Value>) -> Result<String> {
        let value = value.into();
        value.check_storable()?;
        self.store_op.call((value,))
    }

    /// Gets the value of `key`, `None` if it does not exist.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.engine.get(key.to_owned())
    }

    /// Gets the value of `key` and applies `convert` to it.
    ///
    /// A missing key is returned as `None` without calling `convert`. Errors
    /// from `convert` are returned as they are.
    pub fn get_with<T, F>(&self, key: &str, convert: F) -> Result<Option<T>>
    where
        F: FnOnce(Value) -> Result<T>,
    {
        self.get(key)?.map(convert).transpose()
    }

    /// Gets the value of `key` as UTF-8 text.
    pub fn get_str(&self, key: &str) -> Result<Option<String>> {
        self.get_with(key, Value::into_string)
    }

    /// Gets the value of `key` as an integer.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        self.get_with(key, Value::into_int)
    }

    /// Reads back the recorded calls of `qualname`.
    pub fn replay(&self, qualname: &str) -> Result<Trace> {
        replay(&self.engine, qualname)
    }

    /// Returns the underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

/// The bare store operation: a uuid v4 key and a `set`.
struct Store<E> {
    engine: E,
}

impl<E: KvsEngine> Operation for Store<E> {
    type Args = (Value,);
    type Output = String;

    fn qualname(&self) -> &str {
        STORE_QUALNAME
    }

    fn call(&self, (value,): (Value,)) -> Result<String> {
        let key = Uuid::new_v4().to_string();
        debug!("Store {} under {}", value, key);
        self.engine.set(key.clone(), value)?;
        Ok(key)
    }
}
