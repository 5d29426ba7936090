//! Call recording for storage operations.
//!
//! An [`Operation`] is anything callable with a stable name. [`CountCalls`]
//! and [`CallHistory`] wrap an operation and leave a durable trail in a
//! [`KvsEngine`]: a call counter under `<name>` and two lists of JSON records
//! under `<name>:inputs` and `<name>:outputs`. Both wrappers are operations
//! themselves and report the name of what they wrap, so they nest in either
//! order.
//!
//! ```rust
//! # use kvs_cache::{Result};
//! # fn try_main() -> Result<()> {
//! use kvs_cache::recorder::{FnOperation, Operation, OperationExt};
//! use kvs_cache::{replay, MemoryEngine};
//!
//! let engine = MemoryEngine::new();
//! let double = FnOperation::named("double", |(x,): (i64,)| Ok(x * 2))
//!     .call_history(engine.clone())
//!     .count_calls(engine.clone());
//! assert_eq!(double.call((21,))?, 42);
//! assert_eq!(replay(&engine, "double")?.count, 1);
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;

use log::debug;
use serde::Serialize;

use crate::{KvsEngine, Result, Value};

/// A callable with a stable identity.
pub trait Operation {
    /// The argument tuple.
    type Args: Serialize;
    /// What a successful call returns.
    type Output: Serialize;

    /// The identity the call trail is stored under.
    fn qualname(&self) -> &str;

    /// Runs the operation.
    fn call(&self, args: Self::Args) -> Result<Self::Output>;
}

/// Returns the key of the inputs log for the given operation identity.
pub fn inputs_key(qualname: &str) -> String {
    format!("{}:inputs", qualname)
}

/// Returns the key of the outputs log for the given operation identity.
pub fn outputs_key(qualname: &str) -> String {
    format!("{}:outputs", qualname)
}

/// Counts successful calls of the wrapped operation.
///
/// The counter is incremented after the inner call returns. A failed call is
/// not counted.
pub struct CountCalls<O, E> {
    inner: O,
    engine: E,
}

impl<O: Operation, E: KvsEngine> CountCalls<O, E> {
    /// Wraps `inner`, keeping the counter in `engine`.
    pub fn new(inner: O, engine: E) -> Self {
        CountCalls { inner, engine }
    }
}

impl<O: Operation, E: KvsEngine> Operation for CountCalls<O, E> {
    type Args = O::Args;
    type Output = O::Output;

    fn qualname(&self) -> &str {
        self.inner.qualname()
    }

    fn call(&self, args: Self::Args) -> Result<Self::Output> {
        let output = self.inner.call(args)?;
        let count = self.engine.incr(self.qualname().to_owned())?;
        debug!("{} called {} times", self.qualname(), count);
        Ok(output)
    }
}

/// Logs the arguments and result of every call of the wrapped operation.
///
/// The arguments are pushed before the inner call runs and the result after
/// it returns. If the inner call fails the inputs log stays one entry ahead
/// of the outputs log.
pub struct CallHistory<O, E> {
    inner: O,
    engine: E,
}

impl<O: Operation, E: KvsEngine> CallHistory<O, E> {
    /// Wraps `inner`, keeping the logs in `engine`.
    pub fn new(inner: O, engine: E) -> Self {
        CallHistory { inner, engine }
    }
}

impl<O: Operation, E: KvsEngine> Operation for CallHistory<O, E> {
    type Args = O::Args;
    type Output = O::Output;

    fn qualname(&self) -> &str {
        self.inner.qualname()
    }

    fn call(&self, args: Self::Args) -> Result<Self::Output> {
        let qualname = self.qualname();
        let inputs = serde_json::to_string(&args)?;
        debug!("{} called with {}", qualname, inputs);
        self.engine
            .rpush(inputs_key(qualname), Value::Str(inputs))?;

        let output = self.inner.call(args)?;

        let outputs = serde_json::to_string(&output)?;
        debug!("{} returned {}", qualname, outputs);
        self.engine
            .rpush(outputs_key(qualname), Value::Str(outputs))?;
        Ok(output)
    }
}

/// Adds the wrapping methods to every operation.
pub trait OperationExt: Operation + Sized {
    /// Wraps `self` in [`CountCalls`].
    fn count_calls<E: KvsEngine>(self, engine: E) -> CountCalls<Self, E> {
        CountCalls::new(self, engine)
    }

    /// Wraps `self` in [`CallHistory`].
    fn call_history<E: KvsEngine>(self, engine: E) -> CallHistory<Self, E> {
        CallHistory::new(self, engine)
    }
}

impl<O: Operation> OperationExt for O {}

/// A named closure.
pub struct FnOperation<F, A, R> {
    qualname: String,
    f: F,
    _marker: PhantomData<fn(A) -> R>,
}

impl<F, A, R> FnOperation<F, A, R>
where
    F: Fn(A) -> Result<R>,
{
    /// Gives the closure `f` the identity `qualname`.
    pub fn named(qualname: impl Into<String>, f: F) -> Self {
        FnOperation {
            qualname: qualname.into(),
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, A, R> Operation for FnOperation<F, A, R>
where
    F: Fn(A) -> Result<R>,
    A: Serialize,
    R: Serialize,
{
    type Args = A;
    type Output = R;

    fn qualname(&self) -> &str {
        &self.qualname
    }

    fn call(&self, args: A) -> Result<R> {
        (self.f)(args)
    }
}
