use super::{list_range, KvsEngine};
use crate::{KvsError, Result, Value};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, IVec, Tree};

/// Tree holding list elements, one sled key per element.
const LISTS_TREE: &str = "kvs_cache.lists";

/// Wrapper of `sled::Db`
///
/// Keys live in the default tree as JSON `Head`s. A list head only holds the
/// length; its elements are stored in a separate tree under the list key
/// followed by a big-endian index, so a push writes one element no matter
/// how long the list is.
///
/// `incr` retries a compare-and-swap until no other writer got in between.
/// Operations touching both trees run in a sled transaction.
#[derive(Clone)]
pub struct SledKvsEngine(Db);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
enum Head {
    Scalar(Value),
    List { len: u64 },
}

impl SledKvsEngine {
    /// Creates a `SledKvsEngine` from `sled::Db`.
    pub fn new(db: Db) -> Self {
        SledKvsEngine(db)
    }

    fn lists(&self) -> Result<Tree> {
        Ok(self.0.open_tree(LISTS_TREE)?)
    }

    fn read_head(&self, key: &str) -> Result<Option<Head>> {
        let tree: &Tree = &self.0;
        Ok(tree
            .get(key)?
            .map(|i_vec| serde_json::from_slice(&i_vec))
            .transpose()?)
    }

    /// Runs `f` in a transaction over the key tree and the element tree.
    fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: Fn(
            &sled::transaction::TransactionalTree,
            &sled::transaction::TransactionalTree,
        ) -> std::result::Result<R, ConflictableTransactionError<KvsError>>,
    {
        let tree: &Tree = &self.0;
        let lists = self.lists()?;
        let ret = (tree, &lists)
            .transaction(|(tx_tree, tx_lists)| f(tx_tree, tx_lists))
            .map_err(|err| match err {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => KvsError::from(err),
            })?;
        self.0.flush()?;
        Ok(ret)
    }
}

/// `key` length, `key`, then the element index, so one list's elements are
/// contiguous and ordered.
fn element_key(key: &str, index: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + key.len() + 8);
    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(&index.to_be_bytes());
    buf
}

fn decode_head(
    i_vec: Option<IVec>,
) -> std::result::Result<Option<Head>, ConflictableTransactionError<KvsError>> {
    i_vec
        .map(|i_vec| serde_json::from_slice(&i_vec))
        .transpose()
        .map_err(|err| ConflictableTransactionError::Abort(KvsError::from(err)))
}

fn encode<T: Serialize>(
    value: &T,
) -> std::result::Result<Vec<u8>, ConflictableTransactionError<KvsError>> {
    serde_json::to_vec(value).map_err(|err| ConflictableTransactionError::Abort(KvsError::from(err)))
}

impl KvsEngine for SledKvsEngine {
    fn set(&self, key: String, value: Value) -> Result<()> {
        value.check_storable()?;
        let head = serde_json::to_vec(&Head::Scalar(value))?;
        self.transaction(|tree, lists| {
            if let Some(Head::List { len }) = decode_head(tree.get(key.as_str())?)? {
                for index in 0..len {
                    lists.remove(element_key(&key, index))?;
                }
            }
            tree.insert(key.as_str(), head.clone())?;
            Ok(())
        })
    }

    fn get(&self, key: String) -> Result<Option<Value>> {
        match self.read_head(&key)? {
            Some(Head::Scalar(value)) => Ok(Some(value)),
            Some(Head::List { .. }) => Err(KvsError::WrongType),
            None => Ok(None),
        }
    }

    fn incr(&self, key: String) -> Result<i64> {
        let tree: &Tree = &self.0;
        loop {
            let old: Option<IVec> = tree.get(&key)?;
            let head: Option<Head> = old
                .as_ref()
                .map(|i_vec| serde_json::from_slice(i_vec))
                .transpose()?;
            let current = match head {
                Some(Head::Scalar(value)) => value.as_counter()?,
                Some(Head::List { .. }) => return Err(KvsError::WrongType),
                None => 0,
            };
            let next = current.checked_add(1).ok_or(KvsError::NotAnInteger)?;
            let new = serde_json::to_vec(&Head::Scalar(Value::Int(next)))?;
            if tree.compare_and_swap(&key, old, Some(new))?.is_ok() {
                tree.flush()?;
                return Ok(next);
            }
        }
    }

    fn rpush(&self, key: String, value: Value) -> Result<u64> {
        value.check_storable()?;
        let element = serde_json::to_vec(&value)?;
        self.transaction(|tree, lists| {
            let len = match decode_head(tree.get(key.as_str())?)? {
                Some(Head::List { len }) => len,
                Some(Head::Scalar(_)) => {
                    return Err(ConflictableTransactionError::Abort(KvsError::WrongType))
                }
                None => 0,
            };
            lists.insert(element_key(&key, len), element.clone())?;
            tree.insert(key.as_str(), encode(&Head::List { len: len + 1 })?)?;
            Ok(len + 1)
        })
    }

    fn lrange(&self, key: String, start: i64, stop: i64) -> Result<Vec<Value>> {
        let len = match self.read_head(&key)? {
            Some(Head::List { len }) => len,
            Some(Head::Scalar(_)) => return Err(KvsError::WrongType),
            None => return Ok(Vec::new()),
        };
        let (from, to) = match list_range(len as usize, start, stop) {
            Some(range) => range,
            None => return Ok(Vec::new()),
        };
        self.lists()?
            .range(element_key(&key, from as u64)..=element_key(&key, to as u64))
            .values()
            .map(|res| -> Result<Value> { Ok(serde_json::from_slice(&res?)?) })
            .collect()
    }

    fn flushdb(&self) -> Result<()> {
        let tree: &Tree = &self.0;
        tree.clear()?;
        self.lists()?.clear()?;
        tree.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_keys_sort_by_index() {
        assert!(element_key("log", 1) < element_key("log", 2));
        assert!(element_key("log", 255) < element_key("log", 256));
        // a longer key never lands inside a shorter key's elements
        assert!(element_key("log", u64::max_value()) < element_key("log2", 0));
    }
}
