use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_skiplist::SkipMap;
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Deserializer;

use super::{list_range, KvsEngine};
use crate::{KvsError, Result, Value};

const COMPACTION_THRESHOLD: u64 = 1024 * 1024;

/// The `KvStore` stores scalar values and lists under string keys.
///
/// Every write is appended as a command to log files on disk. Log files are
/// named after monotonically increasing generation numbers with a `log`
/// extension name. A skip list in memory maps each key to the positions of
/// the commands that make up its current entry.
///
/// ```rust
/// # use kvs_cache::{KvStore, Result};
/// # fn try_main() -> Result<()> {
/// use std::env::current_dir;
/// use kvs_cache::{KvsEngine, Value};
/// let store = KvStore::open(current_dir()?)?;
/// store.set("key".to_owned(), Value::from("value"))?;
/// let val = store.get("key".to_owned())?;
/// assert_eq!(val, Some(Value::from("value")));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct KvStore {
    index: Arc<SkipMap<String, Slot>>,
    reader: KvStoreReader,
    // 写入串行化，读走 index + reader 不加锁
    writer: Arc<Mutex<KvStoreWriter>>,
}

impl KvStore {
    /// Opens a `KvStore` with the given path.
    ///
    /// This will create a new directory if the given one does not exist.
    ///
    /// # Errors
    ///
    /// It propagates I/O or deserialization errors during the log replay.
    pub fn open(path: impl Into<PathBuf>) -> Result<KvStore> {
        let path = Arc::new(path.into());
        fs::create_dir_all(&*path)?;

        let mut readers = BTreeMap::new();
        let index = Arc::new(SkipMap::new());

        let gen_list = sorted_gen_list(&path)?;
        let mut uncompacted = 0;

        for &gen in &gen_list {
            let mut reader = BufReaderWithPos::new(File::open(log_path(&path, gen))?)?;
            uncompacted += load(gen, &mut reader, &*index)?;
            readers.insert(gen, reader);
        }

        // 旧文件只读，每次打开都写新的一代
        let current_gen = gen_list.last().unwrap_or(&0) + 1;
        let writer = new_log_file(&path, current_gen)?;
        let safe_point = Arc::new(AtomicU64::new(0));

        let reader = KvStoreReader {
            path: Arc::clone(&path),
            safe_point,
            readers: RefCell::new(readers),
        };

        let writer = KvStoreWriter {
            reader: reader.clone(),
            writer,
            current_gen,
            uncompacted,
            path: Arc::clone(&path),
            index: Arc::clone(&index),
        };

        Ok(KvStore {
            reader,
            index,
            writer: Arc::new(Mutex::new(writer)),
        })
    }
}

impl KvsEngine for KvStore {
    /// Sets the value of a string key.
    ///
    /// # Errors
    ///
    /// It propagates I/O or serialization errors during writing the log.
    fn set(&self, key: String, value: Value) -> Result<()> {
        value.check_storable()?;
        self.writer.lock().unwrap().set(key, value)
    }

    fn get(&self, key: String) -> Result<Option<Value>> {
        let slot = match self.index.get(&key) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };
        match slot {
            Slot::Scalar(cmd_pos) => match self.reader.read_command(cmd_pos)? {
                Command::Set { value, .. } => Ok(Some(value)),
                _ => Err(KvsError::UnexpectedCommandType),
            },
            Slot::List(_) => Err(KvsError::WrongType),
        }
    }

    fn incr(&self, key: String) -> Result<i64> {
        self.writer.lock().unwrap().incr(key)
    }

    fn rpush(&self, key: String, value: Value) -> Result<u64> {
        value.check_storable()?;
        self.writer.lock().unwrap().rpush(key, value)
    }

    fn lrange(&self, key: String, start: i64, stop: i64) -> Result<Vec<Value>> {
        let positions = match self.index.get(&key) {
            Some(entry) => match entry.value() {
                Slot::List(positions) => positions.clone(),
                Slot::Scalar(_) => return Err(KvsError::WrongType),
            },
            None => return Ok(Vec::new()),
        };
        let (from, to) = match list_range(positions.len(), start, stop) {
            Some(range) => range,
            None => return Ok(Vec::new()),
        };
        positions[from..=to]
            .iter()
            .map(|&cmd_pos| -> Result<Value> {
                match self.reader.read_command(cmd_pos)? {
                    Command::Push { value, .. } => Ok(value),
                    _ => Err(KvsError::UnexpectedCommandType),
                }
            })
            .collect()
    }

    /// Removes every key.
    ///
    /// A `Flush` command is logged so the keys stay gone after reopening.
    fn flushdb(&self) -> Result<()> {
        self.writer.lock().unwrap().flush_all()
    }
}

/// A single thread reader.
///
/// Each `KvStore` instance has its own `KvStoreReader` and
/// `KvStoreReader`s open the same files separately. So the user
/// can read concurrently through multiple `KvStore`s in different
/// threads.
struct KvStoreReader {
    path: Arc<PathBuf>,
    // generation of the latest compaction file
    safe_point: Arc<AtomicU64>,
    readers: RefCell<BTreeMap<u64, BufReaderWithPos<File>>>,
}

impl KvStoreReader {
    /// Close file handles with generation number less than safe_point.
    ///
    /// `safe_point` is updated to the latest compaction gen after a compaction finishes.
    /// The compaction generation contains the sum of all operations before it and the
    /// in-memory index contains no entries with generation number less than safe_point.
    /// So we can safely close those file handles and the stale files can be deleted.
    fn close_stale_handles(&self) {
        let mut readers = self.readers.borrow_mut();
        while let Some(&first_gen) = readers.keys().next() {
            if self.safe_point.load(Ordering::SeqCst) <= first_gen {
                break;
            }
            readers.remove(&first_gen);
        }
    }

    /// Read the log file at the given `CommandPos`.
    fn read_and<F, R>(&self, cmd_pos: CommandPos, f: F) -> Result<R>
    where
        F: FnOnce(io::Take<&mut BufReaderWithPos<File>>) -> Result<R>,
    {
        self.close_stale_handles();

        let mut readers = self.readers.borrow_mut();
        // Open the file if we haven't opened it in this `KvStoreReader`.
        // We don't use entry API here because we want the errors to be propogated.
        if !readers.contains_key(&cmd_pos.gen) {
            let reader = BufReaderWithPos::new(File::open(log_path(&self.path, cmd_pos.gen))?)?;
            readers.insert(cmd_pos.gen, reader);
        }
        let reader = readers
            .get_mut(&cmd_pos.gen)
            .ok_or_else(|| KvsError::StringError(format!("log {} is not open", cmd_pos.gen)))?;
        reader.seek(SeekFrom::Start(cmd_pos.pos))?;
        let cmd_reader = reader.take(cmd_pos.len);
        f(cmd_reader)
    }

    // Read the log file at the given `CommandPos` and deserialize it to `Command`.
    fn read_command(&self, cmd_pos: CommandPos) -> Result<Command> {
        self.read_and(cmd_pos, |cmd_reader| {
            Ok(serde_json::from_reader(cmd_reader)?)
        })
    }
}

impl Clone for KvStoreReader {
    fn clone(&self) -> KvStoreReader {
        KvStoreReader {
            path: Arc::clone(&self.path),
            safe_point: Arc::clone(&self.safe_point),
            // don't use other KvStoreReader's readers
            readers: RefCell::new(BTreeMap::new()),
        }
    }
}

struct KvStoreWriter {
    reader: KvStoreReader,
    writer: BufWriterWithPos<File>,
    current_gen: u64,
    // the number of bytes representing "stale" commands that could be
    // deleted during a compaction
    uncompacted: u64,
    path: Arc<PathBuf>,
    index: Arc<SkipMap<String, Slot>>,
}

impl KvStoreWriter {
    /// Appends a command to the current log and returns where it landed.
    fn append(&mut self, cmd: &Command) -> Result<CommandPos> {
        let pos = self.writer.pos;
        serde_json::to_writer(&mut self.writer, cmd)?;
        self.writer.flush()?;
        Ok((self.current_gen, pos..self.writer.pos).into())
    }

    fn set(&mut self, key: String, value: Value) -> Result<()> {
        let cmd = Command::set(key, value);
        let cmd_pos = self.append(&cmd)?;
        if let Command::Set { key, .. } = cmd {
            if let Some(old) = self.index.get(&key) {
                self.uncompacted += old.value().stale_len();
            }
            self.index.insert(key, Slot::Scalar(cmd_pos));
        }
        self.maybe_compact()
    }

    fn incr(&mut self, key: String) -> Result<i64> {
        let current = match self.index.get(&key).map(|entry| entry.value().clone()) {
            Some(Slot::Scalar(cmd_pos)) => match self.reader.read_command(cmd_pos)? {
                Command::Set { value, .. } => value.as_counter()?,
                _ => return Err(KvsError::UnexpectedCommandType),
            },
            Some(Slot::List(_)) => return Err(KvsError::WrongType),
            None => 0,
        };
        let next = current.checked_add(1).ok_or(KvsError::NotAnInteger)?;
        self.set(key, Value::Int(next))?;
        Ok(next)
    }

    fn rpush(&mut self, key: String, value: Value) -> Result<u64> {
        let mut positions = match self.index.get(&key).map(|entry| entry.value().clone()) {
            Some(Slot::List(positions)) => positions,
            Some(Slot::Scalar(_)) => return Err(KvsError::WrongType),
            None => Vec::new(),
        };
        let cmd = Command::push(key, value);
        positions.push(self.append(&cmd)?);
        let len = positions.len() as u64;
        if let Command::Push { key, .. } = cmd {
            self.index.insert(key, Slot::List(positions));
        }
        self.maybe_compact()?;
        Ok(len)
    }

    fn flush_all(&mut self) -> Result<()> {
        let cmd_pos = self.append(&Command::Flush)?;
        for entry in self.index.iter() {
            self.uncompacted += entry.value().stale_len();
        }
        self.index.clear();
        // the "flush" command itself can be deleted in the next compaction
        self.uncompacted += cmd_pos.len;
        self.maybe_compact()
    }

    fn maybe_compact(&mut self) -> Result<()> {
        if self.uncompacted > COMPACTION_THRESHOLD {
            self.compact()?;
        }
        Ok(())
    }

    /// Clears stale entries in the log.
    fn compact(&mut self) -> Result<()> {
        // increase current gen by 2. current_gen + 1 is for the compaction file
        let compaction_gen = self.current_gen + 1;
        self.current_gen += 2;
        self.writer = new_log_file(&self.path, self.current_gen)?;

        let mut compaction_writer = new_log_file(&self.path, compaction_gen)?;

        let mut new_pos = 0; // pos in the new log file
        for entry in self.index.iter() {
            let mut copy = |cmd_pos: CommandPos| -> Result<CommandPos> {
                let len = self.reader.read_and(cmd_pos, |mut entry_reader| {
                    Ok(io::copy(&mut entry_reader, &mut compaction_writer)?)
                })?;
                let moved: CommandPos = (compaction_gen, new_pos..new_pos + len).into();
                new_pos += len;
                Ok(moved)
            };
            let slot = match entry.value() {
                Slot::Scalar(cmd_pos) => Slot::Scalar(copy(*cmd_pos)?),
                Slot::List(positions) => Slot::List(
                    positions
                        .iter()
                        .map(|&cmd_pos| copy(cmd_pos))
                        .collect::<Result<_>>()?,
                ),
            };
            self.index.insert(entry.key().clone(), slot);
        }
        compaction_writer.flush()?;

        self.reader
            .safe_point
            .store(compaction_gen, Ordering::SeqCst);
        self.reader.close_stale_handles();

        // Stale files may still be held open by other `KvStoreReader`s. On Unix
        // they go away once those handles close; on Windows the removal fails and
        // the next compaction retries it.
        let stale_gens = sorted_gen_list(&self.path)?
            .into_iter()
            .filter(|&gen| gen < compaction_gen);
        for stale_gen in stale_gens {
            let file_path = log_path(&self.path, stale_gen);
            if let Err(e) = fs::remove_file(&file_path) {
                error!("{:?} cannot be deleted: {}", file_path, e);
            }
        }
        self.uncompacted = 0;

        Ok(())
    }
}

/// Create a new log file with given generation number.
///
/// Returns the writer to the log.
fn new_log_file(path: &Path, gen: u64) -> Result<BufWriterWithPos<File>> {
    let path = log_path(&path, gen);
    let writer = BufWriterWithPos::new(
        OpenOptions::new()
            .create(true)
            .write(true)
            .append(true)
            .open(&path)?,
    )?;
    Ok(writer)
}

/// Returns sorted generation numbers in the given directory
fn sorted_gen_list(path: &Path) -> Result<Vec<u64>> {
    let mut gen_list: Vec<u64> = fs::read_dir(&path)?
        .flat_map(|res| -> Result<_> { Ok(res?.path()) })
        .filter(|path| path.is_file() && path.extension() == Some("log".as_ref()))
        .flat_map(|path| {
            path.file_name()
                .and_then(OsStr::to_str)
                .map(|s| s.trim_end_matches(".log"))
                .map(str::parse::<u64>)
        })
        .flatten()
        .collect();
    gen_list.sort_unstable();
    Ok(gen_list)
}

/// Load the whole log file and store command locations in the index map.
///
/// Returns how many bytes can be saved after a compaction.
fn load(
    gen: u64,
    reader: &mut BufReaderWithPos<File>,
    index: &SkipMap<String, Slot>,
) -> Result<u64> {
    // To make sure we read from the beginning of the file
    let mut pos = reader.seek(SeekFrom::Start(0))?;
    let mut stream = Deserializer::from_reader(reader).into_iter::<Command>();
    let mut uncompacted = 0; // number of bytes that can be saved after a compaction
    while let Some(cmd) = stream.next() {
        let new_pos = stream.byte_offset() as u64;
        let cmd_pos: CommandPos = (gen, pos..new_pos).into();
        match cmd? {
            Command::Set { key, .. } => {
                if let Some(old) = index.get(&key) {
                    uncompacted += old.value().stale_len();
                }
                index.insert(key, Slot::Scalar(cmd_pos));
            }
            Command::Push { key, .. } => {
                let mut positions = match index.get(&key).map(|entry| entry.value().clone()) {
                    Some(Slot::List(positions)) => positions,
                    Some(Slot::Scalar(_)) => return Err(KvsError::UnexpectedCommandType),
                    None => Vec::new(),
                };
                positions.push(cmd_pos);
                index.insert(key, Slot::List(positions));
            }
            Command::Flush => {
                for entry in index.iter() {
                    uncompacted += entry.value().stale_len();
                }
                index.clear();
                uncompacted += cmd_pos.len;
            }
        }
        pos = new_pos;
    }
    Ok(uncompacted)
}

fn log_path(dir: &Path, gen: u64) -> PathBuf {
    dir.join(format!("{}.log", gen))
}

/// Struct representing a command
#[derive(Serialize, Deserialize, Debug)]
enum Command {
    Set { key: String, value: Value },
    Push { key: String, value: Value },
    Flush,
}

impl Command {
    fn set(key: String, value: Value) -> Command {
        Command::Set { key, value }
    }

    fn push(key: String, value: Value) -> Command {
        Command::Push { key, value }
    }
}

/// The commands a key's current entry is built from.
#[derive(Debug, Clone)]
enum Slot {
    Scalar(CommandPos),
    List(Vec<CommandPos>),
}

impl Slot {
    /// Bytes that become garbage once this entry is replaced.
    fn stale_len(&self) -> u64 {
        match self {
            Slot::Scalar(cmd_pos) => cmd_pos.len,
            Slot::List(positions) => positions.iter().map(|cmd_pos| cmd_pos.len).sum(),
        }
    }
}

/// Represents the position and length of a json-serialized command in the log
#[derive(Debug, Clone, Copy)]
struct CommandPos {
    gen: u64,
    pos: u64,
    len: u64,
}

impl From<(u64, Range<u64>)> for CommandPos {
    fn from((gen, range): (u64, Range<u64>)) -> Self {
        CommandPos {
            gen,
            pos: range.start,
            len: range.end - range.start,
        }
    }
}

struct BufReaderWithPos<R: Read + Seek> {
    reader: BufReader<R>,
    pos: u64,
}

impl<R: Read + Seek> BufReaderWithPos<R> {
    fn new(mut inner: R) -> Result<Self> {
        let pos = inner.seek(SeekFrom::Current(0))?;
        Ok(BufReaderWithPos {
            reader: BufReader::new(inner),
            pos,
        })
    }
}

impl<R: Read + Seek> Read for BufReaderWithPos<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.reader.read(buf)?;
        self.pos += len as u64;
        Ok(len)
    }
}

impl<R: Read + Seek> Seek for BufReaderWithPos<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = self.reader.seek(pos)?;
        Ok(self.pos)
    }
}

struct BufWriterWithPos<W: Write + Seek> {
    writer: BufWriter<W>,
    pos: u64,
}

impl<W: Write + Seek> BufWriterWithPos<W> {
    fn new(mut inner: W) -> Result<Self> {
        let pos = inner.seek(SeekFrom::Current(0))?;
        Ok(BufWriterWithPos {
            writer: BufWriter::new(inner),
            pos,
        })
    }
}

impl<W: Write + Seek> Write for BufWriterWithPos<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = self.writer.write(buf)?;
        self.pos += len as u64;
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
