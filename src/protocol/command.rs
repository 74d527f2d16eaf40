//! Executable Commands
//!
//! Each command performs exactly one [`Storage`] call and renders the reply
//! line(s) without the final line terminator.

use crate::cache::Storage;
use crate::error::CommandError;

/// Which storage operation a `set`-family command maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// `set`: insert or overwrite
    Set,
    /// `add`: insert only if absent
    Add,
    /// `replace`: overwrite only if present
    Replace,
    /// `append`: extend an existing value
    Append,
    /// `prepend`: extend an existing value at the front
    Prepend,
}

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `set|add|replace|append|prepend <key> <flags> <exptime> <bytes>`
    Store {
        mode: StoreMode,
        key: Vec<u8>,
        flags: u32,
        exptime: i64,
        bytes: usize,
    },
    /// `get|gets <key>+`
    Get { keys: Vec<Vec<u8>> },
    /// `delete <key>`
    Delete { key: Vec<u8> },
    /// `flush_all`
    FlushAll,
    /// `stats`
    Stats,
    /// `version`
    Version,
}

impl Command {
    /// Whether a data block follows the command line.
    ///
    /// True for storage commands even when `<bytes>` is zero: the empty
    /// block still carries its terminator.
    pub fn has_payload(&self) -> bool {
        matches!(self, Command::Store { .. })
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Store { mode, .. } => match mode {
                StoreMode::Set => "set",
                StoreMode::Add => "add",
                StoreMode::Replace => "replace",
                StoreMode::Append => "append",
                StoreMode::Prepend => "prepend",
            },
            Command::Get { .. } => "get",
            Command::Delete { .. } => "delete",
            Command::FlushAll => "flush_all",
            Command::Stats => "stats",
            Command::Version => "version",
        }
    }

    // == Execute ==
    /// Runs the command against the cache.
    ///
    /// `payload` is the data block with its terminator already trimmed, or
    /// empty for commands without one.
    pub fn execute(&self, storage: &Storage, payload: &[u8]) -> Result<Vec<u8>, CommandError> {
        match self {
            Command::Store {
                mode, key, bytes, ..
            } => {
                if payload.len() != *bytes {
                    return Err(CommandError::PayloadLength {
                        expected: *bytes,
                        actual: payload.len(),
                    });
                }
                if key.len() + payload.len() > storage.capacity() {
                    return Err(CommandError::TooLarge);
                }

                let stored = match mode {
                    StoreMode::Set => storage.put(key, payload),
                    StoreMode::Add => storage.put_if_absent(key, payload),
                    StoreMode::Replace => storage.set(key, payload),
                    StoreMode::Append => storage.append(key, payload),
                    StoreMode::Prepend => storage.prepend(key, payload),
                };
                Ok(if stored { b"STORED".to_vec() } else { b"NOT_STORED".to_vec() })
            }
            Command::Get { keys } => {
                let mut out = Vec::new();
                for key in keys {
                    if let Some(value) = storage.get(key) {
                        out.extend_from_slice(b"VALUE ");
                        out.extend_from_slice(key);
                        out.extend_from_slice(format!(" 0 {}\r\n", value.len()).as_bytes());
                        out.extend_from_slice(&value);
                        out.extend_from_slice(b"\r\n");
                    }
                }
                out.extend_from_slice(b"END");
                Ok(out)
            }
            Command::Delete { key } => Ok(if storage.delete(key) {
                b"DELETED".to_vec()
            } else {
                b"NOT_FOUND".to_vec()
            }),
            Command::FlushAll => {
                storage.clear();
                Ok(b"OK".to_vec())
            }
            Command::Stats => Ok(storage.stats().to_wire()),
            Command::Version => Ok(format!("VERSION {}", env!("CARGO_PKG_VERSION")).into_bytes()),
        }
    }
}
