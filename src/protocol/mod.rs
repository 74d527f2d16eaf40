//! Protocol Module
//!
//! Memcached text protocol: request-line parsing and command execution.
//!
//! # Commands
//! - `set|add|replace|append|prepend <key> <flags> <exptime> <bytes>` + data block
//! - `get|gets <key>+`
//! - `delete <key>`
//! - `flush_all`, `stats`, `version`

mod command;
mod parser;

pub use command::{Command, StoreMode};
pub use parser::{Parser, MAX_KEYS, MAX_KEY_LEN, MAX_LINE_LEN, MAX_VALUE_LEN};

/// Line terminator for requests, data blocks and replies
pub const CRLF: &[u8] = b"\r\n";
