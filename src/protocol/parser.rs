//! Request Line Parser
//!
//! Incremental parser for memcached text protocol request lines. Bytes are
//! fed as they arrive; once a full line is seen it is tokenized and can be
//! built into a [`Command`] plus the payload length still owed.

use crate::error::ParseError;
use crate::protocol::{Command, StoreMode};

/// Maximum key size in bytes (memcached default is 250)
pub const MAX_KEY_LEN: usize = 250;

/// Maximum request line length, terminator included
pub const MAX_LINE_LEN: usize = 2048;

/// Maximum number of keys in one `get`
pub const MAX_KEYS: usize = 64;

/// Maximum data block size in bytes (memcached default is 1MB)
pub const MAX_VALUE_LEN: usize = 1024 * 1024;

// == Parser ==
/// Stateful request-line parser.
///
/// Call [`Parser::feed`] until it reports a complete line, then
/// [`Parser::build`], then [`Parser::reset`] before the next command.
#[derive(Debug, Default)]
pub struct Parser {
    /// Bytes of the current line seen so far
    line: Vec<u8>,
    /// Parsed command waiting for `build`
    parsed: Option<(Command, usize)>,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    // == Feed ==
    /// Consumes bytes up to and including the first `\n` in `buf`.
    ///
    /// Returns how many bytes were consumed and whether a full line has now
    /// been parsed. Without a line feed every byte is consumed and kept. Once
    /// a line is complete, further calls consume nothing until `reset`.
    pub fn feed(&mut self, buf: &[u8]) -> Result<(usize, bool), ParseError> {
        if self.parsed.is_some() {
            return Ok((0, true));
        }

        let (consumed, complete) = match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (buf.len(), false),
        };

        if self.line.len() + consumed > MAX_LINE_LEN {
            return Err(ParseError::LineTooLong);
        }
        self.line.extend_from_slice(&buf[..consumed]);

        if complete {
            self.parsed = Some(parse_line(&self.line)?);
        }
        Ok((consumed, complete))
    }

    // == Build ==
    /// Returns the parsed command and the number of raw payload bytes that
    /// follow it (terminator excluded). Zero means no payload.
    pub fn build(&mut self) -> Result<(Command, usize), ParseError> {
        self.parsed
            .take()
            .ok_or(ParseError::Protocol("command line incomplete"))
    }

    // == Reset ==
    /// Clears all state for the next command.
    pub fn reset(&mut self) {
        self.line.clear();
        self.parsed = None;
    }
}

fn parse_line(line: &[u8]) -> Result<(Command, usize), ParseError> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let mut tokens = line.split(|&b| b == b' ').filter(|t| !t.is_empty());
    let name = tokens.next().ok_or(ParseError::Protocol("empty command"))?;

    let mode = match name {
        b"set" => Some(StoreMode::Set),
        b"add" => Some(StoreMode::Add),
        b"replace" => Some(StoreMode::Replace),
        b"append" => Some(StoreMode::Append),
        b"prepend" => Some(StoreMode::Prepend),
        _ => None,
    };
    if let Some(mode) = mode {
        let key = parse_key(tokens.next())?;
        let flags = parse_number::<u32>(tokens.next(), "missing flags")?;
        let exptime = parse_number::<i64>(tokens.next(), "missing exptime")?;
        let bytes = parse_number::<usize>(tokens.next(), "missing bytes")?;
        no_more(tokens)?;
        if bytes > MAX_VALUE_LEN {
            return Err(ParseError::ValueTooLarge { bytes });
        }
        let command = Command::Store {
            mode,
            key,
            flags,
            exptime,
            bytes,
        };
        return Ok((command, bytes));
    }

    let command = match name {
        b"get" | b"gets" => {
            let keys = tokens
                .map(|t| parse_key(Some(t)))
                .collect::<Result<Vec<_>, _>>()?;
            if keys.is_empty() {
                return Err(ParseError::Protocol("get requires key"));
            }
            if keys.len() > MAX_KEYS {
                return Err(ParseError::Protocol("too many keys"));
            }
            Command::Get { keys }
        }
        b"delete" => {
            let key = parse_key(tokens.next())?;
            no_more(tokens)?;
            Command::Delete { key }
        }
        b"flush_all" => {
            no_more(tokens)?;
            Command::FlushAll
        }
        b"stats" => {
            no_more(tokens)?;
            Command::Stats
        }
        b"version" => {
            no_more(tokens)?;
            Command::Version
        }
        _ => return Err(ParseError::UnknownCommand),
    };
    Ok((command, 0))
}

fn parse_key(token: Option<&[u8]>) -> Result<Vec<u8>, ParseError> {
    let key = token.ok_or(ParseError::Protocol("missing key"))?;
    if key.len() > MAX_KEY_LEN {
        return Err(ParseError::Protocol("key too long"));
    }
    if key.iter().any(|b| b.is_ascii_control()) {
        return Err(ParseError::Protocol("invalid key"));
    }
    Ok(key.to_vec())
}

fn parse_number<T: std::str::FromStr>(
    token: Option<&[u8]>,
    missing: &'static str,
) -> Result<T, ParseError> {
    let token = token.ok_or(ParseError::Protocol(missing))?;
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::InvalidNumber(String::from_utf8_lossy(token).into_owned()))
}

fn no_more<'a>(mut tokens: impl Iterator<Item = &'a [u8]>) -> Result<(), ParseError> {
    match tokens.next() {
        Some(_) => Err(ParseError::Protocol("too many tokens")),
        None => Ok(()),
    }
}
