//! Connection State Machine
//!
//! Per-socket protocol progress: buffered input, the parser, the pending
//! command and its payload, and the reply being written. The machine never
//! blocks on its own: when it needs bytes that are not there, or a write
//! would block, it returns to the caller with a [`Status`] saying what it
//! waits for.

use std::io::{self, Read, Write};

use tracing::{debug, trace};

use crate::cache::Storage;
use crate::error::ParseError;
use crate::protocol::{Command, Parser, CRLF};

/// Bytes requested per read call
pub const READ_CHUNK: usize = 4096;

/// Reads with data allowed per call to [`Connection::on_ready`] before
/// control goes back to the caller
pub const READS_PER_TURN: usize = 8;

// == State ==
/// Where a connection is in the command cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Collecting a request line
    AwaitingCommand,
    /// Collecting `needed` bytes of data block, terminator included
    AwaitingPayload { command: Command, needed: usize },
    /// Command and payload ready to run
    Executing { command: Command, payload: Vec<u8> },
    /// Discarding the rest of a rejected request line
    SkippingLine,
    /// Discarding `remaining` bytes of a rejected data block
    Swallowing { remaining: usize },
    /// Writing the reply
    Responding,
    /// Terminal; the socket should be released
    Closed,
}

// == Status ==
/// What the connection waits for after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Nothing left to do until the socket becomes readable
    WantRead,
    /// A reply is partially written; wait for writability
    WantWrite,
    /// More input may be available; run again after others had a turn
    Yield,
    /// Done; release the socket
    Closed,
}

enum Fill {
    Data,
    WouldBlock,
    Eof,
}

// == Connection ==
/// One client's protocol state over a byte stream.
///
/// `S` is a non-blocking socket in the reactor and a blocking socket with a
/// read timeout in the thread-per-connection transport.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    storage: Storage,
    parser: Parser,
    state: State,
    /// Received bytes not yet consumed
    input: Vec<u8>,
    /// Reply being written, terminator included
    output: Vec<u8>,
    written: usize,
    /// State entered once the reply is written
    resume: State,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, storage: Storage) -> Self {
        Self {
            stream,
            storage,
            parser: Parser::new(),
            state: State::AwaitingCommand,
            input: Vec::new(),
            output: Vec::new(),
            written: 0,
            resume: State::AwaitingCommand,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Received bytes not yet consumed by the parser or a payload.
    pub fn buffered(&self) -> usize {
        self.input.len()
    }

    // == On Ready ==
    /// Advances on a readiness notification.
    ///
    /// Finishes any pending write, runs every command already buffered, and
    /// reads what the socket has immediately available, up to
    /// [`READS_PER_TURN`] reads. An `Err` means the connection is dead.
    pub fn on_ready(&mut self) -> io::Result<Status> {
        self.drive(Some(READS_PER_TURN))
    }

    // == Drain ==
    /// Finishes buffered work without reading anything new.
    ///
    /// Returns [`Status::WantWrite`] while a reply is still pending and
    /// [`Status::Closed`] once everything already received has been answered.
    pub fn drain(&mut self) -> io::Result<Status> {
        self.drive(None)
    }

    fn drive(&mut self, reads: Option<usize>) -> io::Result<Status> {
        let result = self.turn(reads);
        if matches!(result, Ok(Status::Closed) | Err(_)) {
            self.state = State::Closed;
        }
        result
    }

    /// `reads` is the read budget; `None` forbids reading at all.
    fn turn(&mut self, mut reads: Option<usize>) -> io::Result<Status> {
        loop {
            match self.state {
                State::Closed => return Ok(Status::Closed),
                State::Responding => {
                    if !self.flush()? {
                        return Ok(Status::WantWrite);
                    }
                    self.state = std::mem::replace(&mut self.resume, State::AwaitingCommand);
                }
                _ => {}
            }

            if self.step() {
                continue;
            }

            match reads.as_mut() {
                None => return Ok(Status::Closed),
                Some(0) => return Ok(Status::Yield),
                Some(left) => *left -= 1,
            }
            match self.fill()? {
                Fill::Data => {}
                Fill::WouldBlock => return Ok(Status::WantRead),
                Fill::Eof => {
                    debug!(unconsumed = self.input.len(), "peer closed connection");
                    return Ok(Status::Closed);
                }
            }
        }
    }

    /// Advances one transition using buffered bytes. Returns false when the
    /// machine cannot move without more input (or is Responding/Closed).
    fn step(&mut self) -> bool {
        match std::mem::replace(&mut self.state, State::AwaitingCommand) {
            State::AwaitingCommand => self.read_command(),
            State::SkippingLine => {
                if self.skip_line() {
                    return true;
                }
                self.state = State::SkippingLine;
                false
            }
            State::Swallowing { remaining } => {
                if self.input.is_empty() {
                    self.state = State::Swallowing { remaining };
                    return false;
                }
                let n = remaining.min(self.input.len());
                self.input.drain(..n);
                if remaining > n {
                    self.state = State::Swallowing {
                        remaining: remaining - n,
                    };
                }
                true
            }
            State::AwaitingPayload { command, needed } => {
                if self.input.len() < needed {
                    self.state = State::AwaitingPayload { command, needed };
                    return false;
                }
                let mut payload: Vec<u8> = self.input.drain(..needed).collect();
                if !payload.ends_with(CRLF) {
                    let err = ParseError::BadDataChunk;
                    debug!(command = command.name(), error = %err, "rejected data block");
                    self.respond(err.to_wire().into_bytes());
                    return true;
                }
                payload.truncate(needed - CRLF.len());
                self.state = State::Executing { command, payload };
                true
            }
            State::Executing { command, payload } => {
                let reply = match command.execute(&self.storage, &payload) {
                    Ok(reply) => reply,
                    Err(err) => {
                        debug!(command = command.name(), error = %err, "command failed");
                        err.to_wire().into_bytes()
                    }
                };
                trace!(command = command.name(), "executed");
                self.respond(reply);
                true
            }
            other => {
                self.state = other;
                false
            }
        }
    }

    fn read_command(&mut self) -> bool {
        if self.input.is_empty() {
            return false;
        }

        let parsed = self.parser.feed(&self.input).and_then(|(consumed, complete)| {
            self.input.drain(..consumed);
            if complete {
                self.parser.build().map(Some)
            } else {
                Ok(None)
            }
        });

        match parsed {
            Ok(None) => false,
            Ok(Some((command, bytes))) => {
                self.parser.reset();
                self.state = if command.has_payload() {
                    State::AwaitingPayload {
                        command,
                        needed: bytes + CRLF.len(),
                    }
                } else {
                    State::Executing {
                        command,
                        payload: Vec::new(),
                    }
                };
                true
            }
            Err(err) => {
                debug!(error = %err, "protocol error");
                self.parser.reset();
                // Drop the rejected line, then any data block it declared.
                let next = if !self.skip_line() {
                    State::SkippingLine
                } else if let ParseError::ValueTooLarge { bytes } = err {
                    State::Swallowing {
                        remaining: bytes.saturating_add(CRLF.len()),
                    }
                } else {
                    State::AwaitingCommand
                };
                self.respond_then(err.to_wire().into_bytes(), next);
                true
            }
        }
    }

    /// Discards input through the next line feed. Returns false, with the
    /// input emptied, when no line feed has arrived yet.
    fn skip_line(&mut self) -> bool {
        match self.input.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                self.input.drain(..=pos);
                true
            }
            None => {
                self.input.clear();
                false
            }
        }
    }

    fn respond(&mut self, reply: Vec<u8>) {
        self.respond_then(reply, State::AwaitingCommand);
    }

    fn respond_then(&mut self, mut reply: Vec<u8>, next: State) {
        reply.extend_from_slice(CRLF);
        self.output = reply;
        self.written = 0;
        self.state = State::Responding;
        self.resume = next;
    }

    /// Writes until the reply is out (true) or the socket would block (false).
    fn flush(&mut self) -> io::Result<bool> {
        while self.written < self.output.len() {
            match self.stream.write(&self.output[self.written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        self.output.clear();
        self.written = 0;
        Ok(true)
    }

    fn fill(&mut self) -> io::Result<Fill> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(Fill::Eof),
                Ok(n) => {
                    self.input.extend_from_slice(&chunk[..n]);
                    return Ok(Fill::Data);
                }
                // A read timeout on a blocking socket surfaces as either kind.
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(Fill::WouldBlock)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}
