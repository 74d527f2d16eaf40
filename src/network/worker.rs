//! Reactor Worker
//!
//! One thread, one mio [`Poll`]. The listening socket and every accepted
//! connection are registered with it; each readiness event advances the
//! owning [`Connection`] as far as the bytes already available allow, then
//! control goes back to the wait loop.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use tracing::{debug, error, info, warn};

use crate::cache::Storage;
use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::network::connection::{Connection, Status};

const LISTENER: Token = Token(0);

/// Readiness events taken per wait; the rest stay queued in the kernel.
const EVENTS_CAPACITY: usize = 1;

fn token_for(key: usize) -> Token {
    Token(key + 1)
}

struct Slot {
    conn: Connection<TcpStream>,
    interest: Interest,
    /// Already waiting in the yield queue
    queued: bool,
}

// == Worker ==
/// Handle to one reactor thread.
#[derive(Debug)]
pub struct Worker {
    id: usize,
    storage: Storage,
    poll_interval: Duration,
    drain_timeout: Duration,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(id: usize, storage: Storage, config: &Config) -> Self {
        Self {
            id,
            storage,
            poll_interval: config.poll_interval(),
            drain_timeout: config.drain_timeout(),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    // == Start ==
    /// Registers `listener` and spawns the reactor thread.
    ///
    /// Poll creation and registration happen on the caller's thread, so a
    /// failure is returned here instead of being lost in the worker.
    pub fn start(&mut self, listener: std::net::TcpListener) -> Result<()> {
        if self.thread.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        listener.set_nonblocking(true)?;
        let mut listener = TcpListener::from_std(listener);
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        let reactor = Reactor {
            id: self.id,
            poll,
            listener: Some(listener),
            connections: Slab::new(),
            yielded: VecDeque::new(),
            storage: self.storage.clone(),
            running: Arc::clone(&self.running),
            poll_interval: self.poll_interval,
            drain_timeout: self.drain_timeout,
        };

        self.running.store(true, Ordering::Release);
        let handle = thread::Builder::new()
            .name(format!("reactor-{}", self.id))
            .spawn(move || reactor.run());
        match handle {
            Ok(handle) => {
                self.thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    // == Stop ==
    /// Stops accepting and reading. The thread notices within one poll
    /// interval, then drains.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    // == Join ==
    /// Blocks until the reactor thread has exited.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!(worker = self.id, "reactor thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

// == Reactor ==
/// State owned by the reactor thread.
struct Reactor {
    id: usize,
    poll: Poll,
    listener: Option<TcpListener>,
    connections: Slab<Slot>,
    /// Connections that used up their read budget with input still pending
    yielded: VecDeque<usize>,
    storage: Storage,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    drain_timeout: Duration,
}

impl Reactor {
    fn run(mut self) {
        info!(worker = self.id, "reactor started");
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        while self.running.load(Ordering::Acquire) {
            let timeout = if self.yielded.is_empty() {
                self.poll_interval
            } else {
                Duration::ZERO
            };
            if let Err(e) = self.poll.poll(&mut events, Some(timeout)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(worker = self.id, error = %e, "poll failed");
                break;
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept(),
                    Token(n) => self.on_event(n - 1, event),
                }
            }
            self.resume_yielded();
        }

        self.shutdown(&mut events);
        info!(worker = self.id, "reactor stopped");
    }

    /// Accepts until the backlog is empty.
    fn accept(&mut self) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        loop {
            match listener.accept() {
                Ok((mut stream, peer)) => {
                    let entry = self.connections.vacant_entry();
                    let key = entry.key();
                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut stream, token_for(key), Interest::READABLE)
                    {
                        warn!(worker = self.id, %peer, error = %e, "failed to register connection");
                        continue;
                    }
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(worker = self.id, %peer, error = %e, "set_nodelay failed");
                    }
                    entry.insert(Slot {
                        conn: Connection::new(stream, self.storage.clone()),
                        interest: Interest::READABLE,
                        queued: false,
                    });
                    debug!(worker = self.id, %peer, key, "accepted connection");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(worker = self.id, error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    fn on_event(&mut self, key: usize, event: &Event) {
        if event.is_error() {
            let err = self
                .connections
                .get(key)
                .and_then(|slot| slot.conn.stream().take_error().ok().flatten());
            debug!(worker = self.id, key, error = ?err, "socket error");
            self.close(key);
            return;
        }
        self.advance(key);
    }

    fn advance(&mut self, key: usize) {
        let Some(slot) = self.connections.get_mut(key) else {
            return;
        };
        let result = slot.conn.on_ready();
        self.settle(key, result);
    }

    /// Re-arms, queues or closes a connection according to its last turn.
    fn settle(&mut self, key: usize, result: io::Result<Status>) {
        match result {
            Ok(Status::WantRead) => self.rearm(key, Interest::READABLE),
            Ok(Status::WantWrite) => self.rearm(key, Interest::READABLE | Interest::WRITABLE),
            Ok(Status::Yield) => {
                self.rearm(key, Interest::READABLE);
                if let Some(slot) = self.connections.get_mut(key) {
                    if !slot.queued {
                        slot.queued = true;
                        self.yielded.push_back(key);
                    }
                }
            }
            Ok(Status::Closed) => self.close(key),
            Err(e) => {
                warn!(worker = self.id, key, error = %e, "connection failed");
                self.close(key);
            }
        }
    }

    fn rearm(&mut self, key: usize, interest: Interest) {
        let Some(slot) = self.connections.get_mut(key) else {
            return;
        };
        if slot.interest == interest {
            return;
        }
        match self
            .poll
            .registry()
            .reregister(slot.conn.stream_mut(), token_for(key), interest)
        {
            Ok(()) => slot.interest = interest,
            Err(e) => {
                warn!(worker = self.id, key, error = %e, "failed to re-arm connection");
                self.close(key);
            }
        }
    }

    /// Gives each queued connection one more turn, in queue order.
    fn resume_yielded(&mut self) {
        for _ in 0..self.yielded.len() {
            let Some(key) = self.yielded.pop_front() else {
                break;
            };
            match self.connections.get_mut(key) {
                Some(slot) => slot.queued = false,
                None => continue,
            }
            self.advance(key);
        }
    }

    fn close(&mut self, key: usize) {
        if let Some(mut slot) = self.connections.try_remove(key) {
            if let Err(e) = self.poll.registry().deregister(slot.conn.stream_mut()) {
                debug!(worker = self.id, key, error = %e, "deregister failed");
            }
            debug!(worker = self.id, key, "closed connection");
        }
    }

    // == Shutdown ==
    /// Stops accepting, then lets every connection finish the work it has
    /// already received. Pending replies get until the drain timeout.
    fn shutdown(&mut self, events: &mut Events) {
        if let Some(mut listener) = self.listener.take() {
            if let Err(e) = self.poll.registry().deregister(&mut listener) {
                debug!(worker = self.id, error = %e, "listener deregister failed");
            }
        }
        self.yielded.clear();

        let keys: Vec<usize> = self.connections.iter().map(|(key, _)| key).collect();
        for key in keys {
            self.drain(key);
        }

        let deadline = Instant::now() + self.drain_timeout;
        while !self.connections.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    worker = self.id,
                    remaining = self.connections.len(),
                    "drain timed out, dropping connections"
                );
                self.connections.clear();
                break;
            }

            let wait = (deadline - now).min(self.poll_interval);
            if let Err(e) = self.poll.poll(events, Some(wait)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(worker = self.id, error = %e, "poll failed while draining");
                self.connections.clear();
                break;
            }
            for event in events.iter() {
                let Token(n) = event.token();
                if n > 0 {
                    self.drain(n - 1);
                }
            }
        }
    }

    fn drain(&mut self, key: usize) {
        let Some(slot) = self.connections.get_mut(key) else {
            return;
        };
        match slot.conn.drain() {
            Ok(Status::WantWrite) => self.rearm(key, Interest::WRITABLE),
            Ok(_) => self.close(key),
            Err(e) => {
                debug!(worker = self.id, key, error = %e, "connection failed while draining");
                self.close(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpStream as StdStream;

    fn test_config() -> Config {
        Config {
            poll_interval_ms: 10,
            drain_timeout_ms: 500,
            ..Config::default()
        }
    }

    fn started_worker(storage: &Storage) -> (Worker, std::net::SocketAddr) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut worker = Worker::new(0, storage.clone(), &test_config());
        worker.start(listener).unwrap();
        (worker, addr)
    }

    fn read_line(reader: &mut BufReader<StdStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        line
    }

    #[test]
    fn test_token_mapping_skips_listener() {
        assert_eq!(token_for(0), Token(1));
        assert_ne!(token_for(0), LISTENER);
    }

    #[test]
    fn test_start_twice_fails() {
        let storage = Storage::new(1024);
        let (mut worker, _) = started_worker(&storage);

        let second = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        assert!(matches!(
            worker.start(second),
            Err(ServerError::AlreadyStarted)
        ));

        worker.stop();
        worker.join();
    }

    #[test]
    fn test_join_without_start_returns() {
        let mut worker = Worker::new(3, Storage::new(16), &test_config());
        worker.stop();
        worker.join();
        assert!(!worker.is_running());
    }

    #[test]
    fn test_serves_and_stops() {
        let storage = Storage::new(1024);
        let (mut worker, addr) = started_worker(&storage);
        assert!(worker.is_running());

        let stream = StdStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;

        writer.write_all(b"set k 0 0 2\r\nhi\r\n").unwrap();
        assert_eq!(read_line(&mut reader), "STORED\r\n");

        writer.write_all(b"get k\r\n").unwrap();
        assert_eq!(read_line(&mut reader), "VALUE k 0 2\r\n");
        assert_eq!(read_line(&mut reader), "hi\r\n");
        assert_eq!(read_line(&mut reader), "END\r\n");

        worker.stop();
        worker.join();

        // Connection is closed after the drain
        assert_eq!(read_line(&mut reader), "");
        assert_eq!(storage.get(b"k"), Some(b"hi".to_vec()));
    }
}
