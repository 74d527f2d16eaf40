//! Thread-per-Connection Server
//!
//! An acceptor thread hands each client socket to its own OS thread, which
//! runs the same [`Connection`] state machine over a blocking socket. A read
//! timeout bounds every wait so the thread re-checks the stop flag.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::cache::Storage;
use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::network::connection::{Connection, Status};
use crate::network::Server;

// == Blocking Server ==
#[derive(Debug)]
pub struct BlockingServer {
    storage: Storage,
    max_connections: usize,
    poll_interval: Duration,
    drain_timeout: Duration,
    running: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
    acceptor: Option<JoinHandle<()>>,
}

impl BlockingServer {
    pub fn new(storage: Storage, config: &Config) -> Self {
        Self {
            storage,
            max_connections: config.max_connections,
            poll_interval: config.poll_interval(),
            drain_timeout: config.drain_timeout(),
            running: Arc::new(AtomicBool::new(false)),
            local_addr: None,
            acceptor: None,
        }
    }

    /// Connects to our own listener so a blocked `accept` returns and sees
    /// the stop flag.
    fn wake_acceptor(&self) {
        let Some(addr) = self.local_addr else {
            return;
        };
        let target = match addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => {
                SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
            }
            IpAddr::V6(ip) if ip.is_unspecified() => {
                SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
            }
            _ => addr,
        };
        if let Err(e) = TcpStream::connect_timeout(&target, self.poll_interval) {
            debug!(%target, error = %e, "acceptor wake-up connect failed");
        }
    }
}

impl Server for BlockingServer {
    fn start(&mut self, listener: TcpListener) -> Result<()> {
        if self.acceptor.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        listener.set_nonblocking(false)?;
        let addr = listener.local_addr()?;

        let acceptor = Acceptor {
            listener,
            storage: self.storage.clone(),
            running: Arc::clone(&self.running),
            max_connections: self.max_connections,
            poll_interval: self.poll_interval,
            drain_timeout: self.drain_timeout,
        };

        self.running.store(true, Ordering::Release);
        let handle = thread::Builder::new()
            .name("acceptor".to_string())
            .spawn(move || acceptor.run());
        match handle {
            Ok(handle) => {
                self.acceptor = Some(handle);
                self.local_addr = Some(addr);
                info!(%addr, max_connections = self.max_connections, "blocking server listening");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("stopping blocking server");
            self.wake_acceptor();
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.acceptor.take() {
            if handle.join().is_err() {
                error!("acceptor thread panicked");
            }
            info!("blocking server stopped");
        }
    }
}

impl Drop for BlockingServer {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

// == Acceptor ==
struct Acceptor {
    listener: TcpListener,
    storage: Storage,
    running: Arc<AtomicBool>,
    max_connections: usize,
    poll_interval: Duration,
    drain_timeout: Duration,
}

impl Acceptor {
    fn run(self) {
        let mut handlers: Vec<JoinHandle<()>> = Vec::new();

        for incoming in self.listener.incoming() {
            if !self.running.load(Ordering::Acquire) {
                break;
            }

            let stream = match incoming {
                Ok(stream) => stream,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    thread::sleep(self.poll_interval);
                    continue;
                }
            };

            reap(&mut handlers);
            if handlers.len() >= self.max_connections {
                warn!(
                    limit = self.max_connections,
                    "connection limit reached, closing new connection"
                );
                continue;
            }

            let peer = stream.peer_addr().ok();
            let session = Session {
                storage: self.storage.clone(),
                running: Arc::clone(&self.running),
                poll_interval: self.poll_interval,
                drain_timeout: self.drain_timeout,
            };
            match thread::Builder::new()
                .name("connection".to_string())
                .spawn(move || session.serve(stream))
            {
                Ok(handle) => {
                    debug!(peer = ?peer, active = handlers.len() + 1, "accepted connection");
                    handlers.push(handle);
                }
                Err(e) => warn!(peer = ?peer, error = %e, "failed to spawn connection thread"),
            }
        }

        drop(self.listener);
        for handle in handlers {
            if handle.join().is_err() {
                error!("connection thread panicked");
            }
        }
    }
}

/// Joins connection threads that have already exited.
fn reap(handlers: &mut Vec<JoinHandle<()>>) {
    let mut i = 0;
    while i < handlers.len() {
        if handlers[i].is_finished() {
            if handlers.swap_remove(i).join().is_err() {
                error!("connection thread panicked");
            }
        } else {
            i += 1;
        }
    }
}

// == Session ==
/// One client served on its own thread.
struct Session {
    storage: Storage,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    drain_timeout: Duration,
}

impl Session {
    fn serve(self, stream: TcpStream) {
        let peer = stream.peer_addr().ok();
        if let Err(e) = stream.set_read_timeout(Some(self.poll_interval)) {
            warn!(peer = ?peer, error = %e, "failed to set read timeout");
            return;
        }
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = ?peer, error = %e, "set_nodelay failed");
        }

        let mut conn = Connection::new(stream, self.storage);
        while self.running.load(Ordering::Acquire) {
            match conn.on_ready() {
                Ok(Status::Closed) => {
                    debug!(peer = ?peer, "connection closed");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(peer = ?peer, error = %e, "connection failed");
                    return;
                }
            }
        }

        // Stopping: answer what is already buffered, bounded by the drain timeout.
        if let Err(e) = conn.stream().set_write_timeout(Some(self.poll_interval)) {
            debug!(peer = ?peer, error = %e, "failed to set write timeout");
        }
        let deadline = Instant::now() + self.drain_timeout;
        loop {
            match conn.drain() {
                Ok(Status::WantWrite) if Instant::now() < deadline => continue,
                Ok(Status::WantWrite) => {
                    warn!(peer = ?peer, "drain timed out");
                    break;
                }
                Ok(_) => break,
                Err(e) => {
                    debug!(peer = ?peer, error = %e, "connection failed while draining");
                    break;
                }
            }
        }
        debug!(peer = ?peer, "connection closed on shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};

    fn test_config(max_connections: usize) -> Config {
        Config {
            max_connections,
            poll_interval_ms: 10,
            drain_timeout_ms: 500,
            ..Config::default()
        }
    }

    fn started(storage: &Storage, max_connections: usize) -> (BlockingServer, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut server = BlockingServer::new(storage.clone(), &test_config(max_connections));
        server.start(listener).unwrap();
        (server, addr)
    }

    fn read_line(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        line
    }

    #[test]
    fn test_serves_commands() {
        let storage = Storage::new(1024);
        let (mut server, addr) = started(&storage, 4);

        let stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;

        writer.write_all(b"add k 0 0 3\r\nabc\r\nadd k 0 0 3\r\nxyz\r\n").unwrap();
        assert_eq!(read_line(&mut reader), "STORED\r\n");
        assert_eq!(read_line(&mut reader), "NOT_STORED\r\n");

        server.stop();
        server.join();
        assert_eq!(read_line(&mut reader), "");
        assert_eq!(storage.get(b"k"), Some(b"abc".to_vec()));
    }

    #[test]
    fn test_connection_limit_closes_extra_clients() {
        let storage = Storage::new(1024);
        let (mut server, addr) = started(&storage, 1);

        let first = TcpStream::connect(addr).unwrap();
        let mut first_reader = BufReader::new(first.try_clone().unwrap());
        let mut first_writer = first;
        first_writer.write_all(b"version\r\n").unwrap();
        assert!(read_line(&mut first_reader).starts_with("VERSION"));

        let second = TcpStream::connect(addr).unwrap();
        second
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut second_reader = BufReader::new(second);
        // Rejected connections are closed without a reply
        let mut line = String::new();
        let read = second_reader.read_line(&mut line).unwrap_or(0);
        assert_eq!(read, 0);

        server.stop();
        server.join();
    }

    #[test]
    fn test_start_twice_fails() {
        let storage = Storage::new(64);
        let (mut server, _) = started(&storage, 1);

        let other = TcpListener::bind("127.0.0.1:0").unwrap();
        assert!(matches!(server.start(other), Err(ServerError::AlreadyStarted)));

        server.stop();
        server.join();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let storage = Storage::new(64);
        let (mut server, _) = started(&storage, 1);

        server.stop();
        server.stop();
        server.join();
        server.join();
    }
}
