//! Network Module
//!
//! Transports for the cache protocol. Both drive the same per-connection
//! state machine against a shared [`Storage`]:
//! - [`ReactorServer`]: mio reactor threads, many connections each
//! - [`BlockingServer`]: one OS thread per connection

mod blocking;
mod connection;
mod reactor;
mod worker;

use std::net::TcpListener;

pub use blocking::BlockingServer;
pub use connection::{Connection, State, Status, READS_PER_TURN, READ_CHUNK};
pub use reactor::ReactorServer;
pub use worker::Worker;

use crate::cache::Storage;
use crate::config::{Config, Transport};
use crate::error::Result;

// == Server ==
/// Lifecycle shared by every transport.
pub trait Server: Send {
    /// Starts serving on an already bound listener. Socket setup and thread
    /// creation failures are returned, not logged and swallowed.
    fn start(&mut self, listener: TcpListener) -> Result<()>;

    /// Stops accepting and reading new requests; in-flight work drains.
    fn stop(&self);

    /// Blocks until every transport thread has exited.
    fn join(&mut self);
}

/// Builds the transport selected by `config.transport`.
pub fn from_config(storage: Storage, config: &Config) -> Box<dyn Server> {
    match config.transport {
        Transport::NonBlocking => Box::new(ReactorServer::new(storage, config)),
        Transport::Blocking => Box::new(BlockingServer::new(storage, config)),
    }
}
