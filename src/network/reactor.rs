//! Non-Blocking Server
//!
//! A fixed pool of reactor [`Worker`]s, each polling its own clone of the
//! listening socket.

use std::net::TcpListener;

use tracing::info;

use crate::cache::Storage;
use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::network::{Server, Worker};

#[derive(Debug)]
pub struct ReactorServer {
    storage: Storage,
    config: Config,
    workers: Vec<Worker>,
}

impl ReactorServer {
    pub fn new(storage: Storage, config: &Config) -> Self {
        Self {
            storage,
            config: config.clone(),
            workers: Vec::new(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Server for ReactorServer {
    fn start(&mut self, listener: TcpListener) -> Result<()> {
        if !self.workers.is_empty() {
            return Err(ServerError::AlreadyStarted);
        }

        let addr = listener.local_addr()?;
        let count = self.config.workers.max(1);
        for id in 0..count {
            let socket = match listener.try_clone() {
                Ok(socket) => socket,
                Err(e) => {
                    self.stop();
                    self.join();
                    return Err(e.into());
                }
            };
            let mut worker = Worker::new(id, self.storage.clone(), &self.config);
            if let Err(e) = worker.start(socket) {
                self.stop();
                self.join();
                return Err(e);
            }
            self.workers.push(worker);
        }

        info!(%addr, workers = count, "non-blocking server listening");
        Ok(())
    }

    fn stop(&self) {
        if self.workers.iter().any(Worker::is_running) {
            info!("stopping non-blocking server");
        }
        for worker in &self.workers {
            worker.stop();
        }
    }

    fn join(&mut self) {
        for worker in &mut self.workers {
            worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_configured_workers() {
        let config = Config {
            workers: 3,
            poll_interval_ms: 10,
            ..Config::default()
        };
        let mut server = ReactorServer::new(Storage::new(64), &config);

        server
            .start(TcpListener::bind("127.0.0.1:0").unwrap())
            .unwrap();
        assert_eq!(server.worker_count(), 3);

        let again = server.start(TcpListener::bind("127.0.0.1:0").unwrap());
        assert!(matches!(again, Err(ServerError::AlreadyStarted)));

        server.stop();
        server.join();
    }
}
