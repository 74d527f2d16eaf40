//! Mini Memcached - A lightweight in-memory cache server
//!
//! Speaks the memcached text protocol over a byte-bounded LRU cache, with a
//! small HTTP admin API for stats and health.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod network;
pub mod protocol;

pub use api::AppState;
pub use cache::Storage;
pub use config::{Config, Transport};
pub use error::{Result, ServerError};
pub use network::{BlockingServer, ReactorServer, Server};
