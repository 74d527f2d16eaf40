//! Response models for the admin API
//!
//! DTOs serialized into HTTP response bodies.

pub mod responses;

pub use responses::{HealthResponse, StatsResponse};
