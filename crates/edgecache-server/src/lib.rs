//! EdgeCache license HTTP server.
//!
//! Wires the license engine, storage backend, and HTTP routes into a running
//! Axum server. Serves the JSON API at `/v1/*`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod payload;
pub mod routes;
pub mod state;
