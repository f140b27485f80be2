//! HTTP API Module
//!
//! Provides a REST API for cluster status and local data management.

mod http;

pub use http::{AppState, HttpServer};
