//! HTTP server exposing the compression engine.
//!
//! - [`api`]: Request/response types, error mapping, and route handlers

pub mod api;
