//! kv-cache-compress: attention-based KV-cache compression.
//!
//! Reduces the key/value pairs stored for a transformer context window by
//! keeping only the tokens whose cumulative attention mass reaches a
//! configurable threshold. The engine is a pure synchronous function;
//! the HTTP layer in [`server`] wraps it for RPC-style callers.

pub mod config;
pub mod engine;
pub mod server;
