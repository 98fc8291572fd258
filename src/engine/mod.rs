//! Attention-based KV cache compression.
//!
//! This module contains the core numeric pipeline:
//! - [`matrix`]: validated row-major f64 matrices for keys/values/queries
//! - [`attention`]: scaled dot-product scoring, stabilized softmax, and
//!   per-token importance aggregation
//! - [`selection`]: importance ranking and the cumulative-mass threshold walk
//! - [`compressor`]: the `compress` operation tying it together

pub mod attention;
pub mod compressor;
pub mod matrix;
pub mod selection;
