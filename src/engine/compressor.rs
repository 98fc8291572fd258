//! The compression operation: validation, attention scoring, token
//! selection, and statistics.
//!
//! `compress` is a pure synchronous function. It owns no state, performs
//! no I/O, and never consults a source of randomness, so identical inputs
//! always produce identical results and concurrent callers need no
//! coordination.

use std::time::Instant;

use thiserror::Error;

use crate::engine::attention::{token_importance, Aggregation};
use crate::engine::matrix::{Matrix, MatrixError};
use crate::engine::selection::select_tokens;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompressError {
    #[error("attention threshold {threshold} is outside (0, 1]")]
    InvalidConfig { threshold: f64 },

    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("request deadline exceeded before compression completed")]
    Cancelled,
}

impl From<MatrixError> for CompressError {
    fn from(err: MatrixError) -> Self {
        match err {
            MatrixError::Empty => CompressError::EmptyInput("matrix has no rows"),
            MatrixError::RaggedRow { .. } => CompressError::DimensionMismatch(err.to_string()),
        }
    }
}

/// Per-request compression parameters.
#[derive(Debug, Clone, Copy)]
pub struct CompressionConfig {
    /// Fraction of cumulative attention mass to retain, in (0, 1].
    pub attention_threshold: f64,

    /// How multi-query attention rows collapse into one score per token.
    pub aggregation: Aggregation,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            attention_threshold: 0.90,
            aggregation: Aggregation::Mean,
        }
    }
}

/// Statistics describing one compression pass.
#[derive(Debug, Clone)]
pub struct Stats {
    /// Token count before compression.
    pub original_token_count: usize,

    /// Token count after compression.
    pub compressed_token_count: usize,

    /// `1 - compressed/original`, in [0, 1).
    pub compression_ratio: f64,

    /// Fraction of importance mass covered by the retained tokens. At
    /// least `attention_threshold` for thresholds below 1.
    pub cumulative_attention_retained: f64,

    /// Wall-clock time spent inside `compress`.
    pub processing_time_ms: f64,
}

/// Output of a compression pass: the retained subset plus statistics.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    /// Retained token indices, strictly ascending in original order.
    pub retained_indices: Vec<usize>,

    /// Keys gathered at the retained indices.
    pub compressed_keys: Matrix,

    /// Values gathered at the retained indices.
    pub compressed_values: Matrix,

    pub stats: Stats,
}

/// The compression engine.
///
/// Holds only tuning knobs; every call is independent, so a single
/// `Compressor` may be shared freely across threads.
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    /// Minimum M×N×d multiply-adds before attention scoring moves to the
    /// rayon pool.
    parallel_min_work: usize,
}

impl Compressor {
    pub fn new(parallel_min_work: usize) -> Self {
        Self { parallel_min_work }
    }

    /// Compress a KV cache: keep the smallest token subset whose
    /// cumulative attention mass reaches `config.attention_threshold`.
    ///
    /// All inputs are validated before any arithmetic runs; a failed
    /// request does no partial work.
    pub fn compress(
        &self,
        keys: &Matrix,
        values: &Matrix,
        queries: &Matrix,
        config: &CompressionConfig,
    ) -> Result<CompressionResult, CompressError> {
        self.compress_with_deadline(keys, values, queries, config, None)
    }

    /// Like [`compress`](Self::compress), but aborts with `Cancelled` once
    /// `deadline` passes. The deadline is polled between query rows, so a
    /// cancelled call never returns a truncated result.
    pub fn compress_with_deadline(
        &self,
        keys: &Matrix,
        values: &Matrix,
        queries: &Matrix,
        config: &CompressionConfig,
        deadline: Option<Instant>,
    ) -> Result<CompressionResult, CompressError> {
        let start = Instant::now();

        validate(keys, values, queries, config)?;

        let importance = token_importance(
            queries,
            keys,
            config.aggregation,
            self.parallel_min_work,
            deadline,
        )?;

        let selection = select_tokens(&importance, config.attention_threshold);

        let original = keys.rows();
        let compressed = selection.indices.len();
        let stats = Stats {
            original_token_count: original,
            compressed_token_count: compressed,
            compression_ratio: 1.0 - compressed as f64 / original as f64,
            cumulative_attention_retained: selection.cumulative_mass,
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        };

        Ok(CompressionResult {
            compressed_keys: keys.gather(&selection.indices),
            compressed_values: values.gather(&selection.indices),
            retained_indices: selection.indices,
            stats,
        })
    }
}

impl Default for Compressor {
    fn default() -> Self {
        // Roughly the work of 16 queries over 2k tokens at dim 128; below
        // this the rayon dispatch overhead outweighs the win.
        Self::new(4 * 1024 * 1024)
    }
}

fn validate(
    keys: &Matrix,
    values: &Matrix,
    queries: &Matrix,
    config: &CompressionConfig,
) -> Result<(), CompressError> {
    let t = config.attention_threshold;
    if !t.is_finite() || t <= 0.0 || t > 1.0 {
        return Err(CompressError::InvalidConfig { threshold: t });
    }

    if keys.rows() == 0 {
        return Err(CompressError::EmptyInput("no tokens supplied"));
    }
    if queries.rows() == 0 {
        return Err(CompressError::EmptyInput("no queries supplied"));
    }

    if values.rows() != keys.rows() {
        return Err(CompressError::DimensionMismatch(format!(
            "{} keys but {} values",
            keys.rows(),
            values.rows()
        )));
    }
    if queries.cols() != keys.cols() {
        return Err(CompressError::DimensionMismatch(format!(
            "query dimension {} does not match key dimension {}",
            queries.cols(),
            keys.cols()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> Matrix {
        Matrix::from_rows(rows).unwrap()
    }

    fn basic_inputs() -> (Matrix, Matrix, Matrix) {
        let keys = matrix(vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![5.0, 5.0],
            vec![-1.0, -1.0],
        ]);
        let values = matrix(vec![
            vec![10.0, 10.0, 10.0],
            vec![20.0, 20.0, 20.0],
            vec![30.0, 30.0, 30.0],
            vec![40.0, 40.0, 40.0],
        ]);
        let queries = matrix(vec![vec![1.0, 1.0]]);
        (keys, values, queries)
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let (keys, values, queries) = basic_inputs();
        let compressor = Compressor::default();

        for bad in [0.0, -0.5, 1.5, f64::NAN, f64::INFINITY] {
            let config = CompressionConfig {
                attention_threshold: bad,
                ..Default::default()
            };
            let err = compressor
                .compress(&keys, &values, &queries, &config)
                .unwrap_err();
            assert!(matches!(err, CompressError::InvalidConfig { .. }), "{bad}");
        }
    }

    #[test]
    fn test_key_value_count_mismatch_rejected() {
        let (keys, _, queries) = basic_inputs();
        let values = matrix(vec![vec![1.0]; 3]); // 3 values vs 4 keys
        let compressor = Compressor::default();

        let err = compressor
            .compress(&keys, &values, &queries, &CompressionConfig::default())
            .unwrap_err();
        assert!(matches!(err, CompressError::DimensionMismatch(_)));
    }

    #[test]
    fn test_query_dim_mismatch_rejected() {
        let (keys, values, _) = basic_inputs();
        let queries = matrix(vec![vec![1.0, 2.0, 3.0]]); // dim 3 vs key dim 2
        let compressor = Compressor::default();

        let err = compressor
            .compress(&keys, &values, &queries, &CompressionConfig::default())
            .unwrap_err();
        assert!(matches!(err, CompressError::DimensionMismatch(_)));
    }

    #[test]
    fn test_compress_keeps_dominant_token() {
        let (keys, values, queries) = basic_inputs();
        let compressor = Compressor::default();

        // Key 2 = (5,5) dwarfs the others against query (1,1); with a low
        // threshold only it survives.
        let config = CompressionConfig {
            attention_threshold: 0.5,
            ..Default::default()
        };
        let result = compressor
            .compress(&keys, &values, &queries, &config)
            .unwrap();

        assert_eq!(result.retained_indices, vec![2]);
        assert_eq!(result.compressed_keys.row(0), &[5.0, 5.0]);
        assert_eq!(result.compressed_values.row(0), &[30.0, 30.0, 30.0]);
        assert_eq!(result.stats.compressed_token_count, 1);
        assert!((result.stats.compression_ratio - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_values_may_have_different_dim() {
        // d' != d is legal; only key/query dims must agree.
        let (keys, values, queries) = basic_inputs();
        assert_ne!(values.cols(), keys.cols());

        let compressor = Compressor::default();
        let result = compressor
            .compress(&keys, &values, &queries, &CompressionConfig::default())
            .unwrap();
        assert_eq!(result.compressed_values.cols(), 3);
    }

    #[test]
    fn test_single_token_retained() {
        let keys = matrix(vec![vec![0.1, 0.2]]);
        let values = matrix(vec![vec![1.0]]);
        let queries = matrix(vec![vec![1.0, 1.0]]);

        let result = Compressor::default()
            .compress(&keys, &values, &queries, &CompressionConfig::default())
            .unwrap();

        assert_eq!(result.retained_indices, vec![0]);
        assert_eq!(result.stats.compression_ratio, 0.0);
        assert!((result.stats.cumulative_attention_retained - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_stats_invariants() {
        let (keys, values, queries) = basic_inputs();
        let config = CompressionConfig {
            attention_threshold: 0.9,
            ..Default::default()
        };
        let result = Compressor::default()
            .compress(&keys, &values, &queries, &config)
            .unwrap();

        let s = &result.stats;
        assert!(s.compressed_token_count >= 1);
        assert!(s.compressed_token_count <= s.original_token_count);
        assert!(s.compression_ratio >= 0.0 && s.compression_ratio < 1.0);
        assert!(s.cumulative_attention_retained >= 0.9);
        assert!(s.processing_time_ms >= 0.0);
    }

    #[test]
    fn test_expired_deadline_returns_cancelled() {
        let (keys, values, queries) = basic_inputs();
        let err = Compressor::default()
            .compress_with_deadline(
                &keys,
                &values,
                &queries,
                &CompressionConfig::default(),
                Some(Instant::now()),
            )
            .unwrap_err();
        assert_eq!(err, CompressError::Cancelled);
    }
}
