//! Attention scoring: scaled dot-product, stabilized softmax, and
//! per-token importance aggregation.
//!
//! Scores follow the standard transformer convention
//! `s[j][i] = dot(Q_j, K_i) / sqrt(d)`; each query row is softmax-normalized
//! independently, then rows are aggregated into a single importance value
//! per token.

use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::compressor::CompressError;
use crate::engine::matrix::Matrix;

/// How per-query attention rows are collapsed into one importance value
/// per token.
///
/// `Mean` is the default: with multiple queries representing a conversation
/// history it is the most stable choice, since a single outlier query
/// cannot dominate the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Mean,
    Max,
    Sum,
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Stabilized softmax: subtract the row max before exponentiating so large
/// dot products cannot overflow.
fn softmax_in_place(row: &mut [f64]) {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    // All-(-inf) rows cannot occur: finite inputs always yield exp(0) = 1
    // at the max position, so sum >= 1.
    for v in row.iter_mut() {
        *v /= sum;
    }
}

/// One softmax-normalized attention row for a single query.
fn attention_row(query: &[f64], keys: &Matrix, scale: f64) -> Vec<f64> {
    let n = keys.rows();
    let mut row = Vec::with_capacity(n);
    for i in 0..n {
        row.push(dot(query, keys.row(i)) * scale);
    }
    softmax_in_place(&mut row);
    row
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), CompressError> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(CompressError::Cancelled),
        _ => Ok(()),
    }
}

/// Compute the aggregated importance of every token across all queries.
///
/// The score matrix is O(M×N×d); rows are independent, so when the total
/// work reaches `parallel_min_work` multiply-adds the rows are computed on
/// the rayon pool. Results are identical on both paths — rows are reduced
/// in index order either way.
///
/// The deadline is checked once per query row; on expiry the partial score
/// matrix is discarded and `Cancelled` is returned.
pub fn token_importance(
    queries: &Matrix,
    keys: &Matrix,
    aggregation: Aggregation,
    parallel_min_work: usize,
    deadline: Option<Instant>,
) -> Result<Vec<f64>, CompressError> {
    let m = queries.rows();
    let n = keys.rows();
    let d = keys.cols();
    let scale = 1.0 / (d as f64).sqrt();

    let work = m * n * d;
    let rows: Vec<Vec<f64>> = if work >= parallel_min_work {
        (0..m)
            .into_par_iter()
            .map(|j| {
                check_deadline(deadline)?;
                Ok(attention_row(queries.row(j), keys, scale))
            })
            .collect::<Result<_, CompressError>>()?
    } else {
        let mut rows = Vec::with_capacity(m);
        for j in 0..m {
            check_deadline(deadline)?;
            rows.push(attention_row(queries.row(j), keys, scale));
        }
        rows
    };

    let mut importance = match aggregation {
        Aggregation::Max => vec![f64::NEG_INFINITY; n],
        _ => vec![0.0; n],
    };

    for row in &rows {
        for (imp, &a) in importance.iter_mut().zip(row) {
            match aggregation {
                Aggregation::Mean | Aggregation::Sum => *imp += a,
                Aggregation::Max => *imp = imp.max(a),
            }
        }
    }

    if aggregation == Aggregation::Mean {
        for imp in importance.iter_mut() {
            *imp /= m as f64;
        }
    }

    Ok(importance)
}
