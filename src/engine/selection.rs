//! Token selection: ranks tokens by importance and keeps the smallest set
//! whose cumulative mass reaches the attention threshold.
//!
//! Retained indices are returned in original ascending order — the
//! compressed cache must preserve the positional semantics of the context
//! window, so selection never reorders tokens.

/// Outcome of the threshold walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Retained token indices, strictly ascending.
    pub indices: Vec<usize>,

    /// Fraction of total importance mass covered by the retained set,
    /// in [0, 1].
    pub cumulative_mass: f64,
}

/// Select the minimal token set covering `threshold` of the importance mass.
///
/// Ranking is by importance descending with a stable tie-break on the
/// original index ascending (earlier context wins ties), which makes the
/// output deterministic for duplicate scores. The walk is inclusive: the
/// token that crosses the threshold is retained.
///
/// Callers validate the threshold; this function assumes `0 < threshold <= 1`.
pub fn select_tokens(importance: &[f64], threshold: f64) -> Selection {
    let n = importance.len();
    let total: f64 = importance.iter().sum();

    // Degenerate mass (all zeros) carries no ranking information; keep
    // everything rather than invent an ordering.
    if total <= 0.0 || !total.is_finite() {
        return Selection {
            indices: (0..n).collect(),
            cumulative_mass: 1.0,
        };
    }

    let mut ranked: Vec<usize> = (0..n).collect();
    ranked.sort_by(|&a, &b| {
        importance[b]
            .partial_cmp(&importance[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let target = threshold * total;
    let mut retained = Vec::new();
    let mut cum = 0.0;
    for &idx in &ranked {
        cum += importance[idx];
        retained.push(idx);
        if cum >= target {
            break;
        }
    }

    retained.sort_unstable();

    Selection {
        indices: retained,
        cumulative_mass: (cum / total).min(1.0),
    }
}
