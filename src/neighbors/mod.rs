//! K-nearest-neighbor search
//!
//! Brute-force search over the rows of a feature matrix with a sorted
//! size-K buffer. Used by SMOTE over-sampling and available to callers.

use ndarray::ArrayView2;
use tracing::warn;

use crate::error::{Result, SampleError};

/// The K nearest rows, closest first
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    /// Row indices into the searched matrix
    pub indices: Vec<usize>,
    /// Squared Euclidean distances, non-decreasing
    pub distances: Vec<f32>,
}

impl Neighbors {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// (index, distance) pairs, closest first
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.indices.iter().copied().zip(self.distances.iter().copied())
    }
}

/// Find the `k` rows of `matrix` closest to `query`.
///
/// Rows at equal distance keep scan order: a later row never displaces an
/// earlier one with the same distance. Rows whose distance is not finite
/// (NaN or infinite features) are never returned.
pub fn find_nn(query: &[f32], matrix: ArrayView2<'_, f32>, k: usize) -> Result<Neighbors> {
    let (rows, cols) = matrix.dim();
    if query.len() != cols {
        warn!("query has {} features, matrix has {}", query.len(), cols);
        return Err(SampleError::IncompatibleStream(format!(
            "query has {} features, matrix has {}",
            query.len(),
            cols
        )));
    }
    if rows < k {
        warn!("requested {} neighbors from {} candidates", k, rows);
        return Err(SampleError::InsufficientNeighbors {
            requested: k,
            available: rows,
        });
    }

    let mut indices: Vec<usize> = Vec::with_capacity(k);
    let mut distances: Vec<f32> = Vec::with_capacity(k);
    if k == 0 {
        return Ok(Neighbors { indices, distances });
    }

    let mut skipped = 0usize;
    for (row, candidate) in matrix.outer_iter().enumerate() {
        let d = squared_distance(query, candidate.iter().copied());
        if !d.is_finite() {
            skipped += 1;
            continue;
        }
        if distances.len() == k {
            if d >= distances[k - 1] {
                continue;
            }
            distances.pop();
            indices.pop();
        }
        let at = distances.partition_point(|x| *x <= d);
        distances.insert(at, d);
        indices.insert(at, row);
    }

    if distances.len() < k {
        warn!(
            "requested {} neighbors, {} of {} candidates have finite distance",
            k,
            rows - skipped,
            rows
        );
        return Err(SampleError::InsufficientNeighbors {
            requested: k,
            available: rows - skipped,
        });
    }

    Ok(Neighbors { indices, distances })
}

/// Squared Euclidean distance
pub fn squared_distance(a: &[f32], b: impl IntoIterator<Item = f32>) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
