//! Vector similarity scoring (spec.md §4.4).
//!
//! Cosine rejects zero/near-zero and non-finite vectors outright — there is
//! no sane angle for a zero vector, and a non-finite component poisons every
//! downstream comparison. Dot-product and euclidean accept anything finite.

use crate::config::SimilarityFunction;

use super::VectorIndexError;

/// Vectors with squared norm below this are treated as zero for cosine's
/// zero/near-zero rejection.
const ZERO_NORM_EPSILON: f32 = 1e-12;

fn is_finite_vector(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Scores `a` against `b` under `sim`. Higher is always "more similar" —
/// euclidean returns *negative* squared distance so every similarity
/// function shares max-is-best semantics for top-k ranking.
pub fn score(a: &[f32], b: &[f32], sim: SimilarityFunction) -> Result<f32, VectorIndexError> {
    if a.len() != b.len() {
        return Err(VectorIndexError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    match sim {
        SimilarityFunction::Cosine => {
            if !is_finite_vector(a) || !is_finite_vector(b) {
                return Err(VectorIndexError::NonFiniteVector);
            }
            let norm_a = dot(a, a);
            let norm_b = dot(b, b);
            if norm_a < ZERO_NORM_EPSILON || norm_b < ZERO_NORM_EPSILON {
                return Err(VectorIndexError::ZeroNormVector);
            }
            Ok(dot(a, b) / (norm_a.sqrt() * norm_b.sqrt()))
        }
        SimilarityFunction::DotProduct => {
            if !is_finite_vector(a) || !is_finite_vector(b) {
                return Err(VectorIndexError::NonFiniteVector);
            }
            Ok(dot(a, b))
        }
        SimilarityFunction::Euclidean => {
            if !is_finite_vector(a) || !is_finite_vector(b) {
                return Err(VectorIndexError::NonFiniteVector);
            }
            let d: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
            Ok(-d)
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Whether `v` has norm within `tolerance` of 1.0 — the per-vector check
/// behind unit-vector-mode detection (spec.md §4.4).
pub fn is_unit_norm(v: &[f32], tolerance: f32) -> bool {
    let norm = dot(v, v).sqrt();
    (norm - 1.0).abs() <= tolerance
}
