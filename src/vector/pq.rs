//! Product quantization: splits each vector into equal-width subvectors and
//! trains a small k-means codebook per subvector, so a full vector can be
//! approximated by one byte per subvector (spec.md §4.4). Used once a
//! segment has at least [`super::MIN_PQ_ROWS`] rows; below that threshold
//! the segment stores raw vectors only.

use rand::prelude::*;

use super::VectorIndexError;

/// Codewords per subvector. One PQ code byte addresses 256 centroids.
pub const CENTROIDS_PER_SUBVECTOR: usize = 256;

/// A trained product quantizer for one column's vector dimension.
#[derive(Debug, Clone)]
pub struct ProductQuantizer {
    num_subvectors: usize,
    subvector_width: usize,
    /// `codebooks[s]` holds [`CENTROIDS_PER_SUBVECTOR`] centroids, each
    /// `subvector_width` floats, for subvector `s`.
    codebooks: Vec<Vec<Vec<f32>>>,
}

impl ProductQuantizer {
    /// Trains a quantizer over `vectors` (all must share one dimension,
    /// evenly divisible by `num_subvectors`), running `iterations` rounds
    /// of Lloyd's algorithm per subvector with centroids seeded by random
    /// sampling (k-means++-lite: random initial picks, no weighting).
    pub fn train(
        vectors: &[Vec<f32>],
        num_subvectors: usize,
        iterations: usize,
        rng: &mut impl RngCore,
    ) -> Result<Self, VectorIndexError> {
        let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
        if dim == 0 || num_subvectors == 0 || dim % num_subvectors != 0 {
            return Err(VectorIndexError::InvalidPqConfig {
                dim,
                num_subvectors,
            });
        }
        let subvector_width = dim / num_subvectors;
        let k = CENTROIDS_PER_SUBVECTOR.min(vectors.len()).max(1);

        let mut codebooks = Vec::with_capacity(num_subvectors);
        for s in 0..num_subvectors {
            let subvectors: Vec<&[f32]> = vectors
                .iter()
                .map(|v| &v[s * subvector_width..(s + 1) * subvector_width])
                .collect();
            codebooks.push(train_one_subvector(&subvectors, k, iterations, rng));
        }

        Ok(Self {
            num_subvectors,
            subvector_width,
            codebooks,
        })
    }

    /// Encodes `vector` into one PQ code byte per subvector.
    pub fn encode(&self, vector: &[f32]) -> Result<Vec<u8>, VectorIndexError> {
        if vector.len() != self.num_subvectors * self.subvector_width {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.num_subvectors * self.subvector_width,
                actual: vector.len(),
            });
        }
        let mut codes = Vec::with_capacity(self.num_subvectors);
        for s in 0..self.num_subvectors {
            let sub = &vector[s * self.subvector_width..(s + 1) * self.subvector_width];
            let nearest = nearest_centroid(sub, &self.codebooks[s]);
            codes.push(nearest as u8);
        }
        Ok(codes)
    }

    /// Approximate squared Euclidean distance between a raw query vector
    /// and an already-PQ-encoded vector, computed subvector-by-subvector
    /// against the trained codebooks (asymmetric distance computation).
    pub fn approx_distance(&self, query: &[f32], codes: &[u8]) -> f32 {
        let mut total = 0.0;
        for s in 0..self.num_subvectors {
            let sub = &query[s * self.subvector_width..(s + 1) * self.subvector_width];
            let centroid = &self.codebooks[s][codes[s] as usize];
            total += squared_distance(sub, centroid);
        }
        total
    }

    /// Number of subvectors this quantizer splits each vector into.
    pub fn num_subvectors(&self) -> usize {
        self.num_subvectors
    }

    /// Float width of each subvector.
    pub fn subvector_width(&self) -> usize {
        self.subvector_width
    }

    /// Borrows the trained codebooks: `codebooks()[s][c]` is centroid `c`
    /// of subvector `s`, a `subvector_width()`-long float vector.
    pub fn codebooks(&self) -> &[Vec<Vec<f32>>] {
        &self.codebooks
    }

    /// Rebuilds a quantizer from already-trained codebooks (used when
    /// reading a persisted segment back from disk).
    pub fn from_parts(num_subvectors: usize, subvector_width: usize, codebooks: Vec<Vec<Vec<f32>>>) -> Self {
        Self {
            num_subvectors,
            subvector_width,
            codebooks,
        }
    }
}

fn train_one_subvector(
    subvectors: &[&[f32]],
    k: usize,
    iterations: usize,
    rng: &mut impl RngCore,
) -> Vec<Vec<f32>> {
    let mut centroids: Vec<Vec<f32>> = (0..k)
        .map(|_| subvectors[rng.random_range(0..subvectors.len())].to_vec())
        .collect();

    for _ in 0..iterations {
        let mut sums = vec![vec![0.0f32; centroids[0].len()]; k];
        let mut counts = vec![0u32; k];

        for sub in subvectors {
            let nearest = nearest_centroid(sub, &centroids);
            counts[nearest] += 1;
            for (sum, &x) in sums[nearest].iter_mut().zip(*sub) {
                *sum += x;
            }
        }

        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            for (centroid_val, sum) in centroids[c].iter_mut().zip(&sums[c]) {
                *centroid_val = sum / counts[c] as f32;
            }
        }
    }

    centroids
}

fn nearest_centroid(sub: &[f32], centroids: &[Vec<f32>]) -> usize {
    centroids
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| squared_distance(sub, a).total_cmp(&squared_distance(sub, b)))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
