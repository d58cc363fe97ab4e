use crate::traits::VectorIndex;
use crate::{Neighbor, SearchError};
use async_trait::async_trait;
use std::cmp::Ordering;

/// Exact brute-force index. Vectors are kept in insertion order so that the
/// position of a vector is the index of the chunk it was computed from.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn build(vectors: Vec<Vec<f32>>) -> Result<Self, SearchError> {
        let dimension = vectors.first().map(Vec::len).ok_or(SearchError::EmptyInput)?;

        if let Some(mismatch) = vectors.iter().find(|vector| vector.len() != dimension) {
            return Err(SearchError::DimensionMismatch {
                expected: dimension,
                found: mismatch.len(),
            });
        }

        Ok(Self { dimension, vectors })
    }

    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, SearchError> {
        if query.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                found: query.len(),
            });
        }

        let mut scored: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(index, vector)| Neighbor {
                index,
                distance: squared_euclidean(vector, query),
            })
            .collect();

        scored.sort_by(compare_neighbors);
        scored.truncate(k);
        Ok(scored)
    }
}

pub(crate) fn compare_neighbors(left: &Neighbor, right: &Neighbor) -> Ordering {
    left.distance
        .total_cmp(&right.distance)
        .then(left.index.cmp(&right.index))
}

fn squared_euclidean(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right.iter())
        .map(|(a, b)| {
            let delta = a - b;
            delta * delta
        })
        .sum()
}

#[async_trait]
impl VectorIndex for FlatIndex {
    fn backend(&self) -> &'static str {
        "flat"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, SearchError> {
        self.nearest(query, k)
    }
}
