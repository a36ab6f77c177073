//! Exhaustive inner-product index.
//!
//! Vectors are stored contiguously and every search scores all of them.
//! With normalized embeddings the inner product is the cosine similarity.
//! An index lives for a single query and is never persisted.

use anyhow::{bail, Result};

#[derive(Debug, Clone)]
pub struct FlatIpIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a vector. Its position is the current [`len`](Self::len).
    pub fn add(&mut self, vector: &[f32]) -> Result<usize> {
        if self.dim == 0 {
            bail!("index dimension must be > 0");
        }
        if vector.len() != self.dim {
            bail!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dim
            );
        }
        let position = self.len();
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    /// Return up to `min(k, len)` `(position, score)` pairs, best first.
    ///
    /// Equal scores keep insertion order. A query of the wrong width
    /// matches nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if query.len() != self.dim || k == 0 || self.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(pos, v)| (pos, dot(v, query)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k.min(self.len()));
        scored
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(vectors: &[[f32; 2]]) -> FlatIpIndex {
        let mut index = FlatIpIndex::new(2);
        for v in vectors {
            index.add(v).unwrap();
        }
        index
    }

    #[test]
    fn test_search_orders_by_inner_product() {
        let index = index_of(&[[1.0, 0.0], [0.0, 1.0], [0.6, 0.8]]);
        let hits = index.search(&[0.0, 1.0], 3);
        let positions: Vec<usize> = hits.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![1, 2, 0]);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert!((hits[1].1 - 0.8).abs() < 1e-6);
        assert!(hits[2].1.abs() < 1e-6);
    }

    #[test]
    fn test_k_larger_than_len_is_capped() {
        let index = index_of(&[[1.0, 0.0], [0.0, 1.0]]);
        assert_eq!(index.search(&[1.0, 0.0], 10).len(), 2);
        assert_eq!(index.search(&[1.0, 0.0], 1).len(), 1);
        assert!(index.search(&[1.0, 0.0], 0).is_empty());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let index = index_of(&[[0.5, 0.5], [1.0, 0.0], [0.5, 0.5], [0.5, 0.5]]);
        let hits = index.search(&[0.0, 1.0], 3);
        let positions: Vec<usize> = hits.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![0, 2, 3]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = FlatIpIndex::new(3);
        assert!(index.add(&[1.0, 2.0]).is_err());
        assert_eq!(index.add(&[1.0, 2.0, 3.0]).unwrap(), 0);
        assert_eq!(index.add(&[0.0, 0.0, 1.0]).unwrap(), 1);
        assert_eq!(index.len(), 2);
        assert!(index.search(&[1.0, 0.0], 5).is_empty());
    }

    #[test]
    fn test_empty_index() {
        let index = FlatIpIndex::new(4);
        assert!(index.is_empty());
        assert!(index.search(&[0.0; 4], 5).is_empty());
        assert!(FlatIpIndex::new(0).add(&[]).is_err());
    }
}
