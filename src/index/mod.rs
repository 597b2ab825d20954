
use tracing::debug;

use crate::chunking::Chunk;
use crate::{Result, StudyError};

/// One search result: position of the stored vector and its squared
/// Euclidean distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub index: usize,
    pub distance: f32,
}

/// Exact nearest-neighbor index over uniform-dimension vectors.
///
/// Storage is a flat buffer in insertion order; search is brute force over
/// every stored vector. The index is rebuilt wholesale on every analysis and
/// never updated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    #[inline]
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(StudyError::Index(
                "vector dimension must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append one vector. Position follows insertion order, so the caller's
    /// parallel chunk array stays index-aligned.
    #[inline]
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(StudyError::Index(format!(
                "vector dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Exact k-nearest-neighbor search under squared Euclidean distance.
    ///
    /// Returns up to `k` hits ordered nearest first; fewer when fewer vectors
    /// are stored. Ties keep insertion order.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(StudyError::Index(format!(
                "query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(index, stored)| SearchHit {
                index,
                distance: squared_l2(stored, query),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Immutable product of a successful index build: the chunk array and the
/// vector index over it, index-aligned (`chunks[i]` produced vector `i`).
///
/// Query-side code receives a snapshot explicitly; a re-analysis builds a new
/// snapshot and swaps it in whole, it never mutates an existing one.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    chunks: Vec<Chunk>,
    index: VectorIndex,
}

impl IndexSnapshot {
    #[inline]
    pub fn new(chunks: Vec<Chunk>, index: VectorIndex) -> Result<Self> {
        if chunks.len() != index.len() {
            return Err(StudyError::Index(format!(
                "chunk/vector misalignment: {} chunks, {} vectors",
                chunks.len(),
                index.len()
            )));
        }
        debug!(
            "Index snapshot created: {} chunks, dimension {}",
            chunks.len(),
            index.dimension()
        );
        Ok(Self { chunks, index })
    }

    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Retrieve the `k` chunks nearest to the query vector, nearest first.
    #[inline]
    pub fn nearest_chunks(&self, query: &[f32], k: usize) -> Result<Vec<(&Chunk, f32)>> {
        let hits = self.index.search(query, k)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| self.chunks.get(hit.index).map(|c| (c, hit.distance)))
            .collect())
    }
}
