//! In-memory sparse feature collection

use crate::core::{FeatureCollection, KernelError, Result, SparseVector};
use std::any::Any;

/// Collection of sparse vectors sharing one feature space
#[derive(Debug, Clone)]
pub struct SparseFeatures {
    vectors: Vec<SparseVector>,
    dimensions: usize,
}

impl SparseFeatures {
    /// Wrap a set of sparse vectors; the dimension is the largest index seen plus one
    pub fn new(vectors: Vec<SparseVector>) -> Self {
        let dimensions = vectors.iter().map(SparseVector::dense_len).max().unwrap_or(0);
        Self {
            vectors,
            dimensions,
        }
    }

    /// Recover sparse features from a type-erased collection
    pub fn downcast<'a>(features: &'a (dyn FeatureCollection + 'static)) -> Option<&'a SparseFeatures> {
        features.as_any().downcast_ref::<SparseFeatures>()
    }

    /// Build from dense rows, dropping zero entries
    pub fn from_dense_rows(rows: &[Vec<f64>]) -> Self {
        Self::new(rows.iter().map(|r| SparseVector::from_dense(r)).collect())
    }

    pub fn get(&self, index: usize) -> Option<&SparseVector> {
        self.vectors.get(index)
    }

    /// Vector at `index`, or `InvalidArgument` if out of range
    pub fn vector(&self, index: usize) -> Result<&SparseVector> {
        self.vectors.get(index).ok_or_else(|| {
            KernelError::InvalidArgument(format!(
                "vector index {index} out of range for {} vectors",
                self.vectors.len()
            ))
        })
    }

    pub fn vectors(&self) -> &[SparseVector] {
        &self.vectors
    }

    pub fn dim(&self) -> usize {
        self.dimensions
    }

    /// Squared L2 norm of every vector, in order
    pub fn squared_norms(&self) -> Vec<f64> {
        self.vectors.iter().map(SparseVector::norm_squared).collect()
    }
}

impl FeatureCollection for SparseFeatures {
    fn num_vectors(&self) -> usize {
        self.vectors.len()
    }

    fn feature_type(&self) -> &'static str {
        "sparse"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
