//! Core type definitions shared by kernels, features and machines

use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::Path;

/// Score for a single query: sign label plus raw decision value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Predicted class label (+1 or -1)
    pub label: f64,
    /// Raw decision function value
    pub decision_value: f64,
}

impl Prediction {
    /// Build a prediction from a decision value, thresholding at zero
    pub fn from_decision_value(decision_value: f64) -> Self {
        let label = if decision_value >= 0.0 { 1.0 } else { -1.0 };
        Self {
            label,
            decision_value,
        }
    }

    pub fn confidence(&self) -> f64 {
        self.decision_value.abs()
    }
}

/// Sparse vector representation with sorted indices
#[derive(Clone, Debug, PartialEq)]
pub struct SparseVector {
    /// Sorted indices of non-zero elements
    pub indices: Vec<usize>,
    /// Values corresponding to indices
    pub values: Vec<f64>,
}

impl SparseVector {
    /// Create a new sparse vector, sorting entries by index
    pub fn new(indices: Vec<usize>, values: Vec<f64>) -> Self {
        assert_eq!(
            indices.len(),
            values.len(),
            "Indices and values must have same length"
        );

        let mut pairs: Vec<_> = indices.into_iter().zip(values).collect();
        pairs.sort_by_key(|&(idx, _)| idx);

        let (indices, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self { indices, values }
    }

    /// Build from a dense slice, dropping exact zeros
    pub fn from_dense(dense: &[f64]) -> Self {
        let (indices, values) = dense
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0.0)
            .map(|(i, &v)| (i, v))
            .unzip();
        Self { indices, values }
    }

    pub fn empty() -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Get the value at a specific index (0 if not present)
    pub fn get(&self, index: usize) -> f64 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    pub fn norm_squared(&self) -> f64 {
        self.values.iter().map(|&v| v * v).sum()
    }

    /// Dimension needed to hold this vector densely
    pub fn dense_len(&self) -> usize {
        self.indices.last().map_or(0, |&i| i + 1)
    }

    /// Sparse-sparse dot product, merging the sorted index lists
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let mut result = 0.0;
        let mut i = 0;
        let mut j = 0;

        while i < self.indices.len() && j < other.indices.len() {
            let a = self.indices[i];
            let b = other.indices[j];

            if a == b {
                result += self.values[i] * other.values[j];
                i += 1;
                j += 1;
            } else if a < b {
                i += 1;
            } else {
                j += 1;
            }
        }

        result
    }

    /// Dot product against a dense vector; indices beyond `dense` count as zero
    pub fn dot_dense(&self, dense: &[f64]) -> f64 {
        self.indices
            .iter()
            .zip(&self.values)
            .filter_map(|(&i, &v)| dense.get(i).map(|&d| d * v))
            .sum()
    }

    /// Add `scale * self` into a dense vector, growing it as needed
    pub fn add_scaled_to(&self, dense: &mut Vec<f64>, scale: f64) {
        let needed = self.dense_len();
        if dense.len() < needed {
            dense.resize(needed, 0.0);
        }
        for (&i, &v) in self.indices.iter().zip(&self.values) {
            dense[i] += scale * v;
        }
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Capability flags advertised by a kernel
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KernelProperties(u32);

impl KernelProperties {
    pub const NONE: Self = Self(0);
    /// Supports linear-add optimized evaluation against a fixed support set
    pub const LINADD: Self = Self(1);
    /// Is itself a weighted combination of kernels
    pub const KERNCOMBINATION: Self = Self(1 << 1);
    /// Evaluates whole query batches natively
    pub const BATCH_EVAL: Self = Self(1 << 2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for KernelProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for KernelProperties {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for KernelProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::LINADD) {
            names.push("LINADD");
        }
        if self.contains(Self::KERNCOMBINATION) {
            names.push("KERNCOMBINATION");
        }
        if self.contains(Self::BATCH_EVAL) {
            names.push("BATCH_EVAL");
        }
        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join(" | "))
        }
    }
}

/// Trade-off hint for how kernels build their optimization state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationType {
    #[default]
    FastButMemHungry,
    SlowButMemEfficient,
}

/// How subkernel weights of a combined kernel are exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubkernelWeightLayout {
    /// One weight per registered kernel
    #[default]
    Flat,
    /// Concatenation of every member's own subkernel weights
    Appended,
}

/// Configuration for a combined kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Number of cached kernel values; 0 disables the cache
    pub cache_size: usize,
    /// Expose members' own subkernel weights instead of one weight per member
    pub append_subkernel_weights: bool,
    pub optimization_type: OptimizationType,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            cache_size: 0,
            append_subkernel_weights: false,
            optimization_type: OptimizationType::default(),
        }
    }
}

impl KernelConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn layout(&self) -> SubkernelWeightLayout {
        if self.append_subkernel_weights {
            SubkernelWeightLayout::Appended
        } else {
            SubkernelWeightLayout::Flat
        }
    }
}
