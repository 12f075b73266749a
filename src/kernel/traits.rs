//! Kernel trait definition
//!
//! A kernel is bound to a left and a right feature collection by `init` and
//! then evaluates K(x, y) by vector index. Beyond plain pairwise evaluation a
//! kernel may advertise optional capabilities:
//!
//! - `LINADD`: given a support set (indices into the left features plus
//!   weights) it can precompute state so that
//!   `Σ_j w_j * K(sv_j, q)` is answered by `compute_optimized(q)`.
//! - `BATCH_EVAL`: it scores a whole slice of queries in one call.
//!
//! Default method bodies describe a kernel with neither capability.

use crate::core::{FeatureRef, KernelError, KernelProperties, OptimizationType, Result};
use crate::parallel::Parallel;

pub trait Kernel: Send + Sync {
    /// Human-readable kernel name used in diagnostics
    fn name(&self) -> &str;

    /// Capability flags
    fn properties(&self) -> KernelProperties;

    fn has_property(&self, property: KernelProperties) -> bool {
        self.properties().contains(property)
    }

    /// Bind the kernel to left and right feature collections
    fn init(&mut self, lhs: FeatureRef, rhs: FeatureRef) -> Result<()>;

    /// Raw pairwise evaluation K(lhs[x], rhs[y])
    ///
    /// # Panics
    /// May panic if the kernel is not initialised or an index is out of range.
    fn kernel(&self, x: usize, y: usize) -> f64;

    /// Drop the left-hand features
    fn remove_lhs(&mut self) {}

    /// Drop the right-hand features
    fn remove_rhs(&mut self) {}

    /// Release features and any optimization state
    fn cleanup(&mut self) {
        self.delete_optimization();
        self.remove_lhs();
        self.remove_rhs();
    }

    /// Precompute LINADD state for a support set
    fn init_optimization(&mut self, support_indices: &[usize], support_weights: &[f64]) -> Result<()> {
        let _ = (support_indices, support_weights);
        Err(self.unsupported("init_optimization"))
    }

    /// Tear down LINADD state
    fn delete_optimization(&mut self) {}

    /// Whether LINADD state is currently established
    fn is_optimization_initialized(&self) -> bool {
        false
    }

    /// Σ_j w_j * K(sv_j, idx) over the support set given to `init_optimization`
    fn compute_optimized(&self, idx: usize) -> Result<f64> {
        let _ = idx;
        Err(self.unsupported("compute_optimized"))
    }

    /// Add `factor * Σ_j w_j * K(sv_j, q)` to `result[i]` for each query `q = query_indices[i]`
    fn compute_batch(
        &mut self,
        query_indices: &[usize],
        result: &mut [f64],
        support_indices: &[usize],
        support_weights: &[f64],
        factor: f64,
    ) -> Result<()> {
        let _ = (query_indices, result, support_indices, support_weights, factor);
        Err(self.unsupported("compute_batch"))
    }

    /// Add `weight * lhs[idx]` to an explicit normal vector
    fn add_to_normal(&mut self, idx: usize, weight: f64) {
        let _ = (idx, weight);
    }

    /// Reset the explicit normal vector
    fn clear_normal(&mut self) {}

    /// Number of weights this kernel exposes for multiple-kernel learning
    fn num_subkernels(&self) -> usize {
        1
    }

    /// Internal subkernel weights, for kernels with more than one
    fn subkernel_weights(&self) -> Result<Vec<f64>> {
        Err(self.unsupported("subkernel_weights"))
    }

    /// Replace internal subkernel weights, for kernels with more than one
    fn set_subkernel_weights(&mut self, weights: &[f64]) -> Result<()> {
        let _ = weights;
        Err(self.unsupported("set_subkernel_weights"))
    }

    /// Add each internal subkernel's share of `compute_optimized(idx)` into `contributions`
    fn compute_by_subkernel(&self, idx: usize, contributions: &mut [f64]) -> Result<()> {
        let _ = (idx, contributions);
        Err(self.unsupported("compute_by_subkernel"))
    }

    fn set_optimization_type(&mut self, optimization_type: OptimizationType) {
        let _ = optimization_type;
    }

    /// Override the parallelism used for batch evaluation; `None` follows the process-wide setting
    fn set_parallel(&mut self, parallel: Option<Parallel>) {
        let _ = parallel;
    }

    #[doc(hidden)]
    fn unsupported(&self, operation: &str) -> KernelError {
        KernelError::Unsupported {
            kernel: self.name().to_string(),
            operation: operation.to_string(),
        }
    }
}
