//! LINADD optimization for the combined kernel
//!
//! Scoring a trained classifier needs f(q) = Σ_j α_j K(sv_j, q) for many
//! queries q. Members with the LINADD capability fold the support set into
//! their own state once and then answer `compute_optimized(q)` directly.
//! Members without it (or whose setup failed) are evaluated by summing over
//! a copy of the support set kept at the combined level.

use super::CombinedKernel;
use crate::core::{KernelError, KernelProperties, Result};
use crate::kernel::Kernel;
use log::{debug, warn};

/// Optimization state of a combined kernel
///
/// The fallback support set is only populated when at least one member is
/// evaluated the slow way; it is empty whenever the state is not initialised.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OptimizationState {
    initialized: bool,
    fallback_indices: Vec<usize>,
    fallback_weights: Vec<f64>,
}

impl OptimizationState {
    /// Whether LINADD state is established
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Support indices kept for members summed explicitly
    pub fn fallback_indices(&self) -> &[usize] {
        &self.fallback_indices
    }

    /// Weights matching `fallback_indices`
    pub fn fallback_weights(&self) -> &[f64] {
        &self.fallback_weights
    }

    fn reset(&mut self) {
        self.initialized = false;
        self.fallback_indices.clear();
        self.fallback_weights.clear();
    }

    /// Σ_j w_j * K(sv_j, idx) over the fallback support set
    fn fallback_sum(&self, kernel: &dyn Kernel, idx: usize) -> f64 {
        self.fallback_indices
            .iter()
            .zip(&self.fallback_weights)
            .map(|(&sv, &w)| w * kernel.kernel(sv, idx))
            .sum()
    }
}

/// Whether a member answers through its own LINADD state
fn uses_own_optimization(kernel: &dyn Kernel) -> bool {
    kernel.has_property(KernelProperties::LINADD) && kernel.is_optimization_initialized()
}

impl CombinedKernel {
    /// Set up LINADD evaluation for a support set
    ///
    /// Prior state is always torn down first. A member that lacks the
    /// capability, or whose own setup fails, is demoted to explicit
    /// summation over a combined-level copy of the support set; this is
    /// reported as a warning and never fails the call.
    pub fn init_optimization(&mut self, support_indices: &[usize], support_weights: &[f64]) -> Result<()> {
        if support_indices.len() != support_weights.len() {
            return Err(KernelError::InvalidArgument(format!(
                "{} support indices but {} support weights",
                support_indices.len(),
                support_weights.len()
            )));
        }

        debug!(
            "initializing combined kernel optimization for {} support vectors",
            support_indices.len()
        );
        self.delete_optimization();

        let mut have_non_optimizable = false;
        for (position, entry) in self.registry.iter_mut().enumerate() {
            let kernel = entry.kernel_mut();
            if !kernel.has_property(KernelProperties::LINADD) {
                warn!(
                    "non-optimizable kernel '{}' at position {position} in kernel list",
                    kernel.name()
                );
                have_non_optimizable = true;
                continue;
            }
            if let Err(err) = kernel.init_optimization(support_indices, support_weights) {
                warn!(
                    "init_optimization of kernel '{}' at position {position} failed: {err}",
                    kernel.name()
                );
                kernel.delete_optimization();
                have_non_optimizable = true;
            }
        }

        if have_non_optimizable {
            warn!("some kernels in the kernel list are not optimized");
            self.optimization.fallback_indices = support_indices.to_vec();
            self.optimization.fallback_weights = support_weights.to_vec();
        }
        self.optimization.initialized = true;
        Ok(())
    }

    /// Tear down member and combined-level optimization state
    pub fn delete_optimization(&mut self) {
        for entry in self.registry.iter_mut() {
            let kernel = entry.kernel_mut();
            if kernel.has_property(KernelProperties::LINADD) {
                kernel.delete_optimization();
            }
        }
        self.optimization.reset();
    }

    /// Whether `init_optimization` succeeded and has not been torn down
    pub fn is_optimization_initialized(&self) -> bool {
        self.optimization.is_initialized()
    }

    /// Combined-level optimization state
    pub fn optimization_state(&self) -> &OptimizationState {
        &self.optimization
    }

    /// Σ_i β_i Σ_j α_j K_i(sv_j, idx) for the support set given to `init_optimization`
    pub fn compute_optimized(&self, idx: usize) -> Result<f64> {
        if !self.optimization.is_initialized() {
            return Err(KernelError::NotInitialized(
                "combined kernel optimization not initialized".to_string(),
            ));
        }

        let mut result = 0.0;
        for entry in self.registry.iter().filter(|e| e.weight() != 0.0) {
            result += entry.weight() * self.member_optimized(entry.kernel(), idx)?;
        }
        Ok(result)
    }

    /// Unweighted optimized score of one member, by LINADD or by fallback summation
    pub(super) fn member_optimized(&self, kernel: &dyn Kernel, idx: usize) -> Result<f64> {
        if uses_own_optimization(kernel) {
            kernel.compute_optimized(idx)
        } else {
            Ok(self.optimization.fallback_sum(kernel, idx))
        }
    }

    /// Fan `add_to_normal` out to every member
    pub fn add_to_normal(&mut self, idx: usize, weight: f64) {
        for entry in self.registry.iter_mut() {
            entry.kernel_mut().add_to_normal(idx, weight);
        }
        self.optimization.initialized = true;
    }

    /// Fan `clear_normal` out to every member
    pub fn clear_normal(&mut self) {
        for entry in self.registry.iter_mut() {
            entry.kernel_mut().clear_normal();
        }
        self.optimization.initialized = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FeatureRef;
    use crate::features::{CombinedFeatures, SparseFeatures};
    use crate::kernel::{GaussianKernel, LinearKernel};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn features() -> FeatureRef {
        let a: FeatureRef = Arc::new(SparseFeatures::from_dense_rows(&[
            vec![1.0, 0.0],
            vec![0.5, 2.0],
            vec![-1.0, 1.0],
            vec![2.0, 2.0],
        ]));
        let b: FeatureRef = Arc::new(SparseFeatures::from_dense_rows(&[
            vec![0.0, 1.0, 0.0],
            vec![1.0, 1.0, 0.0],
            vec![0.0, 0.0, 3.0],
            vec![1.0, 0.0, 1.0],
        ]));
        CombinedFeatures::from_components(vec![a, b])
            .unwrap()
            .into_shared()
    }

    fn mixed_kernel() -> CombinedKernel {
        let f = features();
        let mut kernel = CombinedKernel::new();
        kernel.append_kernel(Box::new(LinearKernel::new()), 1.5).unwrap();
        kernel.append_kernel(Box::new(GaussianKernel::new(0.3)), 0.7).unwrap();
        kernel.init(f.clone(), f).unwrap();
        kernel
    }

    fn brute_force(kernel: &CombinedKernel, sv: &[usize], alphas: &[f64], q: usize) -> f64 {
        sv.iter()
            .zip(alphas)
            .map(|(&j, &a)| a * kernel.compute(j, q))
            .sum()
    }

    #[test]
    fn test_compute_optimized_requires_init() {
        let kernel = mixed_kernel();
        assert!(matches!(
            kernel.compute_optimized(0),
            Err(KernelError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_mixed_members_match_brute_force() {
        let mut kernel = mixed_kernel();
        let sv = [0, 1, 3];
        let alphas = [0.25, -1.0, 0.5];

        kernel.init_optimization(&sv, &alphas).unwrap();

        // Only the gaussian member needs the fallback copy
        assert_eq!(kernel.optimization_state().fallback_indices(), &sv);
        assert_eq!(kernel.optimization_state().fallback_weights(), &alphas);
        assert!(kernel.kernel_at(0).unwrap().is_optimization_initialized());

        for q in 0..4 {
            assert_relative_eq!(
                kernel.compute_optimized(q).unwrap(),
                brute_force(&kernel, &sv, &alphas, q),
                max_relative = 1e-9
            );
        }
    }

    #[test]
    fn test_fully_optimizable_keeps_no_fallback() {
        let f = features();
        let mut kernel = CombinedKernel::new();
        kernel.append_kernel(Box::new(LinearKernel::new()), 1.0).unwrap();
        kernel.append_kernel(Box::new(LinearKernel::new()), 2.0).unwrap();
        kernel.init(f.clone(), f).unwrap();

        kernel.init_optimization(&[1, 2], &[1.0, 1.0]).unwrap();
        assert!(kernel.is_optimization_initialized());
        assert!(kernel.optimization_state().fallback_indices().is_empty());
        assert_relative_eq!(
            kernel.compute_optimized(3).unwrap(),
            brute_force(&kernel, &[1, 2], &[1.0, 1.0], 3),
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_failed_member_setup_degrades_to_fallback() {
        let mut kernel = mixed_kernel();
        // Index 9 is out of range for the linear member, so its setup fails
        kernel.init_optimization(&[9], &[1.0]).unwrap();

        assert!(kernel.is_optimization_initialized());
        assert!(!kernel.kernel_at(0).unwrap().is_optimization_initialized());
        assert_eq!(kernel.optimization_state().fallback_indices(), &[9]);
    }

    #[test]
    fn test_reinit_replaces_state() {
        let mut kernel = mixed_kernel();
        kernel.init_optimization(&[0, 1], &[1.0, 1.0]).unwrap();
        kernel.init_optimization(&[2], &[3.0]).unwrap();

        assert_eq!(kernel.optimization_state().fallback_indices(), &[2]);
        assert_relative_eq!(
            kernel.compute_optimized(0).unwrap(),
            brute_force(&kernel, &[2], &[3.0], 0),
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_delete_optimization_resets_state() {
        let mut kernel = mixed_kernel();
        kernel.init_optimization(&[0], &[1.0]).unwrap();
        kernel.delete_optimization();

        assert_eq!(kernel.optimization_state(), &OptimizationState::default());
        assert!(!kernel.kernel_at(0).unwrap().is_optimization_initialized());
        assert!(kernel.compute_optimized(0).is_err());
    }

    #[test]
    fn test_mismatched_support_arrays_rejected() {
        let mut kernel = mixed_kernel();
        assert!(matches!(
            kernel.init_optimization(&[0, 1], &[1.0]),
            Err(KernelError::InvalidArgument(_))
        ));
        assert!(!kernel.is_optimization_initialized());
    }

    #[test]
    fn test_normal_fan_out_marks_initialized() {
        let mut kernel = mixed_kernel();
        kernel.add_to_normal(1, 2.0);
        assert!(kernel.is_optimization_initialized());

        // Linear member holds 2 * x_1; the gaussian member has no fallback set
        let linear = kernel.kernel_at(0).unwrap();
        assert_relative_eq!(
            kernel.compute_optimized(2).unwrap(),
            1.5 * 2.0 * linear.kernel(1, 2),
            epsilon = 1e-12
        );

        kernel.clear_normal();
        assert!(kernel.is_optimization_initialized());
        assert_eq!(kernel.compute_optimized(2).unwrap(), 0.0);
    }
}
