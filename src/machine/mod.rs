//! Kernel machine: scoring queries against a trained support set
//!
//! The decision value of query q is f(q) = Σ_j α_j K(sv_j, q) + b. Training
//! is out of scope; the support set, its coefficients and the bias are
//! supplied by the caller.

use crate::core::{KernelError, KernelProperties, Prediction, Result};
use crate::kernel::Kernel;
use log::debug;

/// A kernel bound to a support set, ready to classify right-hand vectors
pub struct KernelMachine<K: Kernel> {
    kernel: K,
    support_indices: Vec<usize>,
    alphas: Vec<f64>,
    bias: f64,
}

impl<K: Kernel> KernelMachine<K> {
    /// Create a machine from an initialised kernel and its support set
    ///
    /// `support_indices` index the kernel's left-hand features; `alphas`
    /// are the signed coefficients (α_j * y_j) of those vectors.
    pub fn new(kernel: K, support_indices: Vec<usize>, alphas: Vec<f64>, bias: f64) -> Result<Self> {
        if support_indices.len() != alphas.len() {
            return Err(KernelError::InvalidArgument(format!(
                "{} support indices but {} coefficients",
                support_indices.len(),
                alphas.len()
            )));
        }

        Ok(Self {
            kernel,
            support_indices,
            alphas,
            bias,
        })
    }

    /// The kernel scoring this machine
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Mutable access to the kernel, e.g. to rebind features
    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    /// Left-hand indices of the support vectors
    pub fn support_vector_indices(&self) -> &[usize] {
        &self.support_indices
    }

    /// Signed support coefficients
    pub fn alpha_values(&self) -> &[f64] {
        &self.alphas
    }

    /// Decision threshold
    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Size of the support set
    pub fn n_support_vectors(&self) -> usize {
        self.support_indices.len()
    }

    /// Precompute the kernel's LINADD state for the support set
    pub fn init_kernel_optimization(&mut self) -> Result<()> {
        if !self.kernel.has_property(KernelProperties::LINADD) {
            return Err(self.kernel.unsupported("init_optimization"));
        }
        debug!(
            "initializing {} kernel optimization for {} support vectors",
            self.kernel.name(),
            self.support_indices.len()
        );
        self.kernel
            .init_optimization(&self.support_indices, &self.alphas)
    }

    /// Release the kernel's LINADD state
    pub fn delete_kernel_optimization(&mut self) {
        self.kernel.delete_optimization();
    }

    /// Decision value of one right-hand vector
    pub fn decision_function(&self, idx: usize) -> Result<f64> {
        let score = if self.kernel.is_optimization_initialized() {
            self.kernel.compute_optimized(idx)?
        } else {
            self.support_indices
                .iter()
                .zip(&self.alphas)
                .map(|(&sv, &alpha)| alpha * self.kernel.kernel(sv, idx))
                .sum()
        };
        Ok(score + self.bias)
    }

    /// Label and decision value of one right-hand vector
    pub fn classify_example(&self, idx: usize) -> Result<Prediction> {
        self.decision_function(idx).map(Prediction::from_decision_value)
    }

    /// Classify a set of right-hand vectors
    ///
    /// Kernels that score batches are handed the whole query set at once;
    /// others are evaluated one example at a time.
    pub fn classify(&mut self, query_indices: &[usize]) -> Result<Vec<Prediction>> {
        if query_indices.is_empty() {
            return Ok(Vec::new());
        }

        if self.kernel.has_property(KernelProperties::BATCH_EVAL) {
            let mut scores = vec![self.bias; query_indices.len()];
            if !self.support_indices.is_empty() {
                self.kernel.compute_batch(
                    query_indices,
                    &mut scores,
                    &self.support_indices,
                    &self.alphas,
                    1.0,
                )?;
            }
            return Ok(scores
                .into_iter()
                .map(Prediction::from_decision_value)
                .collect());
        }

        query_indices
            .iter()
            .map(|&idx| self.classify_example(idx))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FeatureRef;
    use crate::features::{CombinedFeatures, SparseFeatures};
    use crate::kernel::{CombinedKernel, GaussianKernel, LinearKernel};
    use crate::parallel::Parallel;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn features() -> FeatureRef {
        let numeric: FeatureRef = Arc::new(SparseFeatures::from_dense_rows(&[
            vec![2.0, 0.0],
            vec![1.5, 0.5],
            vec![-2.0, 0.0],
            vec![-1.0, -1.0],
        ]));
        let counts: FeatureRef = Arc::new(SparseFeatures::from_dense_rows(&[
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![0.0, 1.0],
            vec![0.0, 2.0],
        ]));
        CombinedFeatures::from_components(vec![numeric, counts])
            .unwrap()
            .into_shared()
    }

    fn machine() -> KernelMachine<CombinedKernel> {
        let f = features();
        let mut kernel = CombinedKernel::new().with_parallel(Parallel::new(2).unwrap());
        kernel.append_kernel(Box::new(LinearKernel::new()), 1.0).unwrap();
        kernel.append_kernel(Box::new(GaussianKernel::new(0.5)), 0.5).unwrap();
        kernel.init(f.clone(), f).unwrap();
        KernelMachine::new(kernel, vec![0, 2], vec![1.0, -1.0], 0.1).unwrap()
    }

    #[test]
    fn test_mismatched_coefficients_rejected() {
        let result = KernelMachine::new(LinearKernel::new(), vec![0, 1], vec![1.0], 0.0);
        assert!(matches!(result, Err(KernelError::InvalidArgument(_))));
    }

    #[test]
    fn test_classify_example_separates_classes() {
        let machine = machine();
        assert_eq!(machine.n_support_vectors(), 2);
        assert_eq!(machine.classify_example(1).unwrap().label, 1.0);
        assert_eq!(machine.classify_example(3).unwrap().label, -1.0);
    }

    #[test]
    fn test_optimized_and_plain_decision_values_agree() {
        let mut machine = machine();
        let plain: Vec<f64> = (0..4)
            .map(|q| machine.decision_function(q).unwrap())
            .collect();

        machine.init_kernel_optimization().unwrap();
        assert!(machine.kernel().is_optimization_initialized());
        for (q, expected) in plain.iter().enumerate() {
            assert_relative_eq!(
                machine.decision_function(q).unwrap(),
                *expected,
                max_relative = 1e-9
            );
        }

        machine.delete_kernel_optimization();
        assert!(!machine.kernel().is_optimization_initialized());
    }

    #[test]
    fn test_batch_classification_matches_per_example() {
        let mut machine = machine();
        let queries = [3, 0, 2, 1];
        let per_example: Vec<Prediction> = queries
            .iter()
            .map(|&q| machine.classify_example(q).unwrap())
            .collect();

        let batch = machine.classify(&queries).unwrap();
        assert_eq!(batch.len(), queries.len());
        for (b, p) in batch.iter().zip(&per_example) {
            assert_eq!(b.label, p.label);
            assert_relative_eq!(b.decision_value, p.decision_value, max_relative = 1e-9);
        }
        assert!(machine.classify(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_kernel_without_linadd_cannot_be_optimized() {
        let f: FeatureRef = Arc::new(SparseFeatures::from_dense_rows(&[vec![1.0], vec![-1.0]]));
        let mut kernel = GaussianKernel::new(1.0);
        kernel.init(f.clone(), f).unwrap();

        let mut machine = KernelMachine::new(kernel, vec![0], vec![1.0], 0.0).unwrap();
        assert!(matches!(
            machine.init_kernel_optimization(),
            Err(KernelError::Unsupported { .. })
        ));
        // Falls back to per-example evaluation
        let predictions = machine.classify(&[0, 1]).unwrap();
        assert_eq!(predictions[0].label, 1.0);
        assert_relative_eq!(predictions[0].decision_value, 1.0, epsilon = 1e-12);
    }
}
