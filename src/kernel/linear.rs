//! Linear kernel implementation

use crate::core::{FeatureRef, KernelError, KernelProperties, Result, SparseVector};
use crate::features::SparseFeatures;
use crate::kernel::Kernel;
use crate::parallel::Parallel;
use rayon::prelude::*;

/// Linear kernel: K(x, y) = x^T * y
///
/// Because the kernel is linear in its first argument, a support set
/// collapses into one dense normal vector w = Σ_j α_j x_j, and scoring a
/// query becomes a single sparse-dense dot product. That makes this kernel
/// LINADD-capable; it also scores query batches natively.
#[derive(Default)]
pub struct LinearKernel {
    lhs: Option<FeatureRef>,
    rhs: Option<FeatureRef>,
    normal: Vec<f64>,
    optimized: bool,
    parallel: Option<Parallel>,
}

impl LinearKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a dedicated parallelism setting for batch evaluation
    pub fn with_parallel(mut self, parallel: Parallel) -> Self {
        self.parallel = Some(parallel);
        self
    }

    /// Current normal vector (empty until optimization or `add_to_normal`)
    pub fn normal(&self) -> &[f64] {
        &self.normal
    }

    fn lhs_features(&self) -> Option<&SparseFeatures> {
        self.lhs.as_deref().and_then(SparseFeatures::downcast)
    }

    fn rhs_features(&self) -> Option<&SparseFeatures> {
        self.rhs.as_deref().and_then(SparseFeatures::downcast)
    }

    fn lhs_vectors(&self) -> &[SparseVector] {
        self.lhs_features().map(SparseFeatures::vectors).unwrap_or_default()
    }

    fn rhs_vectors(&self) -> &[SparseVector] {
        self.rhs_features().map(SparseFeatures::vectors).unwrap_or_default()
    }

    /// Fold a support set into a fresh dense normal vector
    fn build_normal(&self, support_indices: &[usize], support_weights: &[f64]) -> Result<Vec<f64>> {
        if support_indices.len() != support_weights.len() {
            return Err(KernelError::InvalidArgument(format!(
                "{} support indices but {} support weights",
                support_indices.len(),
                support_weights.len()
            )));
        }
        let lhs = self.lhs_features().ok_or_else(|| {
            KernelError::NotInitialized("linear kernel has no left-hand features".to_string())
        })?;

        let mut normal = vec![0.0; lhs.dim()];
        for (&idx, &weight) in support_indices.iter().zip(support_weights) {
            lhs.vector(idx)?.add_scaled_to(&mut normal, weight);
        }
        Ok(normal)
    }

    fn score(&self, normal: &[f64], idx: usize) -> Result<f64> {
        let rhs = self.rhs_features().ok_or_else(|| {
            KernelError::NotInitialized("linear kernel has no right-hand features".to_string())
        })?;
        Ok(rhs.vector(idx)?.dot_dense(normal))
    }
}

impl Kernel for LinearKernel {
    fn name(&self) -> &str {
        "linear"
    }

    fn properties(&self) -> KernelProperties {
        KernelProperties::LINADD | KernelProperties::BATCH_EVAL
    }

    fn init(&mut self, lhs: FeatureRef, rhs: FeatureRef) -> Result<()> {
        for (side, features) in [("left", &lhs), ("right", &rhs)] {
            if SparseFeatures::downcast(&**features).is_none() {
                return Err(KernelError::KernelInit {
                    kernel: self.name().to_string(),
                    reason: format!(
                        "{side} features are '{}', expected sparse",
                        features.feature_type()
                    ),
                });
            }
        }

        self.delete_optimization();
        self.lhs = Some(lhs);
        self.rhs = Some(rhs);
        Ok(())
    }

    fn kernel(&self, x: usize, y: usize) -> f64 {
        self.lhs_vectors()[x].dot(&self.rhs_vectors()[y])
    }

    fn remove_lhs(&mut self) {
        self.delete_optimization();
        self.lhs = None;
    }

    fn remove_rhs(&mut self) {
        self.rhs = None;
    }

    fn init_optimization(&mut self, support_indices: &[usize], support_weights: &[f64]) -> Result<()> {
        self.delete_optimization();
        self.normal = self.build_normal(support_indices, support_weights)?;
        self.optimized = true;
        Ok(())
    }

    fn delete_optimization(&mut self) {
        self.normal.clear();
        self.optimized = false;
    }

    fn is_optimization_initialized(&self) -> bool {
        self.optimized
    }

    fn compute_optimized(&self, idx: usize) -> Result<f64> {
        if !self.optimized {
            return Err(KernelError::NotInitialized(
                "linear kernel optimization not initialized".to_string(),
            ));
        }
        self.score(&self.normal, idx)
    }

    fn compute_batch(
        &mut self,
        query_indices: &[usize],
        result: &mut [f64],
        support_indices: &[usize],
        support_weights: &[f64],
        factor: f64,
    ) -> Result<()> {
        if result.len() < query_indices.len() {
            return Err(KernelError::InvalidArgument(format!(
                "result buffer holds {} entries for {} queries",
                result.len(),
                query_indices.len()
            )));
        }

        let normal = self.build_normal(support_indices, support_weights)?;
        let result = &mut result[..query_indices.len()];
        let parallel = self.parallel.clone().unwrap_or_else(Parallel::global);

        match parallel.pool() {
            Some(pool) => pool.install(|| {
                result
                    .par_iter_mut()
                    .zip(query_indices.par_iter())
                    .try_for_each(|(out, &q)| -> Result<()> {
                        *out += factor * self.score(&normal, q)?;
                        Ok(())
                    })
            }),
            None => result
                .iter_mut()
                .zip(query_indices)
                .try_for_each(|(out, &q)| -> Result<()> {
                    *out += factor * self.score(&normal, q)?;
                    Ok(())
                }),
        }
    }

    fn set_parallel(&mut self, parallel: Option<Parallel>) {
        self.parallel = parallel;
    }

    fn add_to_normal(&mut self, idx: usize, weight: f64) {
        let mut normal = std::mem::take(&mut self.normal);
        if let Some(x) = self.lhs_vectors().get(idx) {
            x.add_scaled_to(&mut normal, weight);
        } else {
            log::warn!("linear kernel: add_to_normal index {idx} out of range, ignored");
        }
        self.normal = normal;
        self.optimized = true;
    }

    fn clear_normal(&mut self) {
        self.normal.iter_mut().for_each(|w| *w = 0.0);
        self.optimized = true;
    }
}
