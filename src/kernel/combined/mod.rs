//! Weighted linear combination of kernels
//!
//! `CombinedKernel` evaluates K(x, y) = Σ_i β_i K_i(x_i, y_i), where each
//! sub-kernel K_i works on its own component of a `CombinedFeatures` object
//! (one component per modality) and β_i is its weight in the registry.
//!
//! The implementation is split by concern:
//! - `registry`: ownership and ordering of the weighted sub-kernels
//! - `optimization`: the LINADD state machine with a fallback support set
//!   for members that cannot be optimized
//! - `batch`: threaded evaluation over query batches
//! - `weights`: flat and appended subkernel weight layouts

mod batch;
mod optimization;
mod registry;
mod weights;

pub use self::batch::partition;
pub use self::optimization::OptimizationState;
pub use self::registry::{KernelRegistry, SubKernelEntry};

use crate::cache::{CacheStats, KernelCache};
use crate::core::{
    same_features, FeatureRef, KernelConfig, KernelError, KernelProperties, OptimizationType,
    Result, SubkernelWeightLayout,
};
use crate::kernel::Kernel;
use crate::parallel::Parallel;
use log::{debug, info, warn};
use parking_lot::Mutex;

pub struct CombinedKernel {
    registry: KernelRegistry,
    layout: SubkernelWeightLayout,
    optimization: OptimizationState,
    optimization_type: OptimizationType,
    lhs: Option<FeatureRef>,
    rhs: Option<FeatureRef>,
    cache: Option<Mutex<KernelCache>>,
    parallel: Option<Parallel>,
}

impl CombinedKernel {
    /// Empty combination with flat weights and no cache
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    /// Build from a loaded configuration
    pub fn with_config(config: KernelConfig) -> Self {
        let layout = config.layout();
        info!("combined kernel created");
        if layout == SubkernelWeightLayout::Appended {
            info!("(subkernel weights are appended)");
        }

        Self {
            registry: KernelRegistry::new(),
            layout,
            optimization: OptimizationState::default(),
            optimization_type: config.optimization_type,
            lhs: None,
            rhs: None,
            cache: (config.cache_size > 0).then(|| Mutex::new(KernelCache::new(config.cache_size))),
            parallel: None,
        }
    }

    /// Use a dedicated parallelism setting instead of the process-wide one
    pub fn with_parallel(mut self, parallel: Parallel) -> Self {
        self.set_parallel(Some(parallel));
        self
    }

    /// Set or clear the dedicated parallelism setting for this kernel and every member
    pub fn set_parallel(&mut self, parallel: Option<Parallel>) {
        for entry in self.registry.iter_mut() {
            entry.kernel_mut().set_parallel(parallel.clone());
        }
        self.parallel = parallel;
    }

    /// Parallelism used by batch evaluation
    pub fn parallel(&self) -> Parallel {
        self.parallel.clone().unwrap_or_else(Parallel::global)
    }

    /// Append a kernel; it inherits this kernel's dedicated parallelism, if any
    pub fn append_kernel(&mut self, mut kernel: Box<dyn Kernel>, weight: f64) -> Result<()> {
        self.share_parallel(kernel.as_mut());
        self.registry.append(kernel, weight)?;
        self.invalidate();
        Ok(())
    }

    /// Insert a kernel before position `index`
    pub fn insert_kernel(&mut self, index: usize, mut kernel: Box<dyn Kernel>, weight: f64) -> Result<()> {
        self.share_parallel(kernel.as_mut());
        self.registry.insert(index, kernel, weight)?;
        self.invalidate();
        Ok(())
    }

    /// Remove and return the most recently appended kernel
    pub fn remove_last(&mut self) -> Result<Box<dyn Kernel>> {
        let kernel = self.registry.remove_last()?;
        self.invalidate();
        Ok(kernel)
    }

    /// Remove the kernel at `index` and hand it back
    pub fn delete_kernel(&mut self, index: usize) -> Result<Box<dyn Kernel>> {
        let kernel = self.registry.remove(index)?;
        self.invalidate();
        Ok(kernel)
    }

    /// Number of registered sub-kernels
    pub fn num_kernels(&self) -> usize {
        self.registry.count()
    }

    /// Registered kernels with their weights, in order
    pub fn kernels(&self) -> std::slice::Iter<'_, SubKernelEntry> {
        self.registry.iter()
    }

    /// Sub-kernel at `index`
    pub fn kernel_at(&self, index: usize) -> Option<&dyn Kernel> {
        self.registry.get(index).map(SubKernelEntry::kernel)
    }

    /// Combination weight of the kernel at `index`
    pub fn kernel_weight(&self, index: usize) -> Option<f64> {
        self.registry.get(index).map(SubKernelEntry::weight)
    }

    /// Replace one combination weight; clears the kernel cache
    pub fn set_kernel_weight(&mut self, index: usize, weight: f64) -> Result<()> {
        if !weight.is_finite() {
            return Err(KernelError::InvalidArgument(format!(
                "kernel weight must be finite, got {weight}"
            )));
        }
        let entry = self
            .registry
            .get_mut(index)
            .ok_or_else(|| KernelError::NotFound(format!("no kernel at position {index}")))?;
        entry.set_weight(weight);
        self.reset_cache();
        Ok(())
    }

    /// How subkernel weights are laid out
    pub fn layout(&self) -> SubkernelWeightLayout {
        self.layout
    }

    /// Bind every sub-kernel to its feature component
    ///
    /// Both sides must be composite with exactly one component per
    /// registered kernel. When `lhs` and `rhs` are the same object each
    /// kernel is initialised with one component on both sides.
    pub fn init(&mut self, lhs: FeatureRef, rhs: FeatureRef) -> Result<()> {
        if !lhs.is_composite() || !rhs.is_composite() {
            return Err(KernelError::IncompatibleFeatures(format!(
                "combined kernel needs composite features on both sides, got '{}' and '{}'",
                lhs.feature_type(),
                rhs.feature_type()
            )));
        }

        let symmetric = same_features(&lhs, &rhs);
        let left = lhs.components();
        let right = if symmetric { left } else { rhs.components() };

        if left.len() != right.len() {
            return Err(KernelError::IncompatibleFeatures(format!(
                "left features have {} components, right features have {}",
                left.len(),
                right.len()
            )));
        }
        if left.len() != self.registry.count() {
            return Err(KernelError::KernelInit {
                kernel: self.name().to_string(),
                reason: format!(
                    "number of features/kernels does not match: {} feature components for {} kernels",
                    left.len(),
                    self.registry.count()
                ),
            });
        }

        self.delete_optimization();
        self.reset_cache();

        let mut failure = None;
        for (position, (entry, (l, r))) in self
            .registry
            .iter_mut()
            .zip(left.iter().zip(right))
            .enumerate()
        {
            let kernel = entry.kernel_mut();
            if let Err(err) = kernel.init(l.clone(), r.clone()) {
                warn!(
                    "CombinedKernel: initialising kernel '{}' at position {position} failed",
                    kernel.name()
                );
                failure = Some((
                    position,
                    KernelError::KernelInit {
                        kernel: format!("{} (position {position})", kernel.name()),
                        reason: err.to_string(),
                    },
                ));
                break;
            }
        }
        if let Some((position, err)) = failure {
            self.rebind_previous(position);
            return Err(err);
        }

        debug!(
            "combined kernel initialised with {} components ({})",
            left.len(),
            if symmetric { "symmetric" } else { "asymmetric" }
        );
        self.lhs = Some(lhs);
        self.rhs = Some(rhs);
        Ok(())
    }

    /// Undo a failed `init` for members `0..=failed`
    ///
    /// Members go back to their component of the previously bound features;
    /// a member that has none, or refuses it, is left unbound.
    fn rebind_previous(&mut self, failed: usize) {
        let previous = match (&self.lhs, &self.rhs) {
            (Some(l), Some(r)) => Some((l.clone(), r.clone())),
            _ => None,
        };

        for (position, entry) in self.registry.iter_mut().enumerate().take(failed + 1) {
            let kernel = entry.kernel_mut();
            let restored = previous.as_ref().and_then(|(l, r)| {
                let left = l.components().get(position)?;
                let right = if same_features(l, r) {
                    left
                } else {
                    r.components().get(position)?
                };
                Some(kernel.init(left.clone(), right.clone()))
            });

            if !matches!(restored, Some(Ok(()))) {
                kernel.remove_lhs();
                kernel.remove_rhs();
            }
        }
        debug!("rolled back {} kernels after failed init", failed + 1);
    }

    /// K(x, y) = Σ β_i K_i(x, y), skipping zero-weighted kernels entirely
    pub fn compute(&self, x: usize, y: usize) -> f64 {
        self.registry
            .iter()
            .filter(|entry| entry.weight() != 0.0)
            .map(|entry| entry.weight() * entry.kernel().kernel(x, y))
            .sum()
    }

    /// Left-hand features from the last successful `init`
    pub fn lhs(&self) -> Option<&FeatureRef> {
        self.lhs.as_ref()
    }

    /// Right-hand features from the last successful `init`
    pub fn rhs(&self) -> Option<&FeatureRef> {
        self.rhs.as_ref()
    }

    /// Unbind the left side here and in every member
    pub fn remove_lhs(&mut self) {
        self.delete_optimization();
        self.reset_cache();
        self.lhs = None;
        for entry in self.registry.iter_mut() {
            entry.kernel_mut().remove_lhs();
        }
    }

    /// Unbind the right side here and in every member
    pub fn remove_rhs(&mut self) {
        self.reset_cache();
        self.rhs = None;
        for entry in self.registry.iter_mut() {
            entry.kernel_mut().remove_rhs();
        }
    }

    /// Release member resources and optimization state
    pub fn cleanup(&mut self) {
        for entry in self.registry.iter_mut() {
            entry.kernel_mut().cleanup();
        }
        self.delete_optimization();
    }

    /// Current optimization preference
    pub fn optimization_type(&self) -> OptimizationType {
        self.optimization_type
    }

    /// Set the preference here and on every member
    pub fn set_optimization_type(&mut self, optimization_type: OptimizationType) {
        for entry in self.registry.iter_mut() {
            entry.kernel_mut().set_optimization_type(optimization_type);
        }
        self.optimization_type = optimization_type;
    }

    /// Log the combination and each member
    pub fn list_kernels(&self) {
        info!(
            "BEGIN COMBINED KERNEL LIST - {} kernels, layout {:?}, optimization {}",
            self.registry.count(),
            self.layout,
            if self.optimization.is_initialized() {
                "initialized"
            } else {
                "not initialized"
            }
        );
        for (position, entry) in self.registry.iter().enumerate() {
            let kernel = entry.kernel();
            info!(
                "  [{position}] {} weight={} properties={:?} subkernels={}",
                kernel.name(),
                entry.weight(),
                kernel.properties(),
                kernel.num_subkernels()
            );
        }
        info!("END COMBINED KERNEL LIST");
    }

    /// Hit and miss counts, when a cache is configured
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.lock().stats())
    }

    fn is_symmetric(&self) -> bool {
        match (&self.lhs, &self.rhs) {
            (Some(l), Some(r)) => same_features(l, r),
            _ => false,
        }
    }

    fn share_parallel(&self, kernel: &mut dyn Kernel) {
        if let Some(parallel) = &self.parallel {
            kernel.set_parallel(Some(parallel.clone()));
        }
    }

    fn reset_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().reset();
        }
    }

    /// Structural change: established optimization state no longer matches the registry
    fn invalidate(&mut self) {
        if self.optimization.is_initialized() {
            debug!("kernel list changed, dropping combined kernel optimization");
            self.delete_optimization();
        }
        self.reset_cache();
    }
}

impl Default for CombinedKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CombinedKernel {
    fn drop(&mut self) {
        self.cleanup();
        info!("combined kernel deleted");
    }
}

impl Kernel for CombinedKernel {
    fn name(&self) -> &str {
        "combined"
    }

    fn properties(&self) -> KernelProperties {
        KernelProperties::LINADD | KernelProperties::KERNCOMBINATION | KernelProperties::BATCH_EVAL
    }

    fn init(&mut self, lhs: FeatureRef, rhs: FeatureRef) -> Result<()> {
        CombinedKernel::init(self, lhs, rhs)
    }

    /// Cached variant of `compute` for symmetric kernels
    fn kernel(&self, x: usize, y: usize) -> f64 {
        match &self.cache {
            Some(cache) if self.is_symmetric() => {
                if let Some(value) = cache.lock().lookup(x, y) {
                    return value;
                }
                let value = self.compute(x, y);
                cache.lock().insert(x, y, value);
                value
            }
            _ => self.compute(x, y),
        }
    }

    fn remove_lhs(&mut self) {
        CombinedKernel::remove_lhs(self)
    }

    fn remove_rhs(&mut self) {
        CombinedKernel::remove_rhs(self)
    }

    fn cleanup(&mut self) {
        CombinedKernel::cleanup(self)
    }

    fn init_optimization(&mut self, support_indices: &[usize], support_weights: &[f64]) -> Result<()> {
        CombinedKernel::init_optimization(self, support_indices, support_weights)
    }

    fn delete_optimization(&mut self) {
        CombinedKernel::delete_optimization(self)
    }

    fn is_optimization_initialized(&self) -> bool {
        self.optimization.is_initialized()
    }

    fn compute_optimized(&self, idx: usize) -> Result<f64> {
        CombinedKernel::compute_optimized(self, idx)
    }

    fn compute_batch(
        &mut self,
        query_indices: &[usize],
        result: &mut [f64],
        support_indices: &[usize],
        support_weights: &[f64],
        factor: f64,
    ) -> Result<()> {
        CombinedKernel::compute_batch(
            self,
            query_indices,
            result,
            support_indices,
            support_weights,
            factor,
        )
    }

    fn add_to_normal(&mut self, idx: usize, weight: f64) {
        CombinedKernel::add_to_normal(self, idx, weight)
    }

    fn clear_normal(&mut self) {
        CombinedKernel::clear_normal(self)
    }

    fn num_subkernels(&self) -> usize {
        CombinedKernel::num_subkernels(self)
    }

    fn subkernel_weights(&self) -> Result<Vec<f64>> {
        CombinedKernel::subkernel_weights(self)
    }

    fn set_subkernel_weights(&mut self, weights: &[f64]) -> Result<()> {
        CombinedKernel::set_subkernel_weights(self, weights)
    }

    fn compute_by_subkernel(&self, idx: usize, contributions: &mut [f64]) -> Result<()> {
        CombinedKernel::compute_by_subkernel(self, idx, contributions)
    }

    fn set_optimization_type(&mut self, optimization_type: OptimizationType) {
        CombinedKernel::set_optimization_type(self, optimization_type)
    }

    fn set_parallel(&mut self, parallel: Option<Parallel>) {
        CombinedKernel::set_parallel(self, parallel)
    }
}
