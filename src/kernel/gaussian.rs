//! Gaussian (RBF) kernel implementation
//!
//! K(x, y) = exp(-γ * ||x - y||²), evaluated as
//! exp(-γ * (||x||² + ||y||² - 2 x^T y)) with squared norms cached at `init`.

use crate::core::{FeatureRef, KernelError, KernelProperties, Result, SparseVector};
use crate::features::SparseFeatures;
use crate::kernel::Kernel;

/// Gaussian kernel over sparse features
///
/// The gamma parameter controls the reach of each support vector: a high
/// gamma makes similarity fall off quickly with distance. The kernel is not
/// linear in its arguments, so it has no LINADD fast path and a combined
/// kernel evaluates it by explicit summation over the support set.
pub struct GaussianKernel {
    gamma: f64,
    lhs: Option<FeatureRef>,
    rhs: Option<FeatureRef>,
    lhs_norms: Vec<f64>,
    rhs_norms: Vec<f64>,
}

impl GaussianKernel {
    /// # Panics
    /// Panics if gamma is not positive
    pub fn new(gamma: f64) -> Self {
        assert!(gamma > 0.0, "Gamma must be positive, got: {}", gamma);
        Self {
            gamma,
            lhs: None,
            rhs: None,
            lhs_norms: Vec::new(),
            rhs_norms: Vec::new(),
        }
    }

    /// gamma = 1 / n_features
    pub fn with_auto_gamma(n_features: usize) -> Self {
        assert!(n_features > 0, "Number of features must be positive");
        Self::new(1.0 / n_features as f64)
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    fn vectors(side: &Option<FeatureRef>) -> &[SparseVector] {
        side.as_deref()
            .and_then(SparseFeatures::downcast)
            .map(SparseFeatures::vectors)
            .unwrap_or_default()
    }
}

impl Default for GaussianKernel {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Kernel for GaussianKernel {
    fn name(&self) -> &str {
        "gaussian"
    }

    fn properties(&self) -> KernelProperties {
        KernelProperties::NONE
    }

    fn init(&mut self, lhs: FeatureRef, rhs: FeatureRef) -> Result<()> {
        let (Some(left), Some(right)) = (
            SparseFeatures::downcast(&*lhs),
            SparseFeatures::downcast(&*rhs),
        ) else {
            return Err(KernelError::KernelInit {
                kernel: self.name().to_string(),
                reason: format!(
                    "expected sparse features, got '{}' and '{}'",
                    lhs.feature_type(),
                    rhs.feature_type()
                ),
            });
        };

        self.lhs_norms = left.squared_norms();
        self.rhs_norms = right.squared_norms();
        self.lhs = Some(lhs);
        self.rhs = Some(rhs);
        Ok(())
    }

    fn kernel(&self, x: usize, y: usize) -> f64 {
        let dot = Self::vectors(&self.lhs)[x].dot(&Self::vectors(&self.rhs)[y]);

        // Clamp: rounding can push the distance slightly negative
        let squared_distance = (self.lhs_norms[x] + self.rhs_norms[y] - 2.0 * dot).max(0.0);
        (-self.gamma * squared_distance).exp()
    }

    fn remove_lhs(&mut self) {
        self.lhs = None;
        self.lhs_norms.clear();
    }

    fn remove_rhs(&mut self) {
        self.rhs = None;
        self.rhs_norms.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn init_with(kernel: &mut GaussianKernel, vectors: Vec<SparseVector>) {
        let features: FeatureRef = Arc::new(SparseFeatures::new(vectors));
        kernel.init(features.clone(), features).unwrap();
    }

    #[test]
    fn test_gaussian_kernel_creation() {
        assert_eq!(GaussianKernel::new(0.5).gamma(), 0.5);
        assert_eq!(GaussianKernel::with_auto_gamma(10).gamma(), 0.1);
        assert_eq!(GaussianKernel::default().gamma(), 1.0);
        assert!(!GaussianKernel::default().has_property(KernelProperties::LINADD));
    }

    #[test]
    #[should_panic(expected = "Gamma must be positive")]
    fn test_gaussian_kernel_invalid_gamma() {
        GaussianKernel::new(0.0);
    }

    #[test]
    fn test_identical_vectors_give_one() {
        let mut kernel = GaussianKernel::new(1.0);
        init_with(
            &mut kernel,
            vec![SparseVector::new(vec![0, 1, 2], vec![1.0, 2.0, 3.0])],
        );
        assert_relative_eq!(kernel.kernel(0, 0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_disjoint_vectors() {
        let mut kernel = GaussianKernel::new(1.0);
        init_with(
            &mut kernel,
            vec![
                SparseVector::new(vec![0, 2], vec![1.0, 1.0]),
                SparseVector::new(vec![1, 3], vec![1.0, 1.0]),
            ],
        );

        // ||x - y||² = 4 with no overlap
        assert_relative_eq!(kernel.kernel(0, 1), (-4.0_f64).exp(), epsilon = 1e-12);
        assert_eq!(kernel.kernel(0, 1), kernel.kernel(1, 0));
    }

    #[test]
    fn test_similarity_decreases_with_distance() {
        let mut kernel = GaussianKernel::new(1.0);
        init_with(
            &mut kernel,
            (0..4)
                .map(|i| SparseVector::new(vec![0], vec![i as f64]))
                .collect(),
        );

        assert!(kernel.kernel(0, 1) > kernel.kernel(0, 2));
        assert!(kernel.kernel(0, 2) > kernel.kernel(0, 3));
    }

    #[test]
    fn test_no_linadd_support() {
        let mut kernel = GaussianKernel::default();
        assert!(matches!(
            kernel.init_optimization(&[0], &[1.0]),
            Err(KernelError::Unsupported { .. })
        ));
        assert!(!kernel.is_optimization_initialized());
    }
}
