//! Composite feature collection, one component per modality

use crate::core::{FeatureCollection, FeatureRef, KernelError, Result};
use std::any::Any;
use std::sync::Arc;

/// Ordered group of component feature collections
///
/// Every component describes the same set of objects, so all components must
/// hold the same number of vectors. Component order matches the order of the
/// sub-kernels in the combined kernel that consumes them.
#[derive(Default, Clone)]
pub struct CombinedFeatures {
    components: Vec<FeatureRef>,
}

impl CombinedFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of components, validating vector counts
    pub fn from_components(components: Vec<FeatureRef>) -> Result<Self> {
        let mut combined = Self::new();
        for component in components {
            combined.append_feature_obj(component)?;
        }
        Ok(combined)
    }

    /// Append a component collection to the end
    pub fn append_feature_obj(&mut self, features: FeatureRef) -> Result<()> {
        if let Some(first) = self.components.first() {
            if first.num_vectors() != features.num_vectors() {
                return Err(KernelError::IncompatibleFeatures(format!(
                    "component {} holds {} vectors, expected {}",
                    self.components.len(),
                    features.num_vectors(),
                    first.num_vectors()
                )));
            }
        }
        self.components.push(features);
        Ok(())
    }

    pub fn num_feature_obj(&self) -> usize {
        self.components.len()
    }

    /// Wrap into a shared handle for kernel initialisation
    pub fn into_shared(self) -> FeatureRef {
        Arc::new(self)
    }
}

impl FeatureCollection for CombinedFeatures {
    fn num_vectors(&self) -> usize {
        self.components.first().map_or(0, |c| c.num_vectors())
    }

    fn is_composite(&self) -> bool {
        true
    }

    fn components(&self) -> &[FeatureRef] {
        &self.components
    }

    fn feature_type(&self) -> &'static str {
        "combined"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SparseVector;
    use crate::features::SparseFeatures;

    fn sparse(n: usize) -> FeatureRef {
        Arc::new(SparseFeatures::new(
            (0..n)
                .map(|i| SparseVector::new(vec![0], vec![i as f64]))
                .collect(),
        ))
    }

    #[test]
    fn test_components_keep_order() {
        let first = sparse(3);
        let second = sparse(3);
        let combined =
            CombinedFeatures::from_components(vec![first.clone(), second.clone()]).unwrap();

        assert!(combined.is_composite());
        assert_eq!(combined.num_feature_obj(), 2);
        assert_eq!(combined.num_vectors(), 3);
        assert!(Arc::ptr_eq(&combined.components()[0], &first));
        assert!(Arc::ptr_eq(&combined.components()[1], &second));
    }

    #[test]
    fn test_vector_count_mismatch_rejected() {
        let mut combined = CombinedFeatures::new();
        combined.append_feature_obj(sparse(3)).unwrap();

        let err = combined.append_feature_obj(sparse(4)).unwrap_err();
        assert!(matches!(err, KernelError::IncompatibleFeatures(_)));
        assert_eq!(combined.num_feature_obj(), 1);
    }

    #[test]
    fn test_empty_combined() {
        let combined = CombinedFeatures::new();
        assert_eq!(combined.num_vectors(), 0);
        assert!(combined.components().is_empty());
    }
}
