//! Core traits shared by feature collections and kernels

use std::any::Any;
use std::sync::Arc;

/// Shared handle to a feature collection
pub type FeatureRef = Arc<dyn FeatureCollection>;

/// A collection of feature vectors addressed by index
///
/// Kernels are initialised with a left and a right collection and afterwards
/// evaluate similarities between vectors by index. Composite collections
/// group one component collection per modality.
pub trait FeatureCollection: Send + Sync {
    /// Number of vectors in the collection
    fn num_vectors(&self) -> usize;

    /// Whether this collection is a composite of component collections
    fn is_composite(&self) -> bool {
        false
    }

    /// Component collections in a stable order; empty unless composite
    fn components(&self) -> &[FeatureRef] {
        &[]
    }

    /// Short type name used in diagnostics
    fn feature_type(&self) -> &'static str;

    /// Downcast hook so kernels can recover their concrete feature type
    fn as_any(&self) -> &dyn Any;
}

/// Identity comparison for shared feature handles
pub fn same_features(a: &FeatureRef, b: &FeatureRef) -> bool {
    Arc::ptr_eq(a, b)
}
