//! Ordered registry of weighted sub-kernels

use crate::core::{KernelError, Result};
use crate::kernel::Kernel;

/// A sub-kernel together with its weight in the combination
pub struct SubKernelEntry {
    kernel: Box<dyn Kernel>,
    weight: f64,
}

impl SubKernelEntry {
    /// The wrapped kernel
    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    pub fn kernel_mut(&mut self) -> &mut dyn Kernel {
        self.kernel.as_mut()
    }

    /// Weight applied to this kernel's value in the sum
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub(crate) fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }
}

/// Owned, insertion-ordered list of sub-kernels
///
/// Order decides which feature component each kernel consumes and where its
/// weights sit in the subkernel weight vector. Dropping the registry drops
/// every kernel it holds.
#[derive(Default)]
pub struct KernelRegistry {
    entries: Vec<SubKernelEntry>,
}

impl KernelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kernel at the end; the weight must be finite
    pub fn append(&mut self, kernel: Box<dyn Kernel>, weight: f64) -> Result<()> {
        check_weight(weight)?;
        self.entries.push(SubKernelEntry { kernel, weight });
        Ok(())
    }

    /// Insert before position `index`; `index == count()` appends
    pub fn insert(&mut self, index: usize, kernel: Box<dyn Kernel>, weight: f64) -> Result<()> {
        check_weight(weight)?;
        if index > self.entries.len() {
            return Err(KernelError::InvalidArgument(format!(
                "insert position {index} beyond {} kernels",
                self.entries.len()
            )));
        }
        self.entries.insert(index, SubKernelEntry { kernel, weight });
        Ok(())
    }

    /// Remove the most recently appended kernel, handing ownership back
    pub fn remove_last(&mut self) -> Result<Box<dyn Kernel>> {
        self.entries
            .pop()
            .map(|entry| entry.kernel)
            .ok_or_else(|| KernelError::NotFound("kernel registry is empty".to_string()))
    }

    /// Remove the kernel at `index`, shifting later entries forward
    pub fn remove(&mut self, index: usize) -> Result<Box<dyn Kernel>> {
        if index >= self.entries.len() {
            return Err(KernelError::NotFound(format!(
                "no kernel at position {index} ({} registered)",
                self.entries.len()
            )));
        }
        Ok(self.entries.remove(index).kernel)
    }

    /// Entries in insertion order; the iterator can be cloned to restart
    pub fn iter(&self) -> std::slice::Iter<'_, SubKernelEntry> {
        self.entries.iter()
    }

    /// Mutable entries in insertion order
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, SubKernelEntry> {
        self.entries.iter_mut()
    }

    /// First registered entry, if any
    pub fn first(&self) -> Option<&SubKernelEntry> {
        self.entries.first()
    }

    /// Entry at `index`
    pub fn get(&self, index: usize) -> Option<&SubKernelEntry> {
        self.entries.get(index)
    }

    /// Mutable entry at `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut SubKernelEntry> {
        self.entries.get_mut(index)
    }

    /// Number of registered kernels
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn check_weight(weight: f64) -> Result<()> {
    if weight.is_finite() {
        Ok(())
    } else {
        Err(KernelError::InvalidArgument(format!(
            "kernel weight must be finite, got {weight}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{GaussianKernel, LinearKernel};

    #[test]
    fn test_append_preserves_order() {
        let mut registry = KernelRegistry::new();
        registry.append(Box::new(LinearKernel::new()), 2.0).unwrap();
        registry.append(Box::new(GaussianKernel::default()), 0.5).unwrap();

        let names: Vec<_> = registry.iter().map(|e| e.kernel().name()).collect();
        assert_eq!(names, vec!["linear", "gaussian"]);
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.first().map(|e| e.weight()), Some(2.0));

        // Restartable traversal
        let walk = registry.iter();
        assert_eq!(walk.clone().count(), walk.count());
    }

    #[test]
    fn test_duplicates_allowed() {
        let mut registry = KernelRegistry::new();
        registry.append(Box::new(LinearKernel::new()), 1.0).unwrap();
        registry.append(Box::new(LinearKernel::new()), 1.0).unwrap();
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_non_finite_weight_rejected() {
        let mut registry = KernelRegistry::new();
        let err = registry
            .append(Box::new(LinearKernel::new()), f64::NAN)
            .unwrap_err();
        assert!(matches!(err, KernelError::InvalidArgument(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_last_transfers_ownership() {
        let mut registry = KernelRegistry::new();
        registry.append(Box::new(LinearKernel::new()), 1.0).unwrap();
        registry.append(Box::new(GaussianKernel::default()), 1.0).unwrap();

        let removed = registry.remove_last().unwrap();
        assert_eq!(removed.name(), "gaussian");
        assert_eq!(registry.count(), 1);

        registry.remove_last().unwrap();
        assert!(matches!(
            registry.remove_last(),
            Err(KernelError::NotFound(_))
        ));
    }

    #[test]
    fn test_insert_and_remove_by_position() {
        let mut registry = KernelRegistry::new();
        registry.append(Box::new(LinearKernel::new()), 1.0).unwrap();
        registry
            .insert(0, Box::new(GaussianKernel::default()), 3.0)
            .unwrap();

        assert_eq!(registry.get(0).map(|e| e.kernel().name()), Some("gaussian"));
        assert!(registry.insert(5, Box::new(LinearKernel::new()), 1.0).is_err());

        assert_eq!(registry.remove(1).unwrap().name(), "linear");
        assert!(matches!(registry.remove(1), Err(KernelError::NotFound(_))));
    }
}
