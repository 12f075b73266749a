//! Subkernel weight layouts
//!
//! In the flat layout there is one slot per registered kernel holding its
//! combination weight. In the appended layout each kernel contributes
//! `num_subkernels()` contiguous slots, in registry order: a kernel with a
//! single weight is represented by its combination weight, a kernel with
//! several (typically a nested combination) by its own weight vector.

use super::CombinedKernel;
use crate::core::{KernelError, Result, SubkernelWeightLayout};
use log::warn;

impl CombinedKernel {
    /// Length of the weight vector in the current layout
    pub fn num_subkernels(&self) -> usize {
        match self.layout {
            SubkernelWeightLayout::Flat => self.registry.count(),
            SubkernelWeightLayout::Appended => self
                .registry
                .iter()
                .map(|entry| entry.kernel().num_subkernels())
                .sum(),
        }
    }

    /// Fresh copy of the weight vector
    pub fn subkernel_weights(&self) -> Result<Vec<f64>> {
        let mut weights = Vec::with_capacity(self.num_subkernels());

        for entry in self.registry.iter() {
            let kernel = entry.kernel();
            let width = self.slot_width(kernel.num_subkernels());
            if width == 1 {
                weights.push(entry.weight());
                continue;
            }

            let own = kernel.subkernel_weights()?;
            if own.len() != width {
                return Err(KernelError::InvalidArgument(format!(
                    "kernel '{}' reports {width} subkernels but returned {} weights",
                    kernel.name(),
                    own.len()
                )));
            }
            weights.extend(own);
        }

        Ok(weights)
    }

    /// Replace the weight vector
    ///
    /// A rejected call leaves every weight untouched: the vector is checked
    /// up front, and if a member refuses its slice the members assigned so
    /// far are rolled back. The kernel cache is reset either way.
    pub fn set_subkernel_weights(&mut self, weights: &[f64]) -> Result<()> {
        let expected = self.num_subkernels();
        if weights.len() != expected {
            return Err(KernelError::InvalidArgument(format!(
                "expected {expected} subkernel weights, got {}",
                weights.len()
            )));
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite()) {
            return Err(KernelError::InvalidArgument(format!(
                "subkernel weights must be finite, got {bad}"
            )));
        }

        let previous: Vec<f64> = self.registry.iter().map(|entry| entry.weight()).collect();
        let mut assigned: Vec<(usize, Vec<f64>)> = Vec::new();
        let outcome = self.assign_subkernel_weights(weights, &mut assigned);

        if let Err(err) = &outcome {
            warn!("rejected subkernel weights, restoring previous ones: {err}");
            for (entry, &weight) in self.registry.iter_mut().zip(&previous) {
                entry.set_weight(weight);
            }
            for (position, own) in assigned {
                if let Some(entry) = self.registry.get_mut(position) {
                    if let Err(err) = entry.kernel_mut().set_subkernel_weights(&own) {
                        warn!("could not restore weights of kernel at position {position}: {err}");
                    }
                }
            }
        }

        self.reset_cache();
        outcome
    }

    /// Walk the layout offsets, recording the old weights of every
    /// multi-weight member that accepted its slice
    fn assign_subkernel_weights(
        &mut self,
        weights: &[f64],
        assigned: &mut Vec<(usize, Vec<f64>)>,
    ) -> Result<()> {
        let layout = self.layout;
        let mut offset = 0;
        for (position, entry) in self.registry.iter_mut().enumerate() {
            let width = match layout {
                SubkernelWeightLayout::Flat => 1,
                SubkernelWeightLayout::Appended => entry.kernel().num_subkernels(),
            };
            let slots = &weights[offset..offset + width];
            if width == 1 {
                entry.set_weight(slots[0]);
            } else {
                let kernel = entry.kernel_mut();
                let own = kernel.subkernel_weights()?;
                kernel.set_subkernel_weights(slots)?;
                assigned.push((position, own));
            }
            offset += width;
        }
        Ok(())
    }

    /// Add each slot's share of `compute_optimized(idx)` into `contributions`
    ///
    /// Slots follow the weight vector layout. A kernel with several weights
    /// in the appended layout fills its slots through its own
    /// `compute_by_subkernel`, whatever its combination weight; single-weight
    /// slots with a zero weight are left alone.
    pub fn compute_by_subkernel(&self, idx: usize, contributions: &mut [f64]) -> Result<()> {
        if !self.optimization.is_initialized() {
            return Err(KernelError::NotInitialized(
                "combined kernel optimization not initialized".to_string(),
            ));
        }
        let expected = self.num_subkernels();
        if contributions.len() < expected {
            return Err(KernelError::InvalidArgument(format!(
                "contribution buffer holds {} entries for {expected} subkernels",
                contributions.len()
            )));
        }

        let mut offset = 0;
        for entry in self.registry.iter() {
            let kernel = entry.kernel();
            let width = self.slot_width(kernel.num_subkernels());

            if width > 1 {
                kernel.compute_by_subkernel(idx, &mut contributions[offset..offset + width])?;
            } else if entry.weight() != 0.0 {
                contributions[offset] += entry.weight() * self.member_optimized(kernel, idx)?;
            }
            offset += width;
        }

        Ok(())
    }

    fn slot_width(&self, member_subkernels: usize) -> usize {
        match self.layout {
            SubkernelWeightLayout::Flat => 1,
            SubkernelWeightLayout::Appended => member_subkernels,
        }
    }
}
