//! Weighted combinations of kernels over multi-modal features
//!
//! A `CombinedKernel` owns an ordered list of weighted sub-kernels, each
//! bound to one component of a `CombinedFeatures` collection, and evaluates
//! K(x, y) = Σ_i β_i K_i(x_i, y_i). On top of pairwise evaluation it offers
//! the LINADD fast path for scoring against a fixed support set, threaded
//! batch scoring, and flat or appended subkernel weight vectors for
//! multiple-kernel learning.

pub mod cache;
pub mod core;
pub mod features;
pub mod kernel;
pub mod machine;
pub mod parallel;

// Re-export main types for convenience
pub use crate::cache::{CacheStats, KernelCache};
pub use crate::core::error::{KernelError, Result};
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::features::{CombinedFeatures, SparseFeatures};
pub use crate::kernel::{CombinedKernel, GaussianKernel, Kernel, LinearKernel};
pub use crate::machine::KernelMachine;
pub use crate::parallel::Parallel;

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
