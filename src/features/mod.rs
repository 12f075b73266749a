//! Feature collections consumed by kernels
//!
//! `SparseFeatures` holds one modality as sparse vectors; `CombinedFeatures`
//! groups one component collection per sub-kernel of a combined kernel.

pub mod combined;
pub mod sparse;

pub use self::combined::*;
pub use self::sparse::*;
