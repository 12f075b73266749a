//! Kernel functions and their weighted combination

pub mod combined;
pub mod gaussian;
pub mod linear;
pub mod traits;

pub use self::combined::CombinedKernel;
pub use self::gaussian::GaussianKernel;
pub use self::linear::LinearKernel;
pub use self::traits::*;
