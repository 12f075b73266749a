//! Error types for kernel evaluation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Initialising kernel '{kernel}' failed: {reason}")]
    KernelInit { kernel: String, reason: String },

    #[error("Optimization not initialized: {0}")]
    NotInitialized(String),

    #[error("Incompatible features: {0}")]
    IncompatibleFeatures(String),

    #[error("Kernel '{kernel}' does not support {operation}")]
    Unsupported { kernel: String, operation: String },

    #[error("Batch evaluation of kernel '{kernel}' failed on queries [{start}, {end}): {reason}")]
    BatchWorker {
        kernel: String,
        start: usize,
        end: usize,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        KernelError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;
