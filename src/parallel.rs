//! Parallelism setting and shared worker pool
//!
//! Batch evaluation fans work out over a bounded rayon pool whose size comes
//! from a `Parallel` setting. A process-wide default exists (serial unless
//! changed); individual kernels may carry their own setting instead.

use crate::core::{KernelError, Result};
use parking_lot::RwLock;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt;
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<RwLock<Parallel>> = OnceLock::new();

/// Worker count plus the pool that serves it
#[derive(Clone)]
pub struct Parallel {
    num_threads: usize,
    pool: Option<Arc<ThreadPool>>,
}

impl Parallel {
    /// Setting with `num_threads` workers; no pool is built for a single thread
    pub fn new(num_threads: usize) -> Result<Self> {
        if num_threads == 0 {
            return Err(KernelError::InvalidArgument(
                "number of threads must be at least 1".to_string(),
            ));
        }

        let pool = if num_threads > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("kernelmix-worker-{i}"))
                .build()
                .map_err(|e| KernelError::Config(format!("failed to build worker pool: {e}")))?;
            Some(Arc::new(pool))
        } else {
            None
        };

        Ok(Self { num_threads, pool })
    }

    pub fn serial() -> Self {
        Self {
            num_threads: 1,
            pool: None,
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Worker pool, absent when running serially
    pub fn pool(&self) -> Option<&ThreadPool> {
        self.pool.as_deref()
    }

    /// Current process-wide setting
    pub fn global() -> Parallel {
        Self::global_lock().read().clone()
    }

    /// Change the process-wide worker count; the pool is rebuilt only on change
    pub fn set_global_num_threads(num_threads: usize) -> Result<()> {
        let mut global = Self::global_lock().write();
        if global.num_threads != num_threads {
            *global = Parallel::new(num_threads)?;
            log::debug!("process-wide parallelism set to {num_threads} threads");
        }
        Ok(())
    }

    fn global_lock() -> &'static RwLock<Parallel> {
        GLOBAL.get_or_init(|| RwLock::new(Parallel::serial()))
    }
}

impl Default for Parallel {
    fn default() -> Self {
        Self::serial()
    }
}

impl fmt::Debug for Parallel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parallel")
            .field("num_threads", &self.num_threads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_has_no_pool() {
        let parallel = Parallel::serial();
        assert_eq!(parallel.num_threads(), 1);
        assert!(parallel.pool().is_none());

        let single = Parallel::new(1).unwrap();
        assert!(single.pool().is_none());
    }

    #[test]
    fn test_pool_sized_by_setting() {
        let parallel = Parallel::new(3).unwrap();
        assert_eq!(parallel.num_threads(), 3);
        assert_eq!(parallel.pool().map(|p| p.current_num_threads()), Some(3));
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(matches!(
            Parallel::new(0),
            Err(KernelError::InvalidArgument(_))
        ));
        assert!(Parallel::set_global_num_threads(0).is_err());
    }

    #[test]
    fn test_global_defaults_to_at_least_one_thread() {
        assert!(Parallel::global().num_threads() >= 1);
    }
}
