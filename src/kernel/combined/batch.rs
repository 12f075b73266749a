//! Batch evaluation of the combined kernel
//!
//! For each member with a nonzero weight the scores of all queries are added
//! into a caller-provided buffer. Members that evaluate batches natively get
//! the whole batch. For the rest the query range is split into contiguous,
//! disjoint chunks, one per worker, so every worker writes its own slice of
//! the buffer and no locking is needed. All workers for one member finish
//! before the next member starts.

use super::CombinedKernel;
use crate::core::{KernelError, KernelProperties, Result};
use crate::kernel::Kernel;
use crate::parallel::Parallel;
use log::{debug, warn};
use rayon::prelude::*;
use std::any::Any;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};

/// Split `[0, num_vec)` into `num_threads` contiguous ranges
///
/// Every range but the last holds `num_vec / num_threads` queries; the last
/// one also takes the remainder. Ranges may be empty when there are fewer
/// queries than threads.
pub fn partition(num_vec: usize, num_threads: usize) -> Vec<Range<usize>> {
    let num_threads = num_threads.max(1);
    let step = num_vec / num_threads;

    (0..num_threads)
        .map(|t| {
            let end = if t + 1 == num_threads {
                num_vec
            } else {
                (t + 1) * step
            };
            t * step..end
        })
        .collect()
}

impl CombinedKernel {
    /// Add the weighted scores of `query_indices` against a support set into `result`
    ///
    /// `result[i] += factor * Σ_k β_k Σ_j α_j K_k(sv_j, query_indices[i])`.
    /// The buffer is accumulated into, not overwritten. Any optimization state
    /// of the combined kernel is torn down before and after the call.
    pub fn compute_batch(
        &mut self,
        query_indices: &[usize],
        result: &mut [f64],
        support_indices: &[usize],
        support_weights: &[f64],
        factor: f64,
    ) -> Result<()> {
        if query_indices.is_empty() {
            return Err(KernelError::InvalidArgument(
                "batch evaluation needs at least one query".to_string(),
            ));
        }
        if result.len() < query_indices.len() {
            return Err(KernelError::InvalidArgument(format!(
                "result buffer holds {} entries for {} queries",
                result.len(),
                query_indices.len()
            )));
        }
        if support_indices.len() != support_weights.len() {
            return Err(KernelError::InvalidArgument(format!(
                "{} support indices but {} support weights",
                support_indices.len(),
                support_weights.len()
            )));
        }
        let num_rhs = match &self.rhs {
            Some(rhs) => rhs.num_vectors(),
            None => {
                return Err(KernelError::InvalidArgument(
                    "combined kernel has no right-hand features, call init first".to_string(),
                ))
            }
        };
        if let Some(&q) = query_indices.iter().find(|&&q| q >= num_rhs) {
            return Err(KernelError::InvalidArgument(format!(
                "query index {q} out of range for {num_rhs} right-hand vectors"
            )));
        }

        self.delete_optimization();
        let parallel = self.parallel();
        debug!(
            "batch evaluation of {} queries against {} support vectors on {} threads",
            query_indices.len(),
            support_indices.len(),
            parallel.num_threads()
        );

        let outcome = self.registry.iter_mut().try_for_each(|entry| {
            if entry.weight() == 0.0 {
                return Ok(());
            }
            let weight = factor * entry.weight();
            let kernel = entry.kernel_mut();

            if kernel.has_property(KernelProperties::BATCH_EVAL) {
                kernel.compute_batch(query_indices, result, support_indices, support_weights, weight)
            } else {
                emulate_compute_batch(
                    kernel,
                    &parallel,
                    query_indices,
                    result,
                    support_indices,
                    support_weights,
                    weight,
                )
            }
        });

        self.delete_optimization();
        outcome
    }
}

/// Batch evaluation for a member without a native batch path
fn emulate_compute_batch(
    kernel: &mut dyn Kernel,
    parallel: &Parallel,
    query_indices: &[usize],
    result: &mut [f64],
    support_indices: &[usize],
    support_weights: &[f64],
    weight: f64,
) -> Result<()> {
    let linadd = kernel.has_property(KernelProperties::LINADD)
        && match kernel.init_optimization(support_indices, support_weights) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "init_optimization of kernel '{}' failed, summing explicitly: {err}",
                    kernel.name()
                );
                kernel.delete_optimization();
                false
            }
        };

    let outcome = {
        let kernel: &dyn Kernel = &*kernel;
        if linadd {
            run_partitioned(parallel, kernel.name(), query_indices.len(), result, |i| {
                Ok(weight * kernel.compute_optimized(query_indices[i])?)
            })
        } else {
            run_partitioned(parallel, kernel.name(), query_indices.len(), result, |i| {
                let q = query_indices[i];
                let sum: f64 = support_indices
                    .iter()
                    .zip(support_weights)
                    .map(|(&sv, &alpha)| alpha * kernel.kernel(sv, q))
                    .sum();
                Ok(weight * sum)
            })
        }
    };

    if linadd {
        kernel.delete_optimization();
    }
    outcome
}

/// Add `score(i)` into `result[i]` for `i` in `[0, num_vec)`, one chunk per worker
fn run_partitioned<F>(
    parallel: &Parallel,
    kernel_name: &str,
    num_vec: usize,
    result: &mut [f64],
    score: F,
) -> Result<()>
where
    F: Fn(usize) -> Result<f64> + Sync,
{
    let mut chunks = Vec::with_capacity(parallel.num_threads());
    let mut rest = &mut result[..num_vec];
    for range in partition(num_vec, parallel.num_threads()) {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
        rest = tail;
        if !range.is_empty() {
            chunks.push((range, head));
        }
    }

    let run = |(range, out): (Range<usize>, &mut [f64])| run_chunk(kernel_name, range, out, &score);
    match parallel.pool() {
        Some(pool) if chunks.len() > 1 => pool.install(|| chunks.into_par_iter().try_for_each(run)),
        _ => chunks.into_iter().try_for_each(run),
    }
}

/// Score one contiguous chunk, turning errors and panics into a batch failure
fn run_chunk<F>(kernel_name: &str, range: Range<usize>, out: &mut [f64], score: &F) -> Result<()>
where
    F: Fn(usize) -> Result<f64>,
{
    let (start, end) = (range.start, range.end);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<()> {
        for (i, slot) in range.zip(out.iter_mut()) {
            *slot += score(i)?;
        }
        Ok(())
    }));

    let reason = match outcome {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => err.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };
    Err(KernelError::BatchWorker {
        kernel: kernel_name.to_string(),
        start,
        end,
        reason,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("worker panicked: {message}")
    } else {
        "worker panicked".to_string()
    }
}
