//! Fixed-size worker pool shared by the physics and avoidance passes.
//!
//! Work is submitted as contiguous batches over a mutable slice and the call blocks until
//! every batch has finished. A panicking batch is caught and counted; its siblings still run
//! to completion and keep their results.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, warn};

/// Outcome of one batched submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub batches: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

pub struct WorkerPool {
    pool: Option<rayon::ThreadPool>,
    workers: usize,
}

impl WorkerPool {
    /// Hardware parallelism minus one, never fewer than two.
    pub fn default_worker_count() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .saturating_sub(1)
            .max(2)
    }

    pub fn from_hardware() -> Self {
        Self::with_workers(Self::default_worker_count())
    }

    /// Pool with exactly `workers` threads (at least one).
    ///
    /// If the threads cannot be started, batches run on the calling thread instead.
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sim-worker-{i}"))
            .build();

        match pool {
            Ok(pool) => Self {
                pool: Some(pool),
                workers,
            },
            Err(e) => {
                warn!(error = %e, workers, "failed to start worker pool; running batches serially");
                Self {
                    pool: None,
                    workers,
                }
            }
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn is_shut_down(&self) -> bool {
        self.pool.is_none()
    }

    /// Batch length giving roughly one batch per worker.
    pub fn batch_size(&self, len: usize) -> usize {
        (len / self.workers + 1).max(1)
    }

    /// Splits `items` into contiguous batches and runs `task(offset, batch)` for each one,
    /// returning once all batches are done. `offset` is the batch's start index in `items`.
    pub fn run_batches<T, F>(&self, items: &mut [T], task: F) -> BatchReport
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync,
    {
        if items.is_empty() {
            return BatchReport::default();
        }

        let size = self.batch_size(items.len());
        let batches = items.len().div_ceil(size);
        let failed = AtomicUsize::new(0);

        match &self.pool {
            Some(pool) => {
                let task = &task;
                let failed = &failed;
                pool.scope(|scope| {
                    for (batch, chunk) in items.chunks_mut(size).enumerate() {
                        scope.spawn(move |_| run_guarded(batch, batch * size, chunk, task, failed));
                    }
                });
            }
            None => {
                for (batch, chunk) in items.chunks_mut(size).enumerate() {
                    run_guarded(batch, batch * size, chunk, &task, &failed);
                }
            }
        }

        BatchReport {
            batches,
            failed: failed.into_inner(),
        }
    }

    /// Runs `task` over all of `items` as one batch on the calling thread.
    pub fn run_serial<T, F>(&self, items: &mut [T], task: F) -> BatchReport
    where
        F: Fn(usize, &mut [T]),
    {
        if items.is_empty() {
            return BatchReport::default();
        }
        let failed = AtomicUsize::new(0);
        run_guarded(0, 0, items, &task, &failed);
        BatchReport {
            batches: 1,
            failed: failed.into_inner(),
        }
    }

    /// Releases the worker threads. Later submissions run serially; calling twice is a no-op.
    pub fn shutdown(&mut self) {
        if let Some(pool) = self.pool.take() {
            // Every submission joins before returning, so no batch is in flight here.
            drop(pool);
            debug!(workers = self.workers, "worker pool shut down");
        }
    }
}

fn run_guarded<T, F>(batch: usize, offset: usize, chunk: &mut [T], task: &F, failed: &AtomicUsize)
where
    F: Fn(usize, &mut [T]),
{
    let len = chunk.len();
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task(offset, chunk))) {
        failed.fetch_add(1, Ordering::Relaxed);
        error!(batch, offset, len, reason = %panic_reason(payload.as_ref()), "worker batch failed");
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_item_is_visited_once_with_correct_offsets() {
        let pool = WorkerPool::with_workers(3);
        let mut items: Vec<usize> = vec![0; 25];

        let report = pool.run_batches(&mut items, |offset, batch| {
            for (k, slot) in batch.iter_mut().enumerate() {
                *slot = offset + k;
            }
        });

        assert!(report.is_clean());
        assert_eq!(report.batches, 25usize.div_ceil(pool.batch_size(25)));
        assert_eq!(items, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn a_failing_batch_does_not_drop_sibling_results() {
        let pool = WorkerPool::with_workers(4);
        let mut items = vec![0u32; 20];
        let size = pool.batch_size(items.len());

        let report = pool.run_batches(&mut items, |offset, batch| {
            if offset == 0 {
                panic!("boom");
            }
            for slot in batch.iter_mut() {
                *slot = 1;
            }
        });

        assert_eq!(report.failed, 1);
        assert!(items[..size].iter().all(|&v| v == 0));
        assert!(items[size..].iter().all(|&v| v == 1));
    }

    #[test]
    fn shutdown_is_idempotent_and_falls_back_to_serial() {
        let mut pool = WorkerPool::with_workers(2);
        pool.shutdown();
        pool.shutdown();
        assert!(pool.is_shut_down());

        let mut items = vec![1, 2, 3];
        let report = pool.run_batches(&mut items, |_, batch| {
            for v in batch.iter_mut() {
                *v *= 2;
            }
        });
        assert!(report.is_clean());
        assert_eq!(items, vec![2, 4, 6]);
    }

    #[test]
    fn empty_input_submits_nothing() {
        let pool = WorkerPool::with_workers(2);
        let mut items: Vec<u8> = Vec::new();
        let report = pool.run_batches(&mut items, |_, _| unreachable!());
        assert_eq!(report, BatchReport::default());
    }

    #[test]
    fn hardware_default_has_at_least_two_workers() {
        assert!(WorkerPool::default_worker_count() >= 2);
    }
}
