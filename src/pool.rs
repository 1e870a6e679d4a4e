//! Bounded worker pool for block-parallel processing.

use crate::error::{Result, VolumeError};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::num::NonZeroUsize;

/// A fixed-size rayon thread pool.
pub struct WorkerPool {
    pool: ThreadPool,
    num_threads: NonZeroUsize,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Result<Self> {
        let num_threads = NonZeroUsize::new(num_threads).ok_or_else(|| {
            VolumeError::InvalidConfig("worker count must be positive".to_string())
        })?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.get())
            .thread_name(|i| format!("volume-worker-{}", i))
            .build()?;

        Ok(Self { pool, num_threads })
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    pub fn num_threads(&self) -> NonZeroUsize {
        self.num_threads
    }

    /// Run `f` on every item using the pool's workers. Stops scheduling new
    /// items after the first error, which is returned.
    pub fn try_for_each<I, F>(&self, items: &[I], f: F) -> Result<()>
    where
        I: Sync,
        F: Fn(&I) -> Result<()> + Sync + Send,
    {
        self.pool.install(|| items.par_iter().try_for_each(|item| f(item)))
    }

    /// Map every item using the pool's workers, collecting results in order.
    pub fn try_map<I, O, F>(&self, items: &[I], f: F) -> Result<Vec<O>>
    where
        I: Sync,
        O: Send,
        F: Fn(&I) -> Result<O> + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(|item| f(item)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(VolumeError::InvalidConfig(_))));
    }

    #[test]
    fn test_try_for_each_visits_all() {
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.num_threads().get(), 3);

        let sum = AtomicUsize::new(0);
        let items: Vec<usize> = (1..=100).collect();
        pool.try_for_each(&items, |&i| {
            sum.fetch_add(i, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
        assert_eq!(sum.into_inner(), 5050);
    }

    #[test]
    fn test_try_for_each_propagates_error() {
        let pool = WorkerPool::new(2).unwrap();
        let items: Vec<usize> = (0..10).collect();
        let result = pool.try_for_each(&items, |&i| {
            if i == 7 {
                Err(VolumeError::Segmentation("boom".to_string()))
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(VolumeError::Segmentation(_))));
    }

    #[test]
    fn test_try_map_keeps_order() {
        let pool = WorkerPool::new(4).unwrap();
        let items: Vec<usize> = (0..20).collect();
        let doubled = pool.try_map(&items, |&i| Ok(i * 2)).unwrap();
        assert_eq!(doubled, (0..20).map(|i| i * 2).collect::<Vec<_>>());
    }
}
