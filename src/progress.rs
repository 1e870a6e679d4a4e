//! Progress reporting for block-wise runs.

use crate::types::Progress;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Callback invoked after each completed unit of work.
pub type ProgressCallback<'a> = &'a (dyn Fn(Progress) + Sync);

/// Counts completed units across worker threads and forwards each update.
pub struct ProgressReporter<'a> {
    completed: AtomicUsize,
    total: usize,
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(total: usize, callback: Option<ProgressCallback<'a>>) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total,
            callback,
        }
    }

    /// Record one completed unit and notify the callback.
    pub fn advance(&self) -> Progress {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        let progress = Progress {
            completed,
            total: self.total,
        };
        log::debug!("Progress {}/{}", completed, self.total);
        if let Some(callback) = self.callback {
            callback(progress);
        }
        progress
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
