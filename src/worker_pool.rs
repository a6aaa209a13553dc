use crate::error::{AnagramError, Stage};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Lines a streaming task processes between two control checkpoints
pub const CHECKPOINT_INTERVAL: usize = 4096;

/// Cooperative cancellation and deadline shared by every task of a run
#[derive(Debug, Clone)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<(Instant, Duration)>,
}

impl RunControl {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self::with_flag(Arc::new(AtomicBool::new(false)), timeout)
    }

    /// Uses an existing flag, e.g. one registered with a signal handler
    pub fn with_flag(cancelled: Arc<AtomicBool>, timeout: Option<Duration>) -> Self {
        Self {
            cancelled,
            deadline: timeout.map(|limit| (Instant::now() + limit, limit)),
        }
    }

    /// A control that never trips
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with `Timeout` past the deadline, else `Interrupted` once cancelled
    pub fn checkpoint(&self, stage: Stage) -> Result<(), AnagramError> {
        if let Some((deadline, limit)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(AnagramError::Timeout { stage, limit });
            }
        }
        if self.is_cancelled() {
            return Err(AnagramError::Interrupted { stage });
        }
        Ok(())
    }
}

/// Fixed-size pool shared by the grouping fan-out and every merge level of one run
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, AnagramError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|index| format!("anagram-worker-{}", index))
            .build()
            .map_err(|e| AnagramError::Config(format!("cannot build worker pool of {}: {}", size, e)))?;
        Ok(Self { pool, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs one level of independent tasks and waits for all of them.
    ///
    /// Every started task runs to completion even when a sibling fails. Results
    /// come back in task order; on failure the error of the lowest-indexed
    /// failing task is returned and the others are logged.
    pub fn run_level<T, R, F>(
        &self,
        stage: Stage,
        tasks: &[T],
        control: &RunControl,
        run: F,
    ) -> Result<Vec<R>, AnagramError>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R, AnagramError> + Sync,
    {
        control.checkpoint(stage)?;

        let results: Vec<Result<R, AnagramError>> = self.pool.install(|| {
            tasks
                .par_iter()
                .map(|task| {
                    control.checkpoint(stage)?;
                    run(task)
                })
                .collect()
        });

        let mut outputs = Vec::with_capacity(results.len());
        let mut first_error = None;
        let mut failures = 0usize;
        for result in results {
            match result {
                Ok(value) => outputs.push(value),
                Err(e) => {
                    failures += 1;
                    if first_error.is_none() {
                        first_error = Some(e);
                    } else {
                        tracing::warn!(%stage, error = %e, "additional task failure");
                    }
                }
            }
        }

        match first_error {
            Some(e) => {
                tracing::error!(%stage, failures, tasks = tasks.len(), "level failed");
                Err(e)
            }
            None => Ok(outputs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_run_level_preserves_task_order() {
        let pool = WorkerPool::new(4).unwrap();
        let tasks: Vec<u64> = (0..100).collect();

        let doubled = pool
            .run_level(Stage::LocalGroup, &tasks, &RunControl::unbounded(), |n| Ok(n * 2))
            .unwrap();

        assert_eq!(doubled, tasks.iter().map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_run_level_finishes_siblings_and_reports_first_failure() {
        let pool = WorkerPool::new(3).unwrap();
        let tasks: Vec<usize> = (0..10).collect();
        let completed = AtomicUsize::new(0);

        let err = pool
            .run_level(Stage::Merge, &tasks, &RunControl::unbounded(), |n| {
                if *n == 3 || *n == 7 {
                    return Err(AnagramError::Config(format!("task {}", n)));
                }
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap_err();

        assert_eq!(err.to_string(), "Configuration error: task 3");
        assert_eq!(completed.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_cancelled_control_interrupts_level() {
        let pool = WorkerPool::new(2).unwrap();
        let control = RunControl::unbounded();
        control.cancel();

        let err = pool
            .run_level(Stage::LocalGroup, &[1, 2, 3], &control, |_| Ok(()))
            .unwrap_err();

        assert!(matches!(err, AnagramError::Interrupted { stage: Stage::LocalGroup }));
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let control = RunControl::new(Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(20));

        let err = control.checkpoint(Stage::Merge).unwrap_err();
        assert!(matches!(err, AnagramError::Timeout { stage: Stage::Merge, .. }));
    }

    #[test]
    fn test_shared_flag_cancels_from_outside() {
        let flag = Arc::new(AtomicBool::new(false));
        let control = RunControl::with_flag(Arc::clone(&flag), None);
        assert!(control.checkpoint(Stage::Partition).is_ok());

        flag.store(true, Ordering::SeqCst);
        assert!(control.is_cancelled());
        assert!(control.checkpoint(Stage::Partition).is_err());
    }
}
