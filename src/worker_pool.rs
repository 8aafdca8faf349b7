//! Fixed-size pool of dedicated OS threads that turn decode jobs into
//! decode results.
//!
//! Grounded directly on the original `Threadpool<Job, Result, Job_Processor>`
//! (`threadpool.hpp`): N named threads, each looping
//! `pop_or_stop` -> `process` -> `push` until the job queue reports
//! `Stopped`, and a `Drop` impl that calls `stop_all` then joins every
//! thread. The thread-spawn idiom (`std::thread::Builder::new().name(...)
//! .spawn(...)`) mirrors `manga_loader.rs`'s coordinator thread.

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::queue::{BlockingQueue, PopOutcome};

/// Picks the worker count the same way the original `init_thread_pool` did:
/// back off a little from the hardware thread count so the render thread and
/// OS still have headroom, but never drop below 2.
pub fn default_worker_count() -> usize {
    let cpu_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);

    let reduced = match cpu_threads {
        12 => cpu_threads.saturating_sub(4),
        4 => cpu_threads.saturating_sub(1),
        _ => cpu_threads.saturating_sub(1),
    };

    reduced.max(2)
}

/// A pool of worker threads that pull `Job`s from a queue, run a pure
/// `process` function, and push the resulting `Res` onto a result queue.
///
/// `process` must be pure with respect to any state outside the job itself —
/// workers never touch the cache; see the Concurrency & Resource Model.
pub struct WorkerPool<Job, Res> {
    jobs: Arc<BlockingQueue<Job>>,
    results: Arc<BlockingQueue<Res>>,
    threads: Vec<JoinHandle<()>>,
}

impl<Job, Res> WorkerPool<Job, Res>
where
    Job: Send + 'static,
    Res: Send + 'static,
{
    /// Spawn `thread_count` workers sharing `jobs`/`results`, each running
    /// `process` on every job it pops.
    pub fn new<F>(thread_count: usize, jobs: Arc<BlockingQueue<Job>>, results: Arc<BlockingQueue<Res>>, process: F) -> Self
    where
        F: Fn(Job) -> Res + Send + Sync + 'static,
    {
        let process = Arc::new(process);
        let mut threads = Vec::with_capacity(thread_count);

        for index in 0..thread_count {
            let jobs = jobs.clone();
            let results = results.clone();
            let process = process.clone();

            let handle = std::thread::Builder::new()
                .name(format!("texture-streamer-worker-{index}"))
                .spawn(move || worker_loop(index, jobs, results, process))
                .expect("failed to spawn texture streamer worker thread");

            threads.push(handle);
        }

        info!(thread_count, "worker pool started");

        Self {
            jobs,
            results,
            threads,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn jobs(&self) -> &Arc<BlockingQueue<Job>> {
        &self.jobs
    }

    pub fn results(&self) -> &Arc<BlockingQueue<Res>> {
        &self.results
    }
}

fn worker_loop<Job, Res>(
    index: usize,
    jobs: Arc<BlockingQueue<Job>>,
    results: Arc<BlockingQueue<Res>>,
    process: Arc<dyn Fn(Job) -> Res + Send + Sync>,
) {
    loop {
        let job = match jobs.pop_or_stop() {
            PopOutcome::Item(job) => job,
            PopOutcome::Stopped => break,
        };

        let result = process(job);
        results.push(result);
    }
    debug!(worker = index, "worker thread exiting");
}

impl<Job, Res> Drop for WorkerPool<Job, Res> {
    fn drop(&mut self) {
        self.jobs.stop_all();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("texture streamer worker thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn processes_jobs_and_pushes_results() {
        let jobs = Arc::new(BlockingQueue::new());
        let results = Arc::new(BlockingQueue::new());
        let pool = WorkerPool::new(2, jobs.clone(), results.clone(), |job: i32| job * 2);

        for i in 0..10 {
            jobs.push(i);
        }

        let mut collected = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while collected.len() < 10 && std::time::Instant::now() < deadline {
            if let Some(r) = results.try_pop() {
                collected.push(r);
            } else {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        collected.sort();
        assert_eq!(collected, (0..10).map(|i| i * 2).collect::<Vec<_>>());
        drop(pool);
    }

    #[test]
    fn drop_stops_all_workers() {
        let processed = Arc::new(AtomicUsize::new(0));
        let jobs = Arc::new(BlockingQueue::new());
        let results = Arc::new(BlockingQueue::new());
        let processed_clone = processed.clone();
        let pool = WorkerPool::new(3, jobs.clone(), results, move |job: i32| {
            processed_clone.fetch_add(1, Ordering::SeqCst);
            job
        });
        let thread_count = pool.thread_count();
        assert_eq!(thread_count, 3);
        drop(pool); // Must not hang.
    }

    #[test]
    fn default_worker_count_is_at_least_two() {
        assert!(default_worker_count() >= 2);
    }
}
