//! Blocking offload: a pool of dedicated worker threads that run synchronous
//! callables on behalf of tasks so a scheduler's cooperative worker is never
//! stalled (spec §4.6).

use crate::awaitable::Awaitable;
use crate::channel::Channel;
use crate::lock::SpinLock;
use std::cell::Cell;
use std::sync::{Arc, Mutex};
use std::thread;

type Job = Box<dyn FnOnce() + Send>;

thread_local! {
    /// Set for the lifetime of a blocking-worker thread's run loop. Lets a
    /// nested `block()` call (a job that itself calls `block`) detect it is
    /// already on a worker and run inline instead of checking out another one.
    static ON_BLOCKING_WORKER: Cell<bool> = Cell::new(false);
}

pub(crate) fn on_blocking_worker() -> bool {
    ON_BLOCKING_WORKER.with(Cell::get)
}

struct Worker {
    jobs: Channel<Job, SpinLock>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn spawn() -> Self {
        let jobs = Channel::unbounded();
        let worker_jobs = jobs.clone();
        let thread = thread::Builder::new()
            .name("weft-blocking-worker".into())
            .spawn(move || {
                ON_BLOCKING_WORKER.with(|w| w.set(true));
                while let Some(job) = worker_jobs.recv_blocking() {
                    job();
                }
            })
            .expect("failed to spawn blocking worker thread");
        Self { jobs, thread: Some(thread) }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.jobs.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// The reuse-or-discard decision for a retired worker, kept separate from
/// `BlockingPool` so the pool's reaper thread can hold it without needing an
/// `Arc<BlockingPool>` back-reference.
struct Idle {
    workers: Mutex<Vec<Worker>>,
    reuse_cap: usize,
}

impl Idle {
    /// Reclaims a finished worker: keeps it if under the reuse cap, else lets
    /// it drop here — on the reaper thread, never on the worker's own thread.
    fn reclaim(&self, worker: Worker) {
        let mut idle = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        if idle.len() < self.reuse_cap {
            idle.push(worker);
        }
        // else: `worker` drops here, closing its mailbox and joining its thread.
    }
}

/// Per-scheduler pool of reusable blocking-offload worker threads.
///
/// A worker reports itself finished by sending itself down `retired` rather
/// than deciding its own fate inline: the job closure that runs on a worker's
/// thread must never be the thing that joins that same thread (`Worker::drop`
/// calls `JoinHandle::join`, and a thread joining itself deadlocks). The
/// dedicated reaper thread spawned in `new` is the only place a retired
/// worker is ever reused or dropped.
pub(crate) struct BlockingPool {
    idle: Arc<Idle>,
    retired: Channel<Worker, SpinLock>,
    reaper: Mutex<Option<thread::JoinHandle<()>>>,
}

impl BlockingPool {
    pub fn new(reuse_cap: usize) -> Self {
        let idle = Arc::new(Idle { workers: Mutex::new(Vec::new()), reuse_cap });
        let retired = Channel::unbounded();
        let reaper_idle = idle.clone();
        let reaper_retired = retired.clone();
        let reaper = thread::Builder::new()
            .name("weft-blocking-reaper".into())
            .spawn(move || {
                while let Some(worker) = reaper_retired.recv_blocking() {
                    reaper_idle.reclaim(worker);
                }
            })
            .expect("failed to spawn blocking-pool reaper thread");
        Self { idle, retired, reaper: Mutex::new(Some(reaper)) }
    }

    fn checkout(&self) -> Worker {
        let mut idle = self.idle.workers.lock().unwrap_or_else(|p| p.into_inner());
        idle.pop().unwrap_or_else(Worker::spawn)
    }

    /// Hands a just-finished worker back to the pool from inside that
    /// worker's own job closure. Only ever enqueues onto `retired`; the
    /// reuse-or-discard decision happens on the reaper thread.
    fn retire(&self, worker: Worker) {
        self.retired.send_blocking(worker);
    }

    /// Number of workers currently retained idle, for diagnostics/tests.
    pub fn idle_count(&self) -> usize {
        self.idle.workers.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Checks out a worker, runs `f` on it, and returns an awaitable that
    /// resolves with `f`'s result once the worker reports completion. The
    /// worker is retired (reused or discarded, at the reuse cap) immediately
    /// after `f` finishes, not when the returned awaitable is later polled or
    /// dropped — this keeps concurrency equal to the number of outstanding
    /// jobs rather than to how promptly callers consume their result.
    pub fn run<F, R>(self: &Arc<Self>, f: F) -> Awaitable<R, SpinLock>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let worker = self.checkout();
        let jobs = worker.jobs.clone();
        let pool = self.clone();
        let result = Awaitable::pending();
        let ret = result.clone();
        jobs.send_blocking(Box::new(move || {
            let value = f();
            result.resume(value);
            pool.retire(worker);
        }) as Job);
        ret
    }
}

impl Drop for BlockingPool {
    fn drop(&mut self) {
        self.retired.close();
        if let Some(reaper) = self.reaper.lock().unwrap_or_else(|p| p.into_inner()).take() {
            let _ = reaper.join();
        }
    }
}
