//! Scope: awaits a dynamically growing set of awaitables via a root task
//! draining an internal unbounded channel (spec §3, §4.10).
//!
//! Grounded in `channel.rs`'s unbounded variant plus the scheduler's
//! `schedule`: the root awaiter is just another task, so no new concurrency
//! primitive is needed beyond what channels and tasks already provide.

use crate::channel::Channel;
use crate::lock::SpinLock;
use crate::scheduler::Scheduler;
use crate::Awaitable;
use std::future::Future;
use std::pin::Pin;

type BoxedAwaitable = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A synchronization object that joins a dynamic, growing set of
/// awaitables through a single root task, rather than a mutex-guarded
/// collection.
///
/// `add` may be called any number of times before
/// [`r#await`](Scope::r#await) is called; `r#await` consumes the scope,
/// which is how double-await is forbidden — there is no `Scope` left to
/// call it on a second time.
pub struct Scope {
    channel: Channel<BoxedAwaitable, SpinLock>,
    done: Awaitable<(), SpinLock>,
}

impl Scope {
    /// Creates an empty scope whose root awaiter runs on `scheduler`.
    pub fn new(scheduler: &Scheduler) -> Self {
        let channel: Channel<BoxedAwaitable, SpinLock> = Channel::unbounded();
        let done = Awaitable::pending();
        let root_channel = channel.clone();
        let root_done = done.clone();
        scheduler.schedule(async move {
            while let Some(fut) = root_channel.recv().await {
                fut.await;
            }
            root_done.resume(());
        });
        Self { channel, done }
    }

    /// Adds an awaitable to the set. Its return value is discarded; the
    /// scope only tracks completion.
    ///
    /// # Panics
    /// Panics if called after [`r#await`](Scope::r#await) — by construction
    /// that requires holding on to a `Scope` past its consumption, which the
    /// type system already prevents for the ordinary case, but a clone of
    /// the boxed future's sender could in principle race with a concurrent
    /// `r#await` on another thread; that race is diagnosed here rather than
    /// silently dropping work.
    pub fn add<F>(&self, awaitable: F)
    where
        F: Future + Send + 'static,
    {
        let boxed: BoxedAwaitable = Box::pin(async move {
            awaitable.await;
        });
        if self.channel.try_send(boxed) == crate::channel::TryStatus::Closed {
            panic!("Scope::add called after Scope::r#await");
        }
    }

    /// Closes the scope to further `add` calls and returns an awaitable
    /// completing once every added awaitable has completed.
    pub fn r#await(self) -> Awaitable<(), SpinLock> {
        self.channel.close();
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn completes_after_all_added_awaitables() {
        let (_lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());
        let count = Arc::new(AtomicUsize::new(0));
        let scope = Scope::new(&scheduler);
        for _ in 0..5 {
            let count = count.clone();
            let s2 = scheduler.clone();
            scope.add(async move {
                s2.sleep(Duration::from_millis(5)).await;
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        scope.r#await().wait_blocking();
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn empty_scope_completes_immediately() {
        let (_lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());
        let scope = Scope::new(&scheduler);
        scope.r#await().wait_blocking();
    }

    #[test]
    #[should_panic(expected = "Scope::add called after Scope::r#await")]
    fn add_after_close_panics() {
        let (_lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());
        let scope = Scope::new(&scheduler);
        scope.channel.close();
        scope.add(async {});
    }

    #[test]
    fn heterogeneous_awaitables_join_and_sleep() {
        let (_lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());
        let scope = Scope::new(&scheduler);
        let s2 = scheduler.clone();
        scope.add(scheduler.join(async { 1i32 }));
        scope.add(scheduler.join(async { "two" }));
        scope.add(s2.sleep(Duration::from_millis(5)));
        scope.r#await().wait_blocking();
    }
}
