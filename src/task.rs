//! Tasks: owned, resumable, stackless frames.
//!
//! A [`Task`] wraps a boxed, pinned [`Future`] (Rust's native stackless
//! frame, per the Design Notes) behind a small amount of bookkeeping: a
//! `done` flag, a stable frame address, and an optional cleanup callback
//! invoked exactly once when the frame is destroyed — whether that is
//! because it ran to completion or because it was dropped while still
//! pending (spec §3's "destroyed-without-completing" path). This mirrors
//! the source engine's `coroutine.hpp` task handle, generalized from a
//! hand-rolled coroutine frame to a boxed `dyn Future`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll, Waker};

/// Why a task's frame was destroyed.
pub enum TaskOutcome<T> {
    /// The task's future ran to completion with this value.
    Completed(T),
    /// The frame was destroyed (dropped) before it completed — for example
    /// because the scheduler that owned it was halted and torn down with
    /// the task still suspended (spec §3, §8 scenario S6).
    Destroyed {
        /// Address of the destroyed frame, for diagnostics.
        frame_addr: usize,
    },
}

/// The body of a spawned task: the user's future plus the cleanup hook that
/// fires exactly once when this value is dropped, whether via normal
/// completion (called inline, right after the inner future resolves) or via
/// early drop (called from this type's `Drop` impl).
struct TaskBody<F: Future> {
    fut: F,
    cleanup: Option<Box<dyn FnOnce(TaskOutcome<F::Output>) + Send>>,
}

impl<F: Future> Future for TaskBody<F> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // SAFETY: structural pinning projection; `fut` is never moved out,
        // `cleanup` is plain data accessed only through `&mut`/`Option::take`.
        let this = unsafe { self.get_unchecked_mut() };
        let fut = unsafe { Pin::new_unchecked(&mut this.fut) };
        match fut.poll(cx) {
            Poll::Ready(value) => {
                if let Some(cleanup) = this.cleanup.take() {
                    cleanup(TaskOutcome::Completed(value));
                }
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F: Future> Drop for TaskBody<F> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            let frame_addr = self as *const Self as usize;
            cleanup(TaskOutcome::Destroyed { frame_addr });
        }
    }
}

/// Type-erased polling surface the scheduler drives, independent of any
/// particular task's return type (which has already been funnelled through
/// that task's cleanup hook by the time the scheduler sees it).
trait ErasedTask: Send + Sync {
    /// Resumes the frame once. Returns `true` if the frame completed.
    ///
    /// # Panics
    /// Panics if called while already being polled — the scheduler
    /// guarantees a task is never in its ready queue and being polled at
    /// the same time, so reentrant calls indicate a framework bug.
    fn poll_once(&self, waker: &Waker) -> bool;
}

struct TaskSlot {
    future: Mutex<Option<Pin<Box<dyn Future<Output = ()> + Send>>>>,
    done: AtomicBool,
}

impl ErasedTask for TaskSlot {
    fn poll_once(&self, waker: &Waker) -> bool {
        let mut guard = self.future.lock().unwrap_or_else(|p| p.into_inner());
        let fut = match guard.as_mut() {
            Some(fut) => fut,
            None => return true,
        };
        let mut cx = Context::from_waker(waker);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                *guard = None;
                self.done.store(true, Ordering::Release);
                true
            }
            Poll::Pending => false,
        }
    }
}

/// A type-erased, shared handle to a scheduled task's frame.
///
/// Cloning a `TaskRef` is cheap (it is an `Arc`) and is how the scheduler's
/// ready queue and a task's own waker both refer to the same frame.
#[derive(Clone)]
pub struct TaskRef {
    slot: Arc<TaskSlot>,
}

impl TaskRef {
    /// Builds a new task from a future whose output is funnelled to
    /// `cleanup` exactly once, whether the future completes or the frame
    /// is dropped first.
    pub(crate) fn new<F>(fut: F, cleanup: Option<Box<dyn FnOnce(TaskOutcome<F::Output>) + Send>>) -> Self
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let body = TaskBody { fut, cleanup };
        let slot = TaskSlot { future: Mutex::new(Some(Box::pin(body))), done: AtomicBool::new(false) };
        Self { slot: Arc::new(slot) }
    }

    /// Drives this frame one step. Returns `true` once the frame has
    /// completed (it must not be resumed again after that).
    pub(crate) fn poll_once(&self, waker: &Waker) -> bool {
        self.slot.poll_once(waker)
    }

    /// True once this frame has completed.
    pub fn done(&self) -> bool {
        self.slot.done.load(Ordering::Acquire)
    }

    /// A stable address identifying this frame, for diagnostics and
    /// equality-by-identity.
    pub fn address(&self) -> usize {
        Arc::as_ptr(&self.slot) as usize
    }
}

impl std::fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskRef(0x{:x}, done={})", self.address(), self.done())
    }
}

impl PartialEq for TaskRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}
impl Eq for TaskRef {}

/// A non-owning handle to a task's frame.
///
/// A task that awaits an awaitable it itself exclusively owns forms a
/// reference cycle if the waker stored in that awaitable's parked state
/// holds the frame strongly: the frame's own future would keep alive the
/// very waker that keeps the frame alive. Wakers hold a `WeakTaskRef`
/// instead, so that cycle collapses to nothing once the scheduler's own
/// bookkeeping reference is the only one left — which lets a halted
/// scheduler actually destroy frames that nothing will ever resume.
#[derive(Clone)]
pub(crate) struct WeakTaskRef {
    slot: Weak<TaskSlot>,
}

impl TaskRef {
    /// A non-owning handle to this frame, for storage inside a waker.
    pub(crate) fn downgrade(&self) -> WeakTaskRef {
        WeakTaskRef { slot: Arc::downgrade(&self.slot) }
    }
}

impl WeakTaskRef {
    pub(crate) fn upgrade(&self) -> Option<TaskRef> {
        self.slot.upgrade().map(|slot| TaskRef { slot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::noop_waker;

    #[test]
    fn completes_and_invokes_cleanup_once() {
        let observed = Arc::new(Mutex::new(None));
        let observed2 = observed.clone();
        let task = TaskRef::new(
            async { 42i32 },
            Some(Box::new(move |outcome: TaskOutcome<i32>| {
                if let TaskOutcome::Completed(v) = outcome {
                    *observed2.lock().unwrap() = Some(v);
                }
            })),
        );
        let waker = noop_waker();
        assert!(task.poll_once(&waker));
        assert!(task.done());
        assert_eq!(*observed.lock().unwrap(), Some(42));
    }

    #[test]
    fn dropped_while_pending_reports_destroyed() {
        let observed = Arc::new(Mutex::new(false));
        let observed2 = observed.clone();
        let task = TaskRef::new(
            std::future::pending::<()>(),
            Some(Box::new(move |outcome: TaskOutcome<()>| {
                if let TaskOutcome::Destroyed { .. } = outcome {
                    *observed2.lock().unwrap() = true;
                }
            })),
        );
        let waker = noop_waker();
        assert!(!task.poll_once(&waker));
        drop(task);
        assert!(*observed.lock().unwrap());
    }
}
