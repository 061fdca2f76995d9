//! The suspension primitive shared by tasks and ordinary threads.
//!
//! An [`Awaitable<T, L>`] is a one-shot, resumable result slot: a task
//! suspends on it via `.await` (it implements [`Future`]), a plain OS
//! thread suspends on it via [`Awaitable::wait_blocking`], and some other
//! piece of code (a channel, a timer, a task's cleanup hook) resumes it
//! exactly once via [`Awaitable::resume`]. Channels, timers and joiners are
//! all built on top of this one primitive (spec §3, §4.3), mirroring the
//! source engine's `coroutine.hpp` awaiter, generalized from a single
//! hand-written `await_ready`/`await_suspend`/`await_resume` triad onto
//! Rust's native `Future`/`Waker` machinery (see the Design Notes in
//! `SPEC_FULL.md` — the lowering is `poll` for the task path and an
//! explicit condvar park for the thread path).
//!
//! # Rescheduling destination
//!
//! Spec §4.4 describes a `destination` weak scheduler reference captured at
//! construction and used to re-enqueue a resumed frame. In this Rust
//! lowering that bookkeeping is folded into the [`Waker`] itself: a
//! scheduler hands each task a waker whose `wake()` implementation already
//! knows which scheduler (via a weak reference) to re-enqueue onto, which
//! is the idiomatic equivalent — an `Awaitable` simply stores whatever
//! waker it was polled with and calls `.wake()` on it, never inventing its
//! own notion of "where to reschedule".
//!
//! # Drop / cancellation
//!
//! The source engine's destruction contract (waiting synchronously or
//! diagnosing a bug when an un-resumed awaiter is destroyed) is an artifact
//! of C++ coroutine-frame lifetimes and has no counterpart here: dropping a
//! pending `Awaitable` is a normal, safe cancellation in Rust's async model
//! (nothing is waiting "on" it beyond whoever held the `Future`, and they
//! are the one dropping it). What spec.md §7 calls "awaitable misuse" —
//! double-await, resuming an already-completed awaitable, or polling from
//! both a task and a thread — is still diagnosed as a framework bug.

use crate::lock::{Lock, SpinLock};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};

enum State<T> {
    Empty,
    TaskParked(Waker),
    ThreadParked(Arc<ThreadPark>),
    Ready(T),
    Taken,
}

struct ThreadPark {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl ThreadPark {
    fn new() -> Self {
        Self { signaled: Mutex::new(false), cond: Condvar::new() }
    }

    fn wait(&self) {
        let mut signaled = self.signaled.lock().unwrap_or_else(|p| p.into_inner());
        while !*signaled {
            signaled = self.cond.wait(signaled).unwrap_or_else(|p| p.into_inner());
        }
    }

    fn notify(&self) {
        let mut signaled = self.signaled.lock().unwrap_or_else(|p| p.into_inner());
        *signaled = true;
        drop(signaled);
        self.cond.notify_one();
    }
}

struct Inner<T, L: Lock> {
    lock: L,
    // SAFETY: every access to `state` is bracketed by `lock.lock()`/`lock.unlock()`.
    state: std::cell::UnsafeCell<State<T>>,
}

// SAFETY: access to `state` is always serialized through `lock`.
unsafe impl<T: Send, L: Lock> Send for Inner<T, L> {}
unsafe impl<T: Send, L: Lock> Sync for Inner<T, L> {}

/// A one-shot suspension primitive usable from a task (as a [`Future`]) or
/// from a plain thread (via [`wait_blocking`](Self::wait_blocking)).
///
/// Cloning an `Awaitable` yields another handle to the same shared slot —
/// this is how a channel or timer keeps a reference to a parked waiter
/// after handing the original handle back to its caller as a `Future`.
pub struct Awaitable<T, L: Lock = SpinLock> {
    inner: Arc<Inner<T, L>>,
}

impl<T, L: Lock> Clone for Awaitable<T, L> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T, L: Lock> Awaitable<T, L> {
    /// Creates a new awaitable with nobody parked on it yet.
    pub fn pending() -> Self {
        Self { inner: Arc::new(Inner { lock: L::default(), state: std::cell::UnsafeCell::new(State::Empty) }) }
    }

    /// Creates an awaitable that is already resolved with `value` — the
    /// fast path described in spec §4.3 ("`on_ready` may return ready with
    /// no parked waiter"): useful when a synchronous check already computed
    /// the result and no one ever needs to park.
    pub fn ready(value: T) -> Self {
        Self { inner: Arc::new(Inner { lock: L::default(), state: std::cell::UnsafeCell::new(State::Ready(value)) }) }
    }

    /// Resumes this awaitable with `value`. Must be called at most once per
    /// awaitable lifecycle (spec §3); a second call is diagnosed as a
    /// framework bug and degrades to a no-op.
    pub fn resume(&self, value: T) {
        self.inner.lock.lock();
        // SAFETY: lock held.
        let state = unsafe { &mut *self.inner.state.get() };
        if matches!(state, State::Ready(_) | State::Taken) {
            self.inner.lock.unlock();
            tracing::error!("framework bug: Awaitable::resume called more than once, ignoring");
            return;
        }
        let prev = std::mem::replace(state, State::Ready(value));
        self.inner.lock.unlock();
        match prev {
            State::TaskParked(waker) => waker.wake(),
            State::ThreadParked(park) => park.notify(),
            State::Empty => {}
            State::Ready(_) | State::Taken => unreachable!("checked above"),
        }
    }

    /// A stable address identifying the shared slot, for diagnostics (e.g.
    /// a join failure reporting which joiner observed a destroyed frame).
    pub fn address(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Blocks the calling OS thread until this awaitable is resumed, then
    /// returns the value. For use outside of a task (spec §4.3's
    /// "thread-mode" path).
    ///
    /// # Panics
    /// Panics if this awaitable has already been polled as a task [`Future`]
    /// or already consumed — double-await is diagnosed as a bug (spec §9,
    /// Open Questions).
    pub fn wait_blocking(&self) -> T {
        self.inner.lock.lock();
        // SAFETY: lock held.
        let state = unsafe { &mut *self.inner.state.get() };
        match state {
            State::Ready(_) => {
                let taken = std::mem::replace(state, State::Taken);
                self.inner.lock.unlock();
                match taken {
                    State::Ready(v) => v,
                    _ => unreachable!(),
                }
            }
            State::Empty => {
                let park = Arc::new(ThreadPark::new());
                *state = State::ThreadParked(park.clone());
                self.inner.lock.unlock();
                park.wait();
                self.inner.lock.lock();
                // SAFETY: lock held.
                let state = unsafe { &mut *self.inner.state.get() };
                let taken = std::mem::replace(state, State::Taken);
                self.inner.lock.unlock();
                match taken {
                    State::Ready(v) => v,
                    _ => unreachable!("resumed without a ready value"),
                }
            }
            _ => {
                self.inner.lock.unlock();
                panic!("framework bug: Awaitable polled from both a task and a thread, or awaited twice");
            }
        }
    }
}

impl<T, L: Lock> Future for Awaitable<T, L> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        self.inner.lock.lock();
        // SAFETY: lock held.
        let state = unsafe { &mut *self.inner.state.get() };
        match state {
            State::Ready(_) => {
                let taken = std::mem::replace(state, State::Taken);
                self.inner.lock.unlock();
                match taken {
                    State::Ready(v) => Poll::Ready(v),
                    _ => unreachable!(),
                }
            }
            State::Empty | State::TaskParked(_) => {
                *state = State::TaskParked(cx.waker().clone());
                self.inner.lock.unlock();
                Poll::Pending
            }
            State::ThreadParked(_) => {
                self.inner.lock.unlock();
                panic!("framework bug: Awaitable polled as a task while a thread is already parked on it");
            }
            State::Taken => {
                self.inner.lock.unlock();
                panic!("framework bug: Awaitable polled again after completion");
            }
        }
    }
}
