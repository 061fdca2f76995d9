//! Lock abstractions shared by channels, schedulers and awaitables.
//!
//! Three implementations satisfy the same [`Lock`] contract: [`SpinLock`] (a
//! test-and-set spin lock), [`BlockingMutex`] (a thin wrapper over
//! [`std::sync::Mutex`]) and [`NoLock`] (a no-op lock for single-threaded use
//! only). The lock flavor is a compile-time parameter of channels, scopes and
//! the internal awaitable plumbing; correctness depends on the caller
//! choosing a lock strong enough for the actual sharing topology, the same
//! way the source engine's `mutex.hpp` leaves that choice to the caller.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

/// Common contract implemented by all lock flavors used in this crate.
///
/// `lock`/`try_lock` never return a guard object: callers pair them with
/// [`Lock::unlock`] themselves. This mirrors the source engine's raw
/// lock/unlock pair (rather than Rust's usual RAII guard) because the
/// awaitable protocol (`is_ready`/`on_suspend`/`resume`) needs to hold a lock
/// across distinct method calls, not across a single lexical scope.
pub trait Lock: Default + Send + Sync {
    /// Blocks until the lock is acquired.
    fn lock(&self);
    /// Attempts to acquire the lock without blocking. Returns `true` on success.
    fn try_lock(&self) -> bool;
    /// Releases a lock previously acquired by this thread.
    ///
    /// # Safety-adjacent invariant
    /// Calling `unlock` without a matching `lock`/successful `try_lock` is a
    /// logic error; implementations are not required to detect it.
    fn unlock(&self);

    /// Acquires the lock and returns an RAII guard that unlocks on drop.
    ///
    /// A convenience on top of the raw contract above, for the common case
    /// of holding a lock across a single lexical scope (most channel and
    /// scope operations); the awaitable protocol still uses `lock`/`unlock`
    /// directly where a lock must outlive one call.
    fn guard(&self) -> LockGuard<'_, Self>
    where
        Self: Sized,
    {
        self.lock();
        LockGuard(self)
    }
}

/// RAII guard returned by [`Lock::guard`]; unlocks the underlying lock on drop.
pub struct LockGuard<'a, L: Lock>(&'a L);

impl<'a, L: Lock> Drop for LockGuard<'a, L> {
    fn drop(&mut self) {
        self.0.unlock();
    }
}

/// Spin lock backed by an atomic test-and-set flag with acquire/release
/// ordering. No fairness guarantees. This is the recommended default lock
/// for channels and schedulers (spec §4.1, §5).
#[derive(Debug, Default)]
pub struct SpinLock {
    flag: AtomicBool,
}

impl SpinLock {
    /// Creates a new, unlocked spin lock.
    pub const fn new() -> Self {
        Self { flag: AtomicBool::new(false) }
    }
}

impl Lock for SpinLock {
    fn lock(&self) {
        let mut spins: u32 = 0;
        while self.flag.compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed).is_err() {
            spins = spins.wrapping_add(1);
            if spins < 32 {
                core::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed).is_ok()
    }

    fn unlock(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Lock backed by the platform's standard blocking primitives.
///
/// Used when contention is expected to be non-trivial and yielding the
/// thread to the OS scheduler while parked is preferable to spinning. Built
/// from a `Mutex<bool>` + `Condvar` pair (rather than holding a
/// `MutexGuard` across calls) so `lock`/`unlock` can be separate method
/// calls instead of a lexically scoped guard.
pub struct BlockingMutex {
    held: Mutex<bool>,
    cond: Condvar,
}

impl Default for BlockingMutex {
    fn default() -> Self {
        Self { held: Mutex::new(false), cond: Condvar::new() }
    }
}

impl Lock for BlockingMutex {
    fn lock(&self) {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        while *held {
            held = self.cond.wait(held).unwrap_or_else(|p| p.into_inner());
        }
        *held = true;
    }

    fn try_lock(&self) -> bool {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        if *held {
            false
        } else {
            *held = true;
            true
        }
    }

    fn unlock(&self) {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        *held = false;
        drop(held);
        self.cond.notify_one();
    }
}

/// A lock that performs no synchronization at all.
///
/// `try_lock` always succeeds. This is a correctness assertion by the
/// caller: only use `NoLock` when the surrounding channel, scope or
/// awaitable is guaranteed never to be shared across threads. The library
/// does not and cannot enforce this — it is exactly the same contract the
/// source engine's lock-free path leaves to its caller.
#[derive(Debug, Default)]
pub struct NoLock;

impl Lock for NoLock {
    fn lock(&self) {}
    fn try_lock(&self) -> bool {
        true
    }
    fn unlock(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_lock_mutual_exclusion() {
        let lock = SpinLock::new();
        assert!(lock.try_lock());
        assert!(!lock.try_lock());
        lock.unlock();
        assert!(lock.try_lock());
        lock.unlock();
    }

    #[test]
    fn no_lock_always_succeeds() {
        let lock = NoLock;
        assert!(lock.try_lock());
        assert!(lock.try_lock());
        lock.unlock();
    }

    #[test]
    fn blocking_mutex_mutual_exclusion() {
        let lock = BlockingMutex::default();
        assert!(lock.try_lock());
        assert!(!lock.try_lock());
        lock.unlock();
        assert!(lock.try_lock());
        lock.unlock();
    }
}
