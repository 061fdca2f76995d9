//! The channel family: unbuffered, bounded and unbounded, over a pluggable lock.
//!
//! All three variants share one shape — a closed flag plus FIFO lists of
//! parked senders/receivers, guarded by a single lock of type `L` — mirroring
//! the source engine's `channel.hpp`. They differ only in what backs the
//! "already available" fast path: nothing (unbuffered), a [`CircularBuffer`]
//! (bounded), or an [`IntrusiveQueue`] (unbounded).

use crate::awaitable::Awaitable;
use crate::buffer::CircularBuffer;
use crate::lock::{Lock, SpinLock};
use crate::queue::IntrusiveQueue;
use std::sync::Arc;

/// Outcome of a non-parking `try_send`/`try_recv` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryStatus {
    /// The channel is closed; the operation cannot succeed now or later.
    Closed,
    /// The operation completed immediately.
    Success,
    /// The operation would have had to park; try-operations never park.
    Failure,
}

struct SenderWaiter<T, L: Lock> {
    value: Option<T>,
    ack: Awaitable<bool, L>,
}

struct ReceiverWaiter<T, L: Lock> {
    slot: Awaitable<Option<T>, L>,
}

enum Variant<T, L: Lock> {
    Unbuffered { senders: IntrusiveQueue<SenderWaiter<T, L>>, receivers: IntrusiveQueue<ReceiverWaiter<T, L>> },
    Bounded { buffer: CircularBuffer<T>, senders: IntrusiveQueue<SenderWaiter<T, L>>, receivers: IntrusiveQueue<ReceiverWaiter<T, L>> },
    Unbounded { queue: IntrusiveQueue<T>, receivers: IntrusiveQueue<ReceiverWaiter<T, L>> },
}

struct Shared<T, L: Lock> {
    lock: L,
    closed: std::cell::UnsafeCell<bool>,
    variant: std::cell::UnsafeCell<Variant<T, L>>,
}

// SAFETY: every access to `closed`/`variant` happens while `lock` is held
// (via `Lock::guard` below).
unsafe impl<T: Send, L: Lock> Send for Shared<T, L> {}
unsafe impl<T: Send, L: Lock> Sync for Shared<T, L> {}

/// A shared handle to one of the three channel variants (spec §3, §4.8-§4.9).
///
/// Cloning a `Channel` yields another handle to the same underlying state;
/// this is how both ends of a channel are distributed to senders/receivers.
pub struct Channel<T, L: Lock = SpinLock> {
    shared: Arc<Shared<T, L>>,
}

impl<T, L: Lock> Clone for Channel<T, L> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<T: Send + 'static, L: Lock> Channel<T, L> {
    fn new(variant: Variant<T, L>) -> Self {
        Self {
            shared: Arc::new(Shared { lock: L::default(), closed: std::cell::UnsafeCell::new(false), variant: std::cell::UnsafeCell::new(variant) }),
        }
    }

    /// Creates an unbuffered (capacity 0) rendezvous channel.
    pub fn unbuffered() -> Self {
        Self::new(Variant::Unbuffered { senders: IntrusiveQueue::new(), receivers: IntrusiveQueue::new() })
    }

    /// Creates a bounded channel with the given fixed capacity (must be ≥ 1).
    pub fn bounded(capacity: usize) -> Self {
        assert!(capacity >= 1, "Channel::bounded capacity must be at least 1");
        Self::new(Variant::Bounded { buffer: CircularBuffer::new(capacity), senders: IntrusiveQueue::new(), receivers: IntrusiveQueue::new() })
    }

    /// Creates an unbounded channel; `send` never parks.
    pub fn unbounded() -> Self {
        Self::new(Variant::Unbounded { queue: IntrusiveQueue::new(), receivers: IntrusiveQueue::new() })
    }

    /// Constructs a channel by capacity, matching the public surface's
    /// `Channel::<T>::make(capacity)`: `0` is unbuffered, `n > 0` is bounded
    /// to `n`, and a negative capacity is unbounded.
    pub fn make(capacity: isize) -> Self {
        match capacity {
            0 => Self::unbuffered(),
            n if n > 0 => Self::bounded(n as usize),
            _ => Self::unbounded(),
        }
    }

    fn is_closed(&self) -> bool {
        let _g = self.shared.lock.guard();
        unsafe { *self.shared.closed.get() }
    }

    /// True once [`close`](Self::close) has been called.
    pub fn closed(&self) -> bool {
        self.is_closed()
    }

    /// Number of messages currently buffered (always 0 for unbuffered channels).
    pub fn size(&self) -> usize {
        let _g = self.shared.lock.guard();
        match unsafe { &*self.shared.variant.get() } {
            Variant::Unbuffered { .. } => 0,
            Variant::Bounded { buffer, .. } => buffer.size(),
            Variant::Unbounded { queue, .. } => queue.len(),
        }
    }

    /// Alias for [`size`](Self::size); matches the public surface's `used()`.
    pub fn used(&self) -> usize {
        self.size()
    }

    /// Sends `v`, returning an awaitable that yields `true` once delivered,
    /// or `false` if the channel was (or becomes) closed first.
    pub fn send(&self, v: T) -> Awaitable<bool, L> {
        let guard = self.shared.lock.guard();
        if unsafe { *self.shared.closed.get() } {
            return Awaitable::ready(false);
        }
        // SAFETY: lock held via `guard`.
        let variant = unsafe { &mut *self.shared.variant.get() };
        match variant {
            Variant::Unbuffered { receivers, .. } => {
                if let Some(r) = receivers.pop_front() {
                    drop(guard);
                    r.slot.resume(Some(v));
                    Awaitable::ready(true)
                } else {
                    let ack = Awaitable::pending();
                    let senders = match variant {
                        Variant::Unbuffered { senders, .. } => senders,
                        _ => unreachable!(),
                    };
                    senders.push_back(SenderWaiter { value: Some(v), ack: ack.clone() });
                    ack
                }
            }
            Variant::Bounded { buffer, receivers, .. } => {
                if !buffer.full() {
                    buffer.push(v);
                    if let Some(r) = receivers.pop_front() {
                        let popped = buffer.pop();
                        drop(guard);
                        r.slot.resume(popped);
                    }
                    Awaitable::ready(true)
                } else {
                    let ack = Awaitable::pending();
                    let senders = match variant {
                        Variant::Bounded { senders, .. } => senders,
                        _ => unreachable!(),
                    };
                    senders.push_back(SenderWaiter { value: Some(v), ack: ack.clone() });
                    ack
                }
            }
            Variant::Unbounded { queue, receivers } => {
                queue.push_back(v);
                if let Some(r) = receivers.pop_front() {
                    let popped = queue.pop_front();
                    drop(guard);
                    r.slot.resume(popped);
                }
                Awaitable::ready(true)
            }
        }
    }

    /// Receives a value, returning an awaitable that yields `Some(v)` on
    /// delivery or `None` once the channel is closed and drained.
    pub fn recv(&self) -> Awaitable<Option<T>, L> {
        let guard = self.shared.lock.guard();
        // SAFETY: lock held via `guard`.
        let variant = unsafe { &mut *self.shared.variant.get() };
        match variant {
            Variant::Unbuffered { senders, .. } => {
                if let Some(mut s) = senders.pop_front() {
                    let value = s.value.take().expect("sender waiter missing value");
                    drop(guard);
                    s.ack.resume(true);
                    return Awaitable::ready(Some(value));
                }
                if unsafe { *self.shared.closed.get() } {
                    return Awaitable::ready(None);
                }
                let slot = Awaitable::pending();
                let receivers = match variant {
                    Variant::Unbuffered { receivers, .. } => receivers,
                    _ => unreachable!(),
                };
                receivers.push_back(ReceiverWaiter { slot: slot.clone() });
                slot
            }
            Variant::Bounded { buffer, senders, .. } => {
                if !buffer.empty() {
                    let value = buffer.pop();
                    if let Some(mut s) = senders.pop_front() {
                        let pushed = s.value.take().expect("sender waiter missing value");
                        buffer.push(pushed);
                        drop(guard);
                        s.ack.resume(true);
                    }
                    return Awaitable::ready(value);
                }
                if unsafe { *self.shared.closed.get() } {
                    return Awaitable::ready(None);
                }
                let slot = Awaitable::pending();
                let receivers = match variant {
                    Variant::Bounded { receivers, .. } => receivers,
                    _ => unreachable!(),
                };
                receivers.push_back(ReceiverWaiter { slot: slot.clone() });
                slot
            }
            Variant::Unbounded { queue, receivers } => {
                if let Some(value) = queue.pop_front() {
                    return Awaitable::ready(Some(value));
                }
                if unsafe { *self.shared.closed.get() } {
                    return Awaitable::ready(None);
                }
                let slot = Awaitable::pending();
                receivers.push_back(ReceiverWaiter { slot: slot.clone() });
                slot
            }
        }
    }

    /// Non-parking send: never suspends, reports its outcome immediately.
    pub fn try_send(&self, v: T) -> TryStatus {
        let guard = self.shared.lock.guard();
        if unsafe { *self.shared.closed.get() } {
            return TryStatus::Closed;
        }
        let variant = unsafe { &mut *self.shared.variant.get() };
        match variant {
            Variant::Unbuffered { receivers, .. } => match receivers.pop_front() {
                Some(r) => {
                    drop(guard);
                    r.slot.resume(Some(v));
                    TryStatus::Success
                }
                None => TryStatus::Failure,
            },
            Variant::Bounded { buffer, receivers, .. } => {
                if buffer.full() {
                    return TryStatus::Failure;
                }
                buffer.push(v);
                if let Some(r) = receivers.pop_front() {
                    let popped = buffer.pop();
                    drop(guard);
                    r.slot.resume(popped);
                }
                TryStatus::Success
            }
            Variant::Unbounded { queue, receivers } => {
                queue.push_back(v);
                if let Some(r) = receivers.pop_front() {
                    let popped = queue.pop_front();
                    drop(guard);
                    r.slot.resume(popped);
                }
                TryStatus::Success
            }
        }
    }

    /// Non-parking receive: never suspends, reports its outcome immediately.
    pub fn try_recv(&self) -> (TryStatus, Option<T>) {
        let guard = self.shared.lock.guard();
        let variant = unsafe { &mut *self.shared.variant.get() };
        match variant {
            Variant::Unbuffered { senders, .. } => match senders.pop_front() {
                Some(mut s) => {
                    let value = s.value.take().expect("sender waiter missing value");
                    drop(guard);
                    s.ack.resume(true);
                    (TryStatus::Success, Some(value))
                }
                None => {
                    let closed = unsafe { *self.shared.closed.get() };
                    (if closed { TryStatus::Closed } else { TryStatus::Failure }, None)
                }
            },
            Variant::Bounded { buffer, senders, .. } => {
                if buffer.empty() {
                    let closed = unsafe { *self.shared.closed.get() };
                    return (if closed { TryStatus::Closed } else { TryStatus::Failure }, None);
                }
                let value = buffer.pop();
                if let Some(mut s) = senders.pop_front() {
                    let pushed = s.value.take().expect("sender waiter missing value");
                    buffer.push(pushed);
                    drop(guard);
                    s.ack.resume(true);
                }
                (TryStatus::Success, Some(value))
            }
            Variant::Unbounded { queue, .. } => match queue.pop_front() {
                Some(value) => (TryStatus::Success, Some(value)),
                None => {
                    let closed = unsafe { *self.shared.closed.get() };
                    (if closed { TryStatus::Closed } else { TryStatus::Failure }, None)
                }
            },
        }
    }

    /// Closes the channel. One-shot and idempotent (spec invariant 5): a
    /// second call observes the same state and does nothing further.
    /// Every currently parked sender/receiver is resumed with its
    /// close-payload (`false`/`None`); buffered data already queued remains
    /// available to future `recv` calls until drained.
    pub fn close(&self) {
        let guard = self.shared.lock.guard();
        // SAFETY: lock held.
        let closed = unsafe { &mut *self.shared.closed.get() };
        if *closed {
            return;
        }
        *closed = true;
        let variant = unsafe { &mut *self.shared.variant.get() };
        let (senders, receivers) = match variant {
            Variant::Unbuffered { senders, receivers } => (Some(std::mem::take(senders)), std::mem::take(receivers)),
            Variant::Bounded { senders, receivers, .. } => (Some(std::mem::take(senders)), std::mem::take(receivers)),
            Variant::Unbounded { receivers, .. } => (None, std::mem::take(receivers)),
        };
        drop(guard);
        if let Some(senders) = senders {
            for s in senders {
                s.ack.resume(false);
            }
        }
        for r in receivers {
            r.slot.resume(None);
        }
    }

    /// Convenience for use from a plain OS thread rather than a task: sends
    /// and blocks the calling thread until delivery, returning whether it
    /// succeeded.
    pub fn send_blocking(&self, v: T) -> bool {
        self.send(v).wait_blocking()
    }

    /// Convenience for use from a plain OS thread rather than a task: blocks
    /// the calling thread until a value is available or the channel closes.
    pub fn recv_blocking(&self) -> Option<T> {
        self.recv().wait_blocking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::SpinLock;

    #[test]
    fn unbuffered_send_then_recv_rendezvous() {
        let ch = Channel::<i32, SpinLock>::unbuffered();
        let ch2 = ch.clone();
        let handle = std::thread::spawn(move || ch2.send_blocking(5));
        assert_eq!(ch.recv_blocking(), Some(5));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn bounded_fast_path_and_parking() {
        let ch = Channel::<i32, SpinLock>::bounded(1);
        assert!(ch.send(1).wait_blocking());
        assert_eq!(ch.try_send(2), TryStatus::Failure);
        assert_eq!(ch.recv().wait_blocking(), Some(1));
    }

    #[test]
    fn unbounded_never_parks_sender() {
        let ch = Channel::<i32, SpinLock>::unbounded();
        for i in 0..100 {
            assert!(ch.send(i).wait_blocking());
        }
        assert_eq!(ch.size(), 100);
        for i in 0..100 {
            assert_eq!(ch.recv().wait_blocking(), Some(i));
        }
    }

    #[test]
    fn close_unblocks_parked_receivers() {
        let ch = Channel::<i32, SpinLock>::unbuffered();
        let waiters: Vec<_> = (0..3).map(|_| ch.clone()).collect();
        let handles: Vec<_> = waiters.into_iter().map(|c| std::thread::spawn(move || c.recv_blocking())).collect();
        std::thread::sleep(std::time::Duration::from_millis(20));
        ch.close();
        for h in handles {
            assert_eq!(h.join().unwrap(), None);
        }
    }

    #[test]
    fn close_is_idempotent() {
        let ch = Channel::<i32, SpinLock>::unbounded();
        ch.close();
        ch.close();
        assert!(ch.closed());
        assert_eq!(ch.recv().wait_blocking(), None);
    }

    #[test]
    fn buffered_recv_drains_after_close() {
        let ch = Channel::<i32, SpinLock>::bounded(4);
        ch.try_send(1);
        ch.try_send(2);
        ch.close();
        assert_eq!(ch.try_send(3), TryStatus::Closed);
        assert_eq!(ch.recv().wait_blocking(), Some(1));
        assert_eq!(ch.recv().wait_blocking(), Some(2));
        assert_eq!(ch.recv().wait_blocking(), None);
    }
}
