//! Small shared helpers: building a [`Waker`] from an `Arc<dyn DynamicWake>`.
//!
//! Grounded in the teacher's `utils::to_waker`/`DynamicWake` pattern, kept
//! essentially verbatim since it is already the idiomatic way to turn an
//! arbitrary `Arc`-shared wake action into a `std::task::Waker` without
//! reaching for a crate.

use std::mem;
use std::ptr::null;
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Implement this to be wakeable via [`to_waker`].
pub trait DynamicWake {
    /// Performs the waking action.
    fn wake(&self);
}

/// Converts an `Arc<T>` into a [`Waker`] that calls `T::wake` on
/// `wake`/`wake_by_ref`, cloning/dropping the `Arc` as the `Waker` is
/// cloned/dropped.
pub fn to_waker<T: DynamicWake + Send + Sync + 'static>(ptr: Arc<T>) -> Waker {
    let data = Arc::into_raw(ptr) as *const ();
    let vtable = &Helper::<T>::VTABLE;
    unsafe { Waker::from_raw(RawWaker::new(data, vtable)) }
}

/// A waker that does nothing when woken, for tests and synchronous polling.
pub fn noop_waker() -> Waker {
    unsafe { Waker::from_raw(RawWaker::new(null(), &NOOP_WAKER_VTABLE)) }
}
fn noop_clone(_: *const ()) -> RawWaker {
    RawWaker::new(null(), &NOOP_WAKER_VTABLE)
}
fn noop_dummy(_: *const ()) {}
static NOOP_WAKER_VTABLE: RawWakerVTable = RawWakerVTable::new(noop_clone, noop_dummy, noop_dummy, noop_dummy);

struct Helper<T>(T);
impl<T: DynamicWake + Send + Sync + 'static> Helper<T> {
    const VTABLE: RawWakerVTable =
        RawWakerVTable::new(Self::waker_clone, Self::waker_wake, Self::waker_wake_by_ref, Self::waker_drop);

    unsafe fn waker_clone(ptr: *const ()) -> RawWaker {
        let arc = mem::ManuallyDrop::new(Arc::from_raw(ptr as *const T));
        mem::forget(arc.clone());
        RawWaker::new(ptr, &Self::VTABLE)
    }
    unsafe fn waker_wake(ptr: *const ()) {
        let arc = Arc::from_raw(ptr as *const T);
        arc.wake();
    }
    unsafe fn waker_wake_by_ref(ptr: *const ()) {
        let arc = mem::ManuallyDrop::new(Arc::from_raw(ptr as *const T));
        arc.wake();
    }
    unsafe fn waker_drop(ptr: *const ()) {
        mem::drop(Arc::from_raw(ptr as *const T));
    }
}
