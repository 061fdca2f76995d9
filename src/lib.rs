//! `weft` is a single-process coroutine runtime: cooperative, suspendable
//! tasks run across a small pool of operating-system threads, with one
//! uniform suspension mechanism shared by tasks and ordinary threads (an
//! [`Awaitable`]), a cooperative [`scheduler`], a [`channel`] family, and a
//! [`scope`] for joining a dynamically growing set of awaitables.
//!
//! A task is just an `async` block or function; [`scheduler::Scheduler`]
//! drives it to completion on a dedicated OS thread. `Awaitable` is the
//! primitive channels, timers and joins are all built from: it is usable
//! both as a `Future` from inside a task and via a blocking wait from a
//! plain thread.

pub mod buffer;
pub mod channel;
pub mod lock;
pub mod queue;
pub mod scheduler;
pub mod scope;
mod awaitable;
mod global;
mod task;
mod util;

pub use self::awaitable::Awaitable;
pub use self::global::global_scheduler;
pub use self::scheduler::{JoinError, Lifecycle, SchedState, Scheduler, SchedulerConfig};
pub use self::scope::Scope;
pub use self::task::TaskOutcome;
