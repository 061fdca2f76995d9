//! The process-wide fallback scheduler (spec §4.4 "Fallback").
//!
//! Used when an awaitable is constructed outside of any task — nothing to
//! capture a destination from — and as a convenient default scheduler for
//! call sites that do not need a dedicated one.

use crate::scheduler::{Lifecycle, Scheduler, SchedulerConfig};
use once_cell::sync::OnceCell;

struct Global {
    // Kept alive for the process's lifetime; never dropped deliberately, so
    // the global scheduler never observes its lifecycle halt.
    _lifecycle: Lifecycle,
    scheduler: Scheduler,
}

static GLOBAL: OnceCell<Global> = OnceCell::new();

fn global() -> &'static Global {
    GLOBAL.get_or_init(|| {
        let (lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default().block_workers_reuse_cap(4));
        Global { _lifecycle: lifecycle, scheduler }
    })
}

/// The process-wide scheduler, lazily spawned on first access.
pub fn global_scheduler() -> Scheduler {
    global().scheduler.clone()
}
