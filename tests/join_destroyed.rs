//! S6 — joining a task whose frame is destroyed un-completed fails with a
//! structured error carrying the frame's address.

use weft::scheduler::{JoinError, Scheduler, SchedulerConfig};
use weft::Awaitable;

#[test]
fn destroyed_frame_fails_the_joiner_with_its_address() {
    let (lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());

    let never_resumed: Awaitable<()> = Awaitable::pending();
    let joined = scheduler.join(async move {
        never_resumed.await;
    });

    // Give the task a chance to actually park before tearing the scheduler
    // down underneath it.
    std::thread::sleep(std::time::Duration::from_millis(20));
    drop(lifecycle);

    match joined.wait_blocking() {
        Err(JoinError::Destroyed { frame_addr, .. }) => assert_ne!(frame_addr, 0),
        other => panic!("expected Destroyed, got a different outcome: {}", other.is_ok()),
    }
}

#[test]
fn join_after_lifecycle_already_dropped_fails_immediately() {
    let (lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());
    drop(lifecycle);
    match scheduler.join(async { 1 }).wait_blocking() {
        Err(JoinError::SchedulerHalted) => {}
        other => panic!("expected SchedulerHalted, got: {}", other.is_ok()),
    }
}
