//! S3, S4 — timer precision and cancellation.

use std::time::{Duration, Instant};
use weft::scheduler::{Scheduler, SchedulerConfig};

#[test]
fn timer_fires_no_earlier_than_its_deadline() {
    let (_lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());
    let start = Instant::now();
    let fired = scheduler.sleep(Duration::from_millis(50)).wait_blocking();
    let elapsed = start.elapsed();
    assert!(fired);
    assert!(elapsed >= Duration::from_millis(50), "fired early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(200), "fired suspiciously late: {:?}", elapsed);
}

#[test]
fn cancel_before_fire_is_fast_and_returns_false() {
    let (_lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());
    let start = Instant::now();
    let (id, awaitable) = scheduler.start(Duration::from_millis(50));
    assert!(scheduler.cancel(id));
    assert_eq!(awaitable.wait_blocking(), false);
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn cancel_returns_false_once_already_fired() {
    let (_lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());
    let (id, awaitable) = scheduler.start(Duration::from_millis(5));
    assert_eq!(awaitable.wait_blocking(), true);
    assert!(!scheduler.cancel(id));
}
