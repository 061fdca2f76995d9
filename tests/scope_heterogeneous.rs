//! S7 — a scope over a heterogeneous mix of join/sleep awaitables completes
//! exactly once, after every added awaitable has individually completed, and
//! no value escapes the scope.

use std::time::Duration;
use weft::scheduler::{Scheduler, SchedulerConfig};
use weft::Scope;

#[test]
fn completes_once_after_every_heterogeneous_member_finishes() {
    let (_lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());

    let scope = Scope::new(&scheduler);

    let s1 = scheduler.clone();
    scope.add(async move { assert_eq!(s1.join(async { 1_i32 }).await.unwrap(), 1) });

    let s2 = scheduler.clone();
    scope.add(async move { assert_eq!(s2.join(async { "two" }).await.unwrap(), "two") });

    let s3 = scheduler.clone();
    scope.add(async move { assert_eq!(s3.join(async { vec![1u8, 2, 3] }).await.unwrap(), vec![1, 2, 3]) });

    let s4 = scheduler.clone();
    scope.add(async move { s4.sleep(Duration::from_millis(10)).await });

    let s5 = scheduler.clone();
    scope.add(async move { s5.sleep(Duration::from_millis(30)).await });

    scope.r#await().wait_blocking();
}

#[test]
fn scheduler_scope_convenience_wraps_the_same_pattern() {
    let (_lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());
    let s2 = scheduler.clone();
    let s3 = scheduler.clone();
    let tasks: Vec<std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>> = vec![
        Box::pin(async move { s2.sleep(Duration::from_millis(5)).await; }),
        Box::pin(async move { assert_eq!(s3.join(async { 7 }).await.unwrap(), 7); }),
    ];
    scheduler.scope(tasks).wait_blocking();
}
