//! S2 — closing an unbuffered channel unblocks every parked receiver, and no
//! task leaks or deadlocks the scheduler's lifecycle.

use std::time::Duration;
use weft::channel::Channel;
use weft::lock::SpinLock;
use weft::scheduler::{Scheduler, SchedulerConfig};

#[test]
fn close_unblocks_all_parked_receivers() {
    let channel = Channel::<i32, SpinLock>::unbuffered();
    let (lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());

    let mut receivers = Vec::new();
    for _ in 0..3 {
        let channel = channel.clone();
        receivers.push(scheduler.join(async move { channel.recv().await }));
    }

    let closer_channel = channel.clone();
    let closer = scheduler.join(async move {
        closer_channel.close();
    });
    closer.wait_blocking().unwrap();

    for r in receivers {
        assert_eq!(r.wait_blocking().unwrap(), None);
    }

    drop(lifecycle); // must return promptly; nothing left parked
}

#[test]
fn close_mid_send_reports_failure_to_parked_sender() {
    let channel = Channel::<i32, SpinLock>::unbuffered();
    let (_lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());

    let sender_channel = channel.clone();
    let sender = scheduler.join(async move { sender_channel.send(1).await });

    std::thread::sleep(Duration::from_millis(20));
    channel.close();

    assert_eq!(sender.wait_blocking().unwrap(), false);
}
