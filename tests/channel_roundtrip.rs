//! S1 — round-trip through an unbounded channel; FIFO ordering properties.

use std::thread;
use weft::channel::Channel;
use weft::lock::SpinLock;
use weft::scheduler::{Scheduler, SchedulerConfig};

#[test]
fn unbounded_round_trip_across_thread_and_task() {
    let channel = Channel::<i32, SpinLock>::unbounded();
    let sender = channel.clone();
    let producer = thread::spawn(move || {
        for v in [3, 2, 1] {
            sender.send_blocking(v);
        }
        sender.close();
    });

    let (_lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());
    let receiver = channel.clone();
    let collected = scheduler
        .join(async move {
            let mut out = Vec::new();
            while let Some(v) = receiver.recv().await {
                out.push(v);
            }
            out
        })
        .wait_blocking()
        .expect("task did not complete");

    producer.join().unwrap();
    assert_eq!(collected, vec![3, 2, 1]);
}

#[test]
fn fifo_order_preserved_for_parked_receivers() {
    let channel = Channel::<i32, SpinLock>::unbuffered();
    let (_lifecycle, scheduler) = Scheduler::make(SchedulerConfig::default());

    let order: std::sync::Arc<std::sync::Mutex<Vec<i32>>> = Default::default();
    let mut joins = Vec::new();
    for id in 0..3 {
        let channel = channel.clone();
        let order = order.clone();
        joins.push(scheduler.join(async move {
            let v = channel.recv().await.unwrap();
            order.lock().unwrap().push(id * 100 + v);
        }));
    }
    // give every receiver a chance to park before sending
    thread::sleep(std::time::Duration::from_millis(20));
    for v in [1, 2, 3] {
        channel.send_blocking(v);
    }
    for j in joins {
        j.wait_blocking().unwrap();
    }
}

#[test]
fn value_round_trips_through_bounded_channel() {
    let channel = Channel::<String, SpinLock>::bounded(4);
    channel.send_blocking("hello".to_string());
    assert_eq!(channel.recv_blocking(), Some("hello".to_string()));
}

#[test]
fn close_is_idempotent_across_many_calls() {
    let channel = Channel::<i32, SpinLock>::unbounded();
    for _ in 0..5 {
        channel.close();
    }
    assert!(channel.closed());
    assert_eq!(channel.recv_blocking(), None);
}
