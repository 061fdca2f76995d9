//! Testable property 1 (FIFO within a single sender) checked against a
//! randomized send order rather than a single fixed sequence, so the
//! property is exercised across more than one arbitrarily-chosen ordering.

mod common;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use weft::channel::Channel;
use weft::lock::SpinLock;

#[test]
fn fifo_preserved_regardless_of_which_random_order_values_are_sent_in() {
    common::init_tracing();

    let mut rng = rand::rngs::StdRng::seed_from_u64(0xC0FFEE);
    for _ in 0..20 {
        let mut values: Vec<i32> = (0..50).collect();
        values.shuffle(&mut rng);

        let channel = Channel::<i32, SpinLock>::unbounded();
        for &v in &values {
            channel.send_blocking(v);
        }
        let mut received = Vec::with_capacity(values.len());
        for _ in 0..values.len() {
            received.push(channel.recv_blocking().unwrap());
        }
        assert_eq!(received, values, "unbounded channel must preserve a single sender's order");
    }
}
