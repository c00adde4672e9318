#[macro_use]
extern crate prbs_rs;

use prbs_rs::checker::checker_node::{BitFlipNode, CheckerNode};
use prbs_rs::checker::{Checker, Counters, TrackingPolicy};
use prbs_rs::prbs::prbs_node::PrbsNode;
use prbs_rs::prbs::{StandardPrbs, TapMask};
use prbs_rs::prelude::*;
use std::time::Instant;

fn main() {
    env_logger::init();

    let config = StandardPrbs::Prbs23.config(0x7F_FFFF);
    let mut source: PrbsNode<TapMask> = PrbsNode::new(&config).unwrap();
    let mut channel_errors =
        BitFlipNode::new((1..=10).map(|i| i * 100_000).collect());
    let checker = Checker::new(&config, TrackingPolicy::Autonomous).unwrap();
    let mut check = CheckerNode::new(checker);

    let (send, counters) = channel::bounded(1);
    check.output.push((send, None));
    connect_nodes!(source, output, channel_errors, input);
    connect_nodes!(channel_errors, output, check, input);
    start_nodes!(source, channel_errors, check);

    let start = Instant::now();
    let mut last = Counters::default();
    for _ in 0..1_500_000 {
        last = counters.recv().unwrap();
    }
    println!(
        "{} bits in {:?}: {} errors, BER {:e}",
        last.data_count,
        start.elapsed(),
        last.error_count,
        last.bit_error_rate()
    );
}
