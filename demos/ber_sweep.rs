#[macro_use]
extern crate prbs_rs;

use prbs_rs::checker::checker_node::CheckerNode;
use prbs_rs::checker::{Checker, Counters, TrackingPolicy};
use prbs_rs::prbs::prbs_node::PrbsNode;
use prbs_rs::prbs::{StandardPrbs, TapMask};
use prbs_rs::prelude::*;
use rand::{FromEntropy, Rng, StdRng};

fn main() {
    env_logger::init();

    /// Flips each bit independently with probability `p`.
    #[derive(Node)]
    struct NoisyChannel {
        input: NodeReceiver<u8>,
        p: f64,
        rng: StdRng,
        output: NodeSender<u8>,
    }

    impl NoisyChannel {
        fn new(p: f64) -> Self {
            NoisyChannel {
                input: Default::default(),
                p,
                rng: StdRng::from_entropy(),
                output: Default::default(),
            }
        }

        fn run(&mut self, bit: u8) -> Result<u8, NodeError> {
            if self.rng.gen_range(0.0, 1.0) < self.p {
                Ok(bit ^ 1)
            } else {
                Ok(bit)
            }
        }
    }

    let config = StandardPrbs::Prbs15.config(0x7FFF);
    let samples = 200_000;
    println!("{:>10} {:>10} {:>12} {:>12}", "p", "errors", "autonomous", "stream");

    for &p in [1e-4, 1e-3, 1e-2, 5e-2].iter() {
        let mut row = Vec::new();
        for &policy in [TrackingPolicy::Autonomous, TrackingPolicy::StreamDriven].iter() {
            let mut source: PrbsNode<TapMask> = PrbsNode::new(&config).unwrap();
            let mut noise = NoisyChannel::new(p);
            let mut check = CheckerNode::new(Checker::new(&config, policy).unwrap());
            let (send, recv) = channel::bounded(1);
            check.output.push((send, None));
            connect_nodes!(source, output, noise, input);
            connect_nodes!(noise, output, check, input);

            // Stepped on one thread so every run sees exactly `samples` bits.
            let mut last = Counters::default();
            for _ in 0..samples {
                source.call().unwrap();
                noise.call().unwrap();
                check.call().unwrap();
                last = recv.recv().unwrap();
            }
            row.push(last);
        }
        println!(
            "{:>10.0e} {:>10} {:>12.3e} {:>12.3e}",
            p,
            row[0].error_count,
            row[0].bit_error_rate(),
            row[1].bit_error_rate()
        );
    }
}
