//! Pipeline nodes around the checker: a sink that checks bits as they
//! arrive, and a channel stage that corrupts chosen bits on the way through.

use crate::checker::{Checker, Counters};
use crate::prelude::*;

/// Checks each received bit and sends out the running counters.
///
/// # Examples
///
/// ```
/// use prbs_rs::checker::checker_node::CheckerNode;
/// use prbs_rs::checker::{Checker, TrackingPolicy};
/// use prbs_rs::prbs::StandardPrbs;
///
/// let config = StandardPrbs::Prbs13.config(0x2);
/// let checker = Checker::new(&config, TrackingPolicy::Autonomous).unwrap();
/// let node = CheckerNode::new(checker);
/// ```
#[derive(Node)]
pub struct CheckerNode {
    pub input: NodeReceiver<u8>,
    checker: Checker,
    pub output: NodeSender<Counters>,
}

impl CheckerNode {
    pub fn new(checker: Checker) -> Self {
        CheckerNode {
            input: Default::default(),
            checker,
            output: Default::default(),
        }
    }

    pub fn run(&mut self, bit: u8) -> Result<Counters, NodeError> {
        if bit > 1 {
            return Err(NodeError::DataError(format!("{} is not a bit", bit)));
        }
        self.checker.observe(bit);
        Ok(self.checker.counters())
    }

    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    pub fn checker_mut(&mut self) -> &mut Checker {
        &mut self.checker
    }
}

/// Passes bits through, inverting the ones whose position in the stream
/// (counting from zero) is listed.
#[derive(Node)]
pub struct BitFlipNode {
    pub input: NodeReceiver<u8>,
    flips: Vec<u64>,
    index: u64,
    pub output: NodeSender<u8>,
}

impl BitFlipNode {
    pub fn new(mut flips: Vec<u64>) -> Self {
        flips.sort_unstable();
        flips.dedup();
        BitFlipNode {
            input: Default::default(),
            flips,
            index: 0,
            output: Default::default(),
        }
    }

    pub fn run(&mut self, bit: u8) -> Result<u8, NodeError> {
        let flip = self.flips.binary_search(&self.index).is_ok();
        self.index += 1;
        Ok(if flip { bit ^ 1 } else { bit })
    }
}

#[cfg(test)]
mod test {
    use crate::checker::checker_node::{BitFlipNode, CheckerNode};
    use crate::checker::{Checker, Counters, TrackingPolicy};
    use crate::prbs::prbs_node::PrbsNode;
    use crate::prbs::{StandardPrbs, TapMask};
    use crate::prelude::*;

    #[test]
    // Source, fault stage and checker stepped in order on one thread.
    fn test_pipeline_single_thread() {
        let config = StandardPrbs::Prbs9.config(0x1FF);
        let mut source: PrbsNode<TapMask> = PrbsNode::new(&config).unwrap();
        let mut flip = BitFlipNode::new(vec![1_000, 2_000, 1_000]);
        let mut check = CheckerNode::new(
            Checker::new(&config, TrackingPolicy::Autonomous).unwrap(),
        );
        let (send, recv) = channel::unbounded();
        check.output.push((send, None));

        connect_nodes!(source, output, flip, input);
        connect_nodes!(flip, output, check, input);
        for _ in 0..3_000 {
            source.call().unwrap();
            flip.call().unwrap();
            check.call().unwrap();
        }

        let last = recv.try_iter().last().unwrap();
        assert_eq!(
            last,
            Counters {
                data_count: 3_000,
                error_count: 2
            }
        );
    }

    #[test]
    fn test_pipeline_threaded() {
        let config = StandardPrbs::Prbs15.config(0x1);
        let mut source: PrbsNode<TapMask> = PrbsNode::new(&config).unwrap();
        let mut flip = BitFlipNode::new(vec![10]);
        let mut check = CheckerNode::new(
            Checker::new(&config, TrackingPolicy::Autonomous).unwrap(),
        );
        let (send, recv) = channel::bounded(1);
        check.output.push((send, None));
        connect_nodes!(source, output, flip, input);
        connect_nodes!(flip, output, check, input);

        start_nodes!(source, flip, check);
        let mut counters = Counters::default();
        for _ in 0..5_000 {
            counters = recv.recv().unwrap();
        }
        drop(recv);
        assert_eq!(counters.data_count, 5_000);
        assert_eq!(counters.error_count, 1);
    }

    #[test]
    fn test_non_bit_is_data_error() {
        let config = StandardPrbs::Prbs7.config(0x7F);
        let mut check = CheckerNode::new(
            Checker::new(&config, TrackingPolicy::Autonomous).unwrap(),
        );
        assert!(check.run(0).is_ok());
        match check.run(2) {
            Err(NodeError::DataError(_)) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(check.checker().counters().data_count, 1);
    }
}
