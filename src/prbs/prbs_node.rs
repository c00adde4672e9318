//! A pipeline node that emits a PRBS one bit per call.
//!
//! This is the same register as [`Lfsr`], wrapped so it can feed other nodes
//! over a channel. Bits go out as `u8` values of 0 or 1.

use crate::error::PrbsError;
use crate::prbs::{Feedback, Lfsr, LfsrConfig, TapMask};
use crate::prelude::*;

/// A node that implements an LFSR based PRBS generator.
///
/// # Examples
///
/// ```
/// use prbs_rs::prbs::prbs_node::PrbsNode;
/// use prbs_rs::prbs::StandardPrbs;
///
/// let node: PrbsNode = PrbsNode::new(&StandardPrbs::Prbs7.config(0x7F)).unwrap();
/// ```
#[derive(Node)]
pub struct PrbsNode<F = TapMask>
where
    F: Feedback + Send,
{
    lfsr: Lfsr<F>,
    pub output: NodeSender<u8>,
}

impl<F> PrbsNode<F>
where
    F: Feedback + Send,
{
    pub fn new(config: &LfsrConfig) -> Result<Self, PrbsError> {
        Ok(PrbsNode {
            lfsr: Lfsr::new(config)?,
            output: Default::default(),
        })
    }

    pub fn run(&mut self) -> Result<u8, NodeError> {
        Ok(self.lfsr.step())
    }

    pub fn lfsr(&self) -> &Lfsr<F> {
        &self.lfsr
    }
}

#[cfg(test)]
mod test {
    use crate::prbs::prbs_node::PrbsNode;
    use crate::prbs::{StandardPrbs, TapList};
    use crate::prelude::*;
    use std::thread;

    #[derive(Node)]
    struct CheckNode {
        input: NodeReceiver<u8>,
        state: Vec<u8>,
    }

    impl CheckNode {
        fn new() -> Self {
            CheckNode {
                input: Default::default(),
                state: vec![],
            }
        }

        fn run(&mut self, x: u8) -> Result<(), NodeError> {
            self.state.push(x);
            Ok(())
        }
    }

    #[test]
    // A test to verify the PrbsNode matches the PRBS7 output.
    fn test_prbs_node() {
        let mut mynode: PrbsNode<TapList> =
            PrbsNode::new(&StandardPrbs::Prbs7.config(0x7F)).unwrap();
        let mut check_node = CheckNode::new();
        connect_nodes!(mynode, output, check_node, input);

        let source = thread::spawn(move || {
            for _ in 0..32 {
                mynode.call().unwrap();
            }
            mynode
        });
        let check = thread::spawn(move || {
            for _ in 0..32 {
                check_node.call().unwrap();
            }
            check_node.state
        });

        let mynode = source.join().unwrap();
        let state = check.join().unwrap();
        assert_eq!(
            state,
            vec![
                0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0, 1, 0, 1,
                0, 0, 0, 1, 1, 1, 1, 0, 0, 1, 0
            ]
        );
        assert_eq!(mynode.lfsr().state(), 114);
    }
}
