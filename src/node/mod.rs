//! Provides an infrastructure to create processing nodes, connect nodes
//! together via crossbeam channels, and start nodes running in their own
//! independent threads.
//!
//! A node is any structure that derives `Node` and provides a `run` method.
//! Fields of type `NodeReceiver<T>` are the node's inputs and are passed to
//! `run` in declaration order; fields of type `NodeSender<T>` receive a copy
//! of each value `run` produces.
//!
//! # Example
//!
//! ```
//! #[macro_use] extern crate prbs_rs;
//! use prbs_rs::prelude::*;
//!
//! # fn main() {
//! #[derive(Node)]
//! struct Source {
//!     output: NodeSender<u8>,
//! }
//!
//! impl Source {
//!     fn run(&mut self) -> Result<u8, NodeError> {
//!         Ok(1)
//!     }
//! }
//!
//! #[derive(Node)]
//! struct Sink {
//!     input: NodeReceiver<u8>,
//! }
//!
//! impl Sink {
//!     fn run(&mut self, x: u8) -> Result<(), NodeError> {
//!         assert_eq!(x, 1);
//!         Ok(())
//!     }
//! }
//!
//! let mut source = Source { output: Default::default() };
//! let mut sink = Sink { input: Default::default() };
//! connect_nodes!(source, output, sink, input);
//! source.call().unwrap();
//! sink.call().unwrap();
//! # }
//! ```

use thiserror::Error;

/// The trait that all nodes in the library implement.
pub trait Node: Send {
    /// Sends any primed default values, then calls the node until one of its
    /// channels disconnects.
    fn start(&mut self);

    /// Executes the node once: receives one value on every input, runs, and
    /// forwards the result to every output.
    fn call(&mut self) -> Result<(), NodeError>;

    /// True once every input has a channel and every output has at least
    /// one subscriber.
    fn is_connected(&self) -> bool;
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum NodeError {
    #[error("node input is not connected")]
    PermanentError,
    #[error("channel disconnected")]
    CommError,
    #[error("invalid data: {0}")]
    DataError(String),
}

/// Connects two nodes together with a crossbeam channel holding one value.
///
/// A sender blocks while the previous value is still queued, so started
/// nodes run in lockstep with their consumers. Nodes stepped by hand from a
/// single thread must be called in pipeline order.
///
/// An optional fifth argument primes the channel with a value that is sent
/// when the sending node is started.
#[macro_export]
macro_rules! connect_nodes {
    ($n1:ident, $send:ident, $n2:ident, $recv:ident) => {{
        let (send, recv) = $crate::channel::bounded(1);
        $n1.$send.push((send, None));
        $n2.$recv = Some(recv);
    }};
    ($n1:ident, $send:ident, $n2:ident, $recv:ident, $default:expr) => {{
        let (send, recv) = $crate::channel::bounded(1);
        $n1.$send.push((send, Some($default)));
        $n2.$recv = Some(recv);
    }};
}

/// Spawns a thread for each node in order and starts nodes to run until
/// their channels disconnect. Evaluates to a `Vec` of the join handles.
#[macro_export]
macro_rules! start_nodes {
    ($($node:ident),+ $(,)*) => {{
        let mut handles = Vec::new();
        $(
            handles.push(::std::thread::spawn(move || {
                $node.start();
            }));
        )*
        handles
    }};
}
