//! Reference models for verifying PRBS generator/checker datapaths.
//!
//! The crate provides the LFSR sequence in two independently written
//! formulations that cross-check each other, a synchronizing checker that
//! tracks a live bit stream and counts errors, a software loopback DUT, and
//! a clocked testbench that drives fault-injection and resynchronization
//! scenarios against anything implementing [`dut::Dut`].
extern crate crossbeam;

#[macro_use]
pub mod node;
pub mod checker;
pub mod dut;
pub mod error;
pub mod prbs;
pub mod prelude;
pub mod scenario;

pub use crossbeam::channel;
pub use crossbeam::channel::{Receiver, Sender};
pub use error::PrbsError;
