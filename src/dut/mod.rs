//! The signal-level boundary with the device under test.
//!
//! A DUT is driven once per clock interval: the testbench sets every input
//! with [`Dut::apply`], raises the clock with [`Dut::clock`], and samples
//! [`Dut::outputs`]. [`LoopbackDut`] is a software DUT that wires a PRBS
//! generator, an error inserter and a [`Checker`] back to back, so the whole
//! protocol can be exercised without a simulator.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::checker::{Checker, CheckerInputs, Counters, TrackingPolicy};
use crate::error::PrbsError;
use crate::prbs::{Lfsr, LfsrConfig, TapMask, Taps};

/// Inputs sampled on each rising clock edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inputs {
    /// While high, the generator and the checker shadow load
    /// `initial_state` and `polynomial`, and no data moves.
    pub init: bool,
    pub initial_state: u64,
    /// Feedback tap bitmask.
    pub polynomial: u64,
    /// A rising edge flips one transmitted bit.
    pub error_insert: bool,
    /// Lane mask for `error_insert`; the serial lane is bit 0.
    pub error_mask: u64,
    /// High selects the PRBS generator, low passes `data_in` through.
    pub prbs_sel: bool,
    pub data_in: u8,
    /// One bit moves on every interval this is high.
    pub data_req: bool,
    pub sync: bool,
    pub count_reset: bool,
}

/// Outputs valid after each rising clock edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outputs {
    /// Generator register contents.
    pub lfsr: u64,
    pub data_count: u64,
    pub error_count: u64,
}

impl Outputs {
    pub fn counters(&self) -> Counters {
        Counters {
            data_count: self.data_count,
            error_count: self.error_count,
        }
    }
}

/// Anything the testbench can clock.
pub trait Dut {
    /// Drives the inputs for the next rising edge.
    fn apply(&mut self, inputs: &Inputs);

    /// One rising edge of `clk`.
    fn clock(&mut self);

    fn outputs(&self) -> Outputs;
}

/// Flips one transmitted bit for each rising edge of `error_insert`,
/// however long the level is held.
#[derive(Clone, Debug, Default)]
pub struct ErrorInserter {
    level: bool,
    armed: bool,
    inserted: u64,
}

impl ErrorInserter {
    /// Samples the `error_insert` level; a rising edge arms one flip.
    pub fn sample(&mut self, level: bool) {
        if level && !self.level {
            self.armed = true;
        }
        self.level = level;
    }

    /// Passes `bit` through, consuming an armed flip. The flip only lands
    /// when the serial lane is selected in `error_mask`.
    pub fn apply(&mut self, bit: u8, error_mask: u64) -> u8 {
        if self.armed {
            self.armed = false;
            if error_mask & 1 == 1 {
                self.inserted += 1;
                return bit ^ 1;
            }
        }
        bit
    }

    /// Number of bits actually flipped.
    pub fn inserted(&self) -> u64 {
        self.inserted
    }
}

/// Generator, error inserter and checker connected back to back.
#[derive(Clone, Debug)]
pub struct LoopbackDut {
    inputs: Inputs,
    generator: Lfsr<TapMask>,
    inserter: ErrorInserter,
    checker: Checker,
    last_bit: Option<u8>,
}

impl LoopbackDut {
    pub fn new(config: &LfsrConfig, policy: TrackingPolicy) -> Result<Self, PrbsError> {
        Ok(LoopbackDut {
            inputs: Inputs::default(),
            generator: Lfsr::new(config)?,
            inserter: ErrorInserter::default(),
            checker: Checker::new(config, policy)?,
            last_bit: None,
        })
    }

    /// The bit that crossed the link on the last clock, if any.
    pub fn last_bit(&self) -> Option<u8> {
        self.last_bit
    }

    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    pub fn inserted_errors(&self) -> u64 {
        self.inserter.inserted()
    }
}

impl Dut for LoopbackDut {
    fn apply(&mut self, inputs: &Inputs) {
        self.inputs = *inputs;
    }

    fn clock(&mut self) {
        let inputs = self.inputs;
        if inputs.init {
            self.generator.load(inputs.initial_state);
            self.generator
                .set_taps(&Taps::Mask(inputs.polynomial & self.generator.mask()));
            self.checker.load_polynomial(inputs.polynomial);
        }

        self.inserter.sample(inputs.error_insert);
        let bit = if !inputs.init && inputs.data_req {
            let raw = if inputs.prbs_sel {
                self.generator.step()
            } else {
                inputs.data_in & 1
            };
            Some(self.inserter.apply(raw, inputs.error_mask))
        } else {
            None
        };

        self.checker.control(&CheckerInputs {
            init: inputs.init,
            initial_state: inputs.initial_state,
            sync: inputs.sync,
            count_reset: inputs.count_reset,
        });
        if let Some(bit) = bit {
            let sample = self.checker.observe(bit);
            trace!("bit {} -> {:?}", bit, sample);
        }
        self.last_bit = bit;
    }

    fn outputs(&self) -> Outputs {
        let counters = self.checker.counters();
        Outputs {
            lfsr: self.generator.state(),
            data_count: counters.data_count,
            error_count: counters.error_count,
        }
    }
}
