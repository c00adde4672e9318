//! A discrete clock driver for anything implementing [`Dut`].
//!
//! Time only moves when [`Testbench::tick`] is called. Waiting for a number
//! of intervals or for a wall-clock-equivalent duration both come down to a
//! bounded number of ticks, so the order of observed bits is exactly the
//! order of ticks.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::dut::{Dut, Inputs, Outputs};
use crate::error::PrbsError;
use crate::scenario::trace::{SignalTrace, TraceRecord};

/// How long to hold a signal or wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hold {
    Intervals(u64),
    /// Simulated time in nanoseconds, rounded up to whole clock periods.
    Nanos(u64),
}

impl Hold {
    pub fn micros(us: u64) -> Hold {
        Hold::Nanos(us * 1_000)
    }
}

/// The pattern driven onto `data_req`, indexed by clock interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataReq {
    /// High on every interval.
    Always,
    /// High for the first `high` intervals of every `period`.
    Divided { period: u64, high: u64 },
}

impl Default for DataReq {
    fn default() -> Self {
        DataReq::Always
    }
}

impl DataReq {
    pub fn level(&self, interval: u64) -> bool {
        match *self {
            DataReq::Always => true,
            DataReq::Divided { period, high } => interval % period < high,
        }
    }

    /// Intervals per repetition of the pattern.
    pub fn period(&self) -> u64 {
        match *self {
            DataReq::Always => 1,
            DataReq::Divided { period, .. } => period,
        }
    }

    /// Upper bound on the intervals needed to move `samples` bits.
    pub fn intervals_for(&self, samples: u64) -> u64 {
        samples.saturating_add(1).saturating_mul(self.period())
    }

    pub fn validate(&self) -> Result<(), PrbsError> {
        match *self {
            DataReq::Always => Ok(()),
            DataReq::Divided { period, high } => {
                if period == 0 || high == 0 || high > period {
                    Err(PrbsError::Config(format!(
                        "data_req pattern needs 0 < high <= period, got high {} period {}",
                        high, period
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }
}

pub struct Testbench<D> {
    dut: D,
    inputs: Inputs,
    data_req: DataReq,
    clock_period_ns: u64,
    interval: u64,
    data_req_enabled: bool,
    last_data_req: bool,
    outputs: Outputs,
    trace: Option<SignalTrace>,
}

impl<D: Dut> Testbench<D> {
    pub fn new(dut: D, clock_period_ns: u64, data_req: DataReq) -> Self {
        let outputs = dut.outputs();
        Testbench {
            dut,
            inputs: Inputs::default(),
            data_req,
            clock_period_ns: clock_period_ns.max(1),
            interval: 0,
            data_req_enabled: true,
            last_data_req: false,
            outputs,
            trace: None,
        }
    }

    /// Records every interval from now on.
    pub fn set_trace(&mut self, trace: SignalTrace) {
        self.trace = Some(trace);
    }

    pub fn take_trace(&mut self) -> Option<SignalTrace> {
        self.trace.take()
    }

    /// While disabled, `data_req` is held low regardless of the pattern.
    pub fn set_data_req_enabled(&mut self, enabled: bool) {
        self.data_req_enabled = enabled;
    }

    /// Inputs to drive on the next ticks. `data_req` is overwritten from
    /// the pattern on every tick.
    pub fn inputs_mut(&mut self) -> &mut Inputs {
        &mut self.inputs
    }

    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    /// Advances one clock interval and returns the sampled outputs.
    pub fn tick(&mut self) -> Outputs {
        self.inputs.data_req = self.data_req_enabled && self.data_req.level(self.interval);
        self.last_data_req = self.inputs.data_req;
        self.dut.apply(&self.inputs);
        self.dut.clock();
        self.interval += 1;
        self.outputs = self.dut.outputs();
        trace!(
            "interval {}: data_count {} error_count {} lfsr {:#x}",
            self.interval,
            self.outputs.data_count,
            self.outputs.error_count,
            self.outputs.lfsr
        );
        if let Some(trace) = self.trace.as_mut() {
            trace.record(TraceRecord {
                interval: self.interval,
                inputs: self.inputs,
                outputs: self.outputs,
            });
        }
        self.outputs
    }

    /// Number of ticks `hold` lasts; never less than one.
    pub fn intervals(&self, hold: Hold) -> u64 {
        let n = match hold {
            Hold::Intervals(n) => n,
            Hold::Nanos(ns) => (ns + self.clock_period_ns - 1) / self.clock_period_ns,
        };
        n.max(1)
    }

    /// Ticks for the length of `hold` and returns the last outputs.
    pub fn wait(&mut self, hold: Hold) -> Outputs {
        for _ in 0..self.intervals(hold) {
            self.tick();
        }
        self.outputs
    }

    /// Intervals elapsed since the testbench was created.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Whether `data_req` was high on the last tick.
    pub fn last_data_req(&self) -> bool {
        self.last_data_req
    }

    pub fn outputs(&self) -> Outputs {
        self.outputs
    }

    pub fn data_req(&self) -> DataReq {
        self.data_req
    }

    pub fn dut(&self) -> &D {
        &self.dut
    }

    pub fn into_dut(self) -> D {
        self.dut
    }
}
