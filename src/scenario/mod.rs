//! Fault-injection and resynchronization scenarios.
//!
//! A [`Scenario`] drives a [`Dut`] through the phases of a loopback
//! bring-up: start-up, a reference-monitored run, clean runs, injected
//! faults followed by `sync` or `count_reset` recovery, and a final soak to
//! counter rollover. Every phase is bounded; the first property that breaks
//! aborts the run with the interval at which it broke.

pub mod testbench;
pub mod trace;

use std::fmt;
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::checker::{Counters, TrackingPolicy};
use crate::dut::{Dut, LoopbackDut, Outputs};
use crate::error::PrbsError;
use crate::prbs::reference::ReferenceModel;
use crate::prbs::{maximal_period, LfsrConfig, StandardPrbs, TapList, Taps};

pub use self::testbench::{DataReq, Hold, Testbench};
pub use self::trace::{SignalTrace, TraceRecord};

/// Parameters of one scenario run. Missing TOML fields fall back to the
/// PRBS13 preset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub name: String,
    pub length: u32,
    pub taps: Taps,
    pub seed: u64,
    pub policy: TrackingPolicy,
    pub clock_period_ns: u64,
    pub data_req: DataReq,
    /// How long `init`, `sync` and `count_reset` are held at start-up.
    pub startup: Hold,
    /// Samples checked against the reference model after start-up.
    pub monitor_samples: u64,
    /// Samples in each clean phase.
    pub clean_samples: u64,
    /// How long `error_insert` is held; used in turn for each fault.
    pub fault_holds: Vec<Hold>,
    pub sync_holds: Vec<Hold>,
    pub reset_holds: Vec<Hold>,
    /// Intervals allowed between raising `error_insert` and a nonzero
    /// `error_count`. Defaults to one `data_req` period plus one.
    pub detect_window: Option<u64>,
    /// Samples to let a fault's error burst drain before recovering.
    /// Defaults to none for `Autonomous`, `length + 1` for `StreamDriven`.
    pub burst_window: Option<u64>,
    /// Samples allowed for `error_count` to read zero after a release.
    /// Defaults to twice the register length.
    pub recovery_window: Option<u64>,
    /// Soak target for `data_count`; the full period when unset.
    pub soak_samples: Option<u64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig::prbs13()
    }
}

impl ScenarioConfig {
    /// 13-bit register, taps {12,11,1,0}, seed 0x2, soaked over the full
    /// 8191-bit period.
    pub fn prbs13() -> Self {
        ScenarioConfig {
            name: "prbs13".to_string(),
            length: 13,
            taps: StandardPrbs::Prbs13.taps(),
            seed: 0x2,
            policy: TrackingPolicy::Autonomous,
            clock_period_ns: 10,
            data_req: DataReq::Always,
            startup: Hold::micros(1),
            monitor_samples: 8_191,
            clean_samples: 10_000,
            fault_holds: vec![Hold::Intervals(1), Hold::micros(10)],
            sync_holds: vec![Hold::Intervals(1), Hold::Intervals(100)],
            reset_holds: vec![Hold::Intervals(1), Hold::Intervals(100)],
            detect_window: None,
            burst_window: None,
            recovery_window: None,
            soak_samples: None,
        }
    }

    /// 31-bit register, taps {30,27}, seed 0x7FFF0000. The soak stops after
    /// a million samples; set `soak_samples` to `None` for all 2^31 - 1.
    pub fn prbs31() -> Self {
        ScenarioConfig {
            name: "prbs31".to_string(),
            length: 31,
            taps: StandardPrbs::Prbs31.taps(),
            seed: 0x7FFF_0000,
            monitor_samples: 10_000,
            sync_holds: vec![Hold::Intervals(1), Hold::micros(10)],
            reset_holds: vec![Hold::Intervals(1), Hold::micros(10)],
            soak_samples: Some(1_000_000),
            ..ScenarioConfig::prbs13()
        }
    }

    /// The preset for a standard pattern: its taps and all-ones seed on the
    /// PRBS13 schedule. PRBS13 and PRBS31 keep their own presets.
    pub fn for_pattern(pattern: StandardPrbs) -> Self {
        match pattern {
            StandardPrbs::Prbs13 => ScenarioConfig::prbs13(),
            StandardPrbs::Prbs31 => ScenarioConfig::prbs31(),
            other => ScenarioConfig {
                name: other.to_string(),
                length: other.length(),
                taps: other.taps(),
                seed: other.default_seed(),
                monitor_samples: other.length() as u64 * 1_000,
                ..ScenarioConfig::prbs13()
            },
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, PrbsError> {
        let config: ScenarioConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PrbsError> {
        let text = fs::read_to_string(path)?;
        ScenarioConfig::from_toml(&text)
    }

    pub fn lfsr_config(&self) -> LfsrConfig {
        LfsrConfig::new(self.length, self.taps.clone(), self.seed)
    }

    pub fn validate(&self) -> Result<(), PrbsError> {
        self.lfsr_config().validate()?;
        self.data_req.validate()?;
        if self.clock_period_ns == 0 {
            return Err(PrbsError::Config("clock_period_ns must be positive".to_string()));
        }
        if let Some(0) = self.detect_window {
            return Err(PrbsError::Config("detect_window must be positive".to_string()));
        }
        Ok(())
    }

    fn soak_target(&self) -> u64 {
        let period = maximal_period(self.length);
        self.soak_samples.map_or(period, |n| n.min(period))
    }

    fn burst_samples(&self) -> u64 {
        self.burst_window.unwrap_or(match self.policy {
            TrackingPolicy::Autonomous => 0,
            TrackingPolicy::StreamDriven => self.length as u64 + 1,
        })
    }

    fn recovery_samples(&self) -> u64 {
        self.recovery_window.unwrap_or(2 * self.length as u64)
    }
}

/// Duration of one completed phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub name: String,
    pub intervals: u64,
    pub counters: Counters,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    /// Total intervals clocked.
    pub intervals: u64,
    /// Detection latency in intervals, one entry per injected fault.
    pub faults_detected: Vec<u64>,
    pub phases: Vec<PhaseReport>,
    /// Counters at the end of the soak.
    pub final_counters: Counters,
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "{}: {} phases, {} intervals",
            self.name,
            self.phases.len(),
            self.intervals
        )?;
        for phase in &self.phases {
            writeln!(
                f,
                "  {:<24} {:>12} intervals  data_count {:>12}  error_count {}",
                phase.name, phase.intervals, phase.counters.data_count, phase.counters.error_count
            )?;
        }
        writeln!(f, "  fault detection latency: {:?}", self.faults_detected)?;
        write!(
            f,
            "  final: data_count {} error_count {}",
            self.final_counters.data_count, self.final_counters.error_count
        )
    }
}

pub struct Scenario<D> {
    config: ScenarioConfig,
    bench: Testbench<D>,
    report: ScenarioReport,
    faults: usize,
}

impl Scenario<LoopbackDut> {
    /// A scenario against the in-crate software loopback.
    pub fn loopback(config: ScenarioConfig) -> Result<Self, PrbsError> {
        config.validate()?;
        let dut = LoopbackDut::new(&config.lfsr_config(), config.policy)?;
        Scenario::new(config, dut)
    }
}

impl<D: Dut> Scenario<D> {
    pub fn new(config: ScenarioConfig, dut: D) -> Result<Self, PrbsError> {
        config.validate()?;
        let bench = Testbench::new(dut, config.clock_period_ns, config.data_req);
        let report = ScenarioReport {
            name: config.name.clone(),
            ..Default::default()
        };
        Ok(Scenario {
            config,
            bench,
            report,
            faults: 0,
        })
    }

    pub fn set_trace(&mut self, trace: SignalTrace) {
        self.bench.set_trace(trace);
    }

    pub fn take_trace(&mut self) -> Option<SignalTrace> {
        self.bench.take_trace()
    }

    pub fn bench(&self) -> &Testbench<D> {
        &self.bench
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Runs every phase in order and stops at the first failure.
    pub fn run(&mut self) -> Result<ScenarioReport, PrbsError> {
        info!(
            "{}: length {} taps {} seed {:#x}, {:?} data_req, {:?} tracking",
            self.config.name,
            self.config.length,
            self.config.taps,
            self.config.seed,
            self.config.data_req,
            self.config.policy
        );
        self.start_up()?;
        if self.config.monitor_samples > 0 {
            self.monitor(self.config.monitor_samples)?;
        }
        self.clean(self.config.clean_samples)?;

        for hold in self.config.sync_holds.clone() {
            self.fault()?;
            self.sync(hold)?;
            self.clean(self.config.clean_samples)?;
        }
        for hold in self.config.reset_holds.clone() {
            self.fault()?;
            self.count_reset(hold)?;
            self.clean(self.config.clean_samples)?;
        }
        self.soak()?;

        self.report.intervals = self.bench.interval();
        self.report.final_counters = self.bench.outputs().counters();
        info!(
            "{}: complete after {} intervals",
            self.config.name, self.report.intervals
        );
        Ok(self.report.clone())
    }

    /// Holds `init`, `sync` and `count_reset` with the configured seed and
    /// polynomial and `data_req` low, then releases them.
    pub fn start_up(&mut self) -> Result<(), PrbsError> {
        let start = self.bench.interval();
        let hold = self.config.startup;
        {
            let inputs = self.bench.inputs_mut();
            inputs.init = true;
            inputs.sync = true;
            inputs.count_reset = true;
            inputs.initial_state = self.config.seed;
            inputs.polynomial = self.config.taps.mask();
            inputs.error_mask = 1;
            inputs.prbs_sel = true;
            inputs.error_insert = false;
        }
        self.bench.set_data_req_enabled(false);
        self.bench.wait(hold);
        self.bench.inputs_mut().init = false;
        self.bench.tick();
        {
            let inputs = self.bench.inputs_mut();
            inputs.sync = false;
            inputs.count_reset = false;
        }
        self.bench.set_data_req_enabled(true);
        info!("start-up released after {} intervals", self.bench.interval() - start);
        self.finish_phase("start-up", start);
        Ok(())
    }

    /// Checks the DUT's register against a reference model on every data
    /// interval for `samples` samples. Expects the generator to sit at the
    /// seed, as it does right after start-up.
    pub fn monitor(&mut self, samples: u64) -> Result<(), PrbsError> {
        let start = self.bench.interval();
        let mut reference = ReferenceModel::<TapList>::new(&self.config.lfsr_config())?;
        let window = self.config.data_req.intervals_for(samples);
        let mut checked = 0;
        while checked < samples {
            if self.bench.interval() - start >= window {
                return Err(PrbsError::RolloverTimeout {
                    interval: self.bench.interval(),
                    target: samples,
                    window,
                });
            }
            let out = self.bench.tick();
            self.expect_clean(&out)?;
            if !self.bench.last_data_req() {
                continue;
            }
            reference.advance();
            if out.lfsr != reference.state() {
                return Err(PrbsError::SequenceMismatch {
                    step: self.bench.interval(),
                    expected: reference.state(),
                    observed: out.lfsr,
                    period: None,
                });
            }
            checked += 1;
        }
        info!("lfsr output matched the reference for {} samples", checked);
        self.finish_phase("monitor", start);
        Ok(())
    }

    /// Runs until `samples` more bits have been counted, with
    /// `error_count` at zero throughout.
    pub fn clean(&mut self, samples: u64) -> Result<(), PrbsError> {
        let start = self.bench.interval();
        let target = self.bench.outputs().data_count.saturating_add(samples);
        let window = self
            .config
            .data_req
            .intervals_for(samples.saturating_add(self.config.length as u64));
        self.run_to(target, window)?;
        info!("no errors for {} values", samples);
        self.finish_phase("clean", start);
        Ok(())
    }

    /// Holds `error_insert` for the next fault hold and waits for
    /// `error_count` to go nonzero. Returns the detection latency.
    pub fn fault(&mut self) -> Result<u64, PrbsError> {
        let hold = if self.config.fault_holds.is_empty() {
            Hold::Intervals(1)
        } else {
            self.config.fault_holds[self.faults % self.config.fault_holds.len()]
        };
        self.faults += 1;
        let window = self
            .config
            .detect_window
            .unwrap_or_else(|| self.config.data_req.period() + 1);

        info!("inserting bit error, error_insert held {:?}", hold);
        let start = self.bench.interval();
        let mut detected = None;
        self.bench.inputs_mut().error_insert = true;
        for _ in 0..self.bench.intervals(hold) {
            let out = self.bench.tick();
            if detected.is_none() && out.error_count > 0 {
                detected = Some(self.bench.interval() - start);
            }
        }
        self.bench.inputs_mut().error_insert = false;

        while detected.is_none() && self.bench.interval() - start < window {
            let out = self.bench.tick();
            if out.error_count > 0 {
                detected = Some(self.bench.interval() - start);
            }
        }
        let latency = match detected {
            Some(latency) if latency <= window => latency,
            _ => {
                return Err(PrbsError::FaultNotDetected {
                    interval: self.bench.interval(),
                    window,
                })
            }
        };
        info!("error detected after {} intervals", latency);
        self.report.faults_detected.push(latency);

        let burst = self.config.burst_samples();
        if burst > 0 {
            debug!("letting the error burst drain for {} samples", burst);
            let intervals = self.config.data_req.intervals_for(burst);
            self.bench.wait(Hold::Intervals(intervals));
        }
        self.finish_phase("fault", start);
        Ok(latency)
    }

    /// Holds `sync` and checks that `error_count` reads zero once released.
    pub fn sync(&mut self, hold: Hold) -> Result<(), PrbsError> {
        let start = self.bench.interval();
        let intervals = self.bench.intervals(hold);
        info!("holding sync for {} intervals", intervals);
        self.bench.inputs_mut().sync = true;
        self.bench.wait(hold);
        self.bench.inputs_mut().sync = false;
        let window = self
            .config
            .data_req
            .intervals_for(self.config.recovery_samples());
        self.recover(window)
            .map_err(|error_count| PrbsError::SyncTimeout {
                interval: self.bench.interval(),
                window,
                error_count,
            })?;
        self.finish_phase(&format!("sync {}", intervals), start);
        Ok(())
    }

    /// Holds `count_reset`, checking both counters read zero on every
    /// interval it is held, then checks `error_count` stays zero.
    pub fn count_reset(&mut self, hold: Hold) -> Result<(), PrbsError> {
        let start = self.bench.interval();
        let intervals = self.bench.intervals(hold);
        info!("holding count_reset for {} intervals", intervals);
        self.bench.inputs_mut().count_reset = true;
        for _ in 0..intervals {
            let out = self.bench.tick();
            if !out.counters().is_zero() {
                return Err(PrbsError::CounterResetViolation {
                    interval: self.bench.interval(),
                    data_count: out.data_count,
                    error_count: out.error_count,
                });
            }
        }
        self.bench.inputs_mut().count_reset = false;
        let window = self
            .config
            .data_req
            .intervals_for(self.config.recovery_samples());
        self.recover(window)
            .map_err(|error_count| PrbsError::UnexpectedError {
                interval: self.bench.interval(),
                error_count,
                data_count: self.bench.outputs().data_count,
            })?;
        self.finish_phase(&format!("count_reset {}", intervals), start);
        Ok(())
    }

    /// Pulses `init` and `sync`, then runs until `data_count` reaches the
    /// soak target with no errors.
    pub fn soak(&mut self) -> Result<(), PrbsError> {
        let start = self.bench.interval();
        let target = self.config.soak_target();
        {
            let inputs = self.bench.inputs_mut();
            inputs.init = true;
            inputs.sync = true;
        }
        self.bench.tick();
        self.bench.inputs_mut().init = false;
        self.bench.tick();
        self.bench.inputs_mut().sync = false;

        info!("simulating until data_count reaches {}", target);
        let window = self
            .config
            .data_req
            .intervals_for(target.saturating_add(self.config.length as u64 + 2));
        self.run_to(target, window)?;
        if target == maximal_period(self.config.length) {
            info!("LFSR rollover after {} samples", target);
        }
        self.finish_phase("soak", start);
        Ok(())
    }

    /// Ticks until `data_count` reaches `target`, failing on any error or
    /// when `window` intervals pass first.
    fn run_to(&mut self, target: u64, window: u64) -> Result<(), PrbsError> {
        let start = self.bench.interval();
        let mut out = self.bench.outputs();
        while out.data_count < target {
            if self.bench.interval() - start >= window {
                return Err(PrbsError::RolloverTimeout {
                    interval: self.bench.interval(),
                    target,
                    window,
                });
            }
            out = self.bench.tick();
            self.expect_clean(&out)?;
        }
        Ok(())
    }

    /// Waits up to `window` intervals for `error_count` to read zero.
    /// Fails with the last count seen.
    fn recover(&mut self, window: u64) -> Result<(), u64> {
        let start = self.bench.interval();
        let mut out = self.bench.outputs();
        while out.error_count != 0 {
            if self.bench.interval() - start >= window {
                return Err(out.error_count);
            }
            out = self.bench.tick();
        }
        debug!(
            "error_count zero {} intervals after release",
            self.bench.interval() - start
        );
        Ok(())
    }

    fn expect_clean(&self, out: &Outputs) -> Result<(), PrbsError> {
        if out.error_count != 0 {
            return Err(PrbsError::UnexpectedError {
                interval: self.bench.interval(),
                error_count: out.error_count,
                data_count: out.data_count,
            });
        }
        Ok(())
    }

    fn finish_phase(&mut self, name: &str, start: u64) {
        self.report.phases.push(PhaseReport {
            name: name.to_string(),
            intervals: self.bench.interval() - start,
            counters: self.bench.outputs().counters(),
        });
    }
}
