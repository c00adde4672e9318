use prbs_rs::checker::{Counters, TrackingPolicy};
use prbs_rs::dut::{Dut, Inputs, LoopbackDut, Outputs};
use prbs_rs::prbs::StandardPrbs;
use prbs_rs::scenario::{DataReq, Hold, Scenario, ScenarioConfig, SignalTrace};
use prbs_rs::PrbsError;

fn prbs13_loopback() -> Scenario<LoopbackDut> {
    Scenario::loopback(ScenarioConfig::prbs13()).unwrap()
}

#[test]
// Length 13, seed 0x2: clean run, faults, sync and count_reset of one and
// a hundred intervals, then a full-period soak.
fn test_prbs13_phase_by_phase() {
    let mut scenario = prbs13_loopback();
    scenario.start_up().unwrap();
    scenario.clean(10_000).unwrap();

    assert_eq!(scenario.fault().unwrap(), 1);
    scenario.sync(Hold::Intervals(1)).unwrap();
    assert_eq!(scenario.bench().outputs().error_count, 0);
    scenario.clean(10_000).unwrap();

    assert_eq!(scenario.fault().unwrap(), 1);
    scenario.sync(Hold::Intervals(100)).unwrap();
    scenario.clean(10_000).unwrap();

    assert_eq!(scenario.fault().unwrap(), 1);
    scenario.count_reset(Hold::Intervals(1)).unwrap();
    assert!(scenario.bench().outputs().counters().is_zero());
    scenario.clean(10_000).unwrap();
    assert_eq!(scenario.bench().outputs().data_count, 10_000);

    assert_eq!(scenario.fault().unwrap(), 1);
    scenario.count_reset(Hold::Intervals(100)).unwrap();
    scenario.count_reset(Hold::Intervals(100)).unwrap();
    scenario.clean(10_000).unwrap();
    assert_eq!(scenario.bench().outputs().data_count, 10_000);

    scenario.soak().unwrap();
    assert_eq!(
        scenario.bench().outputs().counters(),
        Counters {
            data_count: 8_191,
            error_count: 0
        }
    );
    assert_eq!(scenario.bench().dut().inserted_errors(), 4);
}

/// A loopback that flips one bit midway through the reload that follows
/// the `corrupt_on`-th rising edge of `sync`.
struct FlipDuringReload {
    dut: LoopbackDut,
    corrupt_on: u32,
    sync_edges: u32,
    last_sync: bool,
    countdown: Option<u32>,
}

impl FlipDuringReload {
    fn new(dut: LoopbackDut, corrupt_on: u32) -> Self {
        FlipDuringReload {
            dut,
            corrupt_on,
            sync_edges: 0,
            last_sync: false,
            countdown: None,
        }
    }
}

impl Dut for FlipDuringReload {
    fn apply(&mut self, inputs: &Inputs) {
        if inputs.sync && !self.last_sync {
            self.sync_edges += 1;
            if self.sync_edges == self.corrupt_on {
                self.countdown = Some(6);
            }
        }
        self.last_sync = inputs.sync;
        let error_insert = inputs.error_insert || self.countdown == Some(0);
        self.countdown = match self.countdown {
            Some(n) if n > 0 => Some(n - 1),
            _ => None,
        };
        self.dut.apply(&Inputs {
            error_insert,
            ..*inputs
        });
    }

    fn clock(&mut self) {
        self.dut.clock();
    }

    fn outputs(&self) -> Outputs {
        self.dut.outputs()
    }
}

#[test]
// The first sync after start-up reloads a flipped bit into the shadow; the
// autonomous checker then mismatches until the next sync.
fn test_sync_recovers_corrupted_shadow() {
    let config = ScenarioConfig::prbs13();
    let dut = LoopbackDut::new(&config.lfsr_config(), config.policy).unwrap();
    let mut scenario = Scenario::new(config, FlipDuringReload::new(dut, 2)).unwrap();
    scenario.start_up().unwrap();
    scenario.clean(1_000).unwrap();

    scenario.sync(Hold::Intervals(1)).unwrap();
    match scenario.clean(1_000) {
        Err(PrbsError::UnexpectedError { error_count, .. }) => assert_eq!(error_count, 1),
        other => panic!("unexpected {:?}", other),
    }
    let dut = &scenario.bench().dut().dut;
    assert_eq!(dut.inserted_errors(), 1);
    assert_ne!(dut.checker().shadow(), dut.outputs().lfsr);

    scenario.sync(Hold::Intervals(1)).unwrap();
    scenario.clean(10_000).unwrap();
    let dut = &scenario.bench().dut().dut;
    assert_eq!(dut.inserted_errors(), 1);
    assert_eq!(dut.checker().shadow(), dut.outputs().lfsr);
    assert_eq!(
        scenario.bench().outputs().counters(),
        Counters {
            data_count: 10_000,
            error_count: 0
        }
    );
}

#[test]
fn test_prbs13_preset_run() {
    let report = prbs13_loopback().run().unwrap();
    assert_eq!(report.faults_detected.len(), 4);
    assert_eq!(report.final_counters.data_count, 8_191);
    assert_eq!(report.final_counters.error_count, 0);
    assert!(report.intervals > 8_191 + 5 * 10_000);
    assert!(report.to_string().starts_with("prbs13:"));
}

#[test]
// A 40 ns data clock under a 10 ns sample clock.
fn test_prbs13_divided_data_clock() {
    let config = ScenarioConfig {
        data_req: DataReq::Divided { period: 4, high: 2 },
        clean_samples: 2_000,
        ..ScenarioConfig::prbs13()
    };
    let report = Scenario::loopback(config).unwrap().run().unwrap();
    assert_eq!(report.final_counters.data_count, 8_191);
    assert_eq!(report.final_counters.error_count, 0);
}

#[test]
// 10 ns high out of every microsecond.
fn test_prbs7_sparse_strobe() {
    let config = ScenarioConfig {
        data_req: DataReq::Divided { period: 100, high: 1 },
        clean_samples: 300,
        monitor_samples: 127,
        ..ScenarioConfig::for_pattern(StandardPrbs::Prbs7)
    };
    let report = Scenario::loopback(config).unwrap().run().unwrap();
    assert_eq!(report.final_counters.data_count, 127);
    assert!(report.faults_detected.iter().all(|&latency| latency <= 101));
}

#[test]
fn test_stream_driven_tracking() {
    let config = ScenarioConfig {
        policy: TrackingPolicy::StreamDriven,
        clean_samples: 2_000,
        ..ScenarioConfig::prbs13()
    };
    let report = Scenario::loopback(config).unwrap().run().unwrap();
    assert_eq!(report.final_counters.error_count, 0);
}

#[test]
fn test_undrained_burst_after_count_reset() {
    let config = ScenarioConfig {
        policy: TrackingPolicy::StreamDriven,
        burst_window: Some(0),
        ..ScenarioConfig::prbs13()
    };
    let mut scenario = Scenario::loopback(config).unwrap();
    scenario.start_up().unwrap();
    scenario.clean(1_000).unwrap();
    scenario.fault().unwrap();
    scenario.count_reset(Hold::Intervals(1)).unwrap();
    match scenario.clean(1_000) {
        Err(PrbsError::UnexpectedError { error_count, .. }) => assert_eq!(error_count, 1),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_trace_file() {
    let path = std::env::temp_dir().join("prbs_rs_scenario_trace.cbor");
    let mut scenario = prbs13_loopback();
    scenario.set_trace(SignalTrace::default());
    scenario.start_up().unwrap();
    scenario.clean(100).unwrap();
    let trace = scenario.take_trace().unwrap();
    trace
        .write_cbor(std::fs::File::create(&path).unwrap())
        .unwrap();

    let records = SignalTrace::read_cbor(std::fs::File::open(&path).unwrap()).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(records.len(), trace.records().len());
    let last = records.last().unwrap();
    assert_eq!(last.outputs.data_count, 100);
    assert!(records.iter().all(|r| r.outputs.error_count == 0));
}

#[test]
#[ignore]
// Two billion intervals; run with --ignored --release.
fn test_prbs31_full_rollover() {
    let config = ScenarioConfig {
        soak_samples: None,
        ..ScenarioConfig::prbs31()
    };
    let report = Scenario::loopback(config).unwrap().run().unwrap();
    assert_eq!(report.final_counters.data_count, 2_147_483_647);
}
