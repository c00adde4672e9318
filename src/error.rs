//! Error kinds shared by the sequence models, the checker and the scenario
//! runner.
//!
//! Configuration errors are raised eagerly at construction. Protocol errors
//! carry the interval (or step) index at which the property broke along with
//! the expected and observed values.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrbsError {
    #[error("register length {0} is outside 1..=64")]
    InvalidLength(u32),

    #[error("seed {seed:#x} is not a valid non-zero {length}-bit register value")]
    InvalidSeed { seed: u64, length: u32 },

    #[error("tap position {position} is invalid for a {length}-bit register")]
    InvalidTapPosition { position: u32, length: u32 },

    #[error("feedback polynomial has no taps")]
    NoTaps,

    /// Two models disagree at `step`. `period` carries the expected period
    /// when both agree but the seed came back early, or not within the step
    /// limit.
    #[error(
        "sequence mismatch at step {step}: expected {expected:#x}, observed {observed:#x}{}",
        period_note(.period)
    )]
    SequenceMismatch {
        step: u64,
        expected: u64,
        observed: u64,
        period: Option<u64>,
    },

    #[error(
        "unexpected error at interval {interval}: error_count {error_count} (data_count {data_count})"
    )]
    UnexpectedError {
        interval: u64,
        error_count: u64,
        data_count: u64,
    },

    #[error(
        "error_count still {error_count} {window} intervals after sync release (interval {interval})"
    )]
    SyncTimeout {
        interval: u64,
        window: u64,
        error_count: u64,
    },

    #[error("injected fault not detected within {window} intervals (interval {interval})")]
    FaultNotDetected { interval: u64, window: u64 },

    #[error(
        "counters not held at zero during count_reset at interval {interval}: data_count {data_count}, error_count {error_count}"
    )]
    CounterResetViolation {
        interval: u64,
        data_count: u64,
        error_count: u64,
    },

    #[error("data_count never reached {target} within {window} intervals (interval {interval})")]
    RolloverTimeout {
        interval: u64,
        target: u64,
        window: u64,
    },

    #[error("unknown PRBS pattern {0:?}")]
    UnknownPattern(String),

    #[error("invalid scenario configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Cbor(#[from] serde_cbor::error::Error),
}

fn period_note(period: &Option<u64>) -> String {
    match period {
        Some(period) => format!(" (seed state expected at step {})", period),
        None => String::new(),
    }
}

impl PrbsError {
    /// Configuration errors are fatal to the run; everything else is a
    /// property violation inside a scenario.
    pub fn is_config_error(&self) -> bool {
        match self {
            PrbsError::InvalidLength(_)
            | PrbsError::InvalidSeed { .. }
            | PrbsError::InvalidTapPosition { .. }
            | PrbsError::NoTaps
            | PrbsError::UnknownPattern(_)
            | PrbsError::Config(_)
            | PrbsError::Toml(_) => true,
            _ => false,
        }
    }
}
