//! Known-good sequence models and the cross-check between them.
//!
//! A `ReferenceModel` wraps one LFSR and remembers its seed so it can tell
//! when the sequence has come back around. `cross_check` runs two models
//! built from the same configuration but with different feedback
//! formulations in lockstep, and insists that they agree on every register
//! value and hit their seed together exactly one maximal period in.

use log::{debug, info};

use crate::error::PrbsError;
use crate::prbs::{maximal_period, Feedback, Lfsr, LfsrConfig, TapList, TapMask};

const PROGRESS_INTERVAL: u64 = 0x100_0000;

/// An LFSR used as the "truth" for a sequence.
#[derive(Clone, Debug)]
pub struct ReferenceModel<F> {
    lfsr: Lfsr<F>,
    steps: u64,
}

impl<F: Feedback> ReferenceModel<F> {
    pub fn new(config: &LfsrConfig) -> Result<Self, PrbsError> {
        Ok(ReferenceModel {
            lfsr: Lfsr::new(config)?,
            steps: 0,
        })
    }

    /// Steps the wrapped LFSR and returns the emitted bit.
    pub fn advance(&mut self) -> u8 {
        self.steps += 1;
        self.lfsr.step()
    }

    /// True when the register is back at the seed it started from.
    pub fn is_seed_state(&self) -> bool {
        self.lfsr.state() == self.lfsr.seed()
    }

    pub fn state(&self) -> u64 {
        self.lfsr.state()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn length(&self) -> u32 {
        self.lfsr.length()
    }

    pub fn count_zero(&self) -> u64 {
        self.lfsr.count_zero()
    }

    pub fn count_one(&self) -> u64 {
        self.lfsr.count_one()
    }
}

/// Result of a passing cross-check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrossCheckReport {
    pub period: u64,
    pub count_zero: u64,
    pub count_one: u64,
}

/// Runs two models in lockstep for at most `limit` steps.
///
/// Fails with `SequenceMismatch` at the first step where the registers
/// differ (or only one of them is back at its seed). The same error with
/// `period` set reports a seed that comes back at any step other than
/// `2^length - 1`, or not at all within `limit`.
pub fn cross_check<A, B>(
    expected: &mut ReferenceModel<A>,
    observed: &mut ReferenceModel<B>,
    limit: u64,
) -> Result<CrossCheckReport, PrbsError>
where
    A: Feedback,
    B: Feedback,
{
    let period = maximal_period(expected.length());
    for step in 1..=limit {
        expected.advance();
        observed.advance();

        if step % PROGRESS_INTERVAL == 0 {
            debug!("cross-check step {:#x}", step);
        }

        if expected.state() != observed.state()
            || expected.is_seed_state() != observed.is_seed_state()
        {
            return Err(PrbsError::SequenceMismatch {
                step,
                expected: expected.state(),
                observed: observed.state(),
                period: None,
            });
        }

        if expected.is_seed_state() {
            if step != period {
                return Err(PrbsError::SequenceMismatch {
                    step,
                    expected: expected.state(),
                    observed: observed.state(),
                    period: Some(period),
                });
            }
            return Ok(CrossCheckReport {
                period: step,
                count_zero: expected.count_zero(),
                count_one: expected.count_one(),
            });
        }
    }
    Err(PrbsError::SequenceMismatch {
        step: limit,
        expected: expected.state(),
        observed: observed.state(),
        period: Some(period),
    })
}

/// Cross-checks the tap-list and tap-mask formulations of one configuration
/// over `2^length` steps.
pub fn cross_check_config(config: &LfsrConfig) -> Result<CrossCheckReport, PrbsError> {
    let mut list = ReferenceModel::<TapList>::new(config)?;
    let mut mask = ReferenceModel::<TapMask>::new(config)?;
    let limit = config.period().saturating_add(1);
    info!(
        "cross-checking length {} taps {} seed {:#x}",
        config.length, config.taps, config.seed
    );
    let report = cross_check(&mut list, &mut mask, limit)?;
    info!(
        "period {} ({} zeros, {} ones)",
        report.period, report.count_zero, report.count_one
    );
    Ok(report)
}

/// Steps `model` until it returns to its seed, giving up after `limit`
/// steps.
pub fn measure_period<F: Feedback>(model: &mut ReferenceModel<F>, limit: u64) -> Option<u64> {
    for step in 1..=limit {
        model.advance();
        if model.is_seed_state() {
            return Some(step);
        }
    }
    None
}
