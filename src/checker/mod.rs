//! Tracks an observed PRBS stream against a shadow LFSR and counts errors.
//!
//! The checker keeps a shadow copy of the generator register. For every
//! observed bit it predicts the next bit from the shadow, compares, and
//! counts. A rising edge on `sync` opens a reload window: for the next
//! `length` samples (and for as long as `sync` stays high) the observed bits
//! are shifted straight into the shadow instead of being compared, which
//! leaves the shadow holding exactly the generator's register. Prediction
//! then resumes.
//!
//! Counting is an orthogonal axis. While `sync` or `count_reset` is high
//! both counters are held at zero; counting resumes from zero on release.
//!
//! After a reload the shadow advances according to a [`TrackingPolicy`].
//! `Autonomous` runs the shadow on its own predictions, so a single flipped
//! line bit costs exactly one error and never disturbs the shadow.
//! `StreamDriven` shifts in the observed bit instead, like a
//! self-synchronizing descrambler: a flipped bit is counted once when it
//! arrives and once more each time it passes a tap, then flushes out of the
//! register on its own.

pub mod checker_node;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::PrbsError;
use crate::prbs::{Feedback, LfsrConfig, TapMask, Taps};

/// How the shadow register advances once it has been reloaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingPolicy {
    Autonomous,
    StreamDriven,
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        TrackingPolicy::Autonomous
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckerState {
    Tracking,
    Resynchronizing,
}

/// Running sample and mismatch counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub data_count: u64,
    pub error_count: u64,
}

impl Counters {
    /// Fraction of counted samples that mismatched, or 0 with no data.
    pub fn bit_error_rate(&self) -> f64 {
        if self.data_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.data_count as f64
        }
    }

    pub fn is_zero(&self) -> bool {
        self.data_count == 0 && self.error_count == 0
    }
}

/// Level-sensitive control inputs sampled once per interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckerInputs {
    pub init: bool,
    pub initial_state: u64,
    pub sync: bool,
    pub count_reset: bool,
}

/// What the checker did with one observed bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sample {
    /// Shifted into the shadow register during a reload.
    Reloaded,
    Match,
    Mismatch { predicted: u8, observed: u8 },
}

#[derive(Clone, Debug)]
pub struct Checker {
    shadow: u64,
    length: u32,
    mask: u64,
    feedback: TapMask,
    policy: TrackingPolicy,
    reload_remaining: u32,
    sync: bool,
    count_reset: bool,
    counters: Counters,
}

impl Checker {
    /// Creates a checker whose shadow register starts at the configured
    /// seed, already tracking.
    pub fn new(config: &LfsrConfig, policy: TrackingPolicy) -> Result<Self, PrbsError> {
        config.validate()?;
        Ok(Checker {
            shadow: config.seed,
            length: config.length,
            mask: config.mask(),
            feedback: TapMask::from_taps(&config.taps, config.length),
            policy,
            reload_remaining: 0,
            sync: false,
            count_reset: false,
            counters: Counters::default(),
        })
    }

    /// Applies one interval's control levels. Call before `observe`.
    pub fn control(&mut self, inputs: &CheckerInputs) {
        if inputs.init {
            self.load(inputs.initial_state);
        }
        self.set_sync(inputs.sync);
        self.set_count_reset(inputs.count_reset);
    }

    /// Drives the `sync` level. A rising edge opens a reload window of
    /// `length` samples; while high, both counters are held at zero.
    pub fn set_sync(&mut self, level: bool) {
        if level && !self.sync {
            debug!("sync asserted, reloading {} samples", self.length);
            self.reload_remaining = self.length;
        }
        self.sync = level;
        if level {
            self.counters = Counters::default();
        }
    }

    /// Drives the `count_reset` level; while high, both counters are held
    /// at zero.
    pub fn set_count_reset(&mut self, level: bool) {
        self.count_reset = level;
        if level {
            self.counters = Counters::default();
        }
    }

    /// A one-interval sync pulse: clears the counters and reloads the
    /// shadow from the next `length` observed bits.
    pub fn resynchronize(&mut self) {
        self.set_sync(true);
        self.set_sync(false);
    }

    /// A one-interval count_reset pulse.
    pub fn reset_counters(&mut self) {
        self.set_count_reset(true);
        self.set_count_reset(false);
    }

    /// Loads the shadow register directly, as `init` does.
    pub fn load(&mut self, state: u64) {
        self.shadow = state & self.mask;
    }

    /// Replaces the feedback taps, as a `polynomial` load does. Taps are
    /// masked to the register rather than validated.
    pub fn load_polynomial(&mut self, tap_mask: u64) {
        self.feedback = TapMask::from_taps(&Taps::Mask(tap_mask & self.mask), self.length);
    }

    /// Processes one observed bit. Only bit 0 of `bit` is looked at.
    pub fn observe(&mut self, bit: u8) -> Sample {
        let observed = bit & 1;
        if self.sync || self.reload_remaining > 0 {
            self.shift_in(observed);
            self.reload_remaining = self.reload_remaining.saturating_sub(1);
            return Sample::Reloaded;
        }

        let predicted = self.feedback.feedback(self.shadow);
        match self.policy {
            TrackingPolicy::Autonomous => self.shift_in(predicted),
            TrackingPolicy::StreamDriven => self.shift_in(observed),
        }

        if self.is_counting() {
            self.counters.data_count = self.counters.data_count.wrapping_add(1);
        }
        if predicted == observed {
            Sample::Match
        } else {
            if self.is_counting() {
                self.counters.error_count = self.counters.error_count.wrapping_add(1);
            }
            Sample::Mismatch {
                predicted,
                observed,
            }
        }
    }

    fn shift_in(&mut self, bit: u8) {
        self.shadow = ((self.shadow << 1) | u64::from(bit)) & self.mask;
    }

    pub fn state(&self) -> CheckerState {
        if self.sync || self.reload_remaining > 0 {
            CheckerState::Resynchronizing
        } else {
            CheckerState::Tracking
        }
    }

    /// False while `sync` or `count_reset` holds the counters at zero.
    pub fn is_counting(&self) -> bool {
        !self.sync && !self.count_reset
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn shadow(&self) -> u64 {
        self.shadow
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn policy(&self) -> TrackingPolicy {
        self.policy
    }
}
