//! Generates a PRBS using a linear-feedback shift register.
//!
//! The register shifts to the left: every step computes a feedback bit from
//! the tapped register positions, shifts it in at bit 0, and masks the result
//! back down to `length` bits. The feedback bit is also the emitted bit, so
//! after `length` steps the register holds the last `length` bits of the
//! stream, newest in bit 0. That is what lets a checker rebuild the generator
//! state from nothing but the observed stream.
//!
//! The feedback polynomial can be given either as a list of tap positions or
//! as a bitmask over the register. The two are the same polynomial and
//! convert into each other, but each has its own [`Feedback`] implementation
//! so that the two can be run side by side as cross-checking references (see
//! [`reference`]).
//!
//! As usual,
//! [the Wiki](https://en.wikipedia.org/wiki/Linear-feedback_shift_register#Fibonacci_LFSRs)
//! is an excellent reference for farther details.

pub mod prbs_node;
pub mod reference;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PrbsError;

/// Largest supported register length; the register lives in a `u64`.
pub const MAX_LENGTH: u32 = 64;

/// Returns `(1 << length) - 1` without overflowing at 64 bits.
pub fn register_mask(length: u32) -> u64 {
    if length >= 64 {
        u64::max_value()
    } else {
        (1u64 << length) - 1
    }
}

/// Number of steps in one period of a maximal-length sequence.
pub fn maximal_period(length: u32) -> u64 {
    register_mask(length)
}

/// Feedback taps, as either explicit bit positions or a bitmask.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Taps {
    List(Vec<u32>),
    Mask(u64),
}

impl Taps {
    /// The taps as a register bitmask.
    pub fn mask(&self) -> u64 {
        match self {
            Taps::List(positions) => positions
                .iter()
                .filter(|&&p| p < MAX_LENGTH)
                .fold(0u64, |acc, &p| acc | (1u64 << p)),
            Taps::Mask(mask) => *mask,
        }
    }

    /// The taps as bit positions, highest first.
    pub fn positions(&self) -> Vec<u32> {
        let mut positions = match self {
            Taps::List(positions) => positions.clone(),
            Taps::Mask(mask) => (0..MAX_LENGTH).filter(|p| mask >> p & 1 == 1).collect(),
        };
        positions.sort_unstable_by(|a, b| b.cmp(a));
        positions
    }

    /// True when both encodings select the same set of register bits.
    pub fn equivalent(&self, other: &Taps) -> bool {
        self.positions() == other.positions()
    }

    /// Checks that every tap addresses a bit inside a `length`-bit register.
    ///
    /// A list naming the same position twice is rejected: the repeated bit
    /// would cancel itself out of the XOR and no longer match the mask the
    /// list converts to.
    pub fn validate(&self, length: u32) -> Result<(), PrbsError> {
        let reg_mask = register_mask(length);
        match self {
            Taps::List(positions) => {
                if positions.is_empty() {
                    return Err(PrbsError::NoTaps);
                }
                let mut seen = 0u64;
                for &position in positions {
                    if position >= length || seen >> position & 1 == 1 {
                        return Err(PrbsError::InvalidTapPosition { position, length });
                    }
                    seen |= 1u64 << position;
                }
            }
            Taps::Mask(mask) => {
                if *mask == 0 {
                    return Err(PrbsError::NoTaps);
                }
                let outside = mask & !reg_mask;
                if outside != 0 {
                    return Err(PrbsError::InvalidTapPosition {
                        position: 63 - outside.leading_zeros(),
                        length,
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Taps {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let positions: Vec<String> =
            self.positions().iter().map(|p| p.to_string()).collect();
        write!(f, "{{{}}}", positions.join(","))
    }
}

/// A way of computing the feedback bit from the register contents.
pub trait Feedback: Clone + fmt::Debug {
    /// Builds the rule from already validated taps.
    fn from_taps(taps: &Taps, length: u32) -> Self;

    /// Returns the next feedback bit, 0 or 1.
    fn feedback(&self, register: u64) -> u8;

    /// The taps this rule reads, as a register bitmask.
    fn tap_mask(&self) -> u64;
}

/// XORs the tapped bits one position at a time.
#[derive(Clone, Debug)]
pub struct TapList {
    positions: Vec<u32>,
}

impl Feedback for TapList {
    fn from_taps(taps: &Taps, _length: u32) -> Self {
        TapList {
            positions: taps.positions(),
        }
    }

    fn feedback(&self, register: u64) -> u8 {
        let mut bit = 0;
        for &p in &self.positions {
            bit ^= (register >> p) & 1;
        }
        bit as u8
    }

    fn tap_mask(&self) -> u64 {
        Taps::List(self.positions.clone()).mask()
    }
}

/// Takes the parity of the register ANDed with the tap mask.
#[derive(Clone, Debug)]
pub struct TapMask {
    mask: u64,
}

impl TapMask {
    /// XOR-reduces the low `length + 1` bits of `data` by shifting right one
    /// bit at a time. Equivalent to `data.count_ones() % 2` for any value
    /// that fits in `length` bits.
    pub fn iterative_parity(data: u64, length: u32) -> u8 {
        let mut ldata = data;
        let mut res = data & 1;
        for _ in 0..length {
            ldata >>= 1;
            res ^= ldata & 1;
        }
        res as u8
    }
}

impl Feedback for TapMask {
    fn from_taps(taps: &Taps, _length: u32) -> Self {
        TapMask { mask: taps.mask() }
    }

    fn feedback(&self, register: u64) -> u8 {
        ((register & self.mask).count_ones() % 2) as u8
    }

    fn tap_mask(&self) -> u64 {
        self.mask
    }
}

/// Register length, feedback taps and seed of one LFSR.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LfsrConfig {
    pub length: u32,
    pub taps: Taps,
    pub seed: u64,
}

impl LfsrConfig {
    pub fn new(length: u32, taps: Taps, seed: u64) -> Self {
        LfsrConfig { length, taps, seed }
    }

    /// Rejects lengths outside `1..=64`, taps outside the register, and
    /// seeds that are zero or wider than the register.
    pub fn validate(&self) -> Result<(), PrbsError> {
        if self.length == 0 || self.length > MAX_LENGTH {
            return Err(PrbsError::InvalidLength(self.length));
        }
        self.taps.validate(self.length)?;
        validate_seed(self.seed, self.length)
    }

    pub fn mask(&self) -> u64 {
        register_mask(self.length)
    }

    pub fn period(&self) -> u64 {
        maximal_period(self.length)
    }
}

fn validate_seed(seed: u64, length: u32) -> Result<(), PrbsError> {
    if seed == 0 || seed & !register_mask(length) != 0 {
        return Err(PrbsError::InvalidSeed { seed, length });
    }
    Ok(())
}

/// A left-shifting Fibonacci LFSR with running bit counts.
#[derive(Clone, Debug)]
pub struct Lfsr<F> {
    register: u64,
    seed: u64,
    length: u32,
    mask: u64,
    feedback: F,
    count_zero: u64,
    count_one: u64,
}

impl<F: Feedback> Lfsr<F> {
    /// Creates an LFSR loaded with the configured seed.
    ///
    /// # Examples
    ///
    /// ```
    /// use prbs_rs::prbs::{Lfsr, LfsrConfig, TapMask, Taps};
    ///
    /// let config = LfsrConfig::new(7, Taps::List(vec![6, 5]), 0x7F);
    /// let mut lfsr = Lfsr::<TapMask>::new(&config).unwrap();
    ///
    /// assert_eq!(lfsr.step(), 0);
    /// assert_eq!(lfsr.state(), 0x7E);
    /// ```
    pub fn new(config: &LfsrConfig) -> Result<Self, PrbsError> {
        config.validate()?;
        Ok(Lfsr {
            register: config.seed,
            seed: config.seed,
            length: config.length,
            mask: config.mask(),
            feedback: F::from_taps(&config.taps, config.length),
            count_zero: 0,
            count_one: 0,
        })
    }

    /// Advances the register one position and returns the emitted bit.
    pub fn step(&mut self) -> u8 {
        let fb_bit = self.feedback.feedback(self.register);
        self.register = ((self.register << 1) | u64::from(fb_bit)) & self.mask;
        if fb_bit == 0 {
            self.count_zero += 1;
        } else {
            self.count_one += 1;
        }
        fb_bit
    }

    /// The bit the next `step` will emit, without advancing.
    pub fn peek(&self) -> u8 {
        self.feedback.feedback(self.register)
    }

    /// Restarts from a new seed, validated like construction. Bit counts
    /// are kept.
    pub fn reseed(&mut self, seed: u64) -> Result<(), PrbsError> {
        validate_seed(seed, self.length)?;
        self.seed = seed;
        self.register = seed;
        Ok(())
    }

    /// Loads a raw register value, masked to the register length. Used
    /// where hardware would load whatever is on its `initial_state` input.
    pub fn load(&mut self, state: u64) {
        self.register = state & self.mask;
    }

    /// Replaces the feedback taps without validating them, as a hardware
    /// `polynomial` load would.
    pub fn set_taps(&mut self, taps: &Taps) {
        self.feedback = F::from_taps(taps, self.length);
    }

    pub fn state(&self) -> u64 {
        self.register
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    pub fn tap_mask(&self) -> u64 {
        self.feedback.tap_mask()
    }

    pub fn count_zero(&self) -> u64 {
        self.count_zero
    }

    pub fn count_one(&self) -> u64 {
        self.count_one
    }
}

impl<F: Feedback> Iterator for Lfsr<F> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        Some(self.step())
    }
}

/// The common maximal-length patterns, with tap sets for this crate's
/// left-shifting register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StandardPrbs {
    Prbs7,
    Prbs9,
    Prbs11,
    Prbs13,
    Prbs15,
    Prbs20,
    Prbs23,
    Prbs31,
}

impl StandardPrbs {
    pub const ALL: [StandardPrbs; 8] = [
        StandardPrbs::Prbs7,
        StandardPrbs::Prbs9,
        StandardPrbs::Prbs11,
        StandardPrbs::Prbs13,
        StandardPrbs::Prbs15,
        StandardPrbs::Prbs20,
        StandardPrbs::Prbs23,
        StandardPrbs::Prbs31,
    ];

    pub fn length(self) -> u32 {
        match self {
            StandardPrbs::Prbs7 => 7,
            StandardPrbs::Prbs9 => 9,
            StandardPrbs::Prbs11 => 11,
            StandardPrbs::Prbs13 => 13,
            StandardPrbs::Prbs15 => 15,
            StandardPrbs::Prbs20 => 20,
            StandardPrbs::Prbs23 => 23,
            StandardPrbs::Prbs31 => 31,
        }
    }

    pub fn taps(self) -> Taps {
        let positions = match self {
            StandardPrbs::Prbs7 => vec![6, 5],
            StandardPrbs::Prbs9 => vec![8, 4],
            StandardPrbs::Prbs11 => vec![10, 8],
            StandardPrbs::Prbs13 => vec![12, 11, 1, 0],
            StandardPrbs::Prbs15 => vec![14, 13],
            StandardPrbs::Prbs20 => vec![19, 2],
            StandardPrbs::Prbs23 => vec![22, 17],
            StandardPrbs::Prbs31 => vec![30, 27],
        };
        Taps::List(positions)
    }

    /// Seed used when none is given: all ones.
    pub fn default_seed(self) -> u64 {
        register_mask(self.length())
    }

    pub fn config(self, seed: u64) -> LfsrConfig {
        LfsrConfig::new(self.length(), self.taps(), seed)
    }
}

impl fmt::Display for StandardPrbs {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "prbs{}", self.length())
    }
}

impl FromStr for StandardPrbs {
    type Err = PrbsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        StandardPrbs::ALL
            .iter()
            .cloned()
            .find(|p| p.to_string() == lower)
            .ok_or_else(|| PrbsError::UnknownPattern(s.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{Rng, SeedableRng, StdRng};
    use std::collections::HashSet;

    fn prbs13() -> LfsrConfig {
        LfsrConfig::new(13, Taps::List(vec![12, 11, 1, 0]), 0x2)
    }

    #[test]
    // A test to verify the correctness of a maximum length PRBS8.
    fn test_prbs8_visits_every_state() {
        let config = LfsrConfig::new(8, Taps::Mask(0xB8), 0x01);
        let mut lfsr = Lfsr::<TapMask>::new(&config).unwrap();
        let mut states = HashSet::new();
        while states.insert(lfsr.state()) {
            lfsr.step();
        }
        assert_eq!(states.len(), 255);
        assert_eq!(lfsr.state(), 0x01);
    }

    #[test]
    // Known answer for PRBS7 from an all-ones seed.
    fn test_prbs7_output() {
        let config = StandardPrbs::Prbs7.config(0x7F);
        let mut lfsr = Lfsr::<TapList>::new(&config).unwrap();
        let bits: Vec<u8> = lfsr.by_ref().take(32).collect();
        assert_eq!(
            bits,
            vec![
                0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0, 1, 0, 1,
                0, 0, 0, 1, 1, 1, 1, 0, 0, 1, 0
            ]
        );
        assert_eq!(lfsr.state(), 114);
        assert_eq!(lfsr.count_one(), 10);
        assert_eq!(lfsr.count_zero(), 22);
    }

    #[test]
    fn test_prbs13_output() {
        let mut lfsr = Lfsr::<TapMask>::new(&prbs13()).unwrap();
        let bits: Vec<u8> = (0..16).map(|_| lfsr.step()).collect();
        assert_eq!(bits, vec![1, 1, 0, 1, 1, 0, 1, 1, 0, 1, 0, 0, 1, 1, 1, 1]);
        assert_eq!(lfsr.state(), 6991);
    }

    #[test]
    // The register holds the last `length` emitted bits, newest in bit 0.
    fn test_register_is_bit_history() {
        let mut lfsr = Lfsr::<TapMask>::new(&prbs13()).unwrap();
        for _ in 0..100 {
            lfsr.step();
        }
        let mut rebuilt = 0u64;
        for _ in 0..13 {
            rebuilt = (rebuilt << 1) | u64::from(lfsr.step());
        }
        assert_eq!(rebuilt, lfsr.state());
    }

    #[test]
    fn test_prbs13_period() {
        let mut lfsr = Lfsr::<TapList>::new(&prbs13()).unwrap();
        let mut steps = 0u64;
        loop {
            lfsr.step();
            steps += 1;
            if lfsr.state() == lfsr.seed() {
                break;
            }
            assert!(steps < 8191, "seed revisited late");
        }
        assert_eq!(steps, 8191);
    }

    #[test]
    fn test_peek_matches_step() {
        let mut lfsr = Lfsr::<TapMask>::new(&prbs13()).unwrap();
        for _ in 0..64 {
            let predicted = lfsr.peek();
            assert_eq!(lfsr.step(), predicted);
        }
    }

    #[test]
    fn test_taps_conversion() {
        let list = Taps::List(vec![12, 11, 1, 0]);
        assert_eq!(list.mask(), 0x1803);
        assert_eq!(Taps::Mask(0x1803).positions(), vec![12, 11, 1, 0]);
        assert!(list.equivalent(&Taps::Mask(0x1803)));
        assert!(Taps::List(vec![27, 30]).equivalent(&Taps::Mask(0x4800_0000)));
        assert!(!list.equivalent(&Taps::Mask(0x1802)));
        assert_eq!(list.to_string(), "{12,11,1,0}");
    }

    #[test]
    fn test_feedback_forms_agree() {
        let mut rng = StdRng::from_seed([7; 32]);
        let taps = Taps::List(vec![30, 27]);
        let list = TapList::from_taps(&taps, 31);
        let mask = TapMask::from_taps(&taps, 31);
        for _ in 0..10_000 {
            let register = rng.gen::<u64>() & register_mask(31);
            let bit = list.feedback(register);
            assert_eq!(bit, mask.feedback(register));
            assert_eq!(bit, TapMask::iterative_parity(register & taps.mask(), 31));
        }
    }

    #[test]
    fn test_zero_seed_rejected() {
        match Lfsr::<TapMask>::new(&LfsrConfig::new(13, Taps::Mask(0x1803), 0)) {
            Err(PrbsError::InvalidSeed { seed: 0, length: 13 }) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_wide_seed_rejected() {
        let config = LfsrConfig::new(7, Taps::List(vec![6, 5]), 0x80);
        assert!(matches!(
            Lfsr::<TapList>::new(&config),
            Err(PrbsError::InvalidSeed { .. })
        ));
    }

    #[test]
    fn test_tap_position_rejected() {
        let config = LfsrConfig::new(13, Taps::List(vec![13, 1]), 0x2);
        assert!(matches!(
            Lfsr::<TapList>::new(&config),
            Err(PrbsError::InvalidTapPosition { position: 13, length: 13 })
        ));
        let config = LfsrConfig::new(13, Taps::Mask(0x4001), 0x2);
        assert!(matches!(
            Lfsr::<TapMask>::new(&config),
            Err(PrbsError::InvalidTapPosition { position: 14, length: 13 })
        ));
        let config = LfsrConfig::new(13, Taps::List(vec![12, 12]), 0x2);
        assert!(matches!(
            config.validate(),
            Err(PrbsError::InvalidTapPosition { position: 12, .. })
        ));
    }

    #[test]
    fn test_length_and_taps_rejected() {
        assert!(matches!(
            LfsrConfig::new(0, Taps::Mask(1), 1).validate(),
            Err(PrbsError::InvalidLength(0))
        ));
        assert!(matches!(
            LfsrConfig::new(65, Taps::Mask(1), 1).validate(),
            Err(PrbsError::InvalidLength(65))
        ));
        assert!(matches!(
            LfsrConfig::new(7, Taps::List(vec![]), 1).validate(),
            Err(PrbsError::NoTaps)
        ));
        assert!(matches!(
            LfsrConfig::new(7, Taps::Mask(0), 1).validate(),
            Err(PrbsError::NoTaps)
        ));
    }

    #[test]
    fn test_full_width_register() {
        let config = LfsrConfig::new(64, Taps::List(vec![63, 62, 60, 59]), u64::max_value());
        let mut lfsr = Lfsr::<TapMask>::new(&config).unwrap();
        assert_eq!(lfsr.mask(), u64::max_value());
        lfsr.step();
        assert_eq!(lfsr.state(), u64::max_value() - 1);
    }

    #[test]
    fn test_reseed_and_load() {
        let mut lfsr = Lfsr::<TapMask>::new(&prbs13()).unwrap();
        assert!(lfsr.reseed(0).is_err());
        lfsr.reseed(0x1FFF).unwrap();
        assert_eq!(lfsr.seed(), 0x1FFF);
        lfsr.load(0xFFFF_FFFF);
        assert_eq!(lfsr.state(), 0x1FFF);
    }

    #[test]
    fn test_standard_patterns_parse() {
        assert_eq!("PRBS31".parse::<StandardPrbs>().unwrap(), StandardPrbs::Prbs31);
        assert_eq!("prbs13".parse::<StandardPrbs>().unwrap(), StandardPrbs::Prbs13);
        assert!("prbs14".parse::<StandardPrbs>().is_err());
        for pattern in StandardPrbs::ALL.iter() {
            assert!(pattern.config(pattern.default_seed()).validate().is_ok());
        }
    }
}
