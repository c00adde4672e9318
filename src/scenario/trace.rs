//! Per-interval signal capture, saved as CBOR.

use std::io::{Read, Write};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::dut::{Inputs, Outputs};
use crate::error::PrbsError;

/// Default upper bound on recorded intervals.
pub const DEFAULT_CAPACITY: usize = 1 << 20;

/// Inputs driven and outputs sampled on one clock interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub interval: u64,
    pub inputs: Inputs,
    pub outputs: Outputs,
}

/// Records intervals until `capacity` is reached, then drops the rest.
#[derive(Clone, Debug)]
pub struct SignalTrace {
    records: Vec<TraceRecord>,
    capacity: usize,
    dropped: u64,
}

impl Default for SignalTrace {
    fn default() -> Self {
        SignalTrace::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SignalTrace {
    pub fn with_capacity(capacity: usize) -> Self {
        SignalTrace {
            records: Vec::new(),
            capacity,
            dropped: 0,
        }
    }

    pub fn record(&mut self, record: TraceRecord) {
        if self.records.len() < self.capacity {
            self.records.push(record);
        } else {
            if self.dropped == 0 {
                warn!(
                    "signal trace full after {} intervals, dropping the rest",
                    self.capacity
                );
            }
            self.dropped += 1;
        }
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    /// Intervals that did not fit.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn write_cbor<W: Write>(&self, mut writer: W) -> Result<(), PrbsError> {
        serde_cbor::to_writer(&mut writer, &self.records)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_cbor<R: Read>(reader: R) -> Result<Vec<TraceRecord>, PrbsError> {
        Ok(serde_cbor::from_reader(reader)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(interval: u64) -> TraceRecord {
        TraceRecord {
            interval,
            inputs: Inputs {
                data_req: interval % 2 == 0,
                ..Default::default()
            },
            outputs: Outputs {
                lfsr: interval * 3,
                data_count: interval / 2,
                error_count: 0,
            },
        }
    }

    #[test]
    fn test_capacity_drops_excess() {
        let mut trace = SignalTrace::with_capacity(4);
        for i in 0..10 {
            trace.record(record(i));
        }
        assert_eq!(trace.records().len(), 4);
        assert_eq!(trace.records()[3].interval, 3);
        assert_eq!(trace.dropped(), 6);
    }

    #[test]
    fn test_cbor_file_contents() {
        let mut trace = SignalTrace::default();
        for i in 1..=3 {
            trace.record(record(i));
        }
        let mut bytes = Vec::new();
        trace.write_cbor(&mut bytes).unwrap();
        let decoded = SignalTrace::read_cbor(&bytes[..]).unwrap();
        assert_eq!(decoded, trace.records());
    }
}
