//! Delay-table codec.
//!
//! Two incompatible on-disk versions co-exist. Version 1 stores integer
//! polynomial coefficients and int16 millisample fractional delays in a
//! 20-byte fixed region per source; version 2 stores f64 coefficients,
//! three total-delay values and float32 sample fractional delays in a
//! 56-byte fixed region. The in-memory representation uses the wider form
//! for both. Binary and CSV encodings are supported, with heuristic
//! version and shape detection for inputs of unknown provenance.

pub mod binary;
pub mod csv;

use std::fmt::Write as _;

use crate::error::{Error, Result};

/// On-disk delay table version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableVersion {
    V1,
    V2,
}

impl TableVersion {
    /// Size of the fixed (non-frac) region of one row.
    pub fn entry_min_size(self) -> usize {
        match self {
            TableVersion::V1 => 20,
            TableVersion::V2 => 56,
        }
    }

    /// Byte offset of the first fractional delay in a row.
    pub fn frac_offset(self) -> usize {
        self.entry_min_size()
    }

    /// Size of one encoded fractional delay.
    pub fn frac_size(self) -> usize {
        match self {
            TableVersion::V1 => 2,
            TableVersion::V2 => 4,
        }
    }

    /// Trailing padding after the fractional delays of a row.
    pub fn row_padding(self) -> usize {
        0
    }

    pub fn row_length(self, num_fracs: usize) -> usize {
        self.frac_offset() + num_fracs * self.frac_size() + self.row_padding()
    }

    pub fn number(self) -> u8 {
        match self {
            TableVersion::V1 => 1,
            TableVersion::V2 => 2,
        }
    }

    pub fn from_number(n: u64) -> Result<Self> {
        match n {
            1 => Ok(TableVersion::V1),
            2 => Ok(TableVersion::V2),
            other => Err(Error::VersionMismatch {
                expected: "delay table version 1 or 2".into(),
                detected: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for TableVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.number())
    }
}

/// Delay tracking state for one RF input.
///
/// `initial_delay` and the two deltas are the pointing polynomial; the
/// total-delay triple only exists on disk in v2 and reads as zero from v1.
/// `frac_delay` holds the fractional-delay trajectory in samples; v1 files
/// store it in millisamples and are scaled by 1/1000 on load and 1000 on
/// save.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DelayTableEntry {
    pub rf_input: u16,
    pub ws_delay: i16,
    pub initial_delay: f64,
    pub delta_delay: f64,
    pub delta_delta_delay: f64,
    pub num_pointings: u16,
    pub reserved: u16,
    pub start_total_delay: f64,
    pub middle_total_delay: f64,
    pub end_total_delay: f64,
    pub frac_delay: Vec<f32>,
}

/// A full per-source delay table.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayTable {
    pub version: TableVersion,
    pub entries: Vec<DelayTableEntry>,
}

impl DelayTable {
    pub fn num_sources(&self) -> usize {
        self.entries.len()
    }

    pub fn num_frac_delays(&self) -> usize {
        self.entries.first().map_or(0, |e| e.frac_delay.len())
    }

    /// Position of a source in the subfile's line order.
    pub fn index_of(&self, rf_input: u16) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.rf_input == rf_input)
            .ok_or_else(|| Error::MissingResource(format!("source {rf_input} in delay table")))
    }

    pub fn entry_for(&self, rf_input: u16) -> Result<&DelayTableEntry> {
        Ok(&self.entries[self.index_of(rf_input)?])
    }

    /// Element-wise difference `to - from`.
    ///
    /// Both tables must have the same length and the same `rf_input`
    /// ordering. `num_pointings` of every result row is set to 1 so the
    /// output remains acceptable to the format detector.
    pub fn compare(from: &DelayTable, to: &DelayTable) -> Result<DelayTable> {
        if from.num_sources() != to.num_sources() {
            return Err(Error::InvalidArgument(format!(
                "delay tables differ in length: {} vs {}",
                from.num_sources(),
                to.num_sources()
            )));
        }
        let mut entries = Vec::with_capacity(from.num_sources());
        for (a, b) in from.entries.iter().zip(&to.entries) {
            if a.rf_input != b.rf_input {
                return Err(Error::InvalidArgument(format!(
                    "delay tables differ in source ordering: {} vs {}",
                    a.rf_input, b.rf_input
                )));
            }
            if a.frac_delay.len() != b.frac_delay.len() {
                return Err(Error::InvalidArgument(format!(
                    "delay tables differ in fractional delay count: {} vs {}",
                    a.frac_delay.len(),
                    b.frac_delay.len()
                )));
            }
            entries.push(DelayTableEntry {
                rf_input: a.rf_input,
                ws_delay: b.ws_delay - a.ws_delay,
                initial_delay: b.initial_delay - a.initial_delay,
                delta_delay: b.delta_delay - a.delta_delay,
                delta_delta_delay: b.delta_delta_delay - a.delta_delta_delay,
                num_pointings: 1,
                reserved: 0,
                start_total_delay: b.start_total_delay - a.start_total_delay,
                middle_total_delay: b.middle_total_delay - a.middle_total_delay,
                end_total_delay: b.end_total_delay - a.end_total_delay,
                frac_delay: a
                    .frac_delay
                    .iter()
                    .zip(&b.frac_delay)
                    .map(|(x, y)| y - x)
                    .collect(),
            });
        }
        Ok(DelayTable {
            version: to.version,
            entries,
        })
    }

    /// A table of the same shape with every delay zeroed, as applied by
    /// `repoint --zero`.
    pub fn zeroed(&self) -> DelayTable {
        DelayTable {
            version: self.version,
            entries: self
                .entries
                .iter()
                .map(|e| DelayTableEntry {
                    rf_input: e.rf_input,
                    ws_delay: 0,
                    initial_delay: 0.0,
                    delta_delay: 0.0,
                    delta_delta_delay: 0.0,
                    num_pointings: e.num_pointings,
                    reserved: 0,
                    start_total_delay: 0.0,
                    middle_total_delay: 0.0,
                    end_total_delay: 0.0,
                    frac_delay: vec![0.0; e.frac_delay.len()],
                })
                .collect(),
        }
    }

    /// The same table marked as v2. Values are already held in the wide
    /// representation, so this only changes how the table serialises.
    pub fn to_v2(&self) -> DelayTable {
        DelayTable {
            version: TableVersion::V2,
            entries: self.entries.clone(),
        }
    }

    /// Multi-line human readable rendering.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>8} {:>8} {:>14} {:>14} {:>16} {:>6}  frac_delay[{}]",
            "rf_input",
            "ws_delay",
            "initial",
            "delta",
            "delta_delta",
            "npoint",
            self.num_frac_delays()
        );
        for e in &self.entries {
            let _ = write!(
                out,
                "{:>8} {:>8} {:>14.6} {:>14.6} {:>16.9} {:>6} ",
                e.rf_input,
                e.ws_delay,
                e.initial_delay,
                e.delta_delay,
                e.delta_delta_delay,
                e.num_pointings
            );
            for (i, frac) in e.frac_delay.iter().enumerate() {
                let sep = if i == 0 { ' ' } else { ',' };
                let _ = write!(out, "{sep}{frac}");
            }
            out.push('\n');
        }
        out
    }
}
