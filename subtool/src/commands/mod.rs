//! Command handlers, one module per command family.

pub mod bake;
pub mod dt;
pub mod dump;
pub mod header;
pub mod info;
pub mod patch;
pub mod transform;
pub mod upgrade;

use std::path::Path;

use subfile::delays::{binary, csv, DelayTable, TableVersion};
use subfile::error::{Error, Result};
use subfile::resample::Transform;

/// Accepted delay-table input encodings.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatIn {
    #[default]
    Auto,
    Csv,
    Bin,
}

/// Delay-table output encodings.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatOut {
    #[default]
    Pretty,
    Csv,
    Bin,
}

/// Load a delay table from a standalone file.
///
/// `Auto` treats text that splits into comma-separated lines as CSV and
/// anything else as binary.
pub fn load_delay_table(
    path: &Path,
    format: FormatIn,
    expected_version: Option<TableVersion>,
    expected_fracs: Option<usize>,
) -> Result<DelayTable> {
    let bytes = std::fs::read(path)?;
    let as_csv = |bytes: &[u8]| -> Result<DelayTable> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::InvalidFormat(format!("delay table CSV is not UTF-8: {e}")))?;
        let table = csv::parse(text)?;
        if let Some(expected) = expected_version {
            if table.version != expected {
                return Err(Error::VersionMismatch {
                    expected: expected.to_string(),
                    detected: table.version.to_string(),
                });
            }
        }
        if let Some(expected) = expected_fracs {
            if table.num_frac_delays() != expected {
                return Err(Error::VersionMismatch {
                    expected: format!("{expected} fractional delays"),
                    detected: table.num_frac_delays().to_string(),
                });
            }
        }
        Ok(table)
    };

    match format {
        FormatIn::Csv => as_csv(&bytes),
        FormatIn::Bin => binary::parse(&bytes, expected_version, expected_fracs),
        FormatIn::Auto => {
            let looks_textual = std::str::from_utf8(&bytes)
                .map(|text| text.lines().next().is_some_and(|line| line.contains(',')))
                .unwrap_or(false);
            if looks_textual {
                as_csv(&bytes)
            } else {
                binary::parse(&bytes, expected_version, expected_fracs)
            }
        }
    }
}

/// Parse a comma-separated list of source ids.
pub fn parse_source_list(list: &str) -> Result<Vec<u16>> {
    list.split(',')
        .map(|part| {
            part.trim()
                .parse::<u16>()
                .map_err(|_| Error::InvalidArgument(format!("bad source id '{part}'")))
        })
        .collect()
}

/// Parse a `--map` value of the form `A:B,C:D`.
pub fn parse_map_pairs(map: &str) -> Result<Vec<(u16, u16)>> {
    map.split(',')
        .map(|pair| {
            let (dst, src) = pair.split_once(':').ok_or_else(|| {
                Error::InvalidArgument(format!("bad map entry '{pair}', expected DST:SRC"))
            })?;
            Ok((
                dst.trim()
                    .parse::<u16>()
                    .map_err(|_| Error::InvalidArgument(format!("bad source id '{dst}'")))?,
                src.trim()
                    .parse::<u16>()
                    .map_err(|_| Error::InvalidArgument(format!("bad source id '{src}'")))?,
            ))
        })
        .collect()
}

/// Parse a `--rule` value: `SRC:scale:FACTOR` or `SRC:linear:RATE:INITIAL`.
pub fn parse_rule(rule: &str) -> Result<(u16, Transform)> {
    let parts: Vec<&str> = rule.split(':').collect();
    let bad = || Error::InvalidArgument(format!("bad resample rule '{rule}'"));
    let source: u16 = parts
        .first()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(bad)?;
    let transform = match (parts.get(1).copied(), parts.len()) {
        (Some("scale"), 3) => Transform::Scale(parts[2].trim().parse().map_err(|_| bad())?),
        (Some("linear"), 4) => Transform::Linear {
            rate: parts[2].trim().parse().map_err(|_| bad())?,
            initial: parts[3].trim().parse().map_err(|_| bad())?,
        },
        _ => return Err(bad()),
    };
    Ok((source, transform))
}
