//! CSV delay-table codec.
//!
//! One row per source, all columns comma-separated. v1 rows carry 6 fixed
//! columns then integer millisample fractional delays; v2 rows carry 10
//! fixed columns then floating-point sample values. The version is
//! detected from the position of the `num_pointings` column, which always
//! holds 1.

use crate::delays::{DelayTable, DelayTableEntry, TableVersion};
use crate::error::{Context, Error, Location, Result};

/// Fixed (non-frac) column counts per version.
const FIXED_COLS_V1: usize = 6;
const FIXED_COLS_V2: usize = 10;

/// Detect the table version from split rows.
///
/// Column 5 holding "1" in every row marks v1, column 8 marks v2. Input
/// where both hold is refused as ambiguous.
pub fn detect_version(rows: &[Vec<&str>]) -> Result<TableVersion> {
    if rows.is_empty() {
        return Err(Error::InvalidFormat("empty delay table CSV".into()));
    }
    let all_one = |col: usize| rows.iter().all(|row| row.get(col) == Some(&"1"));
    match (all_one(5), all_one(8)) {
        (true, false) => Ok(TableVersion::V1),
        (false, true) => Ok(TableVersion::V2),
        (true, true) => Err(Error::InvalidFormat(
            "delay table CSV version is ambiguous: both v1 and v2 heuristics accept".into(),
        )),
        (false, false) => Err(Error::InvalidFormat(
            "CSV does not look like a v1 or v2 delay table".into(),
        )),
    }
}

fn split_rows(text: &str) -> Vec<Vec<&str>> {
    text.lines()
        .map(|line| line.trim_end_matches('\r').trim_end())
        .filter(|line| !line.is_empty())
        .map(|line| line.split(',').collect())
        .collect()
}

fn parse_cell<T: std::str::FromStr>(cell: &str, what: &str) -> Result<T> {
    cell.trim()
        .parse::<T>()
        .map_err(|_| Error::InvalidFormat(format!("Failed to parse {what}: '{cell}'")))
}

/// Parse a delay-table CSV, detecting its version and shape.
pub fn parse(text: &str) -> Result<DelayTable> {
    let rows = split_rows(text);
    let version = detect_version(&rows)?;
    let fixed_cols = match version {
        TableVersion::V1 => FIXED_COLS_V1,
        TableVersion::V2 => FIXED_COLS_V2,
    };

    let width = rows[0].len();
    if width < fixed_cols {
        return Err(Error::InvalidFormat(format!(
            "{version} delay table CSV needs at least {fixed_cols} columns, got {width}"
        )));
    }

    let mut entries = Vec::with_capacity(rows.len());
    for (row_idx, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(Error::InvalidFormat(format!(
                "expected {width} columns, got {}",
                row.len()
            ))
            .at(Location::Row(row_idx)));
        }
        entries.push(parse_row(row, version).at(Location::Row(row_idx))?);
    }
    Ok(DelayTable { version, entries })
}

fn parse_row(row: &[&str], version: TableVersion) -> Result<DelayTableEntry> {
    let cell_f64 =
        |col: usize| parse_cell::<f64>(row[col], "float").at(Location::Col(col));
    let mut entry = DelayTableEntry {
        rf_input: parse_cell(row[0], "integer").at(Location::Col(0))?,
        ws_delay: parse_cell(row[1], "integer").at(Location::Col(1))?,
        initial_delay: cell_f64(2)?,
        delta_delay: cell_f64(3)?,
        delta_delta_delay: cell_f64(4)?,
        ..DelayTableEntry::default()
    };
    match version {
        TableVersion::V1 => {
            entry.num_pointings = parse_cell(row[5], "integer").at(Location::Col(5))?;
            entry.frac_delay = row[FIXED_COLS_V1..]
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    let milli: f64 = parse_cell(cell, "integer millisamples")
                        .at(Location::Col(FIXED_COLS_V1 + i))?;
                    Ok((milli.floor() / 1000.0) as f32)
                })
                .collect::<Result<Vec<_>>>()?;
        }
        TableVersion::V2 => {
            entry.start_total_delay = cell_f64(5)?;
            entry.middle_total_delay = cell_f64(6)?;
            entry.end_total_delay = cell_f64(7)?;
            entry.num_pointings = parse_cell(row[8], "integer").at(Location::Col(8))?;
            entry.reserved = parse_cell(row[9], "integer").at(Location::Col(9))?;
            entry.frac_delay = row[FIXED_COLS_V2..]
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    let frac: f32 =
                        parse_cell(cell, "float").at(Location::Col(FIXED_COLS_V2 + i))?;
                    Ok(frac)
                })
                .collect::<Result<Vec<_>>>()?;
        }
    }
    Ok(entry)
}

/// Serialise a delay table as CSV in its own version's column layout.
pub fn serialise(table: &DelayTable) -> String {
    let mut out = String::new();
    for entry in &table.entries {
        let mut cells: Vec<String> = vec![
            entry.rf_input.to_string(),
            entry.ws_delay.to_string(),
        ];
        match table.version {
            TableVersion::V1 => {
                cells.push((entry.initial_delay.round() as i64).to_string());
                cells.push((entry.delta_delay.round() as i64).to_string());
                cells.push((entry.delta_delta_delay.round() as i64).to_string());
                cells.push(entry.num_pointings.to_string());
                for frac in &entry.frac_delay {
                    cells.push(((f64::from(*frac) * 1000.0).round() as i64).to_string());
                }
            }
            TableVersion::V2 => {
                cells.push(entry.initial_delay.to_string());
                cells.push(entry.delta_delay.to_string());
                cells.push(entry.delta_delta_delay.to_string());
                cells.push(entry.start_total_delay.to_string());
                cells.push(entry.middle_total_delay.to_string());
                cells.push(entry.end_total_delay.to_string());
                cells.push(entry.num_pointings.to_string());
                cells.push(entry.reserved.to_string());
                for frac in &entry.frac_delay {
                    cells.push(frac.to_string());
                }
            }
        }
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}
