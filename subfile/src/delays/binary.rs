//! Binary delay-table codec and format auto-detection.
//!
//! Row layouts, little-endian throughout:
//!
//! | field             | v1 offset | v1 type | v2 offset | v2 type |
//! |-------------------|-----------|---------|-----------|---------|
//! | rf_input          | 0         | u16     | 0         | u16     |
//! | ws_delay          | 2         | i16     | 2         | i16     |
//! | initial_delay     | 4         | i32     | 4         | f64     |
//! | delta_delay       | 8         | i32     | 12        | f64     |
//! | delta_delta_delay | 12        | i32     | 20        | f64     |
//! | start_total_delay | -         | -       | 28        | f64     |
//! | middle_total_delay| -         | -       | 36        | f64     |
//! | end_total_delay   | -         | -       | 44        | f64     |
//! | num_pointings     | 16        | u16     | 52        | u16     |
//! | reserved          | 18        | u16     | 54        | u16     |
//! | frac_delay[i]     | 20 + 2i   | i16     | 56 + 4i   | f32     |
//!
//! v1 fractional delays are millisamples (scaled by 1/1000 on load and
//! 1000 on save); v2 fractional delays are samples.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::debug;

use crate::delays::{DelayTable, DelayTableEntry, TableVersion};
use crate::error::{Error, Result};

/// Tolerance for the agreement checks in the version heuristics.
const APPROX_TOLERANCE: f64 = 0.0001;

/// Valid fractional-delay magnitude: millisamples in v1, samples in v2.
pub const FRAC_LIMIT_V1: f64 = 2000.0;
pub const FRAC_LIMIT_V2: f64 = 2.0;

fn u16_at(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn i16_at(buf: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn i32_at(buf: &[u8], offset: usize) -> i32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(bytes)
}

fn f32_at(buf: &[u8], offset: usize) -> f32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    f32::from_le_bytes(bytes)
}

fn f64_at(buf: &[u8], offset: usize) -> f64 {
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    f64::from_le_bytes(bytes)
}

/// Whether the first row of `buf` looks like a v1 entry.
///
/// `num_pointings` must read 1, the initial delay must agree with the first
/// fractional delay, and both must be zero or both nonzero.
pub fn plausibly_v1(buf: &[u8]) -> bool {
    if buf.len() < TableVersion::V1.entry_min_size() {
        return false;
    }
    let num_pointings = u16_at(buf, 16);
    let initial_delay = i32_at(buf, 4);
    let first_frac = i16_at(buf, 18);

    num_pointings == 1
        && (f64::from(initial_delay) - f64::from(first_frac)).abs() <= APPROX_TOLERANCE
        && f64::from(first_frac).abs() <= FRAC_LIMIT_V1
        && ((initial_delay == 0) == (first_frac == 0))
}

/// Whether the first row of `buf` looks like a v2 entry.
///
/// `num_pointings` must read 1 with a zero reserved word, and the initial
/// delay must agree with both the start total delay and the first
/// fractional delay.
pub fn plausibly_v2(buf: &[u8]) -> bool {
    if buf.len() < TableVersion::V2.entry_min_size() + 4 {
        return false;
    }
    let num_pointings = u16_at(buf, 52);
    let reserved = u16_at(buf, 54);
    let initial_delay = f64_at(buf, 4);
    let start_total_delay = f64_at(buf, 28);
    let first_frac = f32_at(buf, 56);

    num_pointings == 1
        && reserved == 0
        && (initial_delay - start_total_delay).abs() <= APPROX_TOLERANCE
        && (initial_delay - f64::from(first_frac)).abs() <= APPROX_TOLERANCE
}

/// Decide between v1 and v2, refusing ambiguous or unrecognisable input.
pub fn detect_version(buf: &[u8]) -> Result<TableVersion> {
    match (plausibly_v1(buf), plausibly_v2(buf)) {
        (true, false) => Ok(TableVersion::V1),
        (false, true) => Ok(TableVersion::V2),
        (true, true) => Err(Error::InvalidFormat(
            "delay table version is ambiguous: both v1 and v2 heuristics accept".into(),
        )),
        (false, false) => Err(Error::InvalidFormat(
            "buffer does not look like a v1 or v2 delay table".into(),
        )),
    }
}

fn rows_valid(buf: &[u8], version: TableVersion, row_length: usize, frac_count: usize) -> bool {
    let frac_offset = version.frac_offset();
    for row in buf.chunks(row_length) {
        match version {
            TableVersion::V1 => {
                if u16_at(row, 16) != 1 || u16_at(row, 18) != 0 {
                    return false;
                }
                for i in 0..frac_count {
                    if f64::from(i16_at(row, frac_offset + 2 * i)).abs() > FRAC_LIMIT_V1 {
                        return false;
                    }
                }
            }
            TableVersion::V2 => {
                if u16_at(row, 52) != 1 || u16_at(row, 54) != 0 {
                    return false;
                }
                for i in 0..frac_count {
                    let frac = f32_at(row, frac_offset + 4 * i);
                    if !frac.is_finite() || f64::from(frac).abs() > FRAC_LIMIT_V2 {
                        return false;
                    }
                }
            }
        }
    }
    true
}

/// Infer `(version, row_count, frac_count)` from a bare delay-table buffer.
///
/// Every row count that evenly divides the buffer is tried, smallest
/// implied row first, against both row layouts; a candidate wins when every
/// row has `num_pointings == 1`, a zero reserved word, and all fractional
/// delays within the version's valid range.
pub fn infer_structure(buf: &[u8]) -> Result<(TableVersion, usize, usize)> {
    if buf.is_empty() {
        return Err(Error::InvalidFormat("empty delay table buffer".into()));
    }
    for row_count in (1..=buf.len()).rev() {
        if buf.len() % row_count != 0 {
            continue;
        }
        let row_length = buf.len() / row_count;
        for version in [TableVersion::V1, TableVersion::V2] {
            let fixed = version.frac_offset() + version.row_padding();
            if row_length < fixed || (row_length - fixed) % version.frac_size() != 0 {
                continue;
            }
            let frac_count = (row_length - fixed) / version.frac_size();
            if rows_valid(buf, version, row_length, frac_count) {
                debug!(%version, row_count, frac_count, "inferred delay table structure");
                return Ok((version, row_count, frac_count));
            }
        }
    }
    Err(Error::InvalidFormat(
        "unable to infer delay table structure".into(),
    ))
}

/// Parse a delay-table buffer, inferring structure and checking it against
/// the caller's expectations where given.
pub fn parse(
    buf: &[u8],
    expected_version: Option<TableVersion>,
    expected_fracs: Option<usize>,
) -> Result<DelayTable> {
    let (version, _, frac_count) = infer_structure(buf)?;
    if let Some(expected) = expected_version {
        if expected != version {
            return Err(Error::VersionMismatch {
                expected: expected.to_string(),
                detected: version.to_string(),
            });
        }
    }
    if let Some(expected) = expected_fracs {
        if expected != frac_count {
            return Err(Error::VersionMismatch {
                expected: format!("{expected} fractional delays"),
                detected: frac_count.to_string(),
            });
        }
    }
    parse_with(buf, version, frac_count)
}

/// Parse a delay-table buffer of known version and fractional-delay count.
pub fn parse_with(buf: &[u8], version: TableVersion, num_fracs: usize) -> Result<DelayTable> {
    let row_length = version.row_length(num_fracs);
    if buf.is_empty() || buf.len() % row_length != 0 {
        return Err(Error::InvalidFormat(format!(
            "delay table length {} is not a multiple of the {version} row length {row_length}",
            buf.len()
        )));
    }

    let entries = buf
        .chunks(row_length)
        .map(|row| parse_entry(row, version, num_fracs))
        .collect::<Result<Vec<_>>>()?;
    Ok(DelayTable { version, entries })
}

fn parse_entry(row: &[u8], version: TableVersion, num_fracs: usize) -> Result<DelayTableEntry> {
    let mut cursor = Cursor::new(row);
    let mut entry = DelayTableEntry {
        rf_input: cursor.read_u16::<LittleEndian>()?,
        ws_delay: cursor.read_i16::<LittleEndian>()?,
        ..DelayTableEntry::default()
    };
    match version {
        TableVersion::V1 => {
            entry.initial_delay = f64::from(cursor.read_i32::<LittleEndian>()?);
            entry.delta_delay = f64::from(cursor.read_i32::<LittleEndian>()?);
            entry.delta_delta_delay = f64::from(cursor.read_i32::<LittleEndian>()?);
            entry.num_pointings = cursor.read_u16::<LittleEndian>()?;
            entry.reserved = cursor.read_u16::<LittleEndian>()?;
            entry.frac_delay = (0..num_fracs)
                .map(|_| Ok(f32::from(cursor.read_i16::<LittleEndian>()?) / 1000.0))
                .collect::<Result<Vec<_>>>()?;
        }
        TableVersion::V2 => {
            entry.initial_delay = cursor.read_f64::<LittleEndian>()?;
            entry.delta_delay = cursor.read_f64::<LittleEndian>()?;
            entry.delta_delta_delay = cursor.read_f64::<LittleEndian>()?;
            entry.start_total_delay = cursor.read_f64::<LittleEndian>()?;
            entry.middle_total_delay = cursor.read_f64::<LittleEndian>()?;
            entry.end_total_delay = cursor.read_f64::<LittleEndian>()?;
            entry.num_pointings = cursor.read_u16::<LittleEndian>()?;
            entry.reserved = cursor.read_u16::<LittleEndian>()?;
            entry.frac_delay = (0..num_fracs)
                .map(|_| Ok(cursor.read_f32::<LittleEndian>()?))
                .collect::<Result<Vec<_>>>()?;
        }
    }
    Ok(entry)
}

/// Serialise a delay table in its own version's wire format.
pub fn serialise(table: &DelayTable) -> Vec<u8> {
    let num_fracs = table.num_frac_delays();
    let mut buf = Vec::with_capacity(table.num_sources() * table.version.row_length(num_fracs));
    for entry in &table.entries {
        buf.extend_from_slice(&entry.rf_input.to_le_bytes());
        buf.extend_from_slice(&entry.ws_delay.to_le_bytes());
        match table.version {
            TableVersion::V1 => {
                buf.extend_from_slice(&(entry.initial_delay.round() as i32).to_le_bytes());
                buf.extend_from_slice(&(entry.delta_delay.round() as i32).to_le_bytes());
                buf.extend_from_slice(&(entry.delta_delta_delay.round() as i32).to_le_bytes());
                buf.extend_from_slice(&entry.num_pointings.to_le_bytes());
                buf.extend_from_slice(&entry.reserved.to_le_bytes());
                for frac in &entry.frac_delay {
                    let milli = (f64::from(*frac) * 1000.0).round() as i16;
                    buf.extend_from_slice(&milli.to_le_bytes());
                }
            }
            TableVersion::V2 => {
                buf.extend_from_slice(&entry.initial_delay.to_le_bytes());
                buf.extend_from_slice(&entry.delta_delay.to_le_bytes());
                buf.extend_from_slice(&entry.delta_delta_delay.to_le_bytes());
                buf.extend_from_slice(&entry.start_total_delay.to_le_bytes());
                buf.extend_from_slice(&entry.middle_total_delay.to_le_bytes());
                buf.extend_from_slice(&entry.end_total_delay.to_le_bytes());
                buf.extend_from_slice(&entry.num_pointings.to_le_bytes());
                buf.extend_from_slice(&entry.reserved.to_le_bytes());
                for frac in &entry.frac_delay {
                    buf.extend_from_slice(&frac.to_le_bytes());
                }
            }
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v2_table() -> DelayTable {
        DelayTable {
            version: TableVersion::V2,
            entries: vec![
                DelayTableEntry {
                    rf_input: 0,
                    ws_delay: -3,
                    initial_delay: 1.5,
                    delta_delay: 0.25,
                    delta_delta_delay: -0.125,
                    num_pointings: 1,
                    reserved: 0,
                    start_total_delay: 1.5,
                    middle_total_delay: 1.625,
                    end_total_delay: 1.75,
                    frac_delay: vec![1.5, -0.5],
                },
                DelayTableEntry {
                    rf_input: 1,
                    ws_delay: 4,
                    initial_delay: -2.0,
                    delta_delay: 0.0,
                    delta_delta_delay: 0.0,
                    num_pointings: 1,
                    reserved: 0,
                    start_total_delay: -2.0,
                    middle_total_delay: -2.0,
                    end_total_delay: -2.0,
                    frac_delay: vec![-2.0, 0.75],
                },
            ],
        }
    }

    fn v1_table() -> DelayTable {
        DelayTable {
            version: TableVersion::V1,
            entries: (0..3)
                .map(|n| DelayTableEntry {
                    rf_input: n,
                    ws_delay: n as i16 - 1,
                    initial_delay: f64::from(n) * 100.0,
                    delta_delay: 7.0,
                    delta_delta_delay: -7.0,
                    num_pointings: 1,
                    reserved: 0,
                    frac_delay: vec![1.0, -1.5],
                    ..DelayTableEntry::default()
                })
                .collect(),
        }
    }

    #[test]
    fn test_v2_round_trip_exact() {
        let table = v2_table();
        let buf = serialise(&table);
        assert_eq!(buf.len(), 2 * (56 + 2 * 4));
        let parsed = parse_with(&buf, TableVersion::V2, 2).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn test_v1_round_trip_on_millisample_representation() {
        let table = v1_table();
        let buf = serialise(&table);
        assert_eq!(buf.len(), 3 * (20 + 2 * 2));
        let parsed = parse_with(&buf, TableVersion::V1, 2).unwrap();
        assert_eq!(parsed.entries[0].frac_delay, vec![0.001, -0.0015]);

        // Byte-level round trip holds on the integer millisample form.
        assert_eq!(serialise(&parsed), buf);
    }

    #[test]
    fn test_v1_row_offsets() {
        let buf = serialise(&v1_table());
        let row = &buf[24..48];
        assert_eq!(u16_at(row, 0), 1); // rf_input
        assert_eq!(i16_at(row, 2), 0); // ws_delay
        assert_eq!(i32_at(row, 4), 100); // initial_delay
        assert_eq!(u16_at(row, 16), 1); // num_pointings
        assert_eq!(u16_at(row, 18), 0); // reserved padding
        assert_eq!(i16_at(row, 20), 1000); // frac in millisamples
        assert_eq!(i16_at(row, 22), -1500);
    }

    #[test]
    fn test_plausibly_v1() {
        let mut buf = vec![0u8; 24];
        buf[16] = 1; // num_pointings
        buf[4..8].copy_from_slice(&150i32.to_le_bytes());
        buf[18..20].copy_from_slice(&150i16.to_le_bytes());
        assert!(plausibly_v1(&buf));
        assert!(!plausibly_v2(&buf));
        assert_eq!(detect_version(&buf).unwrap(), TableVersion::V1);

        // Zero initial delay with nonzero first frac is implausible.
        let mut bad = vec![0u8; 24];
        bad[16] = 1;
        bad[18..20].copy_from_slice(&5i16.to_le_bytes());
        assert!(!plausibly_v1(&bad));

        // Out-of-range first frac is implausible.
        let mut bad = vec![0u8; 24];
        bad[16] = 1;
        bad[4..8].copy_from_slice(&2500i32.to_le_bytes());
        bad[18..20].copy_from_slice(&2500i16.to_le_bytes());
        assert!(!plausibly_v1(&bad));
    }

    #[test]
    fn test_plausibly_v2() {
        let buf = serialise(&v2_table());
        assert!(plausibly_v2(&buf));
        assert!(!plausibly_v1(&buf));
        assert_eq!(detect_version(&buf).unwrap(), TableVersion::V2);

        // Disagreement between initial delay and start total delay.
        let mut bad = buf.clone();
        bad[28..36].copy_from_slice(&9.0f64.to_le_bytes());
        assert!(!plausibly_v2(&bad));
    }

    #[test]
    fn test_detect_version_refuses_ambiguous_zero_table() {
        // An all-zero table with both num_pointings words set satisfies
        // both heuristics and must be refused.
        let mut buf = vec![0u8; 64];
        buf[16] = 1;
        buf[52] = 1;
        assert!(plausibly_v1(&buf));
        assert!(plausibly_v2(&buf));
        assert!(detect_version(&buf).is_err());
    }

    #[test]
    fn test_infer_structure() {
        let v1 = serialise(&v1_table());
        assert_eq!(
            infer_structure(&v1).unwrap(),
            (TableVersion::V1, 3, 2)
        );

        let v2 = serialise(&v2_table());
        assert_eq!(
            infer_structure(&v2).unwrap(),
            (TableVersion::V2, 2, 2)
        );

        assert!(infer_structure(&[0u8; 40]).is_err());
    }

    #[test]
    fn test_parse_checks_expectations() {
        let buf = serialise(&v2_table());
        assert!(parse(&buf, Some(TableVersion::V2), Some(2)).is_ok());
        assert!(matches!(
            parse(&buf, Some(TableVersion::V1), None),
            Err(Error::VersionMismatch { .. })
        ));
        assert!(matches!(
            parse(&buf, None, Some(7)),
            Err(Error::VersionMismatch { .. })
        ));
    }
}
