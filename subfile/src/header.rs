//! Text header codec.
//!
//! The first 4096 bytes of a subfile are zero-padded ASCII, one
//! `KEY VALUE\n` per line. A fixed registry maps each known key to a value
//! type and a preferred ordering index; unknown keys survive a round trip as
//! strings and sort last.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Context, Error, Location, Result};

/// Value type of a registered header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Str,
}

/// Ordering index given to keys absent from the registry.
pub const UNKNOWN_FIELD_INDEX: u16 = 9999;

/// Registry of known MWAX subfile header fields: key, value type, and the
/// preferred position in a serialised header.
pub const HEADER_FIELDS: &[(&str, FieldType, u16)] = &[
    ("HDR_SIZE", FieldType::Int, 0),
    ("POPULATED", FieldType::Int, 1),
    ("OBS_ID", FieldType::Int, 2),
    ("SUBOBS_ID", FieldType::Int, 3),
    ("MODE", FieldType::Str, 4),
    ("UTC_START", FieldType::Str, 5),
    ("OBS_OFFSET", FieldType::Int, 6),
    ("NBIT", FieldType::Int, 7),
    ("NPOL", FieldType::Int, 8),
    ("NTIMESAMPLES", FieldType::Int, 9),
    ("NINPUTS", FieldType::Int, 10),
    ("NINPUTS_XGPU", FieldType::Int, 11),
    ("APPLY_PATH_WEIGHTS", FieldType::Int, 12),
    ("APPLY_PATH_DELAYS", FieldType::Int, 13),
    ("INT_TIME_MSEC", FieldType::Int, 14),
    ("FSCRUNCH_FACTOR", FieldType::Int, 15),
    ("APPLY_VIS_WEIGHTS", FieldType::Int, 16),
    ("TRANSFER_SIZE", FieldType::Int, 17),
    ("PROJ_ID", FieldType::Str, 18),
    ("EXPOSURE_SECS", FieldType::Int, 19),
    ("COARSE_CHANNEL", FieldType::Int, 20),
    ("CORR_COARSE_CHANNEL", FieldType::Int, 21),
    ("SECS_PER_SUBOBS", FieldType::Int, 22),
    ("UNIXTIME", FieldType::Int, 23),
    ("UNIXTIME_MSEC", FieldType::Int, 24),
    ("FINE_CHAN_WIDTH_HZ", FieldType::Int, 25),
    ("NFINE_CHAN", FieldType::Int, 26),
    ("BANDWIDTH_HZ", FieldType::Int, 27),
    ("SAMPLE_RATE", FieldType::Int, 28),
    ("MC_IP", FieldType::Str, 29),
    ("MC_PORT", FieldType::Int, 30),
    ("MC_SRC_IP", FieldType::Str, 31),
    ("MWAX_U2S_VER", FieldType::Str, 32),
    ("IDX_PACKET_MAP", FieldType::Str, 33),
    ("IDX_METAFITS", FieldType::Str, 34),
    ("IDX_DELAY_TABLE", FieldType::Str, 35),
    ("IDX_MARGIN_DATA", FieldType::Str, 36),
    ("MWAX_SUB_VER", FieldType::Int, 37),
    ("FRAC_DELAY_SIZE", FieldType::Int, 38),
];

fn field_spec(key: &str) -> Option<&'static (&'static str, FieldType, u16)> {
    HEADER_FIELDS.iter().find(|(k, _, _)| *k == key)
}

fn field_index(key: &str) -> u16 {
    field_spec(key).map_or(UNKNOWN_FIELD_INDEX, |(_, _, i)| *i)
}

/// A header value, typed per the field registry.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Int(v) => write!(f, "{v}"),
            HeaderValue::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Parsed subfile header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    fields: HashMap<String, HeaderValue>,
}

impl Header {
    /// Parse a header section buffer: ASCII up to the first NUL, one
    /// `KEY VALUE` per line, values coerced by the field registry.
    pub fn parse(buf: &[u8]) -> Result<Header> {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        let text = std::str::from_utf8(&buf[..end])
            .map_err(|e| Error::InvalidFormat(format!("header is not ASCII: {e}")))?;

        let mut fields = HashMap::new();
        for (row, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(' ').ok_or_else(|| {
                Error::InvalidFormat(format!("header line has no value: '{line}'"))
                    .at(Location::Row(row))
            })?;
            let value = Self::coerce(key, value).at(Location::Row(row))?;
            fields.insert(key.to_string(), value);
        }
        Ok(Header { fields })
    }

    fn coerce(key: &str, value: &str) -> Result<HeaderValue> {
        match field_spec(key) {
            Some(&(known_key, FieldType::Int, _)) => {
                value.parse::<i64>().map(HeaderValue::Int).map_err(|_| {
                    Error::InvalidFormat(format!("Failed to parse integer: '{value}'"))
                        .at(Location::Field(known_key))
                })
            }
            _ => Ok(HeaderValue::Str(value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.fields.get(key)
    }

    /// Fetch a required non-negative integer field.
    pub fn get_u64(&self, key: &'static str) -> Result<u64> {
        match self.fields.get(key) {
            Some(HeaderValue::Int(v)) if *v >= 0 => Ok(*v as u64),
            Some(HeaderValue::Int(v)) => Err(Error::OutOfRange {
                what: key,
                value: *v,
                min: 0,
                max: i64::MAX,
            }),
            Some(HeaderValue::Str(v)) => Err(Error::InvalidFormat(format!(
                "header field {key} is not an integer: '{v}'"
            ))),
            None => Err(Error::MissingResource(format!("header field {key}"))),
        }
    }

    /// Fetch an optional non-negative integer field with a default.
    pub fn get_u64_or(&self, key: &'static str, default: u64) -> Result<u64> {
        if self.fields.contains_key(key) {
            self.get_u64(key)
        } else {
            Ok(default)
        }
    }

    /// Set a field from its text representation.
    ///
    /// Unknown keys are rejected unless `force` is given, in which case they
    /// are stored as strings and sort last on serialisation.
    pub fn set(&mut self, key: &str, value: &str, force: bool) -> Result<()> {
        if field_spec(key).is_none() && !force {
            return Err(Error::InvalidArgument(format!(
                "unknown header field '{key}' (use force to set it anyway)"
            )));
        }
        let value = Self::coerce(key, value)?;
        self.fields.insert(key.to_string(), value);
        Ok(())
    }

    /// Remove a field. Returns whether it was present.
    pub fn unset(&mut self, key: &str) -> bool {
        self.fields.remove(key).is_some()
    }

    /// Fields sorted by registry index, then alphabetically among ties.
    pub fn sorted_fields(&self) -> Vec<(&str, &HeaderValue)> {
        let mut fields: Vec<(&str, &HeaderValue)> = self
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        fields.sort_by_key(|(k, _)| (field_index(k), *k));
        fields
    }

    /// Serialise to exactly `header_length` bytes, NUL-padded.
    pub fn serialise(&self, header_length: usize) -> Result<Vec<u8>> {
        let mut text = String::new();
        for (key, value) in self.sorted_fields() {
            text.push_str(key);
            text.push(' ');
            text.push_str(&value.to_string());
            text.push('\n');
        }
        if text.len() > header_length {
            return Err(Error::InvalidFormat(format!(
                "header does not fit in {header_length} bytes (needs {})",
                text.len()
            )));
        }
        let mut buf = text.into_bytes();
        buf.resize(header_length, 0);
        Ok(buf)
    }

    /// Pretty format: four fields per line, 19-char key and 20-char value
    /// padding.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        for chunk in self.sorted_fields().chunks(4) {
            let mut line = String::new();
            for (key, value) in chunk {
                line.push_str(&format!("{key:<19} {value:<20}"));
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
