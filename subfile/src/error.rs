//! Error types for subfile operations

use std::fmt;

use thiserror::Error;

/// Result type for subfile operations
pub type Result<T> = std::result::Result<T, Error>;

/// One element of a breadcrumb trail locating a failure inside a compound
/// structure (a CSV cell, a delay-table row, a block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Row of a tabular input
    Row(usize),
    /// Column of a tabular input
    Col(usize),
    /// Index into a sequence
    Index(usize),
    /// Named field
    Field(&'static str),
    /// RF input id
    Source(u16),
    /// Data block index
    Block(u64),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Row(n) => write!(f, "row {n}"),
            Location::Col(n) => write!(f, "col {n}"),
            Location::Index(n) => write!(f, "index {n}"),
            Location::Field(name) => write!(f, "field {name}"),
            Location::Source(id) => write!(f, "source {id}"),
            Location::Block(n) => write!(f, "block {n}"),
        }
    }
}

/// Breadcrumb trail, outermost location first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trail(pub Vec<Location>);

impl fmt::Display for Trail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, loc) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{loc}")?;
        }
        Ok(())
    }
}

/// Subfile error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Positional read returned fewer bytes than requested
    #[error("Short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    /// Malformed header, CSV or binary structure
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Caller-specified version or count disagrees with the detected value
    #[error("Version mismatch: expected {expected}, detected {detected}")]
    VersionMismatch { expected: String, detected: String },

    /// Index or argument outside declared bounds
    #[error("{what} {value} is out of range {min}..={max}")]
    OutOfRange {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Referenced source id or section does not exist
    #[error("Missing resource: {0}")]
    MissingResource(String),

    /// Bad option or argument value, detected before any I/O
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A failure annotated with the locations traversed to reach it
    #[error("{source} at {location}")]
    At { location: Trail, source: Box<Error> },
}

impl Error {
    /// Prepend a location breadcrumb. The outermost caller's location ends
    /// up first in the trail.
    pub fn at(self, location: Location) -> Error {
        match self {
            Error::At {
                location: mut trail,
                source,
            } => {
                trail.0.insert(0, location);
                Error::At {
                    location: trail,
                    source,
                }
            }
            other => Error::At {
                location: Trail(vec![location]),
                source: Box::new(other),
            },
        }
    }
}

/// Extension trait for annotating results with location breadcrumbs.
pub trait Context<T> {
    /// Prepend `location` to the error's breadcrumb trail, if any.
    fn at(self, location: Location) -> Result<T>;
}

impl<T> Context<T> for Result<T> {
    fn at(self, location: Location) -> Result<T> {
        self.map_err(|e| e.at(location))
    }
}

/// Collect a sequence of results, recording the index of the first failure.
pub fn all<T, I>(results: I) -> Result<Vec<T>>
where
    I: IntoIterator<Item = Result<T>>,
{
    results
        .into_iter()
        .enumerate()
        .map(|(i, r)| r.at(Location::Index(i)))
        .collect()
}
