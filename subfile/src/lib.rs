//! Subfile engine for MWA sub-observation voltage files.
//!
//! A subfile is a large binary container produced by the MWAX
//! correlator's UDP-to-subfile stage: a 4096-byte ASCII header followed by a
//! per-source delay table, a packet occupancy map, margin samples retained
//! for delay shifting, and the voltage data itself as a sequence of fixed
//! size blocks of interleaved complex 8-bit sample streams.
//!
//! This crate is the engine behind the `subtool` command-line tool. It
//! provides:
//!
//! - the derived layout model ([`metadata::Metadata`]),
//! - a bounded LRU block cache and a cached positional reader,
//! - codecs for the text header and the two delay-table wire formats
//!   (with heuristic version and shape detection),
//! - the three stream transforms: repoint (whole-sample time shift),
//!   remap (stream substitution) and resample (windowed per-sample
//!   complex transforms, including an FFT phase-gradient "bake"),
//! - a subfile writer assembling preamble and transformed data streams.

pub mod bake;
pub mod cache;
pub mod delays;
pub mod error;
pub mod header;
pub mod loader;
pub mod metadata;
pub mod reader;
pub mod remap;
pub mod repoint;
pub mod resample;
pub mod upgrade;
pub mod writer;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::{BlockCache, CacheKey, CacheStats};
pub use delays::{DelayTable, DelayTableEntry, TableVersion};
pub use error::{Error, Location, Result};
pub use header::Header;
pub use loader::{LoadOptions, Subfile};
pub use metadata::{Metadata, Section};
pub use reader::SubfileReader;
pub use writer::{DataMode, OutputDescriptor, SectionContent};

/// Size of the ASCII header section in bytes.
pub const HEADER_LENGTH: u64 = 4096;

/// Voltage samples carried by one UDP packet.
pub const SAMPLES_PER_PACKET: u64 = 2048;

/// Packets of margin retained at each end of a sub-observation.
pub const MARGIN_PACKETS: u64 = 2;

/// FFT windows per data block, fixing the fractional-delay cadence.
pub const FFT_PER_BLOCK: u64 = 10;

/// Bytes per complex voltage sample (8-bit real, 8-bit imaginary).
pub const BYTES_PER_SAMPLE: u64 = 2;
