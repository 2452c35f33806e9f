//! Opening a subfile: header parse, geometry derivation, delay-table load.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cache::{BlockCache, CacheKey};
use crate::delays::{binary, DelayTable, TableVersion};
use crate::error::{Error, Result};
use crate::header::Header;
use crate::metadata::{Metadata, Section};
use crate::reader::SubfileReader;
use crate::HEADER_LENGTH;

/// Options for opening a subfile.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Open read-write, for the in-place commands.
    pub writable: bool,
    /// Block cache capacity in bytes.
    pub cache_capacity: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            writable: false,
            cache_capacity: BlockCache::DEFAULT_CAPACITY,
        }
    }
}

/// An open subfile: reader, parsed header, derived geometry and delay
/// table.
pub struct Subfile {
    pub path: PathBuf,
    pub reader: SubfileReader,
    pub header: Header,
    pub meta: Metadata,
    pub delay_table: DelayTable,
}

impl Subfile {
    pub fn open<P: AsRef<Path>>(path: P, opts: &LoadOptions) -> Result<Subfile> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(opts.writable)
            .open(path)?;
        let mut reader = SubfileReader::new(file, BlockCache::new(opts.cache_capacity));

        let header_buf = reader.read(CacheKey::Section(Section::Header), 0, HEADER_LENGTH)?;
        let header = Header::parse(&header_buf)?;
        let meta = Metadata::from_header(&header)?;
        debug!(
            obs = meta.observation_id,
            subobs = meta.subobservation_id,
            version = meta.mwax_sub_version,
            blocks = meta.blocks_per_sub,
            sources = meta.num_sources,
            "loaded subfile"
        );

        // FRAC_DELAY_SIZE, when present, must agree with the version.
        let frac_delay_size = header.get_u64_or("FRAC_DELAY_SIZE", meta.frac_delay_size)?;
        if frac_delay_size != meta.frac_delay_size {
            return Err(Error::VersionMismatch {
                expected: format!("FRAC_DELAY_SIZE {}", meta.frac_delay_size),
                detected: frac_delay_size.to_string(),
            });
        }

        let version = TableVersion::from_number(u64::from(meta.mwax_sub_version))?;
        let dt_buf = reader.read_section(&meta, Section::DelayTable)?;
        let delay_table = binary::parse_with(&dt_buf, version, meta.num_frac_delays as usize)?;
        if delay_table.num_sources() as u64 != meta.num_sources {
            return Err(Error::InvalidFormat(format!(
                "delay table has {} rows, expected {}",
                delay_table.num_sources(),
                meta.num_sources
            )));
        }

        Ok(Subfile {
            path: path.to_path_buf(),
            reader,
            header,
            meta,
            delay_table,
        })
    }

    /// Serialise the in-memory header back into the file.
    pub fn write_header(&mut self) -> Result<()> {
        let buf = self.header.serialise(self.meta.header_length as usize)?;
        self.reader.write_at(self.meta.header_offset, &buf)
    }

    /// Serialise the in-memory delay table back into the file.
    pub fn write_delay_table(&mut self) -> Result<()> {
        let buf = binary::serialise(&self.delay_table);
        if buf.len() as u64 != self.meta.dt_length {
            return Err(Error::InvalidFormat(format!(
                "delay table serialises to {} bytes, expected {}",
                buf.len(),
                self.meta.dt_length
            )));
        }
        self.reader.write_at(self.meta.dt_offset, &buf)
    }
}
