//! Cached positional reads over an open subfile.
//!
//! Every read goes through the block cache: a lookup, then on a miss an
//! exact-length positional read which is inserted before being returned.
//! Reads shorter than requested are failures, never truncations.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use bytes::Bytes;
use tracing::trace;

use crate::cache::{BlockCache, CacheKey};
use crate::error::{Error, Result};
use crate::metadata::{Metadata, Section};

/// Which end of a source's margin region to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginEnd {
    Head,
    Tail,
}

/// Cached reader over one open subfile.
pub struct SubfileReader {
    file: File,
    cache: BlockCache,
}

impl SubfileReader {
    pub fn new(file: File, cache: BlockCache) -> Self {
        Self { file, cache }
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    /// Read `length` bytes at `position`, consulting the cache under `key`.
    pub fn read(&mut self, key: CacheKey, position: u64, length: u64) -> Result<Bytes> {
        if let Some(buf) = self.cache.get(&key) {
            return Ok(buf);
        }
        trace!(%key, position, length, "cache miss");

        self.file.seek(SeekFrom::Start(position))?;
        let mut buf = vec![0u8; length as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(Error::ShortRead {
                    offset: position,
                    expected: length,
                    actual: filled as u64,
                });
            }
            filled += n;
        }

        let buf = Bytes::from(buf);
        self.cache.add(key, buf.clone());
        Ok(buf)
    }

    /// Read a whole named section.
    pub fn read_section(&mut self, meta: &Metadata, section: Section) -> Result<Bytes> {
        self.read(
            CacheKey::Section(section),
            meta.section_offset(section),
            meta.section_length(section),
        )
    }

    /// Read one block. Block 0 is the preamble block; block N begins at
    /// `header_length + N * block_length`.
    pub fn read_block(&mut self, meta: &Metadata, idx: u64) -> Result<Bytes> {
        if idx > meta.blocks_per_sub {
            return Err(Error::OutOfRange {
                what: "block index",
                value: idx as i64,
                min: 0,
                max: meta.blocks_per_sub as i64,
            });
        }
        let position = meta.header_length + idx * meta.block_length;
        self.read(CacheKey::Block(idx as u32), position, meta.block_length)
    }

    /// Read a data block, or nothing for indices outside the data region.
    pub fn read_block_or_null(&mut self, meta: &Metadata, idx: i64) -> Result<Option<Bytes>> {
        if idx <= 0 || idx > meta.blocks_per_sub as i64 {
            return Ok(None);
        }
        self.read_block(meta, idx as u64).map(Some)
    }

    /// Read the samples of one source within one block.
    pub fn read_line(&mut self, meta: &Metadata, source_idx: u64, block_idx: u64) -> Result<Bytes> {
        if source_idx >= meta.num_sources {
            return Err(Error::OutOfRange {
                what: "source index",
                value: source_idx as i64,
                min: 0,
                max: meta.num_sources as i64 - 1,
            });
        }
        let block = self.read_block(meta, block_idx)?;
        let start = (source_idx * meta.sub_line_size) as usize;
        Ok(block.slice(start..start + meta.sub_line_size as usize))
    }

    /// Read the head or tail margin samples of one source.
    pub fn read_margin_line(
        &mut self,
        meta: &Metadata,
        source_idx: u64,
        end: MarginEnd,
    ) -> Result<Bytes> {
        if source_idx >= meta.num_sources {
            return Err(Error::OutOfRange {
                what: "source index",
                value: source_idx as i64,
                min: 0,
                max: meta.num_sources as i64 - 1,
            });
        }
        let margin = self.read_section(meta, Section::Margin)?;
        let end_size = (meta.margin_samples * crate::BYTES_PER_SAMPLE) as usize;
        let source_start = source_idx as usize * 2 * end_size;
        let start = match end {
            MarginEnd::Head => source_start,
            MarginEnd::Tail => source_start + end_size,
        };
        Ok(margin.slice(start..start + end_size))
    }

    /// Write through to the file and drop the cache, which may now be
    /// stale. Used by the in-place commands.
    pub fn write_at(&mut self, position: u64, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(position))?;
        self.file.write_all(buf)?;
        self.cache.flush();
        Ok(())
    }

    /// Flush file buffers to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_over(bytes: &[u8]) -> SubfileReader {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(bytes).unwrap();
        SubfileReader::new(file, BlockCache::new(1 << 20))
    }

    #[test]
    fn test_read_caches() {
        let mut reader = reader_over(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let key = CacheKey::Block(1);
        let first = reader.read(key, 2, 4).unwrap();
        assert_eq!(&first[..], &[3, 4, 5, 6]);
        assert_eq!(reader.cache().stats().misses, 1);

        let second = reader.read(key, 2, 4).unwrap();
        assert_eq!(second, first);
        assert_eq!(reader.cache().stats().hits, 1);
    }

    #[test]
    fn test_short_read_is_an_error() {
        let mut reader = reader_over(&[1, 2, 3]);
        let err = reader.read(CacheKey::Block(1), 0, 8).unwrap_err();
        match err {
            Error::ShortRead {
                offset,
                expected,
                actual,
            } => {
                assert_eq!(offset, 0);
                assert_eq!(expected, 8);
                assert_eq!(actual, 3);
            }
            other => panic!("expected ShortRead, got {other:?}"),
        }
    }

    #[test]
    fn test_write_at_invalidates_cache() {
        let mut reader = reader_over(&[0u8; 8]);
        let key = CacheKey::Block(1);
        assert_eq!(&reader.read(key, 0, 4).unwrap()[..], &[0, 0, 0, 0]);
        reader.write_at(0, &[9, 9]).unwrap();
        assert_eq!(&reader.read(key, 0, 4).unwrap()[..], &[9, 9, 0, 0]);
    }
}
