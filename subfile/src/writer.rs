//! Subfile writer: preamble assembly and data-stream dispatch.

use std::io::Write;

use bytes::Bytes;
use tracing::debug;

use crate::delays::DelayTable;
use crate::error::{Error, Result};
use crate::metadata::{Metadata, Section};
use crate::reader::SubfileReader;
use crate::resample::ResampleRules;
use crate::{remap, repoint, resample};

/// Content for one preamble section of the output.
#[derive(Debug, Clone)]
pub enum SectionContent {
    /// Verbatim bytes.
    Buffer(Bytes),
    /// A delay table, serialised in its own version's wire format.
    Table(DelayTable),
    /// Copy the section from the source subfile.
    File,
}

/// How to produce the data section.
#[derive(Debug, Clone)]
pub enum DataMode {
    /// Copy every block verbatim.
    Passthrough,
    /// Whole-sample time shift from one delay table to another.
    Repoint {
        from: DelayTable,
        to: DelayTable,
        force: bool,
    },
    /// Line permutation.
    Remap { line_map: Vec<usize> },
    /// Windowed per-sample transforms.
    Resample { rules: ResampleRules },
}

/// Everything needed to assemble an output subfile.
#[derive(Debug, Clone)]
pub struct OutputDescriptor {
    pub meta: Metadata,
    pub header: Option<SectionContent>,
    pub delay_table: Option<SectionContent>,
    pub udpmap: Option<SectionContent>,
    pub margin: Option<SectionContent>,
    pub data: Option<DataMode>,
}

/// Stderr progress line for the block-writing loop.
pub struct BlockProgress;

impl BlockProgress {
    pub fn start() -> Self {
        eprint!("Writing blocks...");
        BlockProgress
    }

    pub fn tick(&mut self, block: u64) {
        eprint!(" {block}");
    }

    pub fn finish(self) {
        eprintln!();
    }
}

fn resolve_section(
    reader: &mut SubfileReader,
    src_meta: &Metadata,
    section: Section,
    content: &SectionContent,
) -> Result<Bytes> {
    match content {
        SectionContent::Buffer(buf) => Ok(buf.clone()),
        SectionContent::Table(table) => Ok(Bytes::from(crate::delays::binary::serialise(table))),
        SectionContent::File => reader.read_section(src_meta, section),
    }
}

/// Write a subfile: preamble first, then the data blocks in ascending
/// order through the selected transform.
///
/// The preamble is a zeroed `header_length + block_length` region with
/// each provided section copied in at its declared offset, which requires
/// the delay table, packet map and margin to pack inside block 0.
pub fn write_subfile<W: Write>(
    reader: &mut SubfileReader,
    src_meta: &Metadata,
    desc: &OutputDescriptor,
    out: &mut W,
) -> Result<()> {
    let meta = &desc.meta;
    if !meta.preamble_packed() {
        return Err(Error::InvalidFormat(format!(
            "preamble sections end at {} which exceeds the {}-byte preamble",
            meta.margin_offset + meta.margin_length,
            meta.preamble_length()
        )));
    }

    let mut preamble = vec![0u8; meta.preamble_length() as usize];
    let sections = [
        (Section::Header, &desc.header),
        (Section::DelayTable, &desc.delay_table),
        (Section::UdpMap, &desc.udpmap),
        (Section::Margin, &desc.margin),
    ];
    for (section, content) in sections {
        let Some(content) = content else { continue };
        let buf = resolve_section(reader, src_meta, section, content)?;
        let expected = meta.section_length(section);
        if buf.len() as u64 != expected {
            return Err(Error::InvalidFormat(format!(
                "{} section is {} bytes, expected {expected}",
                section.name(),
                buf.len()
            )));
        }
        let offset = meta.section_offset(section) as usize;
        preamble[offset..offset + buf.len()].copy_from_slice(&buf);
    }
    debug!(bytes = preamble.len(), "writing preamble");
    out.write_all(&preamble)?;

    let Some(mode) = &desc.data else {
        return Ok(());
    };
    match mode {
        DataMode::Passthrough => {
            let mut progress = BlockProgress::start();
            for block in 1..=meta.blocks_per_sub {
                let buf = reader.read_block(src_meta, block)?;
                out.write_all(&buf)?;
                progress.tick(block);
            }
            progress.finish();
            Ok(())
        }
        DataMode::Repoint { from, to, force } => {
            repoint::write_blocks(reader, src_meta, from, to, out, *force)
        }
        DataMode::Remap { line_map } => remap::write_blocks(reader, src_meta, line_map, out),
        DataMode::Resample { rules } => resample::write_blocks(reader, src_meta, rules, out),
    }
}
