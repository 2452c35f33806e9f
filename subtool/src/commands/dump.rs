//! `dump`: raw bytes of a section, a block, or one source's line.

use std::path::PathBuf;

use bytes::{Bytes, BytesMut};
use clap::Args;
use subfile::error::{Error, Result};
use subfile::reader::MarginEnd;
use subfile::{LoadOptions, Section, Subfile};

use crate::output;

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Subfile to read
    pub subfile: PathBuf,

    /// Dump a whole section: header, dt, udpmap, margin or data
    #[arg(long)]
    pub section: Option<String>,

    /// Dump one data block
    #[arg(long)]
    pub block: Option<u64>,

    /// Dump one source's line (requires --block)
    #[arg(long)]
    pub source: Option<u16>,

    /// Surround a line with its margin samples at the subfile edges
    #[arg(long)]
    pub with_margin: bool,

    /// Limit the dump to this many samples
    #[arg(long)]
    pub num_samples: Option<usize>,

    /// Render as hex instead of raw bytes
    #[arg(long)]
    pub hex: bool,

    /// Prefix each hex line with its file offset
    #[arg(long)]
    pub hex_offsets: bool,

    /// Write to a file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub fn run(args: DumpArgs) -> Result<()> {
    let mut subfile = Subfile::open(&args.subfile, &LoadOptions::default())?;

    let (mut bytes, offset) = match (&args.section, args.block, args.source) {
        (Some(name), None, None) => {
            let section = Section::from_name(name)?;
            (
                subfile.reader.read_section(&subfile.meta, section)?,
                subfile.meta.section_offset(section),
            )
        }
        (None, Some(block), None) => (
            subfile.reader.read_block(&subfile.meta, block)?,
            subfile.meta.header_length + block * subfile.meta.block_length,
        ),
        (None, Some(block), Some(source)) => {
            let idx = subfile.delay_table.index_of(source)? as u64;
            let line = subfile.reader.read_line(&subfile.meta, idx, block)?;
            let offset = subfile.meta.header_length
                + block * subfile.meta.block_length
                + idx * subfile.meta.sub_line_size;
            if args.with_margin
                && (block == 1 || block == subfile.meta.blocks_per_sub)
            {
                let mut combined = BytesMut::new();
                if block == 1 {
                    combined.extend_from_slice(&subfile.reader.read_margin_line(
                        &subfile.meta,
                        idx,
                        MarginEnd::Head,
                    )?);
                }
                combined.extend_from_slice(&line);
                if block == subfile.meta.blocks_per_sub {
                    combined.extend_from_slice(&subfile.reader.read_margin_line(
                        &subfile.meta,
                        idx,
                        MarginEnd::Tail,
                    )?);
                }
                (combined.freeze(), offset)
            } else {
                (line, offset)
            }
        }
        (None, None, Some(_)) => {
            return Err(Error::InvalidArgument(
                "--source needs --block to pick a line".into(),
            ))
        }
        _ => {
            return Err(Error::InvalidArgument(
                "pick exactly one of --section, --block, or --block with --source".into(),
            ))
        }
    };

    if let Some(limit) = args.num_samples {
        let limit_bytes = limit * 2;
        if limit_bytes < bytes.len() {
            bytes = Bytes::copy_from_slice(&bytes[..limit_bytes]);
        }
    }

    if let Some(path) = &args.output {
        std::fs::write(path, &bytes)?;
    } else if args.hex || args.hex_offsets {
        print!("{}", output::hex_dump(&bytes, offset, args.hex_offsets));
    } else {
        output::write_stdout(&bytes)?;
    }
    Ok(())
}
