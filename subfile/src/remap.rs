//! Remap engine: reassignment of sample streams to source slots.

use std::io::Write;

use tracing::debug;

use crate::delays::DelayTable;
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::reader::SubfileReader;
use crate::writer::BlockProgress;

/// Resolve `--map`/`--map-all` source-id pairs against the subfile's
/// source order into a dense line permutation.
///
/// Output line `i` will carry input line `line_map[i]`. Defaults to the
/// identity; `map_all` rewrites every slot first and `pairs` override
/// pointwise.
pub fn build_line_map(
    table: &DelayTable,
    pairs: &[(u16, u16)],
    map_all: Option<u16>,
) -> Result<Vec<usize>> {
    let mut line_map: Vec<usize> = (0..table.num_sources()).collect();
    if let Some(source) = map_all {
        let idx = table.index_of(source)?;
        line_map.fill(idx);
    }
    for &(dst, src) in pairs {
        let dst_idx = table.index_of(dst)?;
        line_map[dst_idx] = table.index_of(src)?;
    }
    Ok(line_map)
}

/// Copy every data block with its lines permuted by `line_map`.
pub fn write_blocks<W: Write>(
    reader: &mut SubfileReader,
    meta: &Metadata,
    line_map: &[usize],
    out: &mut W,
) -> Result<()> {
    if line_map.len() as u64 != meta.num_sources {
        return Err(Error::InvalidArgument(format!(
            "line map covers {} sources but the subfile has {}",
            line_map.len(),
            meta.num_sources
        )));
    }
    debug!(blocks = meta.blocks_per_sub, "remapping");

    let sls = meta.sub_line_size as usize;
    let mut out_buf = vec![0u8; meta.block_length as usize];
    let mut progress = BlockProgress::start();
    for block in 1..=meta.blocks_per_sub {
        let buf = reader.read_block(meta, block)?;
        for (dst, &src) in line_map.iter().enumerate() {
            out_buf[dst * sls..(dst + 1) * sls].copy_from_slice(&buf[src * sls..(src + 1) * sls]);
        }
        out.write_all(&out_buf)?;
        progress.tick(block);
    }
    progress.finish();
    Ok(())
}
