//! Repoint engine: integer-sample time shift of every source stream.
//!
//! Each source currently carries the whole-sample delay recorded in the
//! subfile's delay table. Repointing rewrites the data blocks so each
//! source carries the delay of a new table instead, pulling the samples
//! that shift in across a block boundary from the neighbouring block, or
//! from the margin section at the edges of the subfile.

use std::io::Write;

use bytes::Bytes;
use tracing::debug;

use crate::delays::DelayTable;
use crate::error::{Context, Error, Location, Result};
use crate::metadata::Metadata;
use crate::reader::{MarginEnd, SubfileReader};
use crate::writer::BlockProgress;
use crate::BYTES_PER_SAMPLE;

const BPS: usize = BYTES_PER_SAMPLE as usize;

/// Per-source shift parameters: the applied delay M and the relative shift
/// N = target - M. Positive N moves the stream towards later samples.
#[derive(Debug, Clone, Copy)]
struct Shift {
    rf_input: u16,
    m: i64,
    n: i64,
}

fn resolve_shifts(meta: &Metadata, from: &DelayTable, to: &DelayTable) -> Result<Vec<Shift>> {
    if from.num_sources() as u64 != meta.num_sources {
        return Err(Error::InvalidArgument(format!(
            "delay table has {} sources but the subfile has {}",
            from.num_sources(),
            meta.num_sources
        )));
    }
    let mut shifts = Vec::with_capacity(from.num_sources());
    for entry in &from.entries {
        let target = to.entry_for(entry.rf_input)?;
        let m = i64::from(entry.ws_delay);
        let n = i64::from(target.ws_delay) - m;
        if n.unsigned_abs() > meta.samples_per_line {
            return Err(Error::OutOfRange {
                what: "whole-sample shift",
                value: n,
                min: -(meta.samples_per_line as i64),
                max: meta.samples_per_line as i64,
            }
            .at(Location::Source(entry.rf_input)));
        }
        shifts.push(Shift {
            rf_input: entry.rf_input,
            m,
            n,
        });
    }
    Ok(shifts)
}

/// Copy margin samples `[lo, hi)` into `dst`.
///
/// Out-of-range indices are an error unless `force` is given, in which
/// case the unavailable samples stay zeroed.
fn copy_margin(margin: &Bytes, lo: i64, hi: i64, force: bool, dst: &mut [u8]) -> Result<()> {
    let margin_samples = (margin.len() / BPS) as i64;
    if lo >= 0 && hi <= margin_samples {
        dst.copy_from_slice(&margin[(lo as usize) * BPS..(hi as usize) * BPS]);
        return Ok(());
    }
    if !force {
        return Err(Error::OutOfRange {
            what: "margin sample",
            value: if lo < 0 { lo } else { hi - 1 },
            min: 0,
            max: margin_samples - 1,
        });
    }
    for (k, idx) in (lo..hi).enumerate() {
        if (0..margin_samples).contains(&idx) {
            dst[k * BPS..(k + 1) * BPS]
                .copy_from_slice(&margin[(idx as usize) * BPS..(idx as usize + 1) * BPS]);
        }
    }
    Ok(())
}

/// Stream the data blocks of `reader` through the shift and write them to
/// `out` in ascending block order.
///
/// With `force`, shifts reaching outside the margin produce zero samples
/// instead of failing.
pub fn write_blocks<W: Write>(
    reader: &mut SubfileReader,
    meta: &Metadata,
    from: &DelayTable,
    to: &DelayTable,
    out: &mut W,
    force: bool,
) -> Result<()> {
    let shifts = resolve_shifts(meta, from, to)?;
    debug!(
        blocks = meta.blocks_per_sub,
        sources = meta.num_sources,
        "repointing"
    );

    let spl = meta.samples_per_line as i64;
    let sls = meta.sub_line_size as usize;
    let half_margin = meta.margin_samples as i64 / 2;
    let last_block = meta.blocks_per_sub;

    let mut out_buf = vec![0u8; meta.block_length as usize];
    let mut progress = BlockProgress::start();
    for block in 1..=last_block {
        // The cache turns this sliding pull of n-1, n, n+1 into one read
        // per block.
        let prev = reader.read_block_or_null(meta, block as i64 - 1)?;
        let cur = reader.read_block(meta, block)?;
        let next = reader.read_block_or_null(meta, block as i64 + 1)?;

        out_buf.fill(0);
        for (i, shift) in shifts.iter().enumerate() {
            let Shift { rf_input, m, n } = *shift;
            let head_len = n.max(0) as usize;
            let tail_len = (-n).max(0) as usize;
            let body_len = (spl - n.abs()) as usize;

            let line_off = i * sls;
            let line = &cur[line_off..line_off + sls];
            let out_line = &mut out_buf[line_off..line_off + sls];

            // Body: the retained middle of the current line.
            out_line[head_len * BPS..(head_len + body_len) * BPS]
                .copy_from_slice(&line[tail_len * BPS..(tail_len + body_len) * BPS]);

            if head_len > 0 {
                let dst = &mut out_line[..head_len * BPS];
                if block == 1 {
                    let margin = reader.read_margin_line(meta, i as u64, MarginEnd::Head)?;
                    copy_margin(
                        &margin,
                        half_margin - n - m - 1,
                        half_margin - m - 1,
                        force,
                        dst,
                    )
                    .at(Location::Source(rf_input))
                    .at(Location::Block(block))?;
                } else if let Some(prev_block) = &prev {
                    // Last head_len samples of the previous block's line.
                    let src = &prev_block[line_off + sls - head_len * BPS..line_off + sls];
                    dst.copy_from_slice(src);
                }
            }

            if tail_len > 0 {
                let dst = &mut out_line[(head_len + body_len) * BPS..];
                if block == last_block {
                    let margin = reader.read_margin_line(meta, i as u64, MarginEnd::Tail)?;
                    copy_margin(
                        &margin,
                        half_margin - m + 1,
                        half_margin - n - m + 1,
                        force,
                        dst,
                    )
                    .at(Location::Source(rf_input))
                    .at(Location::Block(block))?;
                } else if let Some(next_block) = &next {
                    // First tail_len samples of the next block's line.
                    let src = &next_block[line_off..line_off + tail_len * BPS];
                    dst.copy_from_slice(src);
                }
            }
        }
        out.write_all(&out_buf)?;
        progress.tick(block);
    }
    progress.finish();
    Ok(())
}
