//! Resample engine: per-sample complex transforms of selected sources.
//!
//! Each affected sample is handed a neighbourhood window of up to `region`
//! samples on either side, assembled across block boundaries and, at the
//! subfile edges, from the non-overlapping half of the margin. Untouched
//! sources pass through byte-identically.

use std::io::Write;

use bytes::Bytes;
use tracing::debug;

use crate::delays::DelayTable;
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::reader::{MarginEnd, SubfileReader};
use crate::writer::BlockProgress;
use crate::BYTES_PER_SAMPLE;

const BPS: usize = BYTES_PER_SAMPLE as usize;

/// A per-sample complex transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// Multiply each sample by a real factor.
    Scale(f64),
    /// Linear-interpolation phase gradient: shift each sample by
    /// `initial + rate * time` samples, interpolating between the two
    /// neighbouring samples of the fractional position.
    Linear { rate: f64, initial: f64 },
}

/// Sample at `distance` after `cur`, clamped to the available window.
fn forward(cur: (f64, f64), next: &[(f64, f64)], distance: usize) -> (f64, f64) {
    if distance == 0 {
        cur
    } else {
        next.get(distance - 1)
            .or_else(|| next.last())
            .copied()
            .unwrap_or(cur)
    }
}

/// Sample at `distance` before `cur`. `prev` is in time order, so the
/// nearest sample is its last.
fn backward(cur: (f64, f64), prev: &[(f64, f64)], distance: usize) -> (f64, f64) {
    if distance == 0 || prev.is_empty() {
        cur
    } else {
        prev[prev.len().saturating_sub(distance)]
    }
}

impl Transform {
    /// Apply to one sample. `prev` and `next` hold up to `region`
    /// neighbouring samples; `time` is the absolute sample time in
    /// seconds.
    pub fn apply(
        &self,
        prev: &[(f64, f64)],
        cur: (f64, f64),
        next: &[(f64, f64)],
        time: f64,
    ) -> (f64, f64) {
        match *self {
            Transform::Scale(factor) => (cur.0 * factor, cur.1 * factor),
            Transform::Linear { rate, initial } => {
                let amount = initial + rate * time;
                let whole = amount.trunc();
                let frac = (amount - whole).abs();
                let distance = whole.abs() as usize;
                let (s1, s2) = if amount > 0.0 {
                    (
                        forward(cur, next, distance),
                        forward(cur, next, distance + 1),
                    )
                } else if amount < 0.0 {
                    (
                        backward(cur, prev, distance),
                        backward(cur, prev, distance + 1),
                    )
                } else {
                    (cur, cur)
                };
                (s1.0 + (s2.0 - s1.0) * frac, s1.1 + (s2.1 - s1.1) * frac)
            }
        }
    }
}

/// The transform set for one pass: at most one transform per line, plus
/// the neighbourhood size every transform sees.
#[derive(Debug, Clone)]
pub struct ResampleRules {
    per_line: Vec<Option<Transform>>,
    region: usize,
}

impl ResampleRules {
    /// Resolve `(rf_input, transform)` rules against the subfile's source
    /// order.
    pub fn build(
        table: &DelayTable,
        rules: &[(u16, Transform)],
        region: usize,
    ) -> Result<ResampleRules> {
        let mut per_line = vec![None; table.num_sources()];
        for &(rf_input, transform) in rules {
            per_line[table.index_of(rf_input)?] = Some(transform);
        }
        Ok(ResampleRules { per_line, region })
    }

    pub fn region(&self) -> usize {
        self.region
    }
}

fn decode(bytes: &[u8], out: &mut Vec<(f64, f64)>) {
    for pair in bytes.chunks(BPS) {
        out.push((f64::from(pair[0] as i8), f64::from(pair[1] as i8)));
    }
}

/// Stream the data blocks through the transform set.
pub fn write_blocks<W: Write>(
    reader: &mut SubfileReader,
    meta: &Metadata,
    rules: &ResampleRules,
    out: &mut W,
) -> Result<()> {
    if rules.per_line.len() as u64 != meta.num_sources {
        return Err(Error::InvalidArgument(format!(
            "resample rules cover {} sources but the subfile has {}",
            rules.per_line.len(),
            meta.num_sources
        )));
    }
    debug!(
        blocks = meta.blocks_per_sub,
        region = rules.region,
        "resampling"
    );

    let spl = meta.samples_per_line as usize;
    let sls = meta.sub_line_size as usize;
    let half_bytes = (meta.margin_samples / 2) as usize * BPS;
    let blocks_per_sec = meta.blocks_per_sec();
    let sample_rate = meta.sample_rate as f64;

    let mut out_buf = vec![0u8; meta.block_length as usize];
    let mut ext: Vec<(f64, f64)> = Vec::new();
    let mut progress = BlockProgress::start();
    for block in 1..=meta.blocks_per_sub {
        let prev = reader.read_block_or_null(meta, block as i64 - 1)?;
        let cur = reader.read_block(meta, block)?;
        let next = reader.read_block_or_null(meta, block as i64 + 1)?;

        // Untouched lines pass through byte-identically.
        out_buf.copy_from_slice(&cur);

        for (i, rule) in rules.per_line.iter().enumerate() {
            let Some(transform) = rule else { continue };
            let line_off = i * sls;

            // The neighbouring stream segments: the adjacent block's line,
            // or at the subfile edge the non-overlapping half of the
            // margin.
            let prev_seg: Bytes = match &prev {
                Some(p) => p.slice(line_off..line_off + sls),
                None => reader
                    .read_margin_line(meta, i as u64, MarginEnd::Head)?
                    .slice(..half_bytes),
            };
            let next_seg: Bytes = match &next {
                Some(n) => n.slice(line_off..line_off + sls),
                None => reader
                    .read_margin_line(meta, i as u64, MarginEnd::Tail)?
                    .slice(half_bytes..),
            };

            let prev_take = rules.region.min(prev_seg.len() / BPS);
            let next_take = rules.region.min(next_seg.len() / BPS);

            ext.clear();
            decode(&prev_seg[prev_seg.len() - prev_take * BPS..], &mut ext);
            decode(&cur[line_off..line_off + sls], &mut ext);
            decode(&next_seg[..next_take * BPS], &mut ext);
            let base = prev_take;

            let out_line = &mut out_buf[line_off..line_off + sls];
            for j in 0..spl {
                let time = (block - 1) as f64 / blocks_per_sec + j as f64 / sample_rate;
                let lo = (base + j).saturating_sub(rules.region);
                let hi = (base + j + 1 + rules.region).min(ext.len());
                let (re, im) = transform.apply(
                    &ext[lo..base + j],
                    ext[base + j],
                    &ext[base + j + 1..hi],
                    time,
                );
                out_line[j * BPS] = re.round() as i8 as u8;
                out_line[j * BPS + 1] = im.round() as i8 as u8;
            }
        }
        out.write_all(&out_buf)?;
        progress.tick(block);
    }
    progress.finish();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{micro_meta, micro_reader, samples, ws_table};

    fn run(
        meta: &Metadata,
        margins: &[(Vec<u8>, Vec<u8>)],
        blocks: &[Vec<Vec<u8>>],
        rules: &ResampleRules,
    ) -> Vec<u8> {
        let mut reader = micro_reader(meta, margins, blocks);
        let mut out = Vec::new();
        write_blocks(&mut reader, meta, rules, &mut out).unwrap();
        out
    }

    #[test]
    fn test_scale_zero_blanks_only_selected_source() {
        let meta = micro_meta(2, 4, 2);
        let margins = vec![
            ((0..8).collect(), (0..8).collect()),
            ((0..8).collect(), (0..8).collect()),
        ];
        let blocks = vec![
            vec![vec![10, 20, 30, 40], vec![50, 60, 70, 80]],
            vec![vec![11, 21, 31, 41], vec![51, 61, 71, 81]],
        ];
        let rules = ResampleRules::build(&ws_table(&[0, 0]), &[(0, Transform::Scale(0.0))], 2)
            .unwrap();
        let out = run(&meta, &margins, &blocks, &rules);

        let sls = meta.sub_line_size as usize;
        // Source 0 is all zero bytes in both blocks.
        assert_eq!(&out[..sls], &vec![0u8; sls][..]);
        assert_eq!(&out[2 * sls..3 * sls], &vec![0u8; sls][..]);
        // Source 1 is byte-identical to the input, sample encoding intact.
        assert_eq!(&out[sls..2 * sls], &samples(&[50, 60, 70, 80])[..]);
        assert_eq!(&out[3 * sls..], &samples(&[51, 61, 71, 81])[..]);
    }

    #[test]
    fn test_scale_one_is_identity() {
        let meta = micro_meta(1, 4, 2);
        let margins = vec![((0..8).collect(), (0..8).collect())];
        let blocks = vec![vec![vec![10, 20, 30, 40]], vec![vec![50, 60, 70, 80]]];
        let rules =
            ResampleRules::build(&ws_table(&[0]), &[(0, Transform::Scale(1.0))], 2).unwrap();
        let out = run(&meta, &margins, &blocks, &rules);
        let mut expected = samples(&[10, 20, 30, 40]);
        expected.extend(samples(&[50, 60, 70, 80]));
        assert_eq!(out, expected);
    }

    #[test]
    fn test_linear_half_sample_interpolates_across_boundaries() {
        let meta = micro_meta(1, 4, 2);
        // Tail margin 88..96: its second half (92..) continues the stream
        // past the last block.
        let margins = vec![((0..8).collect(), (88..96).collect())];
        let blocks = vec![vec![vec![10, 20, 30, 40]], vec![vec![50, 60, 70, 80]]];
        let rules = ResampleRules::build(
            &ws_table(&[0]),
            &[(
                0,
                Transform::Linear {
                    rate: 0.0,
                    initial: 0.5,
                },
            )],
            2,
        )
        .unwrap();
        let out = run(&meta, &margins, &blocks, &rules);

        // Every output sample is the mean of the sample and its successor;
        // the last sample of block 1 reaches into block 2, and the last
        // sample of block 2 reaches into the tail margin (value 92).
        let values: Vec<u8> = out.chunks(2).map(|pair| pair[0]).collect();
        assert_eq!(values, vec![15, 25, 35, 45, 55, 65, 75, 86]);
    }

    #[test]
    fn test_linear_whole_sample_back_uses_margin_half() {
        let meta = micro_meta(1, 4, 2);
        // Head margin 0..8: its first half (0..4) precedes the stream.
        let margins = vec![((0..8).collect(), (88..96).collect())];
        let blocks = vec![vec![vec![10, 20, 30, 40]], vec![vec![50, 60, 70, 80]]];
        let rules = ResampleRules::build(
            &ws_table(&[0]),
            &[(
                0,
                Transform::Linear {
                    rate: 0.0,
                    initial: -1.0,
                },
            )],
            2,
        )
        .unwrap();
        let out = run(&meta, &margins, &blocks, &rules);

        // Each sample becomes its predecessor; the first sample of the
        // subfile takes the last sample of the head margin's leading half.
        let values: Vec<u8> = out.chunks(2).map(|pair| pair[0]).collect();
        assert_eq!(values, vec![3, 10, 20, 30, 40, 50, 60, 70]);
    }

    #[test]
    fn test_build_rejects_unknown_source() {
        assert!(
            ResampleRules::build(&ws_table(&[0, 0]), &[(7, Transform::Scale(2.0))], 1).is_err()
        );
    }
}
