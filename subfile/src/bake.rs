//! Bake: apply fractional delays into the sample streams with an FFT
//! phase gradient, then zero them in the delay table.
//!
//! Each selected source's stream is processed in `fft_size`-sample chunks:
//! forward FFT, a per-bin rotation derived from the delay trajectory, and
//! an inverse FFT. The rotation combines a DC term at the observation's
//! centre frequency with a per-bin fine term.

use std::f64::consts::TAU;

use num_complex::Complex;
use rustfft::FftPlanner;
use tracing::{debug, info};

use crate::error::{Context, Error, Location, Result};
use crate::loader::Subfile;
use crate::BYTES_PER_SAMPLE;

const BPS: usize = BYTES_PER_SAMPLE as usize;

/// Observation centre frequency assumed when none is given.
pub const DEFAULT_CENTRE_FREQUENCY: f64 = 157_000_000.0;

#[derive(Debug, Clone, Copy)]
pub struct BakeParams {
    /// Samples per FFT chunk.
    pub fft_size: usize,
    /// Centre frequency of the observation in Hz.
    pub centre_frequency: f64,
}

impl Default for BakeParams {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            centre_frequency: DEFAULT_CENTRE_FREQUENCY,
        }
    }
}

/// Rotate the phases of one source stream by its delay trajectory.
///
/// `delays_microsamples` is the fractional-delay trajectory in millionths
/// of a sample; each chunk uses the trajectory entry its middle sample
/// falls on.
pub fn phase_rotate(
    stream: &mut [Complex<f64>],
    delays_microsamples: &[f64],
    sample_rate: f64,
    params: &BakeParams,
) -> Result<()> {
    let fft_size = params.fft_size;
    if fft_size == 0 {
        return Err(Error::InvalidArgument("FFT size must be nonzero".into()));
    }
    if stream.len() % fft_size != 0 {
        return Err(Error::InvalidArgument(format!(
            "stream of {} samples is not a whole number of {fft_size}-sample chunks",
            stream.len()
        )));
    }
    if delays_microsamples.is_empty() {
        return Err(Error::InvalidArgument("empty delay trajectory".into()));
    }

    let mut planner = FftPlanner::new();
    let forward = planner.plan_fft_forward(fft_size);
    let inverse = planner.plan_fft_inverse(fft_size);

    // Seconds spanned by one FFT chunk.
    let fft_len = fft_size as f64 / sample_rate;
    let stream_len = stream.len();
    let scale = 1.0 / fft_size as f64;

    for (chunk_idx, chunk) in stream.chunks_mut(fft_size).enumerate() {
        let mid_sample = chunk_idx * fft_size + fft_size / 2;
        let delay_idx = delays_microsamples.len() * mid_sample / stream_len;
        let delay = delays_microsamples[delay_idx] / 1e6 / sample_rate;

        forward.process(chunk);
        for (k, bin) in chunk.iter_mut().enumerate() {
            let dc_offset = params.centre_frequency * delay * TAU;
            let fine_offset = (k as f64 / (fft_size as f64 * fft_len)) * delay * TAU;
            let rotation = -(dc_offset - fine_offset);
            *bin *= Complex::from_polar(1.0, rotation);
        }
        inverse.process(chunk);
        for value in chunk.iter_mut() {
            *value *= scale;
        }
    }
    Ok(())
}

/// Bake the fractional delays of the selected sources into the subfile in
/// place, then zero them in the delay table and rewrite it.
///
/// `sources` of `None` selects every source.
pub fn bake_subfile(
    subfile: &mut Subfile,
    sources: Option<&[u16]>,
    params: &BakeParams,
) -> Result<()> {
    let selected: Vec<usize> = match sources {
        Some(ids) => ids
            .iter()
            .map(|&id| subfile.delay_table.index_of(id))
            .collect::<Result<_>>()?,
        None => (0..subfile.delay_table.num_sources()).collect(),
    };
    let sample_rate = subfile.meta.sample_rate as f64;
    let stream_len = (subfile.meta.blocks_per_sub * subfile.meta.samples_per_line) as usize;
    if stream_len % params.fft_size != 0 {
        return Err(Error::InvalidArgument(format!(
            "FFT size {} does not divide the {stream_len}-sample stream",
            params.fft_size
        )));
    }

    for &idx in &selected {
        let rf_input = subfile.delay_table.entries[idx].rf_input;
        info!(source = rf_input, "baking fractional delays");
        let delays: Vec<f64> = subfile.delay_table.entries[idx]
            .frac_delay
            .iter()
            .map(|&frac| f64::from(frac) * 1e6)
            .collect();

        // Gather the source's full stream across the data blocks.
        let mut stream: Vec<Complex<f64>> = Vec::with_capacity(stream_len);
        for block in 1..=subfile.meta.blocks_per_sub {
            let line = subfile.reader.read_line(&subfile.meta, idx as u64, block)?;
            for pair in line.chunks(BPS) {
                stream.push(Complex::new(
                    f64::from(pair[0] as i8),
                    f64::from(pair[1] as i8),
                ));
            }
        }

        phase_rotate(&mut stream, &delays, sample_rate, params)
            .at(Location::Source(rf_input))?;

        // Write the rotated lines back in place.
        let sls = subfile.meta.sub_line_size as usize;
        let spl = subfile.meta.samples_per_line as usize;
        let mut line_buf = vec![0u8; sls];
        for block in 1..=subfile.meta.blocks_per_sub {
            let chunk = &stream[(block as usize - 1) * spl..block as usize * spl];
            for (j, value) in chunk.iter().enumerate() {
                line_buf[j * BPS] = value.re.round() as i8 as u8;
                line_buf[j * BPS + 1] = value.im.round() as i8 as u8;
            }
            let position = subfile.meta.header_length
                + block * subfile.meta.block_length
                + idx as u64 * sls as u64;
            subfile.reader.write_at(position, &line_buf)?;
        }

        subfile.delay_table.entries[idx].frac_delay.fill(0.0);
    }

    // Persist the zeroed trajectories.
    let table_bytes = crate::delays::binary::serialise(&subfile.delay_table);
    debug!(bytes = table_bytes.len(), "rewriting delay table");
    subfile
        .reader
        .write_at(subfile.meta.dt_offset, &table_bytes)?;
    subfile.reader.sync()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize) -> Vec<Complex<f64>> {
        (0..len)
            .map(|n| {
                let phase = TAU * n as f64 / 16.0;
                Complex::new((phase.cos() * 40.0).round(), (phase.sin() * 40.0).round())
            })
            .collect()
    }

    #[test]
    fn test_zero_delay_is_identity() {
        let original = tone(64);
        let mut stream = original.clone();
        let params = BakeParams {
            fft_size: 16,
            centre_frequency: DEFAULT_CENTRE_FREQUENCY,
        };
        phase_rotate(&mut stream, &[0.0, 0.0, 0.0, 0.0], 1_280_000.0, &params).unwrap();
        for (a, b) in stream.iter().zip(&original) {
            assert!((a.re - b.re).abs() < 1e-9, "{a} vs {b}");
            assert!((a.im - b.im).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn test_rotation_preserves_power() {
        let mut stream = tone(64);
        let before: f64 = stream.iter().map(|s| s.norm_sqr()).sum();
        let params = BakeParams {
            fft_size: 32,
            centre_frequency: DEFAULT_CENTRE_FREQUENCY,
        };
        phase_rotate(&mut stream, &[250_000.0, -250_000.0], 1_280_000.0, &params).unwrap();
        let after: f64 = stream.iter().map(|s| s.norm_sqr()).sum();
        assert!((before - after).abs() / before < 1e-9);
    }

    #[test]
    fn test_chunk_delay_selection() {
        // Two chunks over a four-entry trajectory: chunk 0's middle sample
        // (8 of 32) selects entry 1, chunk 1's (24 of 32) selects entry 3.
        let delays = [0.0, 1.0, 2.0, 3.0];
        for (chunk_idx, expected) in [(0usize, 1usize), (1, 3)] {
            let mid = chunk_idx * 16 + 8;
            assert_eq!(delays.len() * mid / 32, expected);
        }
    }

    #[test]
    fn test_misaligned_stream_rejected() {
        let mut stream = tone(20);
        let params = BakeParams {
            fft_size: 16,
            centre_frequency: DEFAULT_CENTRE_FREQUENCY,
        };
        assert!(phase_rotate(&mut stream, &[0.0], 1_280_000.0, &params).is_err());
    }
}
