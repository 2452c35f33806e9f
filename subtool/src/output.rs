//! Plain-text output helpers.

use std::io::Write;

use subfile::error::Result;
use subfile::Subfile;

/// Geometry summary printed by `subtool info`.
pub fn print_metadata(subfile: &Subfile) {
    let meta = &subfile.meta;
    let row = |key: &str, value: String| println!("{key:<19} {value}");
    row("OBS_ID", meta.observation_id.to_string());
    row("SUBOBS_ID", meta.subobservation_id.to_string());
    row("MWAX_SUB_VER", meta.mwax_sub_version.to_string());
    row("SAMPLE_RATE", meta.sample_rate.to_string());
    row("SECS_PER_SUBOBS", meta.secs_per_subobs.to_string());
    row("NINPUTS", meta.num_sources.to_string());
    row("NTIMESAMPLES", meta.samples_per_line.to_string());
    row("BLOCKS_PER_SUB", meta.blocks_per_sub.to_string());
    row("BLOCK_LENGTH", meta.block_length.to_string());
    row("NUM_FRAC_DELAYS", meta.num_frac_delays.to_string());
    row("MARGIN_SAMPLES", meta.margin_samples.to_string());
    row(
        "DT",
        format!("offset {} length {}", meta.dt_offset, meta.dt_length),
    );
    row(
        "UDPMAP",
        format!("offset {} length {}", meta.udpmap_offset, meta.udpmap_length),
    );
    row(
        "MARGIN",
        format!("offset {} length {}", meta.margin_offset, meta.margin_length),
    );
    row(
        "DATA",
        format!("offset {} length {}", meta.data_offset, meta.data_length()),
    );
}

/// Render bytes as hex, 16 per line, optionally with an offset column.
pub fn hex_dump(bytes: &[u8], start_offset: u64, with_offsets: bool) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        if with_offsets {
            out.push_str(&format!("{:08x}  ", start_offset + i as u64 * 16));
        }
        for (j, byte) in chunk.iter().enumerate() {
            if j > 0 {
                out.push(' ');
            }
            out.push_str(&format!("{byte:02x}"));
        }
        out.push('\n');
    }
    out
}

/// Write raw bytes to stdout, for piping into other tools.
pub fn write_stdout(bytes: &[u8]) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(bytes)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump_offsets() {
        let dump = hex_dump(&[0xDE, 0xAD, 0xBE, 0xEF], 0x20, true);
        assert_eq!(dump, "00000020  de ad be ef\n");

        let bare = hex_dump(&[0u8; 17], 0, false);
        let lines: Vec<&str> = bare.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "00");
    }
}
