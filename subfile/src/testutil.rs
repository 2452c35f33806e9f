//! Hand-built micro subfiles for engine unit tests.
//!
//! These fixtures bypass header derivation: the metadata record is filled
//! in directly with tiny dimensions, and the file carries only a margin
//! section followed by data blocks. Sample values are written as
//! `[v, v + 1]` byte pairs so re/im ordering mistakes show up.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use crate::cache::BlockCache;
use crate::delays::{DelayTable, DelayTableEntry, TableVersion};
use crate::metadata::Metadata;
use crate::reader::SubfileReader;

/// Encode one complex sample from a scalar test value.
pub fn sample(v: u8) -> [u8; 2] {
    [v, v.wrapping_add(1)]
}

pub fn samples(values: &[u8]) -> Vec<u8> {
    values.iter().flat_map(|&v| sample(v)).collect()
}

/// Metadata for a margin-then-blocks layout: the margin section sits at
/// offset 0 and block 1 starts right after it.
pub fn micro_meta(num_sources: u64, samples_per_line: u64, blocks_per_sub: u64) -> Metadata {
    let margin_samples = 8;
    let sub_line_size = samples_per_line * 2;
    let block_length = sub_line_size * num_sources;
    let margin_length = num_sources * margin_samples * 2 * 2;
    assert!(margin_length >= block_length, "margin must cover block 0");
    Metadata {
        observation_id: 0,
        subobservation_id: 0,
        sample_rate: samples_per_line * blocks_per_sub,
        secs_per_subobs: 1,
        samples_per_line,
        samples_per_packet: 4,
        margin_packets: 2,
        fft_per_block: 10,
        num_sources,
        mwax_sub_version: 1,
        blocks_per_sub,
        sub_line_size,
        block_length,
        num_frac_delays: blocks_per_sub * 10,
        margin_samples,
        frac_delay_size: 2,
        dt_entry_min_size: 20,
        dt_length: 0,
        udpmap_length: 0,
        margin_length,
        header_offset: 0,
        header_length: margin_length - block_length,
        dt_offset: 0,
        udpmap_offset: 0,
        margin_offset: 0,
        data_offset: margin_length,
    }
}

/// Write the margin section and data blocks of a micro subfile.
///
/// `margins[src]` is `(head, tail)` sample values; `blocks[b][src]` the
/// sample values of one line.
pub fn write_micro_subfile(
    meta: &Metadata,
    margins: &[(Vec<u8>, Vec<u8>)],
    blocks: &[Vec<Vec<u8>>],
) -> File {
    assert_eq!(margins.len() as u64, meta.num_sources);
    assert_eq!(blocks.len() as u64, meta.blocks_per_sub);

    let mut file = tempfile::tempfile().unwrap();
    for (head, tail) in margins {
        assert_eq!(head.len() as u64, meta.margin_samples);
        assert_eq!(tail.len() as u64, meta.margin_samples);
        file.write_all(&samples(head)).unwrap();
        file.write_all(&samples(tail)).unwrap();
    }
    for (b, block) in blocks.iter().enumerate() {
        let offset = meta.header_length + (b as u64 + 1) * meta.block_length;
        file.seek(SeekFrom::Start(offset)).unwrap();
        for line in block {
            assert_eq!(line.len() as u64, meta.samples_per_line);
            file.write_all(&samples(line)).unwrap();
        }
    }
    file.seek(SeekFrom::Start(0)).unwrap();
    file
}

pub fn micro_reader(meta: &Metadata, margins: &[(Vec<u8>, Vec<u8>)], blocks: &[Vec<Vec<u8>>]) -> SubfileReader {
    SubfileReader::new(
        write_micro_subfile(meta, margins, blocks),
        BlockCache::new(1 << 20),
    )
}

/// A delay table whose rows carry only whole-sample delays.
pub fn ws_table(ws: &[i16]) -> DelayTable {
    DelayTable {
        version: TableVersion::V1,
        entries: ws
            .iter()
            .enumerate()
            .map(|(i, &w)| DelayTableEntry {
                rf_input: i as u16,
                ws_delay: w,
                num_pointings: 1,
                ..DelayTableEntry::default()
            })
            .collect(),
    }
}

/// Decode an engine's output buffer back into per-line sample values.
pub fn decode_lines(meta: &Metadata, block: &[u8]) -> Vec<Vec<u8>> {
    block
        .chunks(meta.sub_line_size as usize)
        .map(|line| {
            line.chunks(2)
                .map(|pair| {
                    // Zero-filled samples aside, pairs must keep the
                    // [v, v + 1] encoding.
                    assert!(
                        pair[1] == pair[0].wrapping_add(1) || (pair[0] == 0 && pair[1] == 0),
                        "mangled sample pair {pair:?}"
                    );
                    pair[0]
                })
                .collect()
        })
        .collect()
}
