//! End-to-end tests over complete synthetic subfiles: load, passthrough,
//! repoint, remap and upgrade, checked byte-for-byte against the on-disk
//! layout.

use std::fs;
use std::io::Write;

use subfile::delays::{binary, DelayTable, DelayTableEntry, TableVersion};
use subfile::writer::{self, DataMode, OutputDescriptor, SectionContent};
use subfile::{remap, LoadOptions, Subfile};
use tempfile::TempDir;

/// Geometry of the synthetic subfiles: two sources, two blocks of 16384
/// samples, the real margin size.
const NUM_SOURCES: u64 = 2;
const SAMPLES_PER_LINE: u64 = 16384;
const BLOCKS: u64 = 2;
const MARGIN_SAMPLES: i64 = 4096;
const STREAM_LEN: i64 = (SAMPLES_PER_LINE * BLOCKS) as i64;

const HEADER_TEXT: &str = "OBS_ID 1217495184\nSUBOBS_ID 1217495192\nMODE MWAX_VCS\n\
                           NBIT 8\nNPOL 2\nNTIMESAMPLES 16384\nNINPUTS 2\n\
                           SECS_PER_SUBOBS 1\nSAMPLE_RATE 32768\n\
                           X_FLAVOUR vanilla\n";

/// One complex sample of the notional continuous stream of a source, at a
/// possibly negative stream position.
fn stream_sample(src: u64, p: i64) -> [u8; 2] {
    let b = p.wrapping_mul(7).wrapping_add(src as i64 * 3) as u8;
    [b, b.wrapping_add(1)]
}

fn delay_table(ws: &[i16]) -> DelayTable {
    DelayTable {
        version: TableVersion::V1,
        entries: ws
            .iter()
            .enumerate()
            .map(|(i, &w)| DelayTableEntry {
                rf_input: i as u16,
                ws_delay: w,
                initial_delay: 1000.0,
                delta_delay: 2.0,
                delta_delta_delay: 0.0,
                num_pointings: 1,
                reserved: 0,
                frac_delay: {
                    let mut fracs = vec![0.0; (BLOCKS * 10) as usize];
                    fracs[0] = 1.0;
                    fracs[1] = -1.5;
                    fracs
                },
                ..DelayTableEntry::default()
            })
            .collect(),
    }
}

/// Write a complete v1 subfile whose data and margin cut consistent
/// windows of the per-source streams, given the applied whole-sample
/// delays.
fn write_subfile_fixture(path: &std::path::Path, ws: &[i16]) -> Vec<u8> {
    let table = delay_table(ws);
    let dt_bytes = binary::serialise(&table);
    assert_eq!(dt_bytes.len() as u64, NUM_SOURCES * (20 + BLOCKS * 10 * 2));

    let mut header = HEADER_TEXT.as_bytes().to_vec();
    header.resize(4096, 0);

    let udpmap = [0xDEu8, 0xAD, 0xBE, 0xEF];

    let block_length = (NUM_SOURCES * SAMPLES_PER_LINE * 2) as usize;
    let mut file = header;
    file.extend_from_slice(&dt_bytes);
    file.extend_from_slice(&udpmap);
    let half = MARGIN_SAMPLES / 2;
    for src in 0..NUM_SOURCES {
        let m = i64::from(ws[src as usize]);
        // Head margin index i holds stream position i - (half - M - 1);
        // tail margin index i holds (L - 1) + i - (half - M).
        for i in 0..MARGIN_SAMPLES {
            file.extend_from_slice(&stream_sample(src, i - (half - m - 1)));
        }
        for i in 0..MARGIN_SAMPLES {
            file.extend_from_slice(&stream_sample(src, (STREAM_LEN - 1) + i - (half - m)));
        }
    }
    file.resize(4096 + block_length, 0);
    for block in 0..BLOCKS {
        for src in 0..NUM_SOURCES {
            for j in 0..SAMPLES_PER_LINE {
                file.extend_from_slice(&stream_sample(src, (block * SAMPLES_PER_LINE + j) as i64));
            }
        }
    }

    let mut f = fs::File::create(path).unwrap();
    f.write_all(&file).unwrap();
    file
}

fn data_section(bytes: &[u8]) -> &[u8] {
    let block_length = (NUM_SOURCES * SAMPLES_PER_LINE * 2) as usize;
    &bytes[4096 + block_length..]
}

#[test]
fn test_load_derives_geometry_and_table() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.sub");
    write_subfile_fixture(&path, &[0, 0]);

    let sub = Subfile::open(&path, &LoadOptions::default()).unwrap();
    assert_eq!(sub.meta.blocks_per_sub, BLOCKS);
    assert_eq!(sub.meta.num_sources, NUM_SOURCES);
    assert_eq!(sub.meta.num_frac_delays, BLOCKS * 10);
    assert_eq!(sub.meta.mwax_sub_version, 1);
    assert_eq!(sub.delay_table.version, TableVersion::V1);
    assert_eq!(sub.delay_table.entries[0].frac_delay[0], 1.0);
    assert_eq!(sub.delay_table.entries[0].frac_delay[1], -1.5);
    assert_eq!(sub.delay_table.entries[1].initial_delay, 1000.0);
}

#[test]
fn test_passthrough_round_trip_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.sub");
    let original = write_subfile_fixture(&path, &[0, 0]);

    let mut sub = Subfile::open(&path, &LoadOptions::default()).unwrap();
    let desc = OutputDescriptor {
        meta: sub.meta.clone(),
        header: Some(SectionContent::File),
        delay_table: Some(SectionContent::File),
        udpmap: Some(SectionContent::File),
        margin: Some(SectionContent::File),
        data: Some(DataMode::Passthrough),
    };
    let mut out = Vec::new();
    writer::write_subfile(&mut sub.reader, &sub.meta, &desc, &mut out).unwrap();
    assert_eq!(out, original);
}

#[test]
fn test_repoint_identity_keeps_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.sub");
    let original = write_subfile_fixture(&path, &[3, -2]);

    let mut sub = Subfile::open(&path, &LoadOptions::default()).unwrap();
    let from = sub.delay_table.clone();
    let desc = OutputDescriptor {
        meta: sub.meta.clone(),
        header: Some(SectionContent::File),
        delay_table: Some(SectionContent::Table(from.clone())),
        udpmap: Some(SectionContent::File),
        margin: Some(SectionContent::File),
        data: Some(DataMode::Repoint {
            from: from.clone(),
            to: from,
            force: false,
        }),
    };
    let mut out = Vec::new();
    writer::write_subfile(&mut sub.reader, &sub.meta, &desc, &mut out).unwrap();
    assert_eq!(out, original);
}

#[test]
fn test_repoint_then_zero_restores_data() {
    let dir = TempDir::new().unwrap();
    let a_path = dir.path().join("a.sub");
    let b_path = dir.path().join("b.sub");
    let original = write_subfile_fixture(&a_path, &[0, 0]);

    // First pass: apply whole-sample delays of [2, -2].
    let mut sub_a = Subfile::open(&a_path, &LoadOptions::default()).unwrap();
    let from = sub_a.delay_table.clone();
    let mut to = from.clone();
    to.entries[0].ws_delay = 2;
    to.entries[1].ws_delay = -2;
    let desc = OutputDescriptor {
        meta: sub_a.meta.clone(),
        header: Some(SectionContent::File),
        delay_table: Some(SectionContent::Table(to.clone())),
        udpmap: Some(SectionContent::File),
        margin: Some(SectionContent::File),
        data: Some(DataMode::Repoint {
            from,
            to,
            force: false,
        }),
    };
    let mut shifted = Vec::new();
    writer::write_subfile(&mut sub_a.reader, &sub_a.meta, &desc, &mut shifted).unwrap();
    assert_ne!(data_section(&shifted), data_section(&original));
    fs::write(&b_path, &shifted).unwrap();

    // Second pass: repoint back to zero delays.
    let mut sub_b = Subfile::open(&b_path, &LoadOptions::default()).unwrap();
    assert_eq!(sub_b.delay_table.entries[0].ws_delay, 2);
    let from = sub_b.delay_table.clone();
    let mut zero = from.clone();
    for entry in &mut zero.entries {
        entry.ws_delay = 0;
    }
    let desc = OutputDescriptor {
        meta: sub_b.meta.clone(),
        header: Some(SectionContent::File),
        delay_table: Some(SectionContent::Table(zero.clone())),
        udpmap: Some(SectionContent::File),
        margin: Some(SectionContent::File),
        data: Some(DataMode::Repoint {
            from,
            to: zero,
            force: false,
        }),
    };
    let mut restored = Vec::new();
    writer::write_subfile(&mut sub_b.reader, &sub_b.meta, &desc, &mut restored).unwrap();
    assert_eq!(data_section(&restored), data_section(&original));
}

#[test]
fn test_remap_identity_matches_passthrough() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.sub");
    let original = write_subfile_fixture(&path, &[0, 0]);

    let mut sub = Subfile::open(&path, &LoadOptions::default()).unwrap();
    let line_map = remap::build_line_map(&sub.delay_table, &[], None).unwrap();
    let desc = OutputDescriptor {
        meta: sub.meta.clone(),
        header: Some(SectionContent::File),
        delay_table: Some(SectionContent::File),
        udpmap: Some(SectionContent::File),
        margin: Some(SectionContent::File),
        data: Some(DataMode::Remap { line_map }),
    };
    let mut out = Vec::new();
    writer::write_subfile(&mut sub.reader, &sub.meta, &desc, &mut out).unwrap();
    assert_eq!(out, original);
}

#[test]
fn test_upgrade_moves_sections_and_rewrites_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.sub");
    let original = write_subfile_fixture(&path, &[1, -1]);

    let mut sub = Subfile::open(
        &path,
        &LoadOptions {
            writable: true,
            ..LoadOptions::default()
        },
    )
    .unwrap();
    let old_meta = sub.meta.clone();
    subfile::upgrade::upgrade_subfile(&mut sub).unwrap();
    drop(sub);

    let upgraded = fs::read(&path).unwrap();
    let sub = Subfile::open(&path, &LoadOptions::default()).unwrap();
    assert_eq!(sub.meta.mwax_sub_version, 2);
    assert_eq!(sub.header.get_u64("MWAX_SUB_VER").unwrap(), 2);
    assert_eq!(sub.header.get_u64("FRAC_DELAY_SIZE").unwrap(), 4);
    // Unknown header keys survive the rewrite.
    assert!(sub.header.get("X_FLAVOUR").is_some());

    // Row length grows from 20 + 2n to 56 + 4n.
    assert_eq!(
        sub.meta.dt_length,
        NUM_SOURCES * (56 + BLOCKS * 10 * 4)
    );
    assert_eq!(sub.delay_table.version, TableVersion::V2);
    assert_eq!(sub.delay_table.entries[0].ws_delay, 1);
    assert_eq!(sub.delay_table.entries[0].frac_delay[0], 1.0);
    assert_eq!(sub.delay_table.entries[0].frac_delay[1], -1.5);

    // Packet map and margin are byte-identical at their new offsets.
    let old_udpmap = &original[old_meta.udpmap_offset as usize
        ..(old_meta.udpmap_offset + old_meta.udpmap_length) as usize];
    let new_udpmap = &upgraded[sub.meta.udpmap_offset as usize
        ..(sub.meta.udpmap_offset + sub.meta.udpmap_length) as usize];
    assert_eq!(old_udpmap, new_udpmap);

    let old_margin = &original[old_meta.margin_offset as usize
        ..(old_meta.margin_offset + old_meta.margin_length) as usize];
    let new_margin = &upgraded[sub.meta.margin_offset as usize
        ..(sub.meta.margin_offset + sub.meta.margin_length) as usize];
    assert_eq!(old_margin, new_margin);

    // The data section is untouched.
    assert_eq!(data_section(&upgraded), data_section(&original));
}

#[test]
fn test_frac_delay_size_mismatch_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.sub");
    write_subfile_fixture(&path, &[0, 0]);

    let mut bytes = fs::read(&path).unwrap();
    let text = HEADER_TEXT.replace("SAMPLE_RATE 32768\n", "SAMPLE_RATE 32768\nFRAC_DELAY_SIZE 4\n");
    let mut header = text.into_bytes();
    header.resize(4096, 0);
    bytes[..4096].copy_from_slice(&header);
    fs::write(&path, &bytes).unwrap();

    assert!(Subfile::open(&path, &LoadOptions::default()).is_err());
}
