//! Derived geometry of one open subfile.
//!
//! Every section offset in a subfile is arithmetic over header fields. The
//! divisions involved must all be exact for a conformant header; any
//! remainder is a malformed file.

use crate::error::{Error, Result};
use crate::header::Header;
use crate::{BYTES_PER_SAMPLE, FFT_PER_BLOCK, HEADER_LENGTH, MARGIN_PACKETS, SAMPLES_PER_PACKET};

/// Named sections of a subfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Header,
    DelayTable,
    UdpMap,
    Margin,
    Data,
}

impl Section {
    pub fn name(self) -> &'static str {
        match self {
            Section::Header => "header",
            Section::DelayTable => "dt",
            Section::UdpMap => "udpmap",
            Section::Margin => "margin",
            Section::Data => "data",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "header" => Ok(Section::Header),
            "dt" => Ok(Section::DelayTable),
            "udpmap" => Ok(Section::UdpMap),
            "margin" => Ok(Section::Margin),
            "data" => Ok(Section::Data),
            other => Err(Error::InvalidArgument(format!("unknown section '{other}'"))),
        }
    }
}

/// Derived record describing one open subfile. Immutable after load, except
/// for the upgrade command which rewrites the version-dependent fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub observation_id: u64,
    pub subobservation_id: u64,

    pub sample_rate: u64,
    pub secs_per_subobs: u64,
    pub samples_per_line: u64,
    pub samples_per_packet: u64,
    pub margin_packets: u64,
    pub fft_per_block: u64,
    pub num_sources: u64,
    pub mwax_sub_version: u8,

    pub blocks_per_sub: u64,
    pub sub_line_size: u64,
    pub block_length: u64,
    pub num_frac_delays: u64,
    pub margin_samples: u64,
    pub frac_delay_size: u64,
    pub dt_entry_min_size: u64,
    pub dt_length: u64,
    pub udpmap_length: u64,
    pub margin_length: u64,

    pub header_offset: u64,
    pub header_length: u64,
    pub dt_offset: u64,
    pub udpmap_offset: u64,
    pub margin_offset: u64,
    pub data_offset: u64,
}

fn exact_div(numerator: u64, denominator: u64, what: &str) -> Result<u64> {
    if denominator == 0 {
        return Err(Error::InvalidFormat(format!("{what}: division by zero")));
    }
    if numerator % denominator != 0 {
        return Err(Error::InvalidFormat(format!(
            "{what}: {numerator} is not divisible by {denominator}"
        )));
    }
    Ok(numerator / denominator)
}

impl Metadata {
    /// Derive the full geometry from a parsed header.
    pub fn from_header(header: &Header) -> Result<Metadata> {
        let observation_id = header.get_u64("OBS_ID")?;
        let subobservation_id = header.get_u64("SUBOBS_ID")?;
        let sample_rate = header.get_u64("SAMPLE_RATE")?;
        let secs_per_subobs = header.get_u64("SECS_PER_SUBOBS")?;
        let samples_per_line = header.get_u64("NTIMESAMPLES")?;
        let num_sources = header.get_u64("NINPUTS")?;
        let mwax_sub_version = header.get_u64_or("MWAX_SUB_VER", 1)?;
        if !(1..=2).contains(&mwax_sub_version) {
            return Err(Error::VersionMismatch {
                expected: "MWAX_SUB_VER 1 or 2".into(),
                detected: mwax_sub_version.to_string(),
            });
        }

        let samples_per_sub = sample_rate * secs_per_subobs;
        let blocks_per_sub = exact_div(samples_per_sub, samples_per_line, "blocks per sub")?;
        let sub_line_size = samples_per_line * BYTES_PER_SAMPLE;
        let block_length = sub_line_size * num_sources;
        let num_frac_delays = blocks_per_sub * FFT_PER_BLOCK;
        let margin_samples = MARGIN_PACKETS * SAMPLES_PER_PACKET;
        let (frac_delay_size, dt_entry_min_size) = Self::version_sizes(mwax_sub_version as u8);
        let dt_length = num_sources * (dt_entry_min_size + num_frac_delays * frac_delay_size);
        let packets_per_source =
            exact_div(samples_per_sub, SAMPLES_PER_PACKET, "packets per source")?;
        let udpmap_length = exact_div(num_sources * packets_per_source, 8, "packet map length")?;
        let margin_length = num_sources * margin_samples * 2 * BYTES_PER_SAMPLE;

        let dt_offset = HEADER_LENGTH;
        let udpmap_offset = dt_offset + dt_length;
        let margin_offset = udpmap_offset + udpmap_length;
        let data_offset = HEADER_LENGTH + block_length;

        Ok(Metadata {
            observation_id,
            subobservation_id,
            sample_rate,
            secs_per_subobs,
            samples_per_line,
            samples_per_packet: SAMPLES_PER_PACKET,
            margin_packets: MARGIN_PACKETS,
            fft_per_block: FFT_PER_BLOCK,
            num_sources,
            mwax_sub_version: mwax_sub_version as u8,
            blocks_per_sub,
            sub_line_size,
            block_length,
            num_frac_delays,
            margin_samples,
            frac_delay_size,
            dt_entry_min_size,
            dt_length,
            udpmap_length,
            margin_length,
            header_offset: 0,
            header_length: HEADER_LENGTH,
            dt_offset,
            udpmap_offset,
            margin_offset,
            data_offset,
        })
    }

    fn version_sizes(version: u8) -> (u64, u64) {
        if version == 1 {
            (2, 20)
        } else {
            (4, 56)
        }
    }

    /// Rewrite the version-dependent fields for a v1 to v2 migration. The
    /// delay table grows, pushing the packet map and margin sections along.
    pub fn upgrade_to_v2(&mut self) {
        self.mwax_sub_version = 2;
        let (frac_delay_size, dt_entry_min_size) = Self::version_sizes(2);
        self.frac_delay_size = frac_delay_size;
        self.dt_entry_min_size = dt_entry_min_size;
        self.dt_length =
            self.num_sources * (dt_entry_min_size + self.num_frac_delays * frac_delay_size);
        self.udpmap_offset = self.dt_offset + self.dt_length;
        self.margin_offset = self.udpmap_offset + self.udpmap_length;
    }

    pub fn section_offset(&self, section: Section) -> u64 {
        match section {
            Section::Header => self.header_offset,
            Section::DelayTable => self.dt_offset,
            Section::UdpMap => self.udpmap_offset,
            Section::Margin => self.margin_offset,
            Section::Data => self.data_offset,
        }
    }

    pub fn section_length(&self, section: Section) -> u64 {
        match section {
            Section::Header => self.header_length,
            Section::DelayTable => self.dt_length,
            Section::UdpMap => self.udpmap_length,
            Section::Margin => self.margin_length,
            Section::Data => self.data_length(),
        }
    }

    pub fn data_length(&self) -> u64 {
        self.blocks_per_sub * self.block_length
    }

    /// End of the preamble region: header plus one block-0 worth of space
    /// holding the delay table, packet map and margin.
    pub fn preamble_length(&self) -> u64 {
        self.header_length + self.block_length
    }

    /// Whether the delay table, packet map and margin fit inside block 0.
    pub fn preamble_packed(&self) -> bool {
        self.margin_offset + self.margin_length <= self.preamble_length()
    }

    pub fn blocks_per_sec(&self) -> f64 {
        self.blocks_per_sub as f64 / self.secs_per_subobs as f64
    }
}
