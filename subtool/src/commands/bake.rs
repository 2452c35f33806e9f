//! `bake`: apply fractional delays into the sample streams in place.

use std::path::PathBuf;

use clap::Args;
use subfile::bake::{bake_subfile, BakeParams, DEFAULT_CENTRE_FREQUENCY};
use subfile::error::Result;
use subfile::{BlockCache, LoadOptions, Subfile};

use super::parse_source_list;

#[derive(Args, Debug)]
pub struct BakeArgs {
    /// Subfile to modify
    pub subfile: PathBuf,

    /// Samples per FFT chunk
    #[arg(long, default_value_t = 1024)]
    pub fft_size: usize,

    /// Observation centre frequency in Hz
    #[arg(long, default_value_t = DEFAULT_CENTRE_FREQUENCY)]
    pub centre_frequency: f64,

    /// Only bake these sources (comma-separated rf inputs)
    #[arg(long)]
    pub sources: Option<String>,
}

pub fn run(args: BakeArgs) -> Result<()> {
    // Bake reads every block once per source; a larger cache keeps the
    // whole subfile resident.
    let mut subfile = Subfile::open(
        &args.subfile,
        &LoadOptions {
            writable: true,
            cache_capacity: BlockCache::BAKE_CAPACITY,
        },
    )?;
    let sources = args.sources.as_deref().map(parse_source_list).transpose()?;
    let params = BakeParams {
        fft_size: args.fft_size,
        centre_frequency: args.centre_frequency,
    };
    bake_subfile(&mut subfile, sources.as_deref(), &params)
}
