//! `repoint`, `replace` and `resample`: subfile-to-subfile transforms.

use std::fs::File;
use std::path::PathBuf;

use clap::Args;
use subfile::error::{Error, Result};
use subfile::resample::ResampleRules;
use subfile::writer::{self, DataMode, OutputDescriptor, SectionContent};
use subfile::{remap, LoadOptions, Subfile};

use super::{load_delay_table, parse_map_pairs, parse_rule, FormatIn};

fn write_transformed(subfile: &mut Subfile, output: &PathBuf, desc: &OutputDescriptor) -> Result<()> {
    let mut out = File::create(output)?;
    writer::write_subfile(&mut subfile.reader, &subfile.meta, desc, &mut out)?;
    out.sync_all()?;
    Ok(())
}

#[derive(Args, Debug)]
pub struct RepointArgs {
    /// Input subfile
    pub input: PathBuf,
    /// Output subfile
    pub output: PathBuf,

    /// Delay table to apply
    #[arg(long, required_unless_present = "zero")]
    pub delay_table: Option<PathBuf>,

    /// Apply an all-zero delay table instead
    #[arg(long, conflicts_with = "delay_table")]
    pub zero: bool,

    /// Input encoding for --delay-table
    #[arg(long, value_enum, default_value = "auto")]
    pub format_in: FormatIn,

    /// Zero-fill samples the margin cannot provide instead of failing
    #[arg(long)]
    pub force: bool,
}

pub fn run_repoint(args: RepointArgs) -> Result<()> {
    let mut subfile = Subfile::open(&args.input, &LoadOptions::default())?;
    let from = subfile.delay_table.clone();

    let mut to = if args.zero {
        from.zeroed()
    } else {
        let path = args
            .delay_table
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("repoint needs --delay-table or --zero".into()))?;
        load_delay_table(path, args.format_in, None, Some(from.num_frac_delays()))?
    };
    // The output subfile keeps its own on-disk table version.
    to.version = from.version;

    let desc = OutputDescriptor {
        meta: subfile.meta.clone(),
        header: Some(SectionContent::File),
        delay_table: Some(SectionContent::Table(to.clone())),
        udpmap: Some(SectionContent::File),
        margin: Some(SectionContent::File),
        data: Some(DataMode::Repoint {
            from,
            to,
            force: args.force,
        }),
    };
    write_transformed(&mut subfile, &args.output, &desc)
}

#[derive(Args, Debug)]
pub struct ReplaceArgs {
    /// Input subfile
    pub input: PathBuf,
    /// Output subfile
    pub output: PathBuf,

    /// Pointwise reassignments, `DST:SRC,DST:SRC,...`
    #[arg(long)]
    pub map: Option<String>,

    /// Reassign every slot to this source's stream
    #[arg(long)]
    pub map_all: Option<u16>,
}

pub fn run_replace(args: ReplaceArgs) -> Result<()> {
    let mut subfile = Subfile::open(&args.input, &LoadOptions::default())?;
    let pairs = match &args.map {
        Some(map) => parse_map_pairs(map)?,
        None => Vec::new(),
    };
    let line_map = remap::build_line_map(&subfile.delay_table, &pairs, args.map_all)?;

    let desc = OutputDescriptor {
        meta: subfile.meta.clone(),
        header: Some(SectionContent::File),
        delay_table: Some(SectionContent::File),
        udpmap: Some(SectionContent::File),
        margin: Some(SectionContent::File),
        data: Some(DataMode::Remap { line_map }),
    };
    write_transformed(&mut subfile, &args.output, &desc)
}

#[derive(Args, Debug)]
pub struct ResampleArgs {
    /// Input subfile
    pub input: PathBuf,
    /// Output subfile
    pub output: PathBuf,

    /// Transform rules, `SRC:scale:FACTOR` or `SRC:linear:RATE:INITIAL`
    #[arg(long = "rule", required = true)]
    pub rules: Vec<String>,

    /// Neighbourhood samples available to each transform
    #[arg(long, default_value_t = 10)]
    pub region: usize,
}

pub fn run_resample(args: ResampleArgs) -> Result<()> {
    let mut subfile = Subfile::open(&args.input, &LoadOptions::default())?;
    let rules = args
        .rules
        .iter()
        .map(|rule| parse_rule(rule))
        .collect::<Result<Vec<_>>>()?;
    let rules = ResampleRules::build(&subfile.delay_table, &rules, args.region)?;

    let desc = OutputDescriptor {
        meta: subfile.meta.clone(),
        header: Some(SectionContent::File),
        delay_table: Some(SectionContent::File),
        udpmap: Some(SectionContent::File),
        margin: Some(SectionContent::File),
        data: Some(DataMode::Resample { rules }),
    };
    write_transformed(&mut subfile, &args.output, &desc)
}
