//! `dt`: show, convert and compare delay tables.

use std::path::PathBuf;

use clap::Args;
use subfile::delays::{binary, csv, DelayTable, TableVersion};
use subfile::error::{Error, Result};
use subfile::{LoadOptions, Subfile};

use super::{load_delay_table, parse_source_list, FormatIn, FormatOut};
use crate::output;

#[derive(Args, Debug)]
pub struct DtArgs {
    /// Subfile whose delay table to show
    pub subfile: PathBuf,

    /// Read the table from a standalone file instead of the subfile
    #[arg(long)]
    pub table: Option<PathBuf>,

    /// Input encoding for --table
    #[arg(long, value_enum, default_value = "auto")]
    pub format_in: FormatIn,

    /// Output encoding
    #[arg(long, value_enum, default_value = "pretty")]
    pub format_out: FormatOut,

    /// Expected delay table version (1 or 2)
    #[arg(long)]
    pub version: Option<u64>,

    /// Expected number of fractional delays per source
    #[arg(long)]
    pub num_frac_delays: Option<usize>,

    /// Only show these sources (comma-separated rf inputs)
    #[arg(long)]
    pub sources: Option<String>,

    /// Show element-wise differences against another table file
    #[arg(long)]
    pub compare: Option<PathBuf>,
}

pub fn run(args: DtArgs) -> Result<()> {
    let expected_version = args.version.map(TableVersion::from_number).transpose()?;

    let mut table = match &args.table {
        Some(path) => load_delay_table(path, args.format_in, expected_version, args.num_frac_delays)?,
        None => {
            let subfile = Subfile::open(&args.subfile, &LoadOptions::default())?;
            if let Some(expected) = expected_version {
                if subfile.delay_table.version != expected {
                    return Err(Error::VersionMismatch {
                        expected: expected.to_string(),
                        detected: subfile.delay_table.version.to_string(),
                    });
                }
            }
            subfile.delay_table
        }
    };

    if let Some(other) = &args.compare {
        let to = load_delay_table(other, args.format_in, None, None)?;
        table = DelayTable::compare(&table, &to)?;
    }

    if let Some(sources) = &args.sources {
        let keep = parse_source_list(sources)?;
        for &rf_input in &keep {
            table.index_of(rf_input)?;
        }
        table.entries.retain(|e| keep.contains(&e.rf_input));
    }

    match args.format_out {
        FormatOut::Pretty => print!("{}", table.pretty()),
        FormatOut::Csv => print!("{}", csv::serialise(&table)),
        FormatOut::Bin => output::write_stdout(&binary::serialise(&table))?,
    }
    Ok(())
}
