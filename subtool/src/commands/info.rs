//! `info` and `show`: read-only views of a subfile.

use std::path::PathBuf;

use clap::Args;
use subfile::error::Result;
use subfile::{LoadOptions, Subfile};

use super::FormatOut;
use crate::output;

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Subfile to inspect
    pub subfile: PathBuf,
}

pub fn run_info(args: InfoArgs) -> Result<()> {
    let subfile = Subfile::open(&args.subfile, &LoadOptions::default())?;
    output::print_metadata(&subfile);
    Ok(())
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Subfile to inspect
    pub subfile: PathBuf,

    /// Output encoding
    #[arg(long, value_enum, default_value = "pretty")]
    pub format_out: FormatOut,
}

pub fn run_show(args: ShowArgs) -> Result<()> {
    let subfile = Subfile::open(&args.subfile, &LoadOptions::default())?;
    match args.format_out {
        FormatOut::Pretty => print!("{}", subfile.header.pretty()),
        FormatOut::Csv => {
            for (key, value) in subfile.header.sorted_fields() {
                println!("{key},{value}");
            }
        }
        FormatOut::Bin => {
            let buf = subfile
                .header
                .serialise(subfile.meta.header_length as usize)?;
            output::write_stdout(&buf)?;
        }
    }
    Ok(())
}
