//! `get`, `set` and `unset`: header field access and in-place edits.

use std::path::PathBuf;

use clap::Args;
use subfile::error::{Error, Result};
use subfile::{LoadOptions, Subfile};

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Subfile to read
    pub subfile: PathBuf,
    /// Header key
    pub key: String,
}

pub fn run_get(args: GetArgs) -> Result<()> {
    let subfile = Subfile::open(&args.subfile, &LoadOptions::default())?;
    match subfile.header.get(&args.key) {
        Some(value) => {
            println!("{value}");
            Ok(())
        }
        None => Err(Error::MissingResource(format!(
            "header field {}",
            args.key
        ))),
    }
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Subfile to modify
    pub subfile: PathBuf,
    /// Header key
    pub key: String,
    /// New value
    pub value: String,
    /// Allow keys absent from the field registry
    #[arg(long)]
    pub force: bool,
}

pub fn run_set(args: SetArgs) -> Result<()> {
    let mut subfile = Subfile::open(
        &args.subfile,
        &LoadOptions {
            writable: true,
            ..LoadOptions::default()
        },
    )?;
    subfile.header.set(&args.key, &args.value, args.force)?;
    subfile.write_header()?;
    Ok(())
}

#[derive(Args, Debug)]
pub struct UnsetArgs {
    /// Subfile to modify
    pub subfile: PathBuf,
    /// Header key
    pub key: String,
}

pub fn run_unset(args: UnsetArgs) -> Result<()> {
    let mut subfile = Subfile::open(
        &args.subfile,
        &LoadOptions {
            writable: true,
            ..LoadOptions::default()
        },
    )?;
    if !subfile.header.unset(&args.key) {
        return Err(Error::MissingResource(format!(
            "header field {}",
            args.key
        )));
    }
    subfile.write_header()?;
    Ok(())
}
