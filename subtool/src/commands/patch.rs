//! `patch`: splice a section from an external file in place.

use std::path::PathBuf;

use clap::Args;
use subfile::error::{Error, Result};
use subfile::{Header, LoadOptions, Section, Subfile};

#[derive(Args, Debug)]
pub struct PatchArgs {
    /// Subfile to modify
    pub subfile: PathBuf,

    /// Section to replace: header, dt, udpmap or margin
    #[arg(long)]
    pub section: String,

    /// File holding the replacement bytes
    #[arg(long)]
    pub from: PathBuf,
}

pub fn run(args: PatchArgs) -> Result<()> {
    let section = Section::from_name(&args.section)?;
    if section == Section::Data {
        return Err(Error::InvalidArgument(
            "the data section cannot be patched; use repoint, replace or resample".into(),
        ));
    }

    let mut subfile = Subfile::open(
        &args.subfile,
        &LoadOptions {
            writable: true,
            ..LoadOptions::default()
        },
    )?;

    let bytes = std::fs::read(&args.from)?;
    let expected = subfile.meta.section_length(section);
    if bytes.len() as u64 != expected {
        return Err(Error::InvalidFormat(format!(
            "{} is {} bytes, the {} section needs exactly {expected}",
            args.from.display(),
            bytes.len(),
            section.name()
        )));
    }
    // A header patch must at least parse.
    if section == Section::Header {
        Header::parse(&bytes)?;
    }

    subfile
        .reader
        .write_at(subfile.meta.section_offset(section), &bytes)?;
    subfile.reader.sync()?;
    Ok(())
}
