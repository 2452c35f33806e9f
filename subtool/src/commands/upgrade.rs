//! `upgrade`: in-place v1 to v2 migration.

use std::path::PathBuf;

use clap::Args;
use subfile::error::Result;
use subfile::upgrade::upgrade_subfile;
use subfile::{LoadOptions, Subfile};

#[derive(Args, Debug)]
pub struct UpgradeArgs {
    /// Subfile to upgrade
    pub subfile: PathBuf,
}

pub fn run(args: UpgradeArgs) -> Result<()> {
    let mut subfile = Subfile::open(
        &args.subfile,
        &LoadOptions {
            writable: true,
            ..LoadOptions::default()
        },
    )?;
    upgrade_subfile(&mut subfile)
}
