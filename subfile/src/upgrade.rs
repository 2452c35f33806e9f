//! In-place v1 to v2 subfile migration.
//!
//! The v2 delay table is wider, so the packet map and margin sections move
//! towards the end of block 0. Both are read into memory before anything
//! is rewritten; their contents are preserved byte for byte.

use tracing::info;

use crate::error::{Error, Result};
use crate::loader::Subfile;
use crate::metadata::Section;

/// Upgrade a v1 subfile to v2. A subfile that is already v2 is left
/// untouched.
pub fn upgrade_subfile(subfile: &mut Subfile) -> Result<()> {
    if subfile.meta.mwax_sub_version == 2 {
        info!("subfile is already v2");
        return Ok(());
    }

    let udpmap = subfile.reader.read_section(&subfile.meta, Section::UdpMap)?;
    let margin = subfile.reader.read_section(&subfile.meta, Section::Margin)?;

    let mut meta = subfile.meta.clone();
    meta.upgrade_to_v2();
    if !meta.preamble_packed() {
        return Err(Error::InvalidFormat(format!(
            "v2 sections end at {} which exceeds the {}-byte preamble",
            meta.margin_offset + meta.margin_length,
            meta.preamble_length()
        )));
    }

    let table = subfile.delay_table.to_v2();
    let table_bytes = crate::delays::binary::serialise(&table);
    if table_bytes.len() as u64 != meta.dt_length {
        return Err(Error::InvalidFormat(format!(
            "v2 delay table serialises to {} bytes, expected {}",
            table_bytes.len(),
            meta.dt_length
        )));
    }

    // The moved sections are written before the table that displaces them;
    // every write lands inside the in-memory snapshot's region.
    subfile.reader.write_at(meta.udpmap_offset, &udpmap)?;
    subfile.reader.write_at(meta.margin_offset, &margin)?;
    subfile.reader.write_at(meta.dt_offset, &table_bytes)?;

    subfile.header.set("FRAC_DELAY_SIZE", "4", false)?;
    subfile.header.set("MWAX_SUB_VER", "2", false)?;
    let header_bytes = subfile.header.serialise(meta.header_length as usize)?;
    subfile.reader.write_at(meta.header_offset, &header_bytes)?;
    subfile.reader.sync()?;

    subfile.meta = meta;
    subfile.delay_table = table;
    info!("upgraded subfile to v2");
    Ok(())
}
