use std::path::PathBuf;

use anyhow::Result;
use scanvault_core::Archive;

pub fn run(archive: &Archive, files: &[PathBuf]) -> Result<()> {
    archive.clear_metadata(files)?;
    println!("Cleared metadata from {} files.", files.len());
    Ok(())
}
