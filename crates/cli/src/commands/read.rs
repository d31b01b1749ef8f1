use std::path::Path;

use anyhow::Result;
use scanvault_core::Archive;

pub fn run(archive: &Archive, file: &Path) -> Result<()> {
    let bundle = archive.read_metadata(file)?;
    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}
